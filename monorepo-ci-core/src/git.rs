use anyhow::{bail, Context, Result};
use git2::{DiffOptions, Repository};

/// files changed on `head` since it diverged from `base`
///
/// mirrors a pull request diff: both refs are resolved to commits and the
/// tree of their merge base is compared with the tree of `head`.
pub fn changed_files_between(repo_path: &str, base: &str, head: &str) -> Result<Vec<String>> {
    // open the repository
    let repo = Repository::discover(repo_path)
        .context("failed to open git repository")?;

    let base_commit = repo
        .revparse_single(base)
        .and_then(|object| object.peel_to_commit())
        .with_context(|| format!("failed to resolve base ref '{base}'"))?;
    let head_commit = repo
        .revparse_single(head)
        .and_then(|object| object.peel_to_commit())
        .with_context(|| format!("failed to resolve head ref '{head}'"))?;

    let merge_base = repo
        .merge_base(base_commit.id(), head_commit.id())
        .with_context(|| format!("no merge base between '{base}' and '{head}'"))?;
    let base_tree = repo.find_commit(merge_base)?.tree()?;
    let head_tree = head_commit.tree()?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.show_binary(false);

    let diff = repo
        .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut diff_opts))
        .context("failed to diff trees")?;

    let mut files = Vec::new();
    diff.foreach(
        &mut |delta, _| {
            // deleted files only have an old path
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                files.push(path.to_string_lossy().replace('\\', "/"));
            }
            true
        },
        None,
        None,
        None,
    )
    .context("failed to walk diff")?;

    files.dedup();
    log::debug!("{} file(s) changed between {base} and {head}", files.len());
    Ok(files)
}

/// name of the checked out branch; a detached HEAD is an error
pub fn current_branch(repo_path: &str) -> Result<String> {
    let repo = Repository::discover(repo_path)
        .context("failed to get current branch (ensure you're in a git repository)")?;

    if repo.head_detached().unwrap_or(false) {
        bail!("current branch name is empty (you might be in detached HEAD state)");
    }

    let head = repo.head().context("failed to read HEAD")?;
    match head.shorthand() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => bail!("current branch name is empty (you might be in detached HEAD state)"),
    }
}
