use anyhow::{Context, Result};
use console::style;
use encoding_rs::UTF_8;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// environment-derived settings, captured once per invocation and passed explicitly
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub github_actions: bool,
    pub github_output: Option<PathBuf>,
    pub devcontainer: bool,
    pub home_dir: Option<PathBuf>,
    pub path_var: Option<String>,
    /// fail on malformed config entries instead of skipping them
    pub strict: bool,
}

impl RunContext {
    pub fn from_env() -> Self {
        Self {
            github_actions: env::var("GITHUB_ACTIONS").is_ok_and(|value| value == "true"),
            github_output: env::var_os("GITHUB_OUTPUT")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            devcontainer: env::var("DEVCONTAINER").is_ok_and(|value| value == "true"),
            home_dir: env::var_os("HOME").filter(|value| !value.is_empty()).map(PathBuf::from),
            path_var: env::var("PATH").ok(),
            strict: false,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// publish step outputs for github actions. outside of actions this does nothing
    pub fn publish_outputs(&self, outputs: &[(&str, String)]) -> Result<()> {
        if !self.github_actions {
            return Ok(());
        }

        match &self.github_output {
            Some(path) => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open GITHUB_OUTPUT file {}", path.display()))?;
                for (key, value) in outputs {
                    writeln!(file, "{key}={value}")
                        .with_context(|| format!("failed to write {key} to GITHUB_OUTPUT"))?;
                }
            }
            // runners without GITHUB_OUTPUT still understand the legacy workflow command
            None => {
                for (key, value) in outputs {
                    println!("::set-output name={key}::{value}");
                }
            }
        }

        Ok(())
    }
}

/// directory prefixes whose files the go tools leave alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    dirs: Vec<String>,
}

impl IgnoreList {
    pub fn new(dirs: &[String]) -> Self {
        let dirs = dirs
            .iter()
            .map(|dir| dir.trim_end_matches('/').to_string())
            .filter(|dir| !dir.is_empty())
            .collect();
        Self { dirs }
    }

    /// true when the path is one of the ignored dirs or lives below one
    pub fn should_ignore(&self, path: &str) -> bool {
        self.dirs.iter().any(|dir| {
            path == dir
                || path
                    .strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// `PASS ✅` or `FAIL ❌ (reason)` for summary lines
pub fn format_status(success: bool, failure_reason: &str) -> String {
    if success {
        style("PASS ✅").green().to_string()
    } else {
        style(format!("FAIL ❌ ({failure_reason})")).red().to_string()
    }
}

/// print tool output indented under the line that introduced it
pub fn print_indented(output: &str) {
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        println!("    {line}");
    }
}

/// decode file bytes as utf-8, replacing malformed sequences
pub fn decode_content(bytes: &[u8]) -> String {
    let (text, had_errors) = UTF_8.decode_without_bom_handling(bytes);
    if had_errors {
        log::debug!("replaced malformed utf-8 sequences while decoding {} bytes", bytes.len());
    }
    text.into_owned()
}

/// truncate a string to a maximum length with ellipsis
pub fn truncate_with_ellipsis(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        text.to_string()
    } else {
        let mut end_pos = std::cmp::min(max_length.saturating_sub(3), text.len());

        // step back to a char boundary so multi-byte characters stay intact
        while end_pos > 0 && !text.is_char_boundary(end_pos) {
            end_pos -= 1;
        }

        format!("{}...", &text[..end_pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_ignore_list_matches_dirs_and_children() {
        let ignore = IgnoreList::new(&["scripts/vendor/".to_string(), String::new()]);
        assert!(ignore.should_ignore("scripts/vendor"));
        assert!(ignore.should_ignore("scripts/vendor/lib/a.go"));
        assert!(!ignore.should_ignore("scripts/vendored/a.go"));
        assert!(!ignore.should_ignore("scripts/main.go"));
        assert!(!IgnoreList::default().should_ignore("anything.go"));
    }

    #[test]
    fn test_decode_content_is_lossy() {
        assert_eq!(decode_content(b"resource \"x\" {}"), "resource \"x\" {}");
        assert_eq!(decode_content(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("a much longer line", 10), "a much ...");
        assert_eq!(truncate_with_ellipsis("ééééé", 6), "é...");
    }

    #[test]
    fn test_publish_outputs_appends_to_github_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("github_output");
        fs::write(&output, "existing=1\n").unwrap();

        let ctx = RunContext {
            github_actions: true,
            github_output: Some(output.clone()),
            ..RunContext::default()
        };
        ctx.publish_outputs(&[("module_path", "modules/service/a".to_string()), ("is_module", "true".to_string())])
            .unwrap();

        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(written, "existing=1\nmodule_path=modules/service/a\nis_module=true\n");
    }

    #[test]
    fn test_publish_outputs_outside_actions_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("github_output");
        let ctx = RunContext {
            github_output: Some(output.clone()),
            ..RunContext::default()
        };
        ctx.publish_outputs(&[("module_type", "service".to_string())]).unwrap();
        assert!(!output.exists());
    }
}
