// monorepo-ci-core/src/process.rs

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// how a child process is wired to the terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// collect stdout and stderr for the caller
    #[default]
    Capture,
    /// let the tool write straight to our stdout/stderr
    Stream,
    /// like stream, but the tool may also read from stdin (gh auth login)
    Interactive,
}

/// an external command to run: program, arguments, working dir and extra env vars
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub mode: OutputMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, envs: &[(String, String)]) -> Self {
        self.envs.extend_from_slice(envs);
        self
    }

    pub fn streamed(mut self) -> Self {
        self.mode = OutputMode::Stream;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.mode = OutputMode::Interactive;
        self
    }

    /// the command line as a user would type it
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// what a finished command left behind; streamed commands have empty stdout/stderr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, the way a terminal would show them
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// the seam between the tools and the external programs they drive
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// run a command to completion. failing to start it is an error, a non-zero exit is not
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// whether the program can be found on PATH
    fn is_available(&self, program: &str) -> bool;
}

/// runs commands on the host through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.envs {
            command.env(key, value);
        }

        if spec.mode == OutputMode::Capture {
            command.stdin(Stdio::null());
            let output = command
                .output()
                .await
                .with_context(|| format!("failed to execute '{}'", spec.program))?;

            return Ok(CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        if spec.mode == OutputMode::Stream {
            command.stdin(Stdio::null());
        }
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());

        let status = command
            .status()
            .await
            .with_context(|| format!("failed to execute '{}'", spec.program))?;

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            ..CommandOutput::default()
        })
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// run a captured command behind a spinner when someone is watching the terminal
pub async fn run_with_spinner<R: CommandRunner>(
    runner: &R,
    spec: &CommandSpec,
    message: &str,
) -> Result<CommandOutput> {
    let spinner = if spec.mode == OutputMode::Capture && console::user_attended_stderr() {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    } else {
        ProgressBar::hidden()
    };

    let result = runner.run(spec).await;
    spinner.finish_and_clear();
    result
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let spec = CommandSpec::new("gofmt")
            .args(["-l", "scripts"])
            .env("GOGC", "off")
            .current_dir("/tmp");

        assert_eq!(spec.display(), "gofmt -l scripts");
        assert_eq!(spec.envs, vec![("GOGC".to_string(), "off".to_string())]);
        assert_eq!(spec.current_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.mode, OutputMode::Capture);
        assert_eq!(spec.clone().streamed().mode, OutputMode::Stream);
        assert_eq!(spec.interactive().mode, OutputMode::Interactive);
    }

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            success: false,
            code: Some(2),
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr\n");
        assert_eq!(CommandOutput::failed(1, "boom").combined(), "boom");
        assert_eq!(CommandOutput::ok("fine").combined(), "fine");
        assert_eq!(output.status_text(), "exit status 2");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program_is_an_error() {
        let runner = SystemRunner;
        assert!(!runner.is_available("definitely-not-a-real-program-4821"));
        let result = runner
            .run(&CommandSpec::new("definitely-not-a-real-program-4821"))
            .await;
        assert!(result.is_err());
    }
}
