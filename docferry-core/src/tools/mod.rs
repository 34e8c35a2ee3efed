//! Bulk export/import tool invocation.
//!
//! The coordinators describe what to run as a [`ToolInvocation`] and hand it
//! to a [`ToolRunner`]. [`ProcessToolRunner`] spawns the real executables;
//! tests substitute their own runner.
//!
//! # Security
//! The connection URI is kept apart from the other arguments in a zeroizing
//! container and only joins the argument vector at spawn time.
//! [`ToolInvocation::describe`] renders the redacted form for logs.

mod process;

pub use process::ProcessToolRunner;

use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Which bulk tool an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkTool {
    /// `mongodump`
    Export,
    /// `mongorestore`
    Import,
}

impl BulkTool {
    /// Executable name looked up on `PATH` or in a tools directory.
    pub fn executable_name(self) -> &'static str {
        match self {
            BulkTool::Export => "mongodump",
            BulkTool::Import => "mongorestore",
        }
    }
}

impl std::fmt::Display for BulkTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable_name())
    }
}

/// Explicit executable locations for the bulk tools.
///
/// Replaces any process-wide `PATH` mutation: callers decide where the tools
/// live and pass this into the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Export executable
    pub export: PathBuf,
    /// Import executable
    pub import: PathBuf,
}

impl Default for ToolPaths {
    /// Bare executable names, resolved through `PATH` at spawn time.
    fn default() -> Self {
        Self {
            export: PathBuf::from(BulkTool::Export.executable_name()),
            import: PathBuf::from(BulkTool::Import.executable_name()),
        }
    }
}

impl ToolPaths {
    /// Both tools inside one directory (e.g. an unpacked database-tools bundle).
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            export: dir.join(executable_file_name(BulkTool::Export)),
            import: dir.join(executable_file_name(BulkTool::Import)),
        }
    }

    /// Path for a tool.
    pub fn path_for(&self, tool: BulkTool) -> &Path {
        match tool {
            BulkTool::Export => &self.export,
            BulkTool::Import => &self.import,
        }
    }
}

fn executable_file_name(tool: BulkTool) -> String {
    format!("{}{}", tool.executable_name(), std::env::consts::EXE_SUFFIX)
}

/// A fully described bulk tool call.
#[derive(Clone)]
pub struct ToolInvocation {
    tool: BulkTool,
    uri: Zeroizing<String>,
    redacted_uri: String,
    args: Vec<String>,
}

impl std::fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvocation")
            .field("tool", &self.tool)
            .field("uri", &self.redacted_uri)
            .field("args", &self.args)
            .finish()
    }
}

impl ToolInvocation {
    /// Starts an invocation against a connection URI.
    pub fn new(tool: BulkTool, uri: Zeroizing<String>, redacted_uri: String) -> Self {
        Self {
            tool,
            uri,
            redacted_uri,
            args: Vec::new(),
        }
    }

    /// Appends a `--name=value` flag.
    pub fn flag(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        self.args.push(format!("--{}={}", name, value));
        self
    }

    /// Appends a bare `--name` switch.
    pub fn switch(mut self, name: &str) -> Self {
        self.args.push(format!("--{}", name));
        self
    }

    /// Appends a `--name=value` flag when `value` is present.
    pub fn flag_opt<T: std::fmt::Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.flag(name, value),
            None => self,
        }
    }

    /// Appends a bare `--name` switch when `enabled`.
    pub fn switch_if(self, name: &str, enabled: bool) -> Self {
        if enabled { self.switch(name) } else { self }
    }

    /// Appends a positional argument.
    pub fn positional(mut self, value: impl AsRef<Path>) -> Self {
        self.args.push(value.as_ref().display().to_string());
        self
    }

    /// Target tool.
    pub fn tool(&self) -> BulkTool {
        self.tool
    }

    /// Arguments other than the URI.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether a `--name` switch or `--name=...` flag is present.
    pub fn has_flag(&self, name: &str) -> bool {
        let bare = format!("--{}", name);
        let prefixed = format!("--{}=", name);
        self.args
            .iter()
            .any(|arg| *arg == bare || arg.starts_with(&prefixed))
    }

    /// Value of a `--name=value` flag.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let prefixed = format!("--{}=", name);
        self.args.iter().find_map(|arg| arg.strip_prefix(&prefixed))
    }

    /// Full argument vector including the secret URI. Only for spawning.
    pub fn command_args(&self) -> Zeroizing<Vec<String>> {
        let mut args = Vec::with_capacity(self.args.len().saturating_add(1));
        args.push(format!("--uri={}", self.uri.as_str()));
        args.extend(self.args.iter().cloned());
        Zeroizing::new(args)
    }

    /// Loggable command line with the password redacted.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.tool.to_string(), format!("--uri={}", self.redacted_uri)];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a finished tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error (the tools log progress here)
    pub stderr: String,
}

impl ToolOutput {
    /// Exit status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `lines` non-empty lines of stderr, joined by `; `.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let start = tail.len().saturating_sub(lines);
        tail[start..].join("; ")
    }

    /// Human-readable failure cause for a non-zero exit.
    pub fn failure_cause(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let tail = self.stderr_tail(3);
        if tail.is_empty() {
            status
        } else {
            format!("{}: {}", status, tail)
        }
    }
}

/// Runs a bulk tool invocation to completion.
///
/// Each call is a blocking external operation from the coordinator's point of
/// view: there is no cooperative cancellation once the tool has started.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs the tool and captures its output.
    ///
    /// # Errors
    /// Returns an error only when the process could not be started or
    /// awaited. A non-zero exit is reported through [`ToolOutput`].
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

#[async_trait]
impl<T: ToolRunner + ?Sized> ToolRunner for std::sync::Arc<T> {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        (**self).run(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> ToolInvocation {
        ToolInvocation::new(
            BulkTool::Export,
            Zeroizing::new("mongodb://u:s3cret@h:27017/".to_string()),
            "mongodb://u:REDACTED@h:27017/".to_string(),
        )
    }

    #[test]
    fn test_describe_is_redacted() {
        let inv = invocation().flag("db", "reg").switch("gzip");
        let described = inv.describe();

        assert_eq!(
            described,
            "mongodump --uri=mongodb://u:REDACTED@h:27017/ --db=reg --gzip"
        );
        assert!(!format!("{:?}", inv).contains("s3cret"));
    }

    #[test]
    fn test_command_args_start_with_uri() {
        let inv = invocation().flag("db", "reg");
        let args = inv.command_args();
        assert_eq!(args[0], "--uri=mongodb://u:s3cret@h:27017/");
        assert_eq!(args[1], "--db=reg");
    }

    #[test]
    fn test_optional_flags() {
        let inv = invocation()
            .flag_opt("numParallelCollections", Some(4))
            .flag_opt::<u32>("collection", None)
            .switch_if("gzip", false)
            .switch_if("tlsInsecure", true);

        assert_eq!(inv.flag_value("numParallelCollections"), Some("4"));
        assert!(!inv.has_flag("collection"));
        assert!(!inv.has_flag("gzip"));
        assert!(inv.has_flag("tlsInsecure"));
    }

    #[test]
    fn test_tool_paths_from_dir() {
        let paths = ToolPaths::from_dir("/opt/tools/bin");
        assert!(paths.path_for(BulkTool::Export).starts_with("/opt/tools/bin"));
        assert!(
            paths
                .path_for(BulkTool::Import)
                .to_string_lossy()
                .contains("mongorestore")
        );
        assert_eq!(ToolPaths::default().export, PathBuf::from("mongodump"));
    }

    #[test]
    fn test_failure_cause_uses_stderr_tail() {
        let output = ToolOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "line one\n\nline two\nline three\nFailed: auth error\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(
            output.failure_cause(),
            "exit status 1: line two; line three; Failed: auth error"
        );
    }

    #[test]
    fn test_failure_cause_signal() {
        let output = ToolOutput {
            exit_code: None,
            ..Default::default()
        };
        assert_eq!(output.failure_cause(), "terminated by signal");
    }
}
