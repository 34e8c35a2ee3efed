//! Spawns the bulk tools as child processes.

use super::{ToolInvocation, ToolOutput, ToolPaths, ToolRunner};
use crate::error::{DocFerryError, scrub_secrets};
use crate::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// [`ToolRunner`] backed by real `mongodump`/`mongorestore` executables.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner {
    paths: ToolPaths,
}

impl ProcessToolRunner {
    /// Creates a runner using explicit tool locations.
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    /// Tool locations in use.
    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let program = self.paths.path_for(invocation.tool());
        tracing::debug!("Running {}", invocation.describe());

        let args = invocation.command_args();
        let output = Command::new(program)
            .args(args.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DocFerryError::io(
                    format!(
                        "Failed to run {} ({})",
                        invocation.tool(),
                        program.display()
                    ),
                    e,
                )
            })?;

        let result = ToolOutput {
            exit_code: output.status.code(),
            stdout: scrub_secrets(&String::from_utf8_lossy(&output.stdout)),
            stderr: scrub_secrets(&String::from_utf8_lossy(&output.stderr)),
        };

        if result.success() {
            tracing::trace!("{} finished: {}", invocation.tool(), result.stderr_tail(1));
        } else {
            tracing::debug!(
                "{} exited unsuccessfully: {}",
                invocation.tool(),
                result.failure_cause()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::BulkTool;
    use zeroize::Zeroizing;

    #[tokio::test]
    async fn test_missing_executable_is_io_error() {
        let runner = ProcessToolRunner::new(ToolPaths::from_dir("/nonexistent/docferry-tools"));
        let invocation = ToolInvocation::new(
            BulkTool::Export,
            Zeroizing::new("mongodb://localhost:27017/".to_string()),
            "mongodb://localhost:27017/".to_string(),
        );

        let result = runner.run(&invocation).await;
        match result {
            Err(DocFerryError::Io { context, .. }) => assert!(context.contains("mongodump")),
            other => panic!("expected Io error, got {:?}", other.map(|o| o.exit_code)),
        }
    }
}
