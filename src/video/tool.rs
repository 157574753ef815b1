use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

/// An external command line program (ffmpeg, ffprobe, ...) run to completion per call.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            name,
            program,
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before every invocation's own, e.g. a wrapper script's subcommand.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs the tool and collects its output. A non-zero exit becomes
    /// `ToolFailed` carrying the tool's stderr verbatim. Cancelling kills the child.
    pub async fn run<I, S>(&self, args: I, cancel: &CancellationToken) -> Result<Output, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", command.as_std());

        let child = command.spawn().map_err(|source| AppError::ToolSpawn {
            tool: self.name.clone(),
            source,
        })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                debug!("{} cancelled", self.name);
                return Err(AppError::Cancelled);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("{} failed with {}: {}", self.name, output.status, stderr);
            return Err(AppError::ToolFailed {
                tool: self.name.clone(),
                status: output.status,
                stderr,
            });
        }

        Ok(output)
    }
}
