//! Subprocess execution for external tools.

use std::ffi::OsStr;
use std::process::Command;

use thiserror::Error;

/// Errors from invoking an external tool.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ShellError> for crate::models::StageError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Io(io) => Self::Io(io),
            other => Self::External(other.to_string()),
        }
    }
}

/// Run a command and return its stdout. Non-zero exit becomes
/// [`ShellError::Failed`] carrying stderr; a missing binary is reported
/// distinctly so `check-tools` advice can surface.
pub fn run_command<S: AsRef<OsStr>>(tool: &str, args: &[S]) -> Result<Vec<u8>, ShellError> {
    let output = Command::new(tool).args(args).output();
    match output {
        Ok(output) if output.status.success() => Ok(output.stdout),
        Ok(output) => Err(ShellError::Failed {
            tool: tool.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ShellError::ToolNotFound(tool.to_string()))
        }
        Err(e) => Err(ShellError::Io(e)),
    }
}

/// Check whether the external tools docmill shells out to are on PATH.
pub fn check_tools() -> Vec<(&'static str, bool)> {
    ["libreoffice", "pandoc", "pdftoppm", "ocrmypdf"]
        .into_iter()
        .map(|tool| (tool, which::which(tool).is_ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_reported() {
        let err = run_command("definitely-not-a-real-binary-xyz", &["--version"]).unwrap_err();
        assert!(matches!(err, ShellError::ToolNotFound(_)));
    }

    #[test]
    fn test_check_tools_lists_all() {
        let tools = check_tools();
        assert_eq!(tools.len(), 4);
    }
}
