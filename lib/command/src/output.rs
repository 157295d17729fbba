use std::{
  io,
  os::unix::process::ExitStatusExt,
  process::{ExitStatus, Output},
};

#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn from(output: io::Result<Output>) -> Self {
    match output {
      Ok(output) => Self {
        status: output.status,
        stdout: String::from_utf8(output.stdout)
          .unwrap_or("failed to generate stdout".to_string()),
        stderr: String::from_utf8(output.stderr)
          .unwrap_or("failed to generate stderr".to_string()),
      },
      Err(e) => CommandOutput::from_err(e),
    }
  }

  pub fn from_err(e: io::Error) -> Self {
    Self {
      status: ExitStatus::from_raw(1),
      stdout: String::new(),
      stderr: format!("{e:#?}"),
    }
  }

  /// Used when a command is killed for exceeding its bounded timeout.
  pub fn timed_out(command: &str, after: std::time::Duration) -> Self {
    Self {
      status: ExitStatus::from_raw(124 << 8),
      stdout: String::new(),
      stderr: format!(
        "Command timed out after {after:?}: {command}"
      ),
    }
  }

  pub fn success(&self) -> bool {
    self.status.success()
  }

  /// stdout followed by stderr, for diagnostics where the caller
  /// doesn't care which stream a line came from.
  pub fn combined(&self) -> String {
    if self.stderr.is_empty() {
      self.stdout.clone()
    } else if self.stdout.is_empty() {
      self.stderr.clone()
    } else {
      format!("{}\n{}", self.stdout, self.stderr)
    }
  }
}
