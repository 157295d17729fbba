use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::OnceLock,
  time::Duration,
};

mod output;

pub use output::*;
use tokio::process::Command;

/// Binaries the control plane is permitted to invoke. Anything else
/// is refused before a shell is ever spawned. See [AllowedBinaries].
pub struct AllowedBinaries {
  names: Vec<String>,
}

impl AllowedBinaries {
  pub fn new(names: impl IntoIterator<Item = String>) -> Self {
    Self {
      names: names.into_iter().collect(),
    }
  }

  pub fn check(&self, program: &str) -> anyhow::Result<()> {
    if self.names.iter().any(|n| n == program) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "Refusing to run disallowed command: {program}"
      ))
    }
  }
}

/// Commands are run directly, and cannot include '&&'.
/// Bounded by `timeout`; a command that exceeds it is killed and
/// [CommandOutput::timed_out] is returned.
pub async fn run_standard_command(
  command: &str,
  path: impl Into<Option<&Path>>,
  timeout: Duration,
) -> CommandOutput {
  let lexed = if let Some(lexed) = shlex::split(command)
    && !lexed.is_empty()
  {
    lexed
  } else {
    return CommandOutput::from_err(std::io::Error::other(
      "Command lexed into empty args",
    ));
  };

  let mut cmd = Command::new(&lexed[0]);

  cmd
    .args(&lexed[1..])
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e),
    }
  }

  run_with_timeout(cmd, command, timeout).await
}

fn shell() -> &'static str {
  static DEFAULT_SHELL: OnceLock<String> = OnceLock::new();
  DEFAULT_SHELL.get_or_init(|| {
    if PathBuf::from("/bin/bash").exists()
      || PathBuf::from("/usr/bin/bash").exists()
    {
      String::from("bash")
    } else {
      String::from("sh")
    }
  })
}

/// Commands are wrapped in 'sh -c', and can include '&&'.
/// Bounded by `timeout`.
pub async fn run_shell_command(
  command: &str,
  path: impl Into<Option<&Path>>,
  timeout: Duration,
) -> CommandOutput {
  let mut cmd = Command::new(shell());

  cmd
    .args(["-c", command])
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e),
    }
  }

  run_with_timeout(cmd, command, timeout).await
}

async fn run_with_timeout(
  mut cmd: Command,
  original: &str,
  timeout: Duration,
) -> CommandOutput {
  match tokio::time::timeout(timeout, cmd.output()).await {
    Ok(output) => CommandOutput::from(output),
    Err(_) => {
      warn!("command exceeded {timeout:?} timeout: {original}");
      CommandOutput::timed_out(original, timeout)
    }
  }
}

#[macro_use]
extern crate tracing;

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn runs_and_captures_stdout() {
    let out =
      run_standard_command("echo hello", None, Duration::from_secs(5))
        .await;
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn shell_command_supports_pipes() {
    let out = run_shell_command(
      "echo hello && echo world",
      None,
      Duration::from_secs(5),
    )
    .await;
    assert!(out.success());
    assert!(out.stdout.contains("hello"));
    assert!(out.stdout.contains("world"));
  }

  #[tokio::test]
  async fn kills_command_exceeding_timeout() {
    let out = run_standard_command(
      "sleep 2",
      None,
      Duration::from_millis(50),
    )
    .await;
    assert!(!out.success());
    assert!(out.stderr.contains("timed out"));
  }

  #[test]
  fn allow_list_rejects_unknown_binaries() {
    let allowed = AllowedBinaries::new(
      ["docker".to_string(), "nginx".to_string()].into_iter(),
    );
    assert!(allowed.check("docker").is_ok());
    assert!(allowed.check("rm").is_err());
  }
}
