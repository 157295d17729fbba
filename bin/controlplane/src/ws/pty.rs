//! Shared PTY plumbing: spawn a child attached to a pseudo-terminal,
//! pump bytes between the socket and the PTY, and tear everything
//! down exactly once when either side closes.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Grace period between closing stdin and sending a hard kill once a
/// session is torn down, per the "SIGKILL after graceful attempt" rule.
const KILL_GRACE: Duration = Duration::from_millis(500);

pub type StdinSender = mpsc::UnboundedSender<Vec<u8>>;
pub type StdoutReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Handle kept in the terminal registry for the lifetime of one PTY
/// session, so a resize or forced-close can reach it from elsewhere.
#[derive(Debug, Clone)]
pub struct TerminalHandle {
  pub cancel: CancellationToken,
  pub resize: mpsc::UnboundedSender<(u16, u16)>,
}

pub struct SpawnedPty {
  pub stdin_tx: StdinSender,
  pub stdout_rx: StdoutReceiver,
  pub resize_tx: mpsc::UnboundedSender<(u16, u16)>,
  pub cancel: CancellationToken,
}

/// Spawns `command` inside a fresh PTY and wires up four blocking
/// tasks: one waits on the child and propagates exit via
/// cancellation, one copies bytes from the socket-side channel into
/// the PTY, one applies resize requests against the PTY master, and
/// one copies PTY output into the socket-side channel.
pub fn spawn(
  mut command: CommandBuilder,
  cwd: Option<std::path::PathBuf>,
) -> anyhow::Result<SpawnedPty> {
  let pty_system = native_pty_system();
  let pair = pty_system.openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })?;

  command.env("TERM", "xterm-256color");
  command.env("COLORTERM", "truecolor");
  if let Some(cwd) = cwd {
    command.cwd(cwd);
  }

  let child = pair.slave.spawn_command(command)?;
  drop(pair.slave);

  let mut writer = pair.master.take_writer()?;
  let mut reader = pair.master.try_clone_reader()?;

  let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<Vec<u8>>();
  let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<Vec<u8>>();
  let (resize_tx, mut resize_rx) = mpsc::unbounded_channel::<(u16, u16)>();

  let cancel = CancellationToken::new();
  let exited_once = Arc::new(AtomicBool::new(false));
  let child: Arc<Mutex<Box<dyn Child + Send + Sync>>> = Arc::new(Mutex::new(child));

  // Child-wait task: when the process exits (or we're cancelled), flip
  // the cancellation token exactly once.
  {
    let cancel = cancel.clone();
    let exited_once = exited_once.clone();
    let child = child.clone();
    tokio::task::spawn_blocking(move || {
      let _ = child.lock().unwrap().wait();
      if !exited_once.swap(true, Ordering::SeqCst) {
        cancel.cancel();
      }
    });
  }

  // Kill task: once cancellation fires (socket closed, session cancelled
  // from elsewhere, or process manager shutdown), give the child a brief
  // grace period to exit on its own, then kill it outright. Harmless if
  // the process already exited — `kill()` on a reaped child just errors,
  // which we ignore.
  {
    let cancel = cancel.clone();
    let child = child.clone();
    tokio::spawn(async move {
      cancel.cancelled().await;
      tokio::time::sleep(KILL_GRACE).await;
      let _ = child.lock().unwrap().kill();
    });
  }

  // socket -> PTY writer.
  {
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
      while !cancel.is_cancelled() {
        match stdin_rx.blocking_recv() {
          Some(bytes) => {
            use std::io::Write;
            if writer.write_all(&bytes).is_err() {
              break;
            }
          }
          None => break,
        }
      }
    });
  }

  // resize task: owns the master handle for the session's lifetime so
  // the PTY stays alive and resize() has somewhere to apply to.
  {
    let master = pair.master;
    tokio::task::spawn_blocking(move || {
      while let Some((cols, rows)) = resize_rx.blocking_recv() {
        let _ = master.resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 });
      }
    });
  }

  // PTY -> socket reader.
  {
    let cancel = cancel.clone();
    let exited_once = exited_once.clone();
    tokio::task::spawn_blocking(move || {
      use std::io::Read;
      let mut buf = [0u8; 4096];
      loop {
        match reader.read(&mut buf) {
          Ok(0) => break,
          Ok(n) => {
            if stdout_tx.send(buf[..n].to_vec()).is_err() {
              break;
            }
          }
          Err(_) => break,
        }
      }
      if !exited_once.swap(true, Ordering::SeqCst) {
        cancel.cancel();
      }
    });
  }

  Ok(SpawnedPty { stdin_tx, stdout_rx, resize_tx, cancel })
}
