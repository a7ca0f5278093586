//! Interactive shell process management

use std::future::Future;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot, watch};

use ladb_core::prelude::*;

/// How a shell process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellExit {
    /// Exit code, `None` when killed by a signal or the wait itself failed.
    pub code: Option<i32>,
}

impl From<ShellExit> for Error {
    fn from(exit: ShellExit) -> Self {
        Error::ShellExited { code: exit.code }
    }
}

/// Cloneable writer for a shell's input stream.
///
/// Lines are queued to a dedicated writer task that appends the newline and
/// flushes after each one.
#[derive(Debug, Clone)]
pub struct ShellInput {
    tx: mpsc::Sender<String>,
}

impl ShellInput {
    pub async fn send(&self, line: &str) -> Result<()> {
        self.tx
            .send(line.to_string())
            .await
            .map_err(|_| Error::channel_send("shell stdin closed"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Manages the long-lived shell child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task.
/// `ShellProcess` keeps a kill channel to request a force-kill and a `watch`
/// receiver that flips to `Some(exit)` exactly once, when the child is reaped.
pub struct ShellProcess {
    input: ShellInput,
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ShellExit>>,
}

impl ShellProcess {
    /// Take ownership of a spawned child whose stdin is piped.
    pub fn from_child(mut child: Child) -> Result<Self> {
        let pid = child.id();
        info!("Shell process started with PID: {:?}", pid);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::spawn("shell stdin was not piped"))?;
        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(Self::stdin_writer(stdin, stdin_rx));

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(Self::wait_for_exit(child, kill_rx, exit_tx));

        Ok(Self {
            input: ShellInput { tx: stdin_tx },
            pid,
            kill_tx: Some(kill_tx),
            exit_rx,
        })
    }

    /// Background task: owns `child`, waits for it to exit, publishes the exit.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: watch::Sender<Option<ShellExit>>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Shell process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for shell process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing shell process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill shell process: {}", e);
                }
                child.wait().await.ok().and_then(|status| status.code())
            }
        };

        exit_tx.send_replace(Some(ShellExit { code }));
    }

    /// Write queued lines to stdin
    async fn stdin_writer(mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) {
        while let Some(line) = rx.recv().await {
            trace!("Sending to shell: {}", line);

            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                error!("Failed to write to shell stdin: {}", e);
                break;
            }
            if let Err(e) = stdin.write_all(b"\n").await {
                error!("Failed to write newline: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("Failed to flush shell stdin: {}", e);
                break;
            }
        }

        debug!("shell stdin writer finished");
    }

    /// Queue a line for the shell
    pub async fn send(&self, line: &str) -> Result<()> {
        self.input.send(line).await
    }

    /// A cloneable writer for this shell's stdin.
    pub fn input(&self) -> ShellInput {
        self.input.clone()
    }

    /// Future that resolves when the shell exits. Owns its own receiver, so it
    /// can be raced against other work without borrowing `self`.
    pub fn exited(&self) -> impl Future<Output = ShellExit> + Send + 'static {
        let mut rx = self.exit_rx.clone();
        async move {
            match rx.wait_for(|exit| exit.is_some()).await {
                Ok(exit) => (*exit).unwrap_or(ShellExit { code: None }),
                Err(_) => ShellExit { code: None },
            }
        }
    }

    /// Force kill the process by signalling the wait task.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            warn!("Force killing shell process {:?}", self.pid);
            // The wait task may already be gone if the shell exited on its own.
            let _ = tx.send(());
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl std::fmt::Debug for ShellProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            self.kill();
        }
        // kill_on_drop(true) on the Child is the final safety net.
        debug!("ShellProcess dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> ShellProcess {
        let child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("sh must be available in test environment");
        ShellProcess::from_child(child).unwrap()
    }

    #[tokio::test]
    async fn test_exit_code_captured_on_normal_exit() {
        let shell = spawn_sh("exit 0");
        let exit = tokio::time::timeout(Duration::from_secs(5), shell.exited())
            .await
            .expect("shell should exit");
        assert_eq!(exit.code, Some(0));
        assert!(shell.has_exited());
    }

    #[tokio::test]
    async fn test_exit_code_captured_on_error_exit() {
        let shell = spawn_sh("exit 42");
        let exit = tokio::time::timeout(Duration::from_secs(5), shell.exited())
            .await
            .expect("shell should exit");
        assert_eq!(exit.code, Some(42));
    }

    #[tokio::test]
    async fn test_send_reaches_stdin() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("marker");

        let child = Command::new("sh")
            .args(["-c", "read line; echo \"$line\" > \"$MARKER\""])
            .env("MARKER", &marker)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let shell = ShellProcess::from_child(child).unwrap();

        shell.send("hello shell").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), shell.exited())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(content.trim(), "hello shell");
    }

    #[tokio::test]
    async fn test_kill_terminates_long_running_process() {
        let mut shell = spawn_sh("sleep 60");
        assert!(shell.is_running());

        shell.kill();
        let exit = tokio::time::timeout(Duration::from_secs(5), shell.exited())
            .await
            .expect("killed shell should be reaped");
        assert_eq!(exit.code, None);
        assert!(shell.has_exited());
    }

    #[tokio::test]
    async fn test_exited_future_is_independent_of_handle() {
        let shell = spawn_sh("exit 3");
        let exited = shell.exited();
        drop(shell);
        let exit = tokio::time::timeout(Duration::from_secs(5), exited)
            .await
            .unwrap();
        // Dropping the handle may race the natural exit with the kill.
        assert!(exit.code == Some(3) || exit.code.is_none());
    }
}
