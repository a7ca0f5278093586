//! Shell transcript file and its tailing view
//!
//! The shell child appends to [`OutputBuffer`]'s file directly. The only
//! in-process writers are diagnostic lines and [`OutputBuffer::clear`]; those
//! and snapshot reads share one coarse lock so a read never sees a
//! half-truncated file. Appends from the child need no lock: a reader only
//! consumes bytes up to the size it observed.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ladb_core::prelude::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Append-only transcript backed by a file.
#[derive(Debug)]
pub struct OutputBuffer {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutputBuffer {
    /// Open (creating if needed) the transcript at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one line.
    pub fn append_line(&self, line: &str) -> Result<()> {
        let _guard = self.guard();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Append a `* message` diagnostic line and log it.
    pub fn debug(&self, message: &str) {
        info!("{}", message);
        if let Err(e) = self.append_line(&format!("* {}", message)) {
            warn!("Failed to append to output buffer: {}", e);
        }
    }

    /// Erase the transcript.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard();
        File::create(&self.path)?;
        debug!("Output buffer cleared");
        Ok(())
    }

    /// Current tail: the whole file when it fits in `window`, otherwise the
    /// last `window` bytes. A missing file reads as empty.
    pub fn read_tail(&self, window: usize) -> Result<Vec<u8>> {
        let _guard = self.guard();

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();
        let window = window as u64;

        if size <= window {
            let mut snapshot = Vec::with_capacity(size as usize);
            file.take(size).read_to_end(&mut snapshot)?;
            return Ok(snapshot);
        }

        file.seek(SeekFrom::Start(size - window))?;
        let mut snapshot = vec![0; window as usize];
        file.read_exact(&mut snapshot)?;
        Ok(snapshot)
    }
}

/// Polls an [`OutputBuffer`] and publishes changed tails.
#[derive(Debug)]
pub struct OutputBridge {
    buffer: Arc<OutputBuffer>,
    window: usize,
    last: Option<Vec<u8>>,
    tx: watch::Sender<String>,
}

impl OutputBridge {
    pub fn new(buffer: Arc<OutputBuffer>, window: usize) -> (Self, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(String::new());
        (
            Self {
                buffer,
                window,
                last: None,
                tx,
            },
            rx,
        )
    }

    /// Read the tail once and publish it if it differs from the last one.
    ///
    /// Returns `true` when a snapshot was published.
    pub fn poll_once(&mut self) -> Result<bool> {
        let snapshot = self.buffer.read_tail(self.window)?;
        if self.last.as_ref() == Some(&snapshot) {
            return Ok(false);
        }

        // A window cut may split a multi-byte character; lossy decoding shows
        // it as a replacement char.
        self.tx
            .send_replace(String::from_utf8_lossy(&snapshot).into_owned());
        self.last = Some(snapshot);
        Ok(true)
    }

    /// Poll every `interval` until `shutdown_rx` turns true.
    pub fn spawn(mut self, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = self.poll_once() {
                            trace!("Output poll failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Output bridge stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn buffer_in(temp: &TempDir) -> Arc<OutputBuffer> {
        Arc::new(OutputBuffer::new(temp.path().join("output.txt")).unwrap())
    }

    fn append_raw(buffer: &OutputBuffer, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(buffer.path()).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_tail_returns_whole_file_within_window() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        append_raw(&buffer, b"hello\nworld\n");

        assert_eq!(buffer.read_tail(12).unwrap(), b"hello\nworld\n");
        assert_eq!(buffer.read_tail(1024).unwrap(), b"hello\nworld\n");
    }

    #[test]
    fn test_tail_returns_last_window_bytes() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        append_raw(&buffer, &content);

        for window in [1usize, 7, 4096, 9_999] {
            let tail = buffer.read_tail(window).unwrap();
            assert_eq!(tail.len(), window);
            assert_eq!(tail, &content[content.len() - window..]);
        }
        assert_eq!(buffer.read_tail(10_000).unwrap(), content);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        std::fs::remove_file(buffer.path()).unwrap();

        assert!(buffer.read_tail(16).unwrap().is_empty());
    }

    #[test]
    fn test_debug_lines_are_prefixed_and_clear_erases() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);

        buffer.debug("Starting server");
        assert_eq!(buffer.read_tail(1024).unwrap(), b"* Starting server\n");

        buffer.clear().unwrap();
        assert!(buffer.read_tail(1024).unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_file_notifies_once() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        append_raw(&buffer, b"line\n");
        let (mut bridge, rx) = OutputBridge::new(buffer.clone(), 1024);

        assert!(bridge.poll_once().unwrap());
        assert!(!bridge.poll_once().unwrap());
        assert_eq!(*rx.borrow(), "line\n");

        append_raw(&buffer, b"more\n");
        assert!(bridge.poll_once().unwrap());
        assert_eq!(*rx.borrow(), "line\nmore\n");
    }

    #[test]
    fn test_split_character_is_replaced() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        append_raw(&buffer, "aé".as_bytes());
        let (mut bridge, rx) = OutputBridge::new(buffer, 1);

        bridge.poll_once().unwrap();
        assert_eq!(*rx.borrow(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_spawned_bridge_publishes_and_stops() {
        let temp = TempDir::new().unwrap();
        let buffer = buffer_in(&temp);
        let (bridge, mut rx) = OutputBridge::new(buffer.clone(), 1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = bridge.spawn(Duration::from_millis(10), shutdown_rx);
        append_raw(&buffer, b"from shell\n");

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|text| text.contains("from shell")),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot, "from shell\n");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
