//! Process launching for the bridge binary and local shells
//!
//! Every external process goes through [`ProcessLauncher`] so the invocation
//! contract holds everywhere: argv starts with the bridge path, the working
//! directory is the private files directory, `HOME` and `TMPDIR` point into
//! the sandbox, and redirected output is appended (never truncated) to the
//! shared output buffer file.

use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use ladb_core::prelude::*;
use tokio::process::{Child, Command};

/// Where a spawned process's stdout/stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// Output is thrown away.
    Discard,
    /// Output is captured by the caller.
    Piped,
    /// stderr is merged into stdout and both are appended to the output buffer file.
    Output,
}

/// Spawns OS processes under the sandbox invocation contract.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    bridge_path: PathBuf,
    files_dir: PathBuf,
    cache_dir: PathBuf,
    output_path: PathBuf,
}

impl ProcessLauncher {
    /// Create a launcher, making sure the sandbox directories exist.
    pub fn new(
        bridge_path: impl Into<PathBuf>,
        files_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let launcher = Self {
            bridge_path: bridge_path.into(),
            files_dir: files_dir.into(),
            cache_dir: cache_dir.into(),
            output_path: output_path.into(),
        };
        launcher.ensure_dirs()?;
        Ok(launcher)
    }

    /// Recreate the sandbox directories (after a reset wiped them).
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.files_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }

    pub fn bridge_path(&self) -> &Path {
        &self.bridge_path
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Spawn `[bridge, ...args]`.
    pub fn bridge<S: AsRef<OsStr>>(&self, args: &[S], redirect: Redirect) -> Result<Child> {
        debug!(
            "Spawning bridge: {} {}",
            self.bridge_path.display(),
            args.iter()
                .map(|a| a.as_ref().to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        self.command(self.bridge_path.as_os_str(), args, redirect)?
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::BridgeNotFound {
                        path: self.bridge_path.clone(),
                    }
                } else {
                    Error::spawn(e.to_string())
                }
            })
    }

    /// Spawn an arbitrary argv (used for the local shell mode).
    pub fn shell<S: AsRef<OsStr>>(&self, argv: &[S], redirect: Redirect) -> Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::spawn("empty argv"))?;

        debug!("Spawning shell: {}", program.as_ref().to_string_lossy());

        self.command(program.as_ref(), args, redirect)?
            .spawn()
            .map_err(|e| Error::spawn(e.to_string()))
    }

    fn command<S: AsRef<OsStr>>(
        &self,
        program: &OsStr,
        args: &[S],
        redirect: Redirect,
    ) -> Result<Command> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.files_dir)
            .env("HOME", &self.files_dir)
            .env("TMPDIR", &self.cache_dir)
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        match redirect {
            Redirect::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            Redirect::Piped => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            Redirect::Output => {
                let out = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.output_path)?;
                let err = out.try_clone()?;
                command.stdout(Stdio::from(out)).stderr(Stdio::from(err));
            }
        }

        Ok(command)
    }
}
