//! Console command grammar shared by the interactive and headless front ends
//!
//! Lines starting with `:` drive the supervisor; anything else goes to the
//! shell verbatim.

use std::path::PathBuf;

use ladb_app::SupervisorHandle;
use ladb_core::prelude::*;
use ladb_core::{InitResult, PairingRequest};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the line to the shell
    Shell(String),
    Start,
    /// `:pair [port] <code>`
    Pair(PairingRequest),
    /// `:port <port>`
    Port(u16),
    /// `:script <path>`
    Script(PathBuf),
    Clear,
    Reset,
    Status,
    Quit,
    /// A `:` command that did not parse
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let Some(control) = line.trim().strip_prefix(':') else {
            return Command::Shell(line.to_string());
        };

        let mut words = control.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match (name, args.as_slice()) {
            ("q" | "quit", []) => Command::Quit,
            ("start", []) => Command::Start,
            ("clear", []) => Command::Clear,
            ("reset", []) => Command::Reset,
            ("status", []) => Command::Status,
            ("pair", [code]) => Command::Pair(PairingRequest::new(None, *code)),
            ("pair", [port, code]) => match port.parse() {
                Ok(port) => Command::Pair(PairingRequest::new(Some(port), *code)),
                Err(_) => Command::Invalid(format!("not a port: {}", port)),
            },
            ("port", [port]) => match port.parse() {
                Ok(port) => Command::Port(port),
                Err(_) => Command::Invalid(format!("not a port: {}", port)),
            },
            ("script", [path]) => Command::Script(PathBuf::from(path)),
            _ => Command::Invalid(format!(
                "unknown command :{} (try :start, :pair [port] <code>, :port <port>, :script <path>, :clear, :reset, :status, :quit)",
                control.trim()
            )),
        }
    }
}

/// What running a [`Command`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Started(InitResult),
    Resumed(InitResult),
    Paired(bool),
    /// `false` when no shell was attached
    Sent(bool),
    Cleared,
    Reset,
    /// `fatal` when nothing short of restarting ladb helps
    Failed { message: String, fatal: bool },
}

impl Outcome {
    pub fn failed(e: &Error) -> Self {
        Outcome::Failed {
            message: e.to_string(),
            fatal: e.is_fatal(),
        }
    }
}

/// Run everything except `Status`, `Quit` and `Invalid`, which the front
/// end handles itself. Those yield `None`.
pub async fn execute(handle: &SupervisorHandle, command: Command) -> Option<Outcome> {
    let outcome = match command {
        Command::Shell(line) => Outcome::Sent(handle.send_command(&line).await),
        Command::Start => Outcome::Started(handle.start().await),
        Command::Pair(request) => match handle.pair(request).await {
            Ok(paired) => Outcome::Paired(paired),
            Err(e) => Outcome::failed(&e),
        },
        Command::Port(port) => Outcome::Resumed(handle.resume_with_port(port).await),
        Command::Script(path) => match tokio::fs::read_to_string(&path).await {
            Ok(script) => match handle.run_script(&script).await {
                Ok(sent) => Outcome::Sent(sent),
                Err(e) => Outcome::failed(&e),
            },
            Err(e) => Outcome::Failed {
                message: format!("Failed to read {}: {}", path.display(), e),
                fatal: false,
            },
        },
        Command::Clear => match handle.clear_output() {
            Ok(()) => Outcome::Cleared,
            Err(e) => Outcome::failed(&e),
        },
        Command::Reset => match handle.reset().await {
            Ok(()) => Outcome::Reset,
            Err(e) => Outcome::failed(&e),
        },
        Command::Status | Command::Quit | Command::Invalid(_) => return None,
    };
    Some(outcome)
}

/// Input supplied on the command line for the first attempt.
#[derive(Debug, Clone, Default)]
pub struct Startup {
    /// Used when the first attempt asks for a port
    pub port: Option<u16>,
    /// Used when the first attempt asks for pairing
    pub pairing: Option<PairingRequest>,
    /// Run once the shell is ready
    pub script: Option<PathBuf>,
}

impl Startup {
    /// Start the supervisor and feed it the command-line answers it asks for.
    pub async fn run(self, handle: SupervisorHandle, mut report: impl FnMut(Outcome)) {
        let mut result = handle.start().await;
        report(Outcome::Started(result));

        if result == InitResult::NeedsPairing {
            let Some(request) = self.pairing else {
                return;
            };
            match handle.pair(request).await {
                Ok(paired) => report(Outcome::Paired(paired)),
                Err(e) => {
                    report(Outcome::failed(&e));
                    return;
                }
            }
            result = settled(&handle).await;
        }

        if result == InitResult::NeedsPort {
            if let Some(port) = self.port {
                result = handle.resume_with_port(port).await;
                report(Outcome::Resumed(result));
            }
        }

        if let (InitResult::Success, Some(path)) = (result, self.script) {
            if let Some(outcome) = execute(&handle, Command::Script(path)).await {
                report(outcome);
            }
        }
    }
}

/// Wait for the worker to stop orchestrating and map where it rests.
async fn settled(handle: &SupervisorHandle) -> InitResult {
    let mut status_rx = handle.subscribe_status();
    let status = match status_rx
        .wait_for(|status| !status.phase.is_orchestrating())
        .await
    {
        Ok(status) => *status,
        Err(_) => return InitResult::Failure,
    };

    if status.ready {
        return InitResult::Success;
    }
    match status.phase {
        ladb_core::Phase::NeedsPort => InitResult::NeedsPort,
        ladb_core::Phase::NeedsPairing => InitResult::NeedsPairing,
        _ => {
            debug!("Settled in {} without a shell", status.phase);
            InitResult::Failure
        }
    }
}
