//! Interactive console front end
//!
//! Echoes the transcript to stdout as it grows, reports status changes on
//! stderr and forwards typed lines to the shell. Supervisor commands run as
//! background tasks so a long handshake never blocks `:reset` or `:quit`.

use std::io::Write;

use ladb_app::SupervisorHandle;
use ladb_core::prelude::*;
use ladb_core::{Phase, SessionStatus};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::commands::{execute, Command, Outcome, Startup};
use crate::input::{spawn_stdin_reader, Input};
use crate::signals::spawn_signal_handler;

/// Run the console until `:quit`, end of input or a termination signal.
pub async fn run_console(handle: SupervisorHandle, startup: Startup) -> Result<()> {
    let (input_tx, mut input_rx) = mpsc::channel(32);
    spawn_stdin_reader(input_tx.clone());
    spawn_signal_handler(input_tx);

    let mut status_rx = handle.subscribe_status();
    let mut output_rx = handle.subscribe_output();
    let mut previous = output_rx.borrow_and_update().clone();
    write_output(&previous);

    let mut tasks = JoinSet::new();
    tasks.spawn(startup.run(handle.clone(), report));

    loop {
        tokio::select! {
            input = input_rx.recv() => {
                let command = match input {
                    Some(Input::Command(command)) => command,
                    Some(Input::Closed) | None => break,
                };
                match command {
                    Command::Quit => break,
                    Command::Status => print_status(handle.status()),
                    Command::Invalid(message) => notice(&message),
                    Command::Shell(line) => {
                        if !handle.send_command(&line).await {
                            notice("No shell attached yet");
                        }
                    }
                    command => {
                        let handle = handle.clone();
                        tasks.spawn(async move {
                            if let Some(outcome) = execute(&handle, command).await {
                                report(outcome);
                            }
                        });
                    }
                }
            }

            changed = output_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = output_rx.borrow_and_update().clone();
                write_output(fresh_output(&previous, &next));
                previous = next;
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                print_status(status);
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!("Command task failed: {}", e);
                }
            }
        }
    }

    tasks.abort_all();
    info!("Console exiting");
    Ok(())
}

/// Portion of `next` that was not already shown as `previous`.
///
/// Snapshots are tails of a growing file, so once the window slides the old
/// text is no longer a prefix. The longest tail of `previous` that `next`
/// starts with is the overlap; with no overlap the whole snapshot is new.
pub fn fresh_output<'a>(previous: &str, next: &'a str) -> &'a str {
    // A window starting inside a multi-byte char decodes with a leading U+FFFD
    let next = next.trim_start_matches(char::REPLACEMENT_CHARACTER);

    for (start, _) in previous.char_indices() {
        let overlap = &previous[start..];
        if next.starts_with(overlap) {
            return &next[overlap.len()..];
        }
    }
    next
}

fn write_output(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
        error!("Failed to write output: {}", e);
    }
}

fn notice(message: &str) {
    eprintln!("[ladb] {}", message);
}

fn print_status(status: SessionStatus) {
    notice(&format!("status: {}", status.phase));
    match status.phase {
        Phase::NeedsPort => notice("Enter the debug port with :port <port>"),
        Phase::NeedsPairing => notice("Pair with :pair [port] <code>"),
        Phase::Failed => notice("Attempt failed, :start to try again"),
        Phase::Closed => notice("Session closed, restart ladb for a new one"),
        _ => {}
    }
}

fn report(outcome: Outcome) {
    match outcome {
        Outcome::Started(result) | Outcome::Resumed(result) => {
            debug!("Attempt finished: {:?}", result);
        }
        Outcome::Paired(true) => notice("Paired"),
        Outcome::Paired(false) => notice("Pairing failed, check the code and try again"),
        Outcome::Sent(false) => notice("No shell attached yet"),
        Outcome::Sent(true) | Outcome::Cleared => {}
        Outcome::Reset => notice("Reset complete"),
        Outcome::Failed { message, fatal } => {
            notice(&message);
            if fatal {
                notice("Restart ladb to try again");
            }
        }
    }
}
