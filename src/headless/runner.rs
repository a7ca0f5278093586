//! Headless mode runner - NDJSON events on stdout, commands on stdin
//!
//! Commands run one at a time in arrival order on a separate task, so a
//! piped script behaves like a typed session while status and output events
//! keep flowing. `:reset` skips the queue.

use ladb_app::SupervisorHandle;
use ladb_core::prelude::*;
use tokio::sync::mpsc;

use super::HeadlessEvent;
use crate::commands::{execute, Command, Startup};
use crate::console::fresh_output;
use crate::input::{spawn_stdin_reader, Input};
use crate::signals::spawn_signal_handler;

/// Run in headless mode until `:quit`, a signal, or end of input once every
/// queued command has finished.
pub async fn run_headless(handle: SupervisorHandle, startup: Startup) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("LADB headless mode starting");
    info!("═══════════════════════════════════════════════════════");

    let (input_tx, mut input_rx) = mpsc::channel(32);
    spawn_stdin_reader(input_tx.clone());
    spawn_signal_handler(input_tx);

    let mut status_rx = handle.subscribe_status();
    let mut output_rx = handle.subscribe_output();
    HeadlessEvent::status(*status_rx.borrow_and_update()).emit();
    let mut previous = output_rx.borrow_and_update().clone();
    if !previous.is_empty() {
        HeadlessEvent::output(&previous).emit();
    }

    // Command-line answers are handled before anything typed
    let (command_tx, command_rx) = mpsc::channel(32);
    let mut commands = tokio::spawn(run_commands(handle.clone(), startup, command_rx));
    let mut command_tx = Some(command_tx);
    // Signals still arrive on the input channel after stdin closes
    let mut input_open = true;

    loop {
        tokio::select! {
            input = input_rx.recv(), if input_open => match input {
                Some(Input::Command(Command::Quit)) => break,
                Some(Input::Command(Command::Status)) => {
                    HeadlessEvent::status(handle.status()).emit();
                }
                Some(Input::Command(Command::Invalid(message))) => {
                    HeadlessEvent::error(message, false).emit();
                }
                Some(Input::Command(Command::Reset)) => {
                    // Interrupts whatever the queue is waiting on
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if let Some(outcome) = execute(&handle, Command::Reset).await {
                            HeadlessEvent::from_outcome(outcome).emit();
                        }
                    });
                }
                Some(Input::Command(command)) => {
                    if let Some(tx) = &command_tx {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Input::Closed) => {
                    debug!("Input closed, draining queued commands");
                    command_tx = None;
                }
                None => {
                    input_open = false;
                    command_tx = None;
                }
            },

            _ = &mut commands => {
                debug!("Command queue finished");
                break;
            }

            changed = output_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = output_rx.borrow_and_update().clone();
                let fresh = fresh_output(&previous, &next);
                if !fresh.is_empty() {
                    HeadlessEvent::output(fresh).emit();
                }
                previous = next;
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                HeadlessEvent::status(*status_rx.borrow_and_update()).emit();
            }
        }
    }

    commands.abort();
    info!("LADB headless mode exiting");
    Ok(())
}

async fn run_commands(
    handle: SupervisorHandle,
    startup: Startup,
    mut command_rx: mpsc::Receiver<Command>,
) {
    startup
        .run(handle.clone(), |outcome| {
            HeadlessEvent::from_outcome(outcome).emit()
        })
        .await;

    while let Some(command) = command_rx.recv().await {
        if let Some(outcome) = execute(&handle, command).await {
            HeadlessEvent::from_outcome(outcome).emit();
        }
    }
}
