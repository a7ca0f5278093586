//! Line input shared by the console and headless front ends

use std::io::BufRead;

use tokio::sync::mpsc;

use crate::commands::Command;
use ladb_core::prelude::*;

/// Messages delivered to a front end's event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    /// stdin reached end of file
    Closed,
}

/// Read stdin on a dedicated thread and forward parsed commands.
///
/// The thread exits after `:quit`, at end of input, or when the receiver
/// is gone.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Input>) {
    std::thread::spawn(move || read_lines(std::io::stdin().lock(), &tx));
}

fn read_lines(reader: impl BufRead, tx: &mpsc::Sender<Input>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = Command::parse(&line);
        let quit = command == Command::Quit;
        if tx.blocking_send(Input::Command(command)).is_err() || quit {
            return;
        }
    }

    debug!("stdin closed");
    let _ = tx.blocking_send(Input::Closed);
}
