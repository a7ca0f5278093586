//! Ctrl+C and SIGTERM end the session like `:quit`
//!
//! The front ends only read their input channel, so a signal is turned into
//! a queued quit command. The supervisor then drops its handles and kills the
//! shell the same way it would for a typed quit.

use std::future::Future;

use tokio::sync::mpsc;

use crate::commands::Command;
use crate::input::Input;
use ladb_core::prelude::*;

/// Queue a quit on the front end's input channel when a signal arrives.
pub fn spawn_signal_handler(tx: mpsc::Sender<Input>) {
    tokio::spawn(quit_on(next_signal(), tx));
}

async fn quit_on<F>(signal: F, tx: mpsc::Sender<Input>)
where
    F: Future<Output = Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            info!("{} received, quitting", name);
            let _ = tx.send(Input::Command(Command::Quit)).await;
        }
        Err(e) => error!("Signals will not end the session: {}", e),
    }
}

#[cfg(unix)]
async fn next_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let listen = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| Error::process(format!("Failed to listen for {}: {}", name, e)))
    };
    let mut interrupt = listen(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = listen(SignalKind::terminate(), "SIGTERM")?;

    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    })
}

#[cfg(windows)]
async fn next_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::process(format!("Failed to listen for Ctrl+C: {}", e)))?;
    Ok("Ctrl+C")
}
