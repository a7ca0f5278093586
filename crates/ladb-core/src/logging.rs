//! File logging for the supervisor
//!
//! The terminal belongs to the shell transcript, so diagnostics go to a
//! daily rolling file under `<data_local_dir>/ladb/logs/` instead. Set
//! `LADB_LOG` to a tracing filter to change what gets written, e.g.
//! `LADB_LOG=ladb_daemon=trace` to see every bridge invocation.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "LADB_LOG";

const DEFAULT_FILTER: &str = "ladb_shell=info,ladb_app=info,ladb_daemon=info,ladb_core=info,warn";

/// Install the file subscriber. Call once, before the supervisor starts.
pub fn init() -> Result<()> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, "ladb.log");
    let timer = fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    tracing_subscriber::registry()
        .with(filter(std::env::var(LOG_ENV).ok().as_deref()))
        .with(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(timer),
        )
        .init();

    tracing::info!("ladb {} logging to {}", env!("CARGO_PKG_VERSION"), dir.display());
    Ok(())
}

/// Where the rolling log files live.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ladb")
        .join("logs")
}

/// An unparsable `LADB_LOG` falls back to the default rather than
/// silencing everything.
fn filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
