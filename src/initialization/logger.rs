//! Logger initialization.
//!
//! Engine messages start with `visitor=<id> visit=<id>:`. The JSON format lifts
//! those two ids into their own fields so log pipelines can filter on them.

use std::io::Write;

use colored::*;
use log::{Level, LevelFilter};
use serde::Serialize;

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first and `level` then overrides it for this crate, so
/// `RUST_LOG=sqlx=debug` still works for dependency debugging.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=sqlx=info latency_region visits.ndjson --log-level debug
/// latency_region visits.ndjson --log-format json | jq 'select(.visitor == "v-42")'
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(matches!(format, LogFormat::Plain));

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    // sqlx logs every statement at info; one per correlation lookup is too chatty
    builder.filter_module("sqlx", LevelFilter::Warn);
    builder.filter_module("ort", LevelFilter::Warn);
    builder.filter_module("latency_region", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let msg = record.args().to_string();
                writeln!(
                    buf,
                    "{}",
                    json_line(
                        chrono::Utc::now().timestamp_millis(),
                        record.level(),
                        record.target(),
                        &msg
                    )
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {} [{}] {}",
                    level_emoji(record.level()),
                    record.target().cyan(),
                    colored_level(record.level()),
                    record.args()
                )
            });
        }
    }

    builder.try_init().map_err(InitializationError::from)?;
    Ok(())
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    ts: i64,
    level: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    visitor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visit: Option<&'a str>,
    msg: &'a str,
}

fn json_line(ts: i64, level: Level, target: &str, msg: &str) -> String {
    let (visitor, visit) = visit_ids(msg);
    let record = JsonRecord {
        ts,
        level: level.as_str(),
        target,
        visitor,
        visit,
        msg,
    };
    serde_json::to_string(&record).unwrap_or_else(|_| format!("{{\"ts\":{ts},\"msg\":\"\"}}"))
}

/// Ids from a `visitor=<id> visit=<id>:` message prefix.
fn visit_ids(msg: &str) -> (Option<&str>, Option<&str>) {
    let Some(rest) = msg.strip_prefix("visitor=") else {
        return (None, None);
    };
    let Some((visitor, rest)) = rest.split_once(' ') else {
        return (None, None);
    };
    let visit = rest
        .strip_prefix("visit=")
        .and_then(|r| r.split_once(':'))
        .map(|(visit, _)| visit);
    (Some(visitor), visit)
}

fn colored_level(level: Level) -> ColoredString {
    let label = level.to_string();
    match level {
        Level::Error => label.red(),
        Level::Warn => label.yellow(),
        Level::Info => label.green(),
        Level::Debug => label.blue(),
        Level::Trace => label.purple(),
    }
}

fn level_emoji(level: Level) -> &'static str {
    match level {
        Level::Error => "❌",
        Level::Warn => "⚠️",
        Level::Info => "✔️",
        Level::Debug => "🔍",
        Level::Trace => "🔬",
    }
}
