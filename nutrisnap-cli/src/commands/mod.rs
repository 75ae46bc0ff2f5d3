mod auth;
mod config_cmd;
mod food;
mod goals;
mod log;
mod progress;
mod watch;

pub use auth::AuthCommand;
pub use config_cmd::ConfigCommand;
pub use food::{AnalyzeCommand, SearchCommand};
pub use goals::GoalsCommand;
pub use log::LogCommand;
pub use progress::ProgressCommand;
pub use watch::WatchCommand;

use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use nutrisnap_core::{clock::local_date, LogEntry};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Parses an optional `YYYY-MM-DD` argument.
pub fn parse_date(date: &Option<String>) -> Result<Option<NaiveDate>, String> {
    match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", d)),
        None => Ok(None),
    }
}

/// One-line rendering: "12:30  Rice (1 cup)  200 kcal | P 4g | C 44g | F 0g"
pub fn format_entry(entry: &LogEntry) -> String {
    let time = entry
        .timestamp
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let portion = if entry.portion.is_empty() {
        String::new()
    } else {
        format!(" ({})", entry.portion)
    };
    format!(
        "{}  {}{}  {:.0} kcal | P {:.0}g | C {:.0}g | F {:.0}g",
        time, entry.name, portion, entry.calories, entry.protein, entry.carbs, entry.fat
    )
}

/// Day header label for an entry, falling back to "undated".
pub fn entry_day(entry: &LogEntry) -> String {
    entry
        .timestamp
        .and_then(local_date)
        .map(|d| d.to_string())
        .unwrap_or_else(|| "undated".to_string())
}
