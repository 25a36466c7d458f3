//! Plain-text timing report appended to the results file after a run.

use gridfray_core::{ArenaConfig, WorkerTiming};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

const COLUMN_WIDTH: usize = 20;

/// Render the timing table: run header, column header, then one row per
/// worker with times in milliseconds.
#[must_use]
pub fn format_report(config: &ArenaConfig, timings: &[WorkerTiming]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Arena Size: {}x{}\n",
        config.width, config.height
    ));
    out.push_str(&format!("Number of Bots: {}\n", config.bot_count));
    out.push_str(&format!(
        "{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}\n",
        "Worker", "Exec Time (ms)", "Wait Time (ms)", "Percent Wait"
    ));
    for timing in timings {
        let exec_ms = timing.exec.as_secs_f64() * 1_000.0;
        let wait_ms = timing.wait.as_secs_f64() * 1_000.0;
        out.push_str(&format!(
            "{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}{:<COLUMN_WIDTH$}\n",
            timing.label,
            format!("{exec_ms:.4}"),
            format!("{wait_ms:.4}"),
            format!("{:.2}", timing.wait_percent()),
        ));
    }
    out
}

/// Append the timing table to `path`, creating the file if needed.
pub fn append_report(
    path: &Path,
    config: &ArenaConfig,
    timings: &[WorkerTiming],
) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format_report(config, timings).as_bytes())
}
