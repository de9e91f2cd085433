//! Shared CLI plumbing for the `tips-*-cli` binaries: CSV ingestion,
//! criterion parsing, the built-in `medical`/`adult` dataset
//! hierarchies, and the in-process request runner the demo binary uses.

pub mod criteria;
pub mod dataset;
pub mod ingest;
pub mod runner;

use std::time::Duration;

/// Format an elapsed duration as `H:MM:SS.micros`, matching Python's
/// `datetime.timedelta` rendering used by `run_central.py`'s `FINISHED
/// - time elapsed [...]` line.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_micros = elapsed.as_micros();
    let hours = total_micros / 3_600_000_000;
    let minutes = (total_micros / 60_000_000) % 60;
    let seconds = (total_micros / 1_000_000) % 60;
    let micros = total_micros % 1_000_000;
    format!("{hours}:{minutes:02}:{seconds:02}.{micros:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_elapsed_like_a_python_timedelta() {
        let d = Duration::from_micros(3_661_500_000);
        assert_eq!(format_elapsed(d), "1:01:01.500000");
    }
}
