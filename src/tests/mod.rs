//! Helpers for tests that drive the whole pipeline through
//! [`TimelineService`](crate::TimelineService).

use std::path::Path;

use crate::config::TimelineConfig;


/// Config rooted in `dir`, with periodic and shutdown archiving off so tests
/// control every write.
pub fn temp_config(dir: &Path) -> TimelineConfig {
    TimelineConfig {
        data_dir: dir.to_path_buf(),
        archive_on_shutdown: false,
        auto_archive_secs: None,
        ..TimelineConfig::default()
    }
}

/// Number of `.json` files directly under `dir`.
pub fn json_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
                .count()
        })
        .unwrap_or(0)
}
