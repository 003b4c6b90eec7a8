//! Read access to the persisted "time stayed" text.
//!
//! Some other component writes a human-readable duration to `stayDuration.txt` in the app's
//! documents directory; the detail view shows it. The engine only ever reads it.

use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::stopwatch::{format_elapsed, ElapsedFormat};

pub const DEFAULT_FILE_NAME: &str = "stayDuration.txt";

/// Text shown when the file is missing or unreadable.
pub fn default_stay_duration() -> String {
    format_elapsed(Duration::ZERO, ElapsedFormat::KoreanShort)
}

/// Read the stored text, trimmed. Any failure yields [`default_stay_duration`].
pub fn read_stay_duration(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            debug!("[StayFile] {} unreadable ({}), using default", path.display(), e);
            default_stay_duration()
        }
    }
}

/// [`read_stay_duration`] on `DEFAULT_FILE_NAME` inside `dir`.
pub fn read_stay_duration_in(dir: impl AsRef<Path>) -> String {
    read_stay_duration(dir.as_ref().join(DEFAULT_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempdir().unwrap();
        assert_eq!(read_stay_duration_in(dir.path()), "0시간 0분");
    }

    #[test]
    fn test_reads_and_trims() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_FILE_NAME), "2시간 15분\n").unwrap();
        assert_eq!(read_stay_duration_in(dir.path()), "2시간 15분");
    }

    #[test]
    fn test_invalid_utf8_gives_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_FILE_NAME);
        std::fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();
        assert_eq!(read_stay_duration(&path), default_stay_duration());
    }
}
