//! Run directory naming and wall-clock stamps.
//!
//! Runs land in date-prefixed directories like "2026-02-19-audit", with
//! "-2", "-3", ... appended on collision.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

/// Create a unique run directory `{root}/{YYYY-MM-DD}-{label}`.
///
/// Handles collisions by appending -2, -3, etc.
pub fn create_run_dir(root: &Path, label: &str) -> Result<PathBuf> {
    let base_name = format!("{}-{}", today(), label);

    let candidate = root.join(&base_name);
    if !candidate.exists() {
        std::fs::create_dir_all(&candidate)?;
        return Ok(candidate);
    }

    let mut counter = 2u32;
    loop {
        let candidate = root.join(format!("{}-{}", base_name, counter));
        if !candidate.exists() {
            std::fs::create_dir_all(&candidate)?;
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Today's UTC date as ISO string (YYYY-MM-DD).
pub fn today() -> String {
    let (year, month, day) = days_to_date((epoch_secs() / 86_400) as i64);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Current UTC time as RFC 3339 (second precision).
pub fn utc_timestamp() -> String {
    format_timestamp(epoch_secs())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn format_timestamp(secs: u64) -> String {
    let (year, month, day) = days_to_date((secs / 86_400) as i64);
    let rem = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Convert days since Unix epoch to (year, month, day).
fn days_to_date(days: i64) -> (i32, u32, u32) {
    // Algorithm from Howard Hinnant
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_run_dir_basic() {
        let root = tempfile::tempdir().unwrap();
        let dir = create_run_dir(root.path(), "audit").unwrap();
        assert!(dir.is_dir());
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-audit"));
        assert_eq!(&name[..10], today());
    }

    #[test]
    fn test_create_run_dir_collision() {
        let root = tempfile::tempdir().unwrap();
        let dir1 = create_run_dir(root.path(), "regenerate").unwrap();
        let dir2 = create_run_dir(root.path(), "regenerate").unwrap();
        let dir3 = create_run_dir(root.path(), "regenerate").unwrap();
        assert_ne!(dir1, dir2);
        assert!(dir2.to_string_lossy().ends_with("-regenerate-2"));
        assert!(dir3.to_string_lossy().ends_with("-regenerate-3"));
    }

    #[test]
    fn test_days_to_date() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
        assert_eq!(days_to_date(19723), (2024, 1, 1));
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }

    #[test]
    fn test_format_timestamp() {
        // 2024-01-01T12:34:56Z
        let secs = 19723 * 86_400 + 12 * 3600 + 34 * 60 + 56;
        assert_eq!(format_timestamp(secs), "2024-01-01T12:34:56Z");
    }

    #[test]
    fn test_utc_timestamp_shape() {
        let ts = utc_timestamp();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }
}
