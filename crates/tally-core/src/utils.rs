//! Shared utility functions for Tally crates

use anyhow::anyhow;
use std::path::PathBuf;

/// Resolve the application data directory
///
/// Prefers the TALLY_DATA_DIR environment variable over the default
/// `~/.tally` so tests and containerized runs can redirect all state.
/// HOME is checked before dirs::home_dir() for consistency with shell
/// scripts that export an overridden HOME.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home).join(".tally"));
    }

    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Format a byte count for display
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_data_dir_env_override() {
        std::env::set_var("TALLY_DATA_DIR", "/tmp/tally-test");
        let dir = data_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/tally-test"));
        std::env::remove_var("TALLY_DATA_DIR");
    }

    #[test]
    #[serial]
    fn test_data_dir_defaults_under_home() {
        std::env::remove_var("TALLY_DATA_DIR");
        if std::env::var("HOME").is_ok() {
            let dir = data_dir().unwrap();
            assert!(dir.ends_with(".tally"));
        }
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
