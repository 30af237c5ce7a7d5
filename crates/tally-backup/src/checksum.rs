//! Snapshot integrity hashing.
//!
//! Every snapshot file is paired with a `{name}.sha256` companion holding the
//! hex-encoded SHA-256 digest of its bytes. Local companions hold the bare
//! digest; the remote auto slot's companion additionally records the
//! originating timestamped filename in `sha256sum` output format, so the
//! overwritten object keeps its schema version and creation time.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tally_core::{Error, Result};

/// Extension appended to the snapshot filename for its companion.
pub const COMPANION_EXTENSION: &str = "sha256";

/// A parsed checksum companion file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Companion {
    /// Hex-encoded SHA-256 digest (64 characters).
    pub digest: String,

    /// Originating filename, present only in `sha256sum`-format companions
    /// (the remote auto slot).
    pub origin: Option<String>,
}

/// Calculates the SHA-256 digest of a file, streamed.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Returns the companion path for a snapshot path
/// (`tally_v1_20250101_120000.snapshot` -> `….snapshot.sha256`).
pub fn companion_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_os_string();
    name.push(".");
    name.push(COMPANION_EXTENSION);
    PathBuf::from(name)
}

/// Companion name for a remote object name
/// (`tally_auto.snapshot` -> `tally_auto.snapshot.sha256`).
pub fn companion_name(object: &str) -> String {
    format!("{object}.{COMPANION_EXTENSION}")
}

/// Returns true for a well-formed hex digest (64 lowercase hex characters).
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Writes a bare-digest companion beside the snapshot.
pub fn write_companion(snapshot: &Path, digest: &str) -> Result<()> {
    std::fs::write(companion_path(snapshot), format!("{digest}\n"))?;
    Ok(())
}

/// Renders a `sha256sum`-format companion line: digest, two spaces, origin.
pub fn companion_line_with_origin(digest: &str, origin: &str) -> String {
    format!("{digest}  {origin}\n")
}

/// Parses companion content in either bare-digest or `sha256sum` format.
pub fn parse_companion(content: &str) -> Result<Companion> {
    let line = content.lines().next().unwrap_or("").trim();
    let (digest, origin) = match line.split_once("  ") {
        Some((d, o)) => (d.trim(), Some(o.trim().to_string())),
        None => (line, None),
    };

    if !is_valid_digest(digest) {
        return Err(Error::invalid_snapshot_name(format!(
            "malformed checksum companion: {line:?}"
        )));
    }

    Ok(Companion {
        digest: digest.to_string(),
        origin: origin.filter(|o| !o.is_empty()),
    })
}

/// Reads and parses the companion file for a snapshot.
pub fn read_companion(snapshot: &Path) -> Result<Companion> {
    let path = companion_path(snapshot);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::snapshot_not_found(format!("{} (no checksum companion)", path.display()))
        } else {
            Error::Io(e)
        }
    })?;
    parse_companion(&content)
}

/// Recomputes the digest of a snapshot file and compares it to `expected`.
///
/// Returns `Ok(false)` on mismatch; I/O failures propagate so the caller can
/// distinguish "bytes changed" from "could not read the bytes".
pub fn verify(snapshot: &Path, expected: &str) -> Result<bool> {
    let actual = digest_file(snapshot)?;
    Ok(actual == expected)
}

/// Verifies the snapshot against its companion file; mismatch is an error
/// carrying both digests.
pub fn verify_against_companion(snapshot: &Path) -> Result<Companion> {
    let companion = read_companion(snapshot)?;
    let actual = digest_file(snapshot)?;
    if actual != companion.digest {
        let name = snapshot
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| snapshot.display().to_string());
        return Err(Error::checksum_mismatch(name, companion.digest, actual));
    }
    Ok(companion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_digest_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(temp_dir.path(), "data.snapshot", b"tally rows");

        let digest1 = digest_file(&path).unwrap();
        let digest2 = digest_file(&path).unwrap();

        assert_eq!(digest1, digest2);
        assert_eq!(digest1.len(), 64); // SHA256 hex length

        let path2 = create_test_file(temp_dir.path(), "other.snapshot", b"different rows");
        let digest3 = digest_file(&path2).unwrap();
        assert_ne!(digest1, digest3);
    }

    #[test]
    fn test_companion_path_appends_extension() {
        let path = Path::new("/data/tally_v3_20250102_080000.snapshot");
        assert_eq!(
            companion_path(path),
            PathBuf::from("/data/tally_v3_20250102_080000.snapshot.sha256")
        );
    }

    #[test]
    fn test_write_and_read_bare_companion() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(temp_dir.path(), "a.snapshot", b"bytes");
        let digest = digest_file(&path).unwrap();

        write_companion(&path, &digest).unwrap();
        let companion = read_companion(&path).unwrap();

        assert_eq!(companion.digest, digest);
        assert_eq!(companion.origin, None);
    }

    #[test]
    fn test_parse_companion_sha256sum_format() {
        let digest = "a".repeat(64);
        let line = companion_line_with_origin(&digest, "tally_v2_20250101_120000.snapshot");
        let companion = parse_companion(&line).unwrap();

        assert_eq!(companion.digest, digest);
        assert_eq!(
            companion.origin.as_deref(),
            Some("tally_v2_20250101_120000.snapshot")
        );
    }

    #[test]
    fn test_parse_companion_rejects_short_digest() {
        let result = parse_companion("deadbeef\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_companion_rejects_non_hex() {
        let line = format!("{}\n", "z".repeat(64));
        assert!(parse_companion(&line).is_err());
    }

    #[test]
    fn test_verify_detects_single_byte_flip() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(temp_dir.path(), "flip.snapshot", b"original content");
        let digest = digest_file(&path).unwrap();
        write_companion(&path, &digest).unwrap();

        assert!(verify(&path, &digest).unwrap());
        verify_against_companion(&path).unwrap();

        // Flip one byte in the middle of the file.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        assert!(!verify(&path, &digest).unwrap());
        let err = verify_against_companion(&path).unwrap_err();
        assert!(matches!(
            err,
            tally_core::Error::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn test_read_companion_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(temp_dir.path(), "orphan.snapshot", b"no companion");

        let err = read_companion(&path).unwrap_err();
        assert!(matches!(err, tally_core::Error::SnapshotNotFound { .. }));
    }

    #[test]
    fn test_is_valid_digest() {
        assert!(is_valid_digest(&"0".repeat(64)));
        assert!(is_valid_digest(&"f".repeat(64)));
        assert!(!is_valid_digest(&"f".repeat(63)));
        assert!(!is_valid_digest(&"g".repeat(64)));
        assert!(!is_valid_digest(""));
    }
}
