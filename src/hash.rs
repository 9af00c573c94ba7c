//! Streaming SHA-256 hasher (C1).
//!
//! One primitive hashes whole files from disk with a failure class, and also
//! hashes in-memory byte slices for chunk/artifact verification.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of attempting to hash a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStatus {
    Ok,
    Missing,
    Permission,
    IoError,
}

impl HashStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HashStatus::Ok => "ok",
            HashStatus::Missing => "missing",
            HashStatus::Permission => "permission",
            HashStatus::IoError => "io_error",
        }
    }
}

/// Result of [`hash_file`].
#[derive(Debug, Clone)]
pub struct FileHash {
    pub sha256: Option<String>,
    pub size: u64,
    pub status: HashStatus,
}

/// Streams a file's contents through SHA-256 in 64 KiB chunks.
///
/// Missing files yield `(None, 0, Missing)`. Permission-denied opens yield
/// `(None, 0, Permission)`. A stat that succeeds but whose subsequent open
/// fails for another reason yields `(None, stat_size_or_0, IoError)`.
pub fn hash_file(path: &Path) -> FileHash {
    let metadata = match std::fs::metadata(path) {
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return FileHash { sha256: None, size: 0, status: HashStatus::Missing };
        }
        Err(_) => None,
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            let status = match err.kind() {
                io::ErrorKind::NotFound => HashStatus::Missing,
                io::ErrorKind::PermissionDenied => HashStatus::Permission,
                _ => HashStatus::IoError,
            };
            let size = metadata.map(|m| m.len()).unwrap_or(0);
            return FileHash { sha256: None, size, status };
        }
    };

    let known_size = metadata.map(|m| m.len());
    match hash_reader(file) {
        Ok((digest, bytes_read)) => FileHash {
            sha256: Some(digest),
            size: known_size.unwrap_or(bytes_read),
            status: HashStatus::Ok,
        },
        Err(_) => FileHash { sha256: None, size: known_size.unwrap_or(0), status: HashStatus::IoError },
    }
}

fn hash_reader<R: Read>(mut reader: R) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Hashes an in-memory byte slice (chunk/artifact content verification).
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-1 is used only for the short `file_id`/`chunk_id` derivation (§3);
/// never for content integrity, which is always SHA-256.
pub fn sha1_hex(bytes: &[u8]) -> String {
    use sha1::{Digest as _, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn hash_file_missing_returns_missing_status() {
        let result = hash_file(Path::new("/nonexistent/path/for/repolens/tests"));
        assert!(result.sha256.is_none());
        assert_eq!(result.size, 0);
        assert_eq!(result.status, HashStatus::Missing);
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let result = hash_file(file.path());
        assert_eq!(result.status, HashStatus::Ok);
        assert_eq!(result.sha256.as_deref(), Some(hash_bytes(b"hello world").as_str()));
        assert_eq!(result.size, 11);
    }

    #[test]
    fn sha1_hex_is_stable() {
        let a = sha1_hex(b"repo||path/to/file.rs");
        let b = sha1_hex(b"repo||path/to/file.rs");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }
}
