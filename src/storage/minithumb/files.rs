//! Backing file provisioning for a store
//!
//! Each table owns two files under the cache directory:
//!
//! ```text
//! <base_dir>/.thumbdata<DATA_VERSION>-<tableHash>
//! <base_dir>/.thumbindex<INDEX_VERSION>-<tableHash>
//! ```
//!
//! Files are disposable cache data. Opening never fails hard: a file that
//! cannot be opened read-write is retried read-only, and a file that cannot
//! be opened at all leaves the store without persistence.

use crate::config::StoreConfig;
use crate::metrics;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which of the two backing files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Data,
    Index,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            FileKind::Data => ".thumbdata",
            FileKind::Index => ".thumbindex",
        }
    }

    fn version(self, config: &StoreConfig) -> u32 {
        match self {
            FileKind::Data => config.data_version,
            FileKind::Index => config.index_version,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Data => "data",
            FileKind::Index => "index",
        }
    }
}

/// An open backing file
#[derive(Debug)]
pub struct BackingFile {
    pub file: File,
    pub path: PathBuf,
    pub writable: bool,
}

impl BackingFile {
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// 32-bit polynomial string hash (multiplier 31, UTF-16 code units, wrapping)
pub fn table_hash(table: &str) -> i32 {
    table
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Path of a backing file at an explicit version
pub fn versioned_path(base_dir: &Path, kind: FileKind, version: u32, table: &str) -> PathBuf {
    base_dir.join(format!("{}{}-{}", kind.prefix(), version, table_hash(table)))
}

/// Path of the current-version backing file
pub fn file_path(config: &StoreConfig, kind: FileKind, table: &str) -> PathBuf {
    versioned_path(&config.base_dir, kind, kind.version(config), table)
}

/// Delete the file left behind by the previous layout version
fn remove_legacy_file(config: &StoreConfig, kind: FileKind, table: &str) {
    let version = kind.version(config);
    if version == 0 {
        return;
    }
    let legacy = versioned_path(&config.base_dir, kind, version - 1, table);
    if legacy.exists() {
        match std::fs::remove_file(&legacy) {
            Ok(()) => info!(path = ?legacy, "Removed legacy thumbnail file"),
            Err(e) => debug!(path = ?legacy, error = %e, "Could not remove legacy thumbnail file"),
        }
    }
}

/// Open (creating if needed) one backing file of `table`.
///
/// Returns `None` when the file cannot be opened even read-only.
pub fn open_backing_file(config: &StoreConfig, kind: FileKind, table: &str) -> Option<BackingFile> {
    remove_legacy_file(config, kind, table);

    if config.create_dirs {
        if let Err(e) = std::fs::create_dir_all(&config.base_dir) {
            warn!(dir = ?config.base_dir, error = %e, "Failed to create thumbnail directory");
        }
    }

    let path = file_path(config, kind, table);

    let read_write = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path);

    match read_write {
        Ok(file) => {
            debug!(path = ?path, file = kind.label(), "Opened thumbnail file");
            Some(BackingFile {
                file,
                path,
                writable: true,
            })
        }
        Err(rw_err) => match File::open(&path) {
            Ok(file) => {
                warn!(path = ?path, error = %rw_err, "Thumbnail file opened read-only");
                Some(BackingFile {
                    file,
                    path,
                    writable: false,
                })
            }
            Err(ro_err) => {
                warn!(
                    path = ?path,
                    file = kind.label(),
                    error = %ro_err,
                    "Thumbnail file unavailable, store runs without persistence"
                );
                metrics::record_open_failure(kind.label());
                None
            }
        },
    }
}

/// Read into `buf` at `offset` until it is full or end of file.
///
/// Returns the number of bytes read; fewer than `buf.len()` means EOF.
pub fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match sys::read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match sys::write_at(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Full disk or read-only mount
pub fn is_exhausted(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::ENOSPC || code == libc::EROFS)
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.read_at(buf, offset)
    }

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.write_at(buf, offset)
    }
}

#[cfg(windows)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.seek_read(buf, offset)
    }

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.seek_write(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str) -> StoreConfig {
        StoreConfig::with_base_dir(
            std::env::temp_dir().join(format!("minithumb_files_{}_{}", name, std::process::id())),
        )
    }

    #[test]
    fn test_table_hash_known_values() {
        assert_eq!(table_hash(""), 0);
        assert_eq!(table_hash("a"), 97);
        assert_eq!(table_hash("images"), -1185250696);
        assert_eq!(table_hash("images"), table_hash("images"));
        assert_ne!(table_hash("images"), table_hash("video"));
    }

    #[test]
    fn test_file_names() {
        let config = StoreConfig::with_base_dir("/thumbs");
        let hash = table_hash("video");

        assert_eq!(
            file_path(&config, FileKind::Data, "video"),
            PathBuf::from(format!("/thumbs/.thumbdata{}-{}", config.data_version, hash))
        );
        assert_eq!(
            file_path(&config, FileKind::Index, "video"),
            PathBuf::from(format!("/thumbs/.thumbindex{}-{}", config.index_version, hash))
        );
    }

    #[test]
    fn test_open_creates_directory_and_file() {
        let config = temp_config("create");
        std::fs::remove_dir_all(&config.base_dir).ok();

        let opened = open_backing_file(&config, FileKind::Data, "images").expect("opened");
        assert!(opened.writable);
        assert!(opened.path.exists());
        assert_eq!(opened.len().unwrap(), 0);

        std::fs::remove_dir_all(&config.base_dir).ok();
    }

    #[test]
    fn test_open_removes_legacy_version() {
        let config = temp_config("legacy");
        std::fs::create_dir_all(&config.base_dir).unwrap();

        let legacy = versioned_path(&config.base_dir, FileKind::Index, config.index_version - 1, "images");
        std::fs::write(&legacy, b"old layout").unwrap();

        let opened = open_backing_file(&config, FileKind::Index, "images");
        assert!(opened.is_some());
        assert!(!legacy.exists());

        std::fs::remove_dir_all(&config.base_dir).ok();
    }

    #[test]
    fn test_open_fails_softly_when_directory_is_a_file() {
        let blocker = std::env::temp_dir().join(format!("minithumb_files_blocker_{}", std::process::id()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = StoreConfig::with_base_dir(blocker.join("thumbs"));
        assert!(open_backing_file(&config, FileKind::Data, "images").is_none());

        std::fs::remove_file(blocker).ok();
    }

    #[test]
    fn test_positioned_io() -> io::Result<()> {
        let config = temp_config("io");
        let opened = open_backing_file(&config, FileKind::Data, "images").expect("opened");

        write_all_at(&opened.file, b"hello", 10)?;
        let mut buf = [0u8; 8];
        let n = read_full_at(&opened.file, &mut buf, 10)?;
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(read_full_at(&opened.file, &mut buf, 100)?, 0);

        std::fs::remove_dir_all(&config.base_dir).ok();
        Ok(())
    }

    #[test]
    fn test_exhausted_errors() {
        assert!(is_exhausted(&io::Error::from_raw_os_error(libc::ENOSPC)));
        assert!(is_exhausted(&io::Error::from_raw_os_error(libc::EROFS)));
        assert!(!is_exhausted(&io::Error::from_raw_os_error(libc::EIO)));
        assert!(!is_exhausted(&io::Error::new(io::ErrorKind::Other, "no errno")));
    }
}
