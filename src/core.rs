use std::collections::HashMap;
use std::hash::BuildHasher;
use std::io;
use std::ops::BitOr;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Setting key that overrides the namenode authority of a URL.
pub const NAMENODE_URL_SETTING: &str = "hdfs_namenode_url";
/// Setting key for the HTTP proxy used to reach the gateway.
pub const PROXY_SETTING: &str = "hdfs_proxy";
/// Setting key for the `user.name` parameter sent to the gateway.
pub const USER_SETTING: &str = "hdfs_user";
/// Setting key for the authentication mode (`none` or `negotiate`).
pub const AUTH_SETTING: &str = "hdfs_auth";
/// Value of [`PROXY_SETTING`] meaning "connect directly".
pub const NO_PROXY: &str = "No Proxy";

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("File handle is not initialized")]
    NotInitialized,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Position {position} is past the end of a {length} byte file")]
    SeekOutOfRange { position: u64, length: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File is closed")]
    FileClosed,
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Access flags requested when opening a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(1);
    pub const WRITE: OpenFlags = OpenFlags(1 << 1);
    pub const APPEND: OpenFlags = OpenFlags(1 << 2);
    pub const CREATE: OpenFlags = OpenFlags(1 << 3);
    pub const DIRECT_IO: OpenFlags = OpenFlags(1 << 4);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag asks for mutation of the remote file.
    pub fn wants_write(self) -> bool {
        self.0 & (Self::WRITE.0 | Self::APPEND.0 | Self::CREATE.0) != 0
    }

    /// Parse an fopen-style mode string. `d` requests direct IO, `b` is
    /// accepted and ignored.
    pub fn from_mode(mode: &str) -> Result<Self> {
        if mode.is_empty() {
            return Err(FsError::UnsupportedOperation("empty open mode".into()));
        }

        let mut flags = OpenFlags::default();
        for c in mode.chars() {
            flags = flags
                | match c {
                    'r' => Self::READ,
                    'w' => Self::WRITE | Self::CREATE,
                    'a' => Self::APPEND,
                    '+' => Self::WRITE,
                    'd' => Self::DIRECT_IO,
                    'b' => OpenFlags::default(),
                    other => {
                        return Err(FsError::UnsupportedOperation(format!(
                            "unknown open mode character '{other}' in \"{mode}\""
                        )));
                    }
                };
        }
        Ok(flags)
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileLockType {
    #[default]
    None,
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileCompressionType {
    #[default]
    Uncompressed,
    AutoDetect,
    Gzip,
    Zstd,
}

/// Key/value settings lookup supplied by the host at open time.
pub trait FileOpener {
    fn setting(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher> FileOpener for HashMap<String, String, S> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<const N: usize> FileOpener for [(&str, &str); N] {
    fn setting(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

/// Abstract file interface
pub trait File: Send {
    /// Read up to buf.len() bytes starting at `location`.
    /// Returns number of bytes read; fewer than requested means EOF.
    /// Leaves the cursor at `location` plus the bytes read.
    fn read_at(&mut self, buf: &mut [u8], location: u64) -> Result<usize>;

    /// Read up to buf.len() bytes into buf at the cursor.
    /// Returns number of bytes read (0 = EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Seek to absolute position.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Get current position.
    fn tell(&self) -> u64;

    /// Check if at end of file.
    fn eof(&self) -> bool;

    /// File size. Fails if the handle does not know it (yet).
    fn size(&self) -> Result<u64> {
        Err(FsError::UnsupportedOperation("size is not available".into()))
    }

    /// Remote modification time.
    fn last_modified(&self) -> Result<DateTime<Utc>> {
        Err(FsError::UnsupportedOperation(
            "modification time is not available".into(),
        ))
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(FsError::UnsupportedOperation(
            "write is not supported on a read-only filesystem".into(),
        ))
    }

    fn sync(&mut self) -> Result<()> {
        Err(FsError::UnsupportedOperation(
            "sync is not supported on a read-only filesystem".into(),
        ))
    }

    /// Close the file (optional, called automatically on drop).
    fn close(&mut self) {}
}

/// Provider contract a host filesystem registry talks to.
pub trait FileSystem: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `path` belongs to this provider.
    fn can_handle(&self, path: &str) -> bool;

    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        lock: FileLockType,
        compression: FileCompressionType,
        opener: Option<&dyn FileOpener>,
    ) -> Result<Box<dyn File>>;

    fn open(&self, path: &str, mode: &str) -> Result<Box<dyn File>> {
        let flags = OpenFlags::from_mode(mode)?;
        self.open_file(
            path,
            flags,
            FileLockType::None,
            FileCompressionType::Uncompressed,
            None,
        )
    }

    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Expand `path`. Only literal paths are supported.
    fn glob(&self, path: &str) -> Result<Vec<String>> {
        Ok(vec![path.to_string()])
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn on_disk_file(&self) -> bool {
        false
    }

    fn read_at(&self, handle: &mut dyn File, buf: &mut [u8], location: u64) -> Result<usize> {
        handle.read_at(buf, location)
    }

    fn read(&self, handle: &mut dyn File, buf: &mut [u8]) -> Result<usize> {
        handle.read(buf)
    }

    fn file_size(&self, handle: &dyn File) -> Result<u64> {
        handle.size()
    }

    fn last_modified(&self, handle: &dyn File) -> Result<DateTime<Utc>> {
        handle.last_modified()
    }

    fn seek(&self, handle: &mut dyn File, location: u64) -> Result<()> {
        handle.seek(location)
    }

    fn seek_position(&self, handle: &dyn File) -> u64 {
        handle.tell()
    }

    fn write(&self, handle: &mut dyn File, buf: &[u8]) -> Result<usize> {
        handle.write(buf)
    }

    fn sync(&self, handle: &mut dyn File) -> Result<()> {
        handle.sync()
    }
}

/// Create a filesystem for the given URL.
pub fn create(url: &str) -> Result<Box<dyn FileSystem>> {
    if crate::endpoint::can_handle(url) {
        Ok(Box::new(crate::hdfs::HdfsFileSystem::new()))
    } else {
        Err(FsError::MalformedUrl(url.to_string()))
    }
}

/// Open a file directly.
pub fn open(url: &str, mode: &str) -> Result<Box<dyn File>> {
    let fs = create(url)?;
    fs.open(url, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_modes_parse() {
        assert_eq!(OpenFlags::from_mode("r").unwrap(), OpenFlags::READ);
        assert_eq!(OpenFlags::from_mode("rb").unwrap(), OpenFlags::READ);

        let direct = OpenFlags::from_mode("rd").unwrap();
        assert!(direct.contains(OpenFlags::DIRECT_IO));
        assert!(!direct.wants_write());
    }

    #[test]
    fn write_modes_are_detected() {
        for mode in ["w", "wb", "a", "r+", "ab"] {
            assert!(OpenFlags::from_mode(mode).unwrap().wants_write(), "{mode}");
        }
    }

    #[test]
    fn bad_modes_are_rejected() {
        assert!(matches!(
            OpenFlags::from_mode(""),
            Err(FsError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            OpenFlags::from_mode("rx"),
            Err(FsError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn settings_lookup() {
        let pairs = [(PROXY_SETTING, "proxy:3128")];
        assert_eq!(pairs.setting(PROXY_SETTING).as_deref(), Some("proxy:3128"));
        assert_eq!(pairs.setting(NAMENODE_URL_SETTING), None);

        let mut map = HashMap::new();
        map.insert(USER_SETTING.to_string(), "hdfs".to_string());
        assert_eq!(map.setting(USER_SETTING).as_deref(), Some("hdfs"));
    }

    #[test]
    fn create_rejects_other_schemes() {
        assert!(create("hdfs://nn:8020/data/a.parquet").is_ok());
        assert!(matches!(
            create("https://example.com/a"),
            Err(FsError::MalformedUrl(_))
        ));
    }
}
