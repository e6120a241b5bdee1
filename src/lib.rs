//! # hdfs-vfs
//!
//! Read files stored behind a WebHDFS gateway as if they were local, seekable files.
//! Paths look like `hdfs://namenode:9870/warehouse/events/part-0.parquet` or
//! `webhdfs://namenode:9870/...`; both talk to the gateway's REST surface.
//!
//! ## Basic usage
//!
//! ```rust,no_run
//! use hdfs_vfs::{open, File};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = open("hdfs://namenode:9870/data/events.parquet", "r")?;
//!
//! // footer first, the way columnar readers do it
//! let size = file.size()?;
//! let mut footer = vec![0u8; 8];
//! file.read_at(&mut footer, size.saturating_sub(8))?;
//!
//! file.seek(0)?;
//! let mut header = vec![0u8; 4];
//! file.read(&mut header)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## What it does
//!
//! Opening a file resolves the URL, then asks the gateway for the file's status
//! (`GETFILESTATUS`) once. After that, size and modification time are answered
//! locally.
//!
//! Reads go through a window: the most recent contiguous range fetched from the
//! gateway (1,000,000 bytes by default). A read inside the window costs no
//! request. A read outside it replaces the window with a new range starting at
//! the read position. There is no prefetching and no retrying; a failed request
//! fails the read and empties the window.
//!
//! Two other strategies can be picked at open time:
//! - direct IO (`"rd"` mode or `HdfsConfig::direct_io`): every read fetches exactly
//!   the requested bytes
//! - whole-file caching (`CacheMode::WholeFile`): the first read downloads the file
//!   and later handles on the same unchanged file, opened as the same user, reuse
//!   it. Files larger than the cache's byte budget are read through a window.
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use hdfs_vfs::{FileLockType, FileCompressionType, FileSystem, HdfsFileSystem, OpenFlags};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = HdfsFileSystem::builder()
//!     .window_capacity(4 * 1024 * 1024)
//!     .user("analytics")
//!     .connect_timeout(Duration::from_secs(5))
//!     .build();
//!
//! // per-open settings, as a host would pass them
//! let mut settings = HashMap::new();
//! settings.insert("hdfs_namenode_url".to_string(), "http://nn.internal:9870".to_string());
//! settings.insert("hdfs_proxy".to_string(), "No Proxy".to_string());
//!
//! let file = fs.open_file(
//!     "hdfs:///warehouse/t/part-0.parquet",
//!     OpenFlags::READ,
//!     FileLockType::None,
//!     FileCompressionType::Uncompressed,
//!     Some(&settings),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using with standard I/O libraries
//!
//! `HdfsFile` implements `std::io::Read` and `Seek`. For a `Box<dyn File>`, wrap it
//! in [`FileAdapter`].
//!
//! ## Some things to know
//!
//! The remote filesystem is read-only here. Opening with a write flag, `write`, and
//! `sync` all fail with `UnsupportedOperation`.
//!
//! Metadata is never revalidated. If the file changes after it was opened, the
//! handle keeps the old length.
//!
//! Handles are not meant to be shared between threads. Open one per reader; the
//! `HdfsFileSystem` itself can be shared freely.
//!
//! ## Feature flags
//!
//! - `curl` (default): use libcurl for HTTP, including SPNEGO (`hdfs_auth = negotiate`)
//! - `reqwest`: use reqwest instead of curl (don't enable both)
//! - `capi`: build the C API

pub mod core;
pub mod endpoint;
pub mod hdfs;
pub mod metadata;
pub mod plug;
pub mod window;

pub use crate::core::*;
pub use endpoint::{AuthMode, Endpoint, Scheme};
pub use hdfs::*;
pub use metadata::RemoteFileMetadata;
pub use plug::*;

#[cfg(feature = "capi")]
pub mod ffi;

use std::io::{self, Read, Seek, SeekFrom};

pub struct FileAdapter {
    inner: Box<dyn File>,
}

impl FileAdapter {
    pub fn new(file: Box<dyn File>) -> Self {
        Self { inner: file }
    }

    pub fn into_inner(self) -> Box<dyn File> {
        self.inner
    }
}

impl From<Box<dyn File>> for FileAdapter {
    fn from(file: Box<dyn File>) -> Self {
        Self::new(file)
    }
}

impl Read for FileAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(io::Error::other)
    }
}

impl Seek for FileAdapter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(offset) => hdfs::checked_offset(self.inner.tell(), offset)?,
            SeekFrom::End(offset) => {
                let size = self.inner.size().map_err(io::Error::other)?;
                hdfs::checked_offset(size, offset)?
            }
        };

        self.inner.seek(new_pos).map_err(io::Error::other)?;
        Ok(new_pos)
    }
}
