//! Read-window state machine and the byte-source strategies built on it.
//!
//! A handle serves reads through one [`ByteSource`], picked at open time:
//!
//! - `Windowed` keeps the most recently fetched contiguous range (at most
//!   `capacity` bytes) and refills it wholesale on a miss.
//! - `Direct` fetches exactly what the caller asked for, every time.
//! - `WholeFile` pulls the entire file once, sharing it through a
//!   [`WholeFileCache`].
//!
//! Fetching goes through [`RangeFetch`], so the machine itself never sees
//! URLs or HTTP.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use ahash::RandomState;
use log::debug;
use lru::LruCache;

use crate::core::{FsError, Result};
use crate::endpoint::AuthMode;
use crate::metadata::RemoteFileMetadata;

pub const DEFAULT_WINDOW_CAPACITY: u64 = 1_000_000;

/// Source of remote bytes.
pub trait RangeFetch {
    /// Fetch exactly `[offset, offset + length)`. Implementations fail
    /// rather than return a different number of bytes.
    fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

/// The most recently fetched contiguous range.
#[derive(Debug, Default)]
pub struct ReadWindow {
    data: Vec<u8>,
    start: u64,
    end: u64,
}

impl ReadWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn install(&mut self, start: u64, data: Vec<u8>) {
        self.start = start;
        self.end = start + data.len() as u64;
        self.data = data;
    }

    pub fn contains(&self, file_offset: u64) -> bool {
        file_offset >= self.start && file_offset < self.end
    }

    /// Copy from `file_offset` into `out`; 0 if the offset is not covered.
    fn copy_to(&self, out: &mut [u8], file_offset: u64) -> usize {
        if !self.contains(file_offset) {
            return 0;
        }

        let buffer_offset = (file_offset - self.start) as usize;
        let available = self.data.len() - buffer_offset;
        let to_copy = available.min(out.len());

        out[..to_copy].copy_from_slice(&self.data[buffer_offset..buffer_offset + to_copy]);
        to_copy
    }

    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.start = 0;
        self.end = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Covered file range, `None` when empty.
    pub fn range(&self) -> Option<Range<u64>> {
        (!self.is_empty()).then_some(self.start..self.end)
    }
}

/// Windowed reader: serves hits from the window, refills on a miss.
#[derive(Debug)]
pub struct BufferedReader {
    capacity: u64,
    window: ReadWindow,
}

impl BufferedReader {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            window: ReadWindow::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> &ReadWindow {
        &self.window
    }

    /// Fill `buf` from `location`, clamped to `file_length`.
    pub fn read_at(
        &mut self,
        source: &dyn RangeFetch,
        file_length: u64,
        buf: &mut [u8],
        location: u64,
    ) -> Result<usize> {
        let wanted = clamp_to_eof(buf.len(), location, file_length);
        let mut copied = 0;
        let mut pos = location;

        while copied < wanted {
            if !self.window.contains(pos) {
                self.refill(source, pos, file_length)?;
            }

            let n = self.window.copy_to(&mut buf[copied..wanted], pos);
            if n == 0 {
                self.window.clear();
                return Err(FsError::RemoteRead(format!(
                    "refill at offset {pos} did not cover the requested byte"
                )));
            }

            copied += n;
            pos += n as u64;
        }

        Ok(copied)
    }

    fn refill(&mut self, source: &dyn RangeFetch, pos: u64, file_length: u64) -> Result<()> {
        // a failed fetch must not leave the previous window in place
        self.window.clear();

        let end = pos.saturating_add(self.capacity).min(file_length);
        let length = end - pos;
        debug!("window miss at {pos}, fetching {length} bytes");

        let data = source.fetch_range(pos, length)?;
        if data.len() as u64 != length {
            return Err(FsError::RemoteRead(format!(
                "expected {length} bytes at offset {pos}, received {}",
                data.len()
            )));
        }

        self.window.install(pos, data);
        Ok(())
    }

    pub fn release(&mut self) {
        self.window.clear();
    }
}

fn clamp_to_eof(requested: usize, location: u64, file_length: u64) -> usize {
    if location >= file_length {
        return 0;
    }
    (file_length - location).min(requested as u64) as usize
}

/// Principal a whole-file download was made for. Entries are never
/// shared across users or auth modes.
#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct CacheScope {
    pub url: Arc<str>,
    pub user: Option<Arc<str>>,
    pub auth: AuthMode,
}

impl std::fmt::Display for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{} as {user}", self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct CacheKey {
    pub scope: CacheScope,
    pub length: u64,
    pub last_modified_ms: i64,
}

impl CacheKey {
    pub fn new(scope: CacheScope, metadata: &RemoteFileMetadata) -> Self {
        Self {
            scope,
            length: metadata.length,
            last_modified_ms: metadata.last_modified.timestamp_millis(),
        }
    }
}

/// Whole-file contents shared by every handle of one filesystem.
///
/// Keys include length and mtime, so a rewritten file gets a fresh entry.
pub struct WholeFileCache {
    entries: Mutex<CacheState>,
    max_bytes: usize,
}

struct CacheState {
    lru: LruCache<CacheKey, Arc<[u8]>, RandomState>,
    current_bytes: usize,
}

impl WholeFileCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(CacheState {
                lru: LruCache::with_hasher(cap, RandomState::new()),
                current_bytes: 0,
            }),
            max_bytes,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<[u8]>> {
        let mut state = self.entries.lock().ok()?;
        state.lru.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, data: Arc<[u8]>) {
        if data.len() > self.max_bytes {
            return;
        }

        let Ok(mut state) = self.entries.lock() else {
            return;
        };

        if let Some(old) = state.lru.pop(&key) {
            state.current_bytes -= old.len();
        }

        state.current_bytes += data.len();
        if let Some((_, evicted)) = state.lru.push(key, data) {
            state.current_bytes -= evicted.len();
        }

        while state.current_bytes > self.max_bytes {
            match state.lru.pop_lru() {
                Some((_, evicted)) => state.current_bytes -= evicted.len(),
                None => break,
            }
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|s| s.lru.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.lock().map(|s| s.current_bytes).unwrap_or(0)
    }
}

/// How a handle services reads.
pub enum ByteSource {
    Windowed(BufferedReader),
    Direct,
    /// Files over the cache's byte budget are read through a window of
    /// `window_capacity` bytes instead.
    WholeFile {
        cache: Arc<WholeFileCache>,
        scope: CacheScope,
        window_capacity: u64,
        data: Option<Arc<[u8]>>,
    },
}

impl ByteSource {
    pub fn read_at(
        &mut self,
        source: &dyn RangeFetch,
        metadata: &RemoteFileMetadata,
        buf: &mut [u8],
        location: u64,
    ) -> Result<usize> {
        let fallback = match self {
            ByteSource::WholeFile {
                cache,
                scope,
                window_capacity,
                ..
            } if metadata.length > cache.max_bytes() as u64 => {
                debug!(
                    "{scope} is {} bytes, over the whole-file budget; reading through a window",
                    metadata.length
                );
                Some(*window_capacity)
            }
            _ => None,
        };
        if let Some(capacity) = fallback {
            *self = ByteSource::Windowed(BufferedReader::new(capacity));
        }

        match self {
            ByteSource::Windowed(reader) => reader.read_at(source, metadata.length, buf, location),
            ByteSource::Direct => {
                let wanted = clamp_to_eof(buf.len(), location, metadata.length);
                if wanted == 0 {
                    return Ok(0);
                }

                let data = source.fetch_range(location, wanted as u64)?;
                if data.len() != wanted {
                    return Err(FsError::RemoteRead(format!(
                        "expected {wanted} bytes at offset {location}, received {}",
                        data.len()
                    )));
                }

                buf[..wanted].copy_from_slice(&data);
                Ok(wanted)
            }
            ByteSource::WholeFile {
                cache, scope, data, ..
            } => {
                let wanted = clamp_to_eof(buf.len(), location, metadata.length);
                if wanted == 0 {
                    return Ok(0);
                }

                let contents = match data.as_ref() {
                    Some(contents) => Arc::clone(contents),
                    None => {
                        let contents = load_whole_file(source, cache, scope, metadata)?;
                        *data = Some(Arc::clone(&contents));
                        contents
                    }
                };

                let start = location as usize;
                buf[..wanted].copy_from_slice(&contents[start..start + wanted]);
                Ok(wanted)
            }
        }
    }

    /// Drop any buffered bytes.
    pub fn release(&mut self) {
        match self {
            ByteSource::Windowed(reader) => reader.release(),
            ByteSource::Direct => {}
            ByteSource::WholeFile { data, .. } => *data = None,
        }
    }
}

fn load_whole_file(
    source: &dyn RangeFetch,
    cache: &WholeFileCache,
    scope: &CacheScope,
    metadata: &RemoteFileMetadata,
) -> Result<Arc<[u8]>> {
    let key = CacheKey::new(scope.clone(), metadata);
    if let Some(contents) = cache.get(&key) {
        debug!("whole-file cache hit for {scope}");
        return Ok(contents);
    }

    debug!("downloading {} bytes of {scope}", metadata.length);
    let bytes = source.fetch_range(0, metadata.length)?;
    if bytes.len() as u64 != metadata.length {
        return Err(FsError::RemoteRead(format!(
            "expected {} bytes for {scope}, received {}",
            metadata.length,
            bytes.len()
        )));
    }

    let contents: Arc<[u8]> = bytes.into();
    cache.insert(key, Arc::clone(&contents));
    Ok(contents)
}
