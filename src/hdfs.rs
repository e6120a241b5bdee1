use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::core::{
    AUTH_SETTING, File, FileCompressionType, FileLockType, FileOpener, FileSystem, FsError,
    NAMENODE_URL_SETTING, NO_PROXY, OpenFlags, PROXY_SETTING, Result, USER_SETTING,
};
use crate::endpoint::{self, AuthMode, Endpoint};
use crate::metadata::{RemoteFileMetadata, fetch_metadata};
use crate::plug::{BlockingHttp, ByteRange, RequestContext, build_default_transport};
use crate::window::{
    BufferedReader, ByteSource, CacheScope, DEFAULT_WINDOW_CAPACITY, RangeFetch, WholeFileCache,
};

/// How a non-direct handle services a window miss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Range-buffered reads through a window of `window_capacity` bytes.
    #[default]
    Windowed,
    /// Download the whole file on first read and keep it in a shared LRU.
    WholeFile,
}

/// How a byte range is put on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RangeStyle {
    /// WebHDFS `offset` and `length` query parameters.
    #[default]
    Query,
    /// HTTP `Range` header.
    Header,
}

#[derive(Clone, Debug)]
pub struct HdfsConfig {
    pub window_capacity: u64,
    pub cache_mode: CacheMode,
    pub direct_io: bool,
    pub whole_file_cache_max_entries: usize,
    pub whole_file_cache_max_bytes: usize,
    pub range_style: RangeStyle,
    pub auth_mode: AuthMode,
    /// Use https towards the gateway.
    pub secure: bool,
    pub namenode_url: Option<String>,
    pub proxy: Option<String>,
    pub user: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            cache_mode: CacheMode::Windowed,
            direct_io: false,
            whole_file_cache_max_entries: 16,
            whole_file_cache_max_bytes: 256 * 1024 * 1024,
            range_style: RangeStyle::Query,
            auth_mode: AuthMode::None,
            secure: false,
            namenode_url: None,
            proxy: None,
            user: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Transport, endpoint and request settings of one handle.
struct RemoteContent {
    transport: Arc<dyn BlockingHttp>,
    endpoint: Endpoint,
    ctx: RequestContext,
    range_style: RangeStyle,
}

impl RangeFetch for RemoteContent {
    fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let (url, range) = match self.range_style {
            RangeStyle::Query => (self.endpoint.open_url(Some((offset, length)))?, None),
            RangeStyle::Header => (
                self.endpoint.open_url(None)?,
                Some(ByteRange::new(offset, length)),
            ),
        };

        debug!(
            "fetching {length} bytes at offset {offset} of {}",
            self.endpoint
        );
        let response = self.transport.get(&url, range, &self.ctx)?;

        if !response.is_success() {
            warn!(
                "range read of {} failed with HTTP {}",
                self.endpoint, response.status
            );
            return Err(FsError::RemoteRead(format!(
                "HTTP {} reading {length} bytes at offset {offset} of {}",
                response.status, self.endpoint
            )));
        }

        if self.range_style == RangeStyle::Header
            && response.status == 200
            && response.data.len() as u64 > length
        {
            return Err(FsError::RemoteRead(
                "Server ignored the Range header (returned 200 with the full body)".into(),
            ));
        }

        if let Some((start, _)) = response.content_range()
            && start != offset
        {
            return Err(FsError::RemoteRead(format!(
                "Server returned range starting at {start}, expected {offset}"
            )));
        }

        if response.data.len() as u64 != length {
            return Err(FsError::RemoteRead(format!(
                "expected {length} bytes at offset {offset} of {}, received {}",
                self.endpoint,
                response.data.len()
            )));
        }

        Ok(response.data)
    }
}

enum HandleState {
    Uninitialized,
    Ready(RemoteFileMetadata),
    Closed,
}

/// Read-only handle on one remote file.
///
/// Built `Uninitialized` by [`HdfsFileSystem`]; [`HdfsFile::initialize`]
/// fetches the metadata once and makes the handle readable. Not meant to be
/// shared between threads: open one handle per reader.
pub struct HdfsFile {
    path: Arc<str>,
    remote: RemoteContent,
    source: ByteSource,
    state: HandleState,
    file_offset: u64,
}

impl HdfsFile {
    fn new(path: Arc<str>, remote: RemoteContent, source: ByteSource) -> Self {
        Self {
            path,
            remote,
            source,
            state: HandleState::Uninitialized,
            file_offset: 0,
        }
    }

    /// Fetch remote metadata. Calling it again on a ready handle is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            HandleState::Ready(_) => Ok(()),
            HandleState::Closed => Err(FsError::FileClosed),
            HandleState::Uninitialized => {
                let metadata = fetch_metadata(
                    self.remote.transport.as_ref(),
                    &self.remote.endpoint,
                    &self.remote.ctx,
                )?;
                debug!(
                    "{} is {} bytes, modified {}",
                    self.path, metadata.length, metadata.last_modified
                );
                self.file_offset = 0;
                self.state = HandleState::Ready(metadata);
                Ok(())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.remote.endpoint
    }

    pub fn metadata(&self) -> Result<RemoteFileMetadata> {
        match &self.state {
            HandleState::Ready(metadata) => Ok(*metadata),
            HandleState::Uninitialized => Err(FsError::NotInitialized),
            HandleState::Closed => Err(FsError::FileClosed),
        }
    }

    /// Currently buffered file range, if the handle is window-buffered.
    pub fn window_range(&self) -> Option<std::ops::Range<u64>> {
        match &self.source {
            ByteSource::Windowed(reader) => reader.window().range(),
            _ => None,
        }
    }
}

impl File for HdfsFile {
    fn read_at(&mut self, buf: &mut [u8], location: u64) -> Result<usize> {
        let metadata = self.metadata()?;
        if location > metadata.length {
            return Err(FsError::SeekOutOfRange {
                position: location,
                length: metadata.length,
            });
        }

        let n = self
            .source
            .read_at(&self.remote, &metadata, buf, location)?;
        self.file_offset = location + n as u64;
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let location = self.file_offset;
        self.read_at(buf, location)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let metadata = self.metadata()?;
        if pos > metadata.length {
            return Err(FsError::SeekOutOfRange {
                position: pos,
                length: metadata.length,
            });
        }

        self.file_offset = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.file_offset
    }

    fn eof(&self) -> bool {
        match &self.state {
            HandleState::Ready(metadata) => self.file_offset >= metadata.length,
            _ => false,
        }
    }

    fn size(&self) -> Result<u64> {
        self.metadata().map(|m| m.length)
    }

    fn last_modified(&self) -> Result<DateTime<Utc>> {
        self.metadata().map(|m| m.last_modified)
    }

    fn close(&mut self) {
        if !matches!(self.state, HandleState::Closed) {
            self.source.release();
            self.state = HandleState::Closed;
            info!("closed {}", self.path);
        }
    }
}

impl Read for HdfsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(io::Error::other)
    }
}

impl Seek for HdfsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(offset) => checked_offset(self.file_offset, offset)?,
            SeekFrom::End(offset) => {
                let size = File::size(self).map_err(io::Error::other)?;
                checked_offset(size, offset)?
            }
        };

        File::seek(self, new_pos).map_err(io::Error::other)?;
        Ok(new_pos)
    }
}

pub(crate) fn checked_offset(base: u64, offset: i64) -> io::Result<u64> {
    base.checked_add_signed(offset).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

impl Drop for HdfsFile {
    fn drop(&mut self) {
        self.close();
    }
}

/// Provider for `hdfs://` and `webhdfs://` URLs.
pub struct HdfsFileSystem {
    transport: Arc<dyn BlockingHttp>,
    config: HdfsConfig,
    whole_file_cache: Arc<WholeFileCache>,
}

pub struct HdfsFileSystemBuilder {
    config: HdfsConfig,
    transport: Option<Arc<dyn BlockingHttp>>,
}

impl Default for HdfsFileSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HdfsFileSystemBuilder {
    pub fn new() -> Self {
        Self {
            config: HdfsConfig::default(),
            transport: None,
        }
    }

    pub fn config(mut self, config: HdfsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn BlockingHttp>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn window_capacity(mut self, capacity: u64) -> Self {
        self.config.window_capacity = capacity.max(1);
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    pub fn direct_io(mut self, enabled: bool) -> Self {
        self.config.direct_io = enabled;
        self
    }

    pub fn whole_file_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.config.whole_file_cache_max_entries = max_entries;
        self
    }

    pub fn whole_file_cache_max_bytes(mut self, max_bytes: usize) -> Self {
        self.config.whole_file_cache_max_bytes = max_bytes;
        self
    }

    pub fn range_style(mut self, style: RangeStyle) -> Self {
        self.config.range_style = style;
        self
    }

    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.config.auth_mode = mode;
        self
    }

    pub fn secure(mut self, enabled: bool) -> Self {
        self.config.secure = enabled;
        self
    }

    pub fn namenode_url(mut self, url: impl Into<String>) -> Self {
        self.config.namenode_url = Some(url.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> HdfsFileSystem {
        let transport = self
            .transport
            .unwrap_or_else(|| build_default_transport(&self.config));

        HdfsFileSystem {
            transport,
            whole_file_cache: Arc::new(WholeFileCache::new(
                self.config.whole_file_cache_max_entries,
                self.config.whole_file_cache_max_bytes,
            )),
            config: self.config,
        }
    }
}

impl HdfsFileSystem {
    pub fn new() -> Self {
        HdfsFileSystemBuilder::new().build()
    }

    pub fn builder() -> HdfsFileSystemBuilder {
        HdfsFileSystemBuilder::new()
    }

    pub fn config(&self) -> &HdfsConfig {
        &self.config
    }

    pub fn whole_file_cache(&self) -> &WholeFileCache {
        &self.whole_file_cache
    }

    /// Build an uninitialized handle. No network I/O happens here.
    pub fn create_handle(
        &self,
        path: &str,
        flags: OpenFlags,
        lock: FileLockType,
        compression: FileCompressionType,
        opener: Option<&dyn FileOpener>,
    ) -> Result<HdfsFile> {
        if flags.wants_write() {
            return Err(FsError::UnsupportedOperation(format!(
                "{path}: HDFS files can only be opened for reading"
            )));
        }
        if lock == FileLockType::Write {
            return Err(FsError::UnsupportedOperation(format!(
                "{path}: write locks are not supported"
            )));
        }
        if compression != FileCompressionType::Uncompressed {
            return Err(FsError::UnsupportedOperation(format!(
                "{path}: compressed reads are not supported ({compression:?})"
            )));
        }

        let endpoint = self.resolve_endpoint(path, opener)?;
        let remote = RemoteContent {
            transport: Arc::clone(&self.transport),
            ctx: endpoint.request_context(),
            endpoint,
            range_style: self.config.range_style,
        };

        let source = if flags.contains(OpenFlags::DIRECT_IO) || self.config.direct_io {
            ByteSource::Direct
        } else {
            match self.config.cache_mode {
                CacheMode::Windowed => {
                    ByteSource::Windowed(BufferedReader::new(self.config.window_capacity))
                }
                CacheMode::WholeFile => ByteSource::WholeFile {
                    cache: Arc::clone(&self.whole_file_cache),
                    scope: CacheScope {
                        url: Arc::from(remote.endpoint.to_string()),
                        user: remote.endpoint.user.as_deref().map(Arc::from),
                        auth: remote.endpoint.auth_mode,
                    },
                    window_capacity: self.config.window_capacity,
                    data: None,
                },
            }
        };

        Ok(HdfsFile::new(Arc::from(path), remote, source))
    }

    /// Open and initialize a handle.
    pub fn open_handle(
        &self,
        path: &str,
        flags: OpenFlags,
        lock: FileLockType,
        compression: FileCompressionType,
        opener: Option<&dyn FileOpener>,
    ) -> Result<HdfsFile> {
        let mut handle = self.create_handle(path, flags, lock, compression, opener)?;
        handle.initialize()?;
        info!("opened {path}");
        Ok(handle)
    }

    /// Settings from `opener` win over the configured defaults; the
    /// namenode setting replaces whatever authority the URL carries.
    fn resolve_endpoint(&self, path: &str, opener: Option<&dyn FileOpener>) -> Result<Endpoint> {
        let setting = |key: &str| opener.and_then(|o| o.setting(key));

        let mut endpoint = endpoint::resolve(path)?;
        endpoint.secure = self.config.secure;

        let namenode =
            setting(NAMENODE_URL_SETTING).or_else(|| self.config.namenode_url.clone());
        if let Some(namenode) = namenode {
            endpoint = endpoint.with_namenode(&namenode)?;
        }

        endpoint.proxy = setting(PROXY_SETTING)
            .or_else(|| self.config.proxy.clone())
            .filter(|p| {
                let p = p.trim();
                !p.is_empty() && p != NO_PROXY
            });

        endpoint.user = setting(USER_SETTING)
            .or_else(|| self.config.user.clone())
            .filter(|u| !u.is_empty());

        endpoint.auth_mode = match setting(AUTH_SETTING) {
            Some(mode) => AuthMode::parse(&mode)?,
            None => self.config.auth_mode,
        };

        if endpoint.namenode_authority.is_empty() {
            return Err(FsError::MalformedUrl(format!(
                "{path}: no namenode authority in URL or settings"
            )));
        }

        Ok(endpoint)
    }
}

impl Default for HdfsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for HdfsFileSystem {
    fn name(&self) -> &str {
        "HdfsFileSystem"
    }

    fn can_handle(&self, path: &str) -> bool {
        endpoint::can_handle(path)
    }

    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        lock: FileLockType,
        compression: FileCompressionType,
        opener: Option<&dyn FileOpener>,
    ) -> Result<Box<dyn File>> {
        let handle = self.open_handle(path, flags, lock, compression, opener)?;
        Ok(Box::new(handle))
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        match self.open_handle(
            path,
            OpenFlags::READ,
            FileLockType::None,
            FileCompressionType::Uncompressed,
            None,
        ) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
