use libc::size_t;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;

use crate::{
    File, FileCompressionType, FileLockType, FileSystem, FsError, HdfsFileSystem,
    NAMENODE_URL_SETTING, OpenFlags, PROXY_SETTING,
};

#[repr(C)]
#[allow(non_camel_case_types)]
pub enum HdfsVfsErrorCode {
    HDFS_VFS_SUCCESS = 0,
    HDFS_VFS_MALFORMED_URL = 1,
    HDFS_VFS_UNSUPPORTED_OPERATION = 2,
    HDFS_VFS_NOT_INITIALIZED = 3,
    HDFS_VFS_NOT_FOUND = 4,
    HDFS_VFS_TRANSPORT = 5,
    HDFS_VFS_REMOTE_READ = 6,
    HDFS_VFS_MALFORMED_RESPONSE = 7,
    HDFS_VFS_SEEK_OUT_OF_RANGE = 8,
    HDFS_VFS_IO = 9,
    HDFS_VFS_FILE_CLOSED = 10,
    HDFS_VFS_INVALID_ARGUMENT = 11,
    HDFS_VFS_UNKNOWN = 99,
}

impl From<&FsError> for HdfsVfsErrorCode {
    fn from(err: &FsError) -> Self {
        match err {
            FsError::MalformedUrl(_) => HdfsVfsErrorCode::HDFS_VFS_MALFORMED_URL,
            FsError::UnsupportedOperation(_) => HdfsVfsErrorCode::HDFS_VFS_UNSUPPORTED_OPERATION,
            FsError::NotInitialized => HdfsVfsErrorCode::HDFS_VFS_NOT_INITIALIZED,
            FsError::NotFound(_) => HdfsVfsErrorCode::HDFS_VFS_NOT_FOUND,
            FsError::Transport(_) => HdfsVfsErrorCode::HDFS_VFS_TRANSPORT,
            FsError::RemoteRead(_) => HdfsVfsErrorCode::HDFS_VFS_REMOTE_READ,
            FsError::MalformedResponse(_) => HdfsVfsErrorCode::HDFS_VFS_MALFORMED_RESPONSE,
            FsError::SeekOutOfRange { .. } => HdfsVfsErrorCode::HDFS_VFS_SEEK_OUT_OF_RANGE,
            FsError::Io(_) => HdfsVfsErrorCode::HDFS_VFS_IO,
            FsError::FileClosed => HdfsVfsErrorCode::HDFS_VFS_FILE_CLOSED,
        }
    }
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>>  = const { std::cell::RefCell::new(None) };
}

fn set_last_error(err: &FsError) {
    let error_msg = CString::new(err.to_string().replace('\0', " "))
        .unwrap_or_else(|_| CString::from(c"Failed to format error message"));
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(error_msg);
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

fn invalid_argument(msg: &str) -> FsError {
    FsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg.to_string()))
}

/// Borrow a required C string, recording an error if it is null or not UTF-8.
///
/// # Safety
/// >> s must be NULL or a valid null-terminated C string
unsafe fn required_str<'a>(s: *const c_char, what: &str) -> Option<&'a str> {
    if s.is_null() {
        set_last_error(&invalid_argument(&format!("{what} is null")));
        return None;
    }

    match unsafe { CStr::from_ptr(s) }.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error(&invalid_argument(&format!("Invalid UTF-8 in {what}")));
            None
        }
    }
}

/// Borrow an optional C string; NULL means "not set".
///
/// # Safety
/// >> s must be NULL or a valid null-terminated C string
unsafe fn optional_str<'a>(s: *const c_char, what: &str) -> Result<Option<&'a str>, ()> {
    if s.is_null() {
        return Ok(None);
    }
    unsafe { required_str(s, what) }.map(Some).ok_or(())
}

/// Opaque filesystem handle
pub struct HdfsVfsFilesystem {
    inner: HdfsFileSystem,
}

/// Opaque file handle
pub struct HdfsVfsFile {
    inner: Box<dyn File>,
}

/// Get the last error message for this thread
/// Returns NULL if no error
/// The returned string is valid until the next hdfs_vfs call on this thread
#[unsafe(no_mangle)]
pub extern "C" fn hdfs_vfs_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Create a filesystem with default configuration
/// Caller must free the returned pointer with hdfs_vfs_filesystem_free()
#[unsafe(no_mangle)]
pub extern "C" fn hdfs_vfs_create() -> *mut HdfsVfsFilesystem {
    clear_last_error();
    Box::into_raw(Box::new(HdfsVfsFilesystem {
        inner: HdfsFileSystem::new(),
    }))
}

/// Returns 1 if path uses a scheme this library handles, 0 otherwise
///
/// # Safety
/// >> path must be NULL or a valid null-terminated C string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_can_handle(path: *const c_char) -> c_int {
    clear_last_error();
    match unsafe { required_str(path, "path") } {
        Some(path) if crate::endpoint::can_handle(path) => 1,
        _ => 0,
    }
}

/// Open a file for reading
/// Returns NULL on error
///
/// # Safety
/// >> fs must be a valid filesystem handle
/// >> path and mode must be valid null-terminated C strings
/// >> Caller must free the returned pointer with hdfs_vfs_file_close()
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_open(
    fs: *mut HdfsVfsFilesystem,
    path: *const c_char,
    mode: *const c_char,
) -> *mut HdfsVfsFile {
    unsafe { hdfs_vfs_open_with_settings(fs, path, mode, ptr::null(), ptr::null()) }
}

/// Open a file for reading with per-open settings
/// namenode_url and proxy may be NULL to use the filesystem defaults
/// Returns NULL on error
///
/// # Safety
/// >> fs must be a valid filesystem handle
/// >> path and mode must be valid null-terminated C strings
/// >> namenode_url and proxy must be NULL or valid null-terminated C strings
/// >> Caller must free the returned pointer with hdfs_vfs_file_close()
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_open_with_settings(
    fs: *mut HdfsVfsFilesystem,
    path: *const c_char,
    mode: *const c_char,
    namenode_url: *const c_char,
    proxy: *const c_char,
) -> *mut HdfsVfsFile {
    clear_last_error();

    if fs.is_null() {
        set_last_error(&invalid_argument("Null filesystem pointer"));
        return ptr::null_mut();
    }

    let fs_ref = unsafe { &*fs };

    let (Some(path_str), Some(mode_str)) = (unsafe { required_str(path, "path") }, unsafe {
        required_str(mode, "mode")
    }) else {
        return ptr::null_mut();
    };

    let (Ok(namenode), Ok(proxy)) = (
        unsafe { optional_str(namenode_url, "namenode_url") },
        unsafe { optional_str(proxy, "proxy") },
    ) else {
        return ptr::null_mut();
    };

    let mut settings = std::collections::HashMap::new();
    if let Some(namenode) = namenode {
        settings.insert(NAMENODE_URL_SETTING.to_string(), namenode.to_string());
    }
    if let Some(proxy) = proxy {
        settings.insert(PROXY_SETTING.to_string(), proxy.to_string());
    }

    let result = OpenFlags::from_mode(mode_str).and_then(|flags| {
        fs_ref.inner.open_file(
            path_str,
            flags,
            FileLockType::None,
            FileCompressionType::Uncompressed,
            Some(&settings),
        )
    });

    match result {
        Ok(file) => Box::into_raw(Box::new(HdfsVfsFile { inner: file })),
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

/// Open a file directly without creating a filesystem handle
/// Returns NULL on error
///
/// # Safety
/// >> url and mode must be valid null-terminated C strings
/// >> Caller must free the returned pointer with hdfs_vfs_file_close()
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_open_url(
    url: *const c_char,
    mode: *const c_char,
) -> *mut HdfsVfsFile {
    clear_last_error();

    let (Some(url_str), Some(mode_str)) = (unsafe { required_str(url, "URL") }, unsafe {
        required_str(mode, "mode")
    }) else {
        return ptr::null_mut();
    };

    match crate::open(url_str, mode_str) {
        Ok(file) => Box::into_raw(Box::new(HdfsVfsFile { inner: file })),
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

/// Read up to size bytes at the cursor into buffer
/// Returns number of bytes read, or -1 on error
///
/// # Safety
/// >> file must be a valid file handle
/// >> buffer must be valid for writes of at least size bytes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_read(
    file: *mut HdfsVfsFile,
    buffer: *mut c_void,
    size: size_t,
) -> isize {
    clear_last_error();

    if file.is_null() || buffer.is_null() {
        set_last_error(&invalid_argument("Null pointer argument"));
        return -1;
    }

    let file_ref = unsafe { &mut *file };
    let buf = unsafe { slice::from_raw_parts_mut(buffer as *mut u8, size) };

    match file_ref.inner.read(buf) {
        Ok(n) => n as isize,
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Read up to size bytes starting at location into buffer
/// Moves the cursor to location plus the bytes read
/// Returns number of bytes read, or -1 on error
///
/// # Safety
/// >> file must be a valid file handle
/// >> buffer must be valid for writes of at least size bytes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_read_at(
    file: *mut HdfsVfsFile,
    buffer: *mut c_void,
    size: size_t,
    location: u64,
) -> isize {
    clear_last_error();

    if file.is_null() || buffer.is_null() {
        set_last_error(&invalid_argument("Null pointer argument"));
        return -1;
    }

    let file_ref = unsafe { &mut *file };
    let buf = unsafe { slice::from_raw_parts_mut(buffer as *mut u8, size) };

    match file_ref.inner.read_at(buf, location) {
        Ok(n) => n as isize,
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Seek to absolute position in file
/// Returns 0 on success, error code on failure
///
/// # Safety
/// >> file must be a valid file handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_seek(file: *mut HdfsVfsFile, pos: u64) -> c_int {
    clear_last_error();

    if file.is_null() {
        set_last_error(&invalid_argument("Null file pointer"));
        return HdfsVfsErrorCode::HDFS_VFS_INVALID_ARGUMENT as c_int;
    }

    let file_ref = unsafe { &mut *file };

    match file_ref.inner.seek(pos) {
        Ok(_) => HdfsVfsErrorCode::HDFS_VFS_SUCCESS as c_int,
        Err(e) => {
            let code = HdfsVfsErrorCode::from(&e);
            set_last_error(&e);
            code as c_int
        }
    }
}

/// Get current position in file
/// Returns current position, or 0 if file is invalid
///
/// # Safety
/// >> file must be a valid file handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_tell(file: *const HdfsVfsFile) -> u64 {
    clear_last_error();

    if file.is_null() {
        set_last_error(&invalid_argument("Null file pointer"));
        return 0;
    }

    let file_ref = unsafe { &*file };
    file_ref.inner.tell()
}

/// Get file size
/// Returns size, or 0 if not available
/// Sets has_size to 1 if size is available, 0 otherwise
///
/// # Safety
/// >> file must be a valid file handle
/// >> has_size must be valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_size(file: *const HdfsVfsFile, has_size: *mut c_int) -> u64 {
    clear_last_error();

    if file.is_null() || has_size.is_null() {
        if !has_size.is_null() {
            unsafe { *has_size = 0 };
        }
        set_last_error(&invalid_argument("Null pointer argument"));
        return 0;
    }

    let file_ref = unsafe { &*file };

    match file_ref.inner.size() {
        Ok(size) => {
            unsafe { *has_size = 1 };
            size
        }
        Err(e) => {
            unsafe { *has_size = 0 };
            set_last_error(&e);
            0
        }
    }
}

/// Get the remote modification time in seconds since the Unix epoch
/// Returns -1 if not available
///
/// # Safety
/// >> file must be a valid file handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_last_modified(file: *const HdfsVfsFile) -> i64 {
    clear_last_error();

    if file.is_null() {
        set_last_error(&invalid_argument("Null file pointer"));
        return -1;
    }

    let file_ref = unsafe { &*file };
    match file_ref.inner.last_modified() {
        Ok(t) => t.timestamp(),
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Check if at end of file
/// Returns 1 if EOF, 0 otherwise
///
/// # Safety
/// >> file must be a valid file handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_eof(file: *const HdfsVfsFile) -> c_int {
    clear_last_error();

    if file.is_null() {
        return 0;
    }

    let file_ref = unsafe { &*file };
    if file_ref.inner.eof() { 1 } else { 0 }
}

/// Close a file and free its resources
///
/// # Safety
/// >> file must be a valid file handle or NULL
/// >> file must not be used after this call
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_file_close(file: *mut HdfsVfsFile) {
    if !file.is_null() {
        let mut file_box = unsafe { Box::from_raw(file) };
        file_box.inner.close();
    }
}

/// Free a filesystem handle
///
/// # Safety
/// >> fs must be a valid filesystem handle or NULL
/// >> fs must not be used after this call
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdfs_vfs_filesystem_free(fs: *mut HdfsVfsFilesystem) {
    if !fs.is_null() {
        let _ = unsafe { Box::from_raw(fs) };
    }
}

/// Get library version string
/// Returns pointer to static version string
#[unsafe(no_mangle)]
pub extern "C" fn hdfs_vfs_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
