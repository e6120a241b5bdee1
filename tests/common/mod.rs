#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hdfs_vfs::{BlockingHttp, ByteRange, FsError, HttpResponse, RequestContext, Result};
use serde_json::json;
use url::Url;

pub const MTIME_MS: i64 = 1_700_000_000_000;

/// One request seen by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    pub op: String,
    pub path: String,
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub proxy: Option<String>,
    pub user: Option<String>,
}

/// In-process WebHDFS gateway serving `GETFILESTATUS` and `OPEN`.
///
/// `OPEN` ranges come from either the `offset`/`length` query or the
/// `Range` header, whichever the client used.
#[derive(Default)]
pub struct MockGateway {
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Recorded>>,
    fail_reads: Mutex<bool>,
    status_override: Mutex<Option<u16>>,
    unreadable_by: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(Self::default())
    }

    pub fn with_file(self: &Arc<Self>, path: &str, bytes: Vec<u8>) -> Arc<Self> {
        self.files.lock().unwrap().insert(path.to_string(), bytes);
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads(&self) -> Vec<Recorded> {
        self.calls().into_iter().filter(|c| c.op == "OPEN").collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every `OPEN` fail at the network level.
    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    /// Refuse `OPEN` for `user` the way HDFS permissions do; status still works.
    pub fn deny_reads_for(&self, user: &str) {
        self.unreadable_by.lock().unwrap().push(user.to_string());
    }

    /// Answer every `OPEN` with this status and an empty body.
    pub fn read_status(&self, status: Option<u16>) {
        *self.status_override.lock().unwrap() = status;
    }
}

/// Deterministic, non-repeating-per-window test content.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 997) % 256) as u8).collect()
}

impl BlockingHttp for MockGateway {
    fn get(
        &self,
        url: &str,
        range: Option<ByteRange>,
        ctx: &RequestContext,
    ) -> Result<HttpResponse> {
        let url = Url::parse(url).map_err(|e| FsError::Transport(e.to_string()))?;
        let path = url
            .path()
            .strip_prefix("/webhdfs/v1")
            .unwrap_or(url.path())
            .to_string();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let op = query.get("op").cloned().unwrap_or_default();
        let user = query.get("user.name").cloned();

        let query_num = |key: &str| query.get(key).and_then(|v| v.parse::<u64>().ok());
        let (offset, length) = match range {
            Some(r) => (Some(r.offset), Some(r.length)),
            None => (query_num("offset"), query_num("length")),
        };

        self.calls.lock().unwrap().push(Recorded {
            op: op.clone(),
            path: path.clone(),
            offset,
            length,
            proxy: ctx.proxy.clone(),
            user: user.clone(),
        });

        let files = self.files.lock().unwrap();
        let Some(bytes) = files.get(&path) else {
            let body = json!({
                "RemoteException": {
                    "exception": "FileNotFoundException",
                    "javaClassName": "java.io.FileNotFoundException",
                    "message": format!("File does not exist: {path}"),
                }
            });
            return Ok(HttpResponse::new(body.to_string().into_bytes(), 404));
        };

        match op.as_str() {
            "GETFILESTATUS" => {
                let body = json!({
                    "FileStatus": {
                        "length": bytes.len(),
                        "modificationTime": MTIME_MS,
                        "type": "FILE",
                        "owner": "hdfs",
                        "permission": "644",
                    }
                });
                Ok(HttpResponse::new(body.to_string().into_bytes(), 200))
            }
            "OPEN" => {
                if *self.fail_reads.lock().unwrap() {
                    return Err(FsError::Transport("connection reset by peer".into()));
                }
                if let Some(user) = &user
                    && self.unreadable_by.lock().unwrap().contains(user)
                {
                    let body = json!({
                        "RemoteException": {
                            "exception": "AccessControlException",
                            "javaClassName": "org.apache.hadoop.security.AccessControlException",
                            "message": format!("Permission denied: user={user}, access=READ, inode=\"{path}\""),
                        }
                    });
                    return Ok(HttpResponse::new(body.to_string().into_bytes(), 403));
                }
                if let Some(status) = *self.status_override.lock().unwrap() {
                    return Ok(HttpResponse::new(Vec::new(), status));
                }

                let start = offset.unwrap_or(0) as usize;
                let end = match length {
                    Some(len) => (start + len as usize).min(bytes.len()),
                    None => bytes.len(),
                };
                let data = bytes[start.min(bytes.len())..end].to_vec();

                let status = if range.is_some() { 206 } else { 200 };
                let mut resp = HttpResponse::new(data, status);
                if range.is_some() && end > start {
                    resp = resp.with_header(
                        "Content-Range",
                        &format!("bytes {start}-{}/{}", end - 1, bytes.len()),
                    );
                }
                Ok(resp)
            }
            other => Ok(HttpResponse::new(
                format!("unsupported op {other}").into_bytes(),
                400,
            )),
        }
    }
}
