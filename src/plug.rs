use crate::core::{FsError, Result};
use crate::endpoint::AuthMode;
use crate::hdfs::HdfsConfig;
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;
use std::time::Duration;

/// Inclusive-exclusive byte span `[offset, offset + length)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Value for an HTTP `Range` header. `length` must be non-zero.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.offset, self.offset + self.length - 1)
    }
}

/// Per-handle settings applied to every request it issues.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub proxy: Option<String>,
    pub auth: AuthMode,
}

#[derive(Debug)]
pub struct HttpResponse {
    pub data: Vec<u8>,
    pub status: u16,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(data: Vec<u8>, status: u16) -> Self {
        Self {
            data,
            status,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.parse::<u64>().ok())
    }

    pub fn content_range(&self) -> Option<(u64, u64)> {
        self.header("content-range").and_then(parse_content_range)
    }
}

/// Blocking transport: one GET per call, no retries.
///
/// Non-2xx statuses come back as `Ok` so callers can interpret them;
/// only network-level failures are `FsError::Transport`.
pub trait BlockingHttp: Send + Sync {
    fn get(&self, url: &str, range: Option<ByteRange>, ctx: &RequestContext)
    -> Result<HttpResponse>;
}

#[cfg(all(not(feature = "reqwest"), not(feature = "curl")))]
compile_error!("Enable either `curl` (default) or `reqwest` feature.");

pub(crate) fn build_default_transport(config: &HdfsConfig) -> Arc<dyn BlockingHttp> {
    #[cfg(feature = "reqwest")]
    {
        Arc::new(ReqwestBlockingTransport::new(config))
    }
    #[cfg(all(not(feature = "reqwest"), feature = "curl"))]
    {
        Arc::new(CurlBlockingTransport::new(config))
    }
}

fn parse_content_range(header: &str) -> Option<(u64, u64)> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "bytes" {
        return None;
    }

    let range_part = parts[1].split('/').next()?;
    let mut range_iter = range_part.split('-');

    let start = range_iter.next()?.parse::<u64>().ok()?;
    let end = range_iter.next()?.parse::<u64>().ok()?;

    Some((start, end))
}

#[cfg(feature = "reqwest")]
struct ReqwestBlockingTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
    idle_timeout: Duration,
    clients: dashmap::DashMap<Option<String>, reqwest::blocking::Client>,
}

#[cfg(feature = "reqwest")]
impl ReqwestBlockingTransport {
    fn new(config: &HdfsConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            idle_timeout: config.idle_timeout,
            clients: dashmap::DashMap::new(),
        }
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::blocking::Client> {
        let key = proxy.map(str::to_string);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::blocking::Client::builder()
            .timeout(self.read_timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.idle_timeout);

        builder = match proxy {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| FsError::Transport(format!("invalid proxy {proxy}: {e}")))?,
            ),
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| FsError::Transport(e.to_string()))?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

#[cfg(feature = "reqwest")]
impl BlockingHttp for ReqwestBlockingTransport {
    fn get(
        &self,
        url: &str,
        range: Option<ByteRange>,
        ctx: &RequestContext,
    ) -> Result<HttpResponse> {
        if ctx.auth == AuthMode::Negotiate {
            return Err(FsError::UnsupportedOperation(
                "negotiate authentication requires the curl transport".into(),
            ));
        }

        let client = self.client(ctx.proxy.as_deref())?;
        let mut request = client.get(url);
        if let Some(range) = range {
            request = request.header("Range", range.header_value());
        }

        let response = request
            .send()
            .map_err(|e| FsError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let data = response
            .bytes()
            .map_err(|e| FsError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            data,
            status,
            headers,
        })
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
struct CurlBlockingTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl CurlBlockingTransport {
    fn new(config: &HdfsConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl BlockingHttp for CurlBlockingTransport {
    fn get(
        &self,
        url: &str,
        range: Option<ByteRange>,
        ctx: &RequestContext,
    ) -> Result<HttpResponse> {
        let net = |e: curl::Error| FsError::Transport(e.to_string());

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(net)?;
        easy.connect_timeout(self.connect_timeout).map_err(net)?;
        // stall timeout, not a cap on the whole transfer
        easy.low_speed_limit(1).map_err(net)?;
        easy.low_speed_time(self.read_timeout).map_err(net)?;
        // namenode answers OPEN with a redirect to a datanode
        easy.follow_location(true).map_err(net)?;

        match ctx.proxy.as_deref() {
            Some(proxy) => easy.proxy(proxy).map_err(net)?,
            None => easy.noproxy("*").map_err(net)?,
        }

        if ctx.auth == AuthMode::Negotiate {
            let mut auth = curl::easy::Auth::new();
            auth.gssnegotiate(true);
            easy.http_auth(&auth).map_err(net)?;
            easy.unrestricted_auth(true).map_err(net)?;
        }

        if let Some(range) = range {
            easy.range(&format!(
                "{}-{}",
                range.offset,
                range.offset + range.length - 1
            ))
            .map_err(net)?;
        }

        let mut data = Vec::new();
        let mut headers = HashMap::<String, String>::new();

        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|chunk| {
                    data.extend_from_slice(chunk);
                    Ok(chunk.len())
                })
                .map_err(net)?;

            transfer
                .header_function(|header| {
                    if let Ok(line) = std::str::from_utf8(header) {
                        let line = line.trim();
                        if line.starts_with("HTTP/") {
                            // a redirect hop starts a new header block
                            headers.clear();
                        } else if let Some((name, value)) = line.split_once(':') {
                            headers.insert(name.trim().to_ascii_lowercase(), value.trim().into());
                        }
                    }
                    true
                })
                .map_err(net)?;

            transfer.perform().map_err(net)?;
        }

        let status = easy.response_code().map_err(net)? as u16;

        Ok(HttpResponse {
            data,
            status,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_parsing() {
        assert_eq!(parse_content_range("bytes 0-99/1000"), Some((0, 99)));
        assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, 9)));
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes"), None);
    }

    #[test]
    fn response_headers_are_case_insensitive() {
        let resp = HttpResponse::new(vec![0; 4], 206)
            .with_header("Content-Length", "4")
            .with_header("Content-Range", "bytes 10-13/100");
        assert!(resp.is_success());
        assert_eq!(resp.content_length(), Some(4));
        assert_eq!(resp.content_range(), Some((10, 13)));
        assert_eq!(resp.header("CONTENT-LENGTH"), Some("4"));
    }

    #[test]
    fn range_header_is_inclusive() {
        assert_eq!(ByteRange::new(0, 1_000_000).header_value(), "bytes=0-999999");
        assert_eq!(ByteRange::new(7, 1).header_value(), "bytes=7-7");
    }
}
