//! URL resolution for `hdfs://` and `webhdfs://` paths.
//!
//! Resolution is purely syntactic. The gateway URLs built here point at the
//! WebHDFS REST surface (`/webhdfs/v1/<path>?op=...`).

use std::fmt;

use url::Url;

use crate::core::{FsError, Result};
use crate::plug::RequestContext;

const WEBHDFS_PREFIX: &str = "/webhdfs/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Hdfs,
    WebHdfs,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Hdfs, Scheme::WebHdfs];

    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Hdfs => "hdfs://",
            Scheme::WebHdfs => "webhdfs://",
        }
    }

    /// Case-sensitive literal prefix match.
    pub fn of(path: &str) -> Option<Scheme> {
        Self::ALL.into_iter().find(|s| path.starts_with(s.prefix()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
    #[default]
    None,
    /// SPNEGO / Kerberos negotiate.
    Negotiate,
}

impl AuthMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthMode::None),
            "negotiate" | "kerberos" | "spnego" => Ok(AuthMode::Negotiate),
            other => Err(FsError::UnsupportedOperation(format!(
                "unknown authentication mode '{other}'"
            ))),
        }
    }
}

pub fn can_handle(path: &str) -> bool {
    Scheme::of(path).is_some()
}

/// A resolved remote file location plus the request settings bound to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    /// `host[:port]` of the gateway. May be empty until an override is applied.
    pub namenode_authority: String,
    /// Absolute, percent-encoded path on the remote filesystem.
    pub remote_path: String,
    pub proxy: Option<String>,
    pub auth_mode: AuthMode,
    /// Talk to the gateway over https.
    pub secure: bool,
    pub user: Option<String>,
}

/// Split `url` into scheme, authority and path. No network I/O.
pub fn resolve(url: &str) -> Result<Endpoint> {
    let scheme = Scheme::of(url).ok_or_else(|| FsError::MalformedUrl(url.to_string()))?;

    let parsed = Url::parse(url).map_err(|e| FsError::MalformedUrl(format!("{url}: {e}")))?;

    let host = parsed.host_str().unwrap_or_default();
    let namenode_authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let remote_path = parsed.path();
    if remote_path.is_empty() || remote_path == "/" {
        return Err(FsError::MalformedUrl(format!("{url}: no file path")));
    }

    Ok(Endpoint {
        scheme,
        namenode_authority,
        remote_path: remote_path.to_string(),
        proxy: None,
        auth_mode: AuthMode::None,
        secure: false,
        user: None,
    })
}

impl Endpoint {
    /// Replace the authority with `namenode`, given either as `host:port` or
    /// as an `http(s)://host:port` URL.
    pub fn with_namenode(mut self, namenode: &str) -> Result<Self> {
        let namenode = namenode.trim().trim_end_matches('/');
        if namenode.is_empty() {
            return Ok(self);
        }

        if namenode.contains("://") {
            let parsed = Url::parse(namenode)
                .map_err(|e| FsError::MalformedUrl(format!("{namenode}: {e}")))?;
            let host = parsed
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| FsError::MalformedUrl(format!("{namenode}: no host")))?;
            self.namenode_authority = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            self.secure = parsed.scheme() == "https";
        } else {
            self.namenode_authority = namenode.to_string();
        }
        Ok(self)
    }

    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            proxy: self.proxy.clone(),
            auth: self.auth_mode,
        }
    }

    /// URL of the `GETFILESTATUS` call for this file.
    pub fn status_url(&self) -> Result<String> {
        let mut url = self.gateway_url()?;
        url.query_pairs_mut().append_pair("op", "GETFILESTATUS");
        self.append_user(&mut url);
        Ok(url.into())
    }

    /// URL of the `OPEN` call. With `span` set, the byte range travels as
    /// `offset`/`length` query parameters.
    pub fn open_url(&self, span: Option<(u64, u64)>) -> Result<String> {
        let mut url = self.gateway_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", "OPEN");
            if let Some((offset, length)) = span {
                query
                    .append_pair("offset", &offset.to_string())
                    .append_pair("length", &length.to_string());
            }
        }
        self.append_user(&mut url);
        Ok(url.into())
    }

    fn gateway_url(&self) -> Result<Url> {
        if self.namenode_authority.is_empty() {
            return Err(FsError::MalformedUrl(format!(
                "{}{}: no namenode authority in URL or settings",
                self.scheme.prefix(),
                self.remote_path
            )));
        }

        let http = if self.secure { "https" } else { "http" };
        let mut url = Url::parse(&format!("{http}://{}", self.namenode_authority))
            .map_err(|e| FsError::MalformedUrl(format!("{}: {e}", self.namenode_authority)))?;
        url.set_path(&format!("{WEBHDFS_PREFIX}{}", self.remote_path));
        Ok(url)
    }

    fn append_user(&self, url: &mut Url) {
        if let Some(user) = &self.user {
            url.query_pairs_mut().append_pair("user.name", user);
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.scheme.prefix(),
            self.namenode_authority,
            self.remote_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_matching() {
        assert!(can_handle("hdfs://host/path"));
        assert!(can_handle("webhdfs://host/path"));
        assert!(!can_handle("file:///etc/passwd"));
        assert!(!can_handle("HDFS://host/path"));
        assert!(!can_handle("/data/local.parquet"));
    }

    #[test]
    fn resolves_authority_and_path() {
        let ep = resolve("hdfs://namenode:9870/warehouse/t/part-0.parquet").unwrap();
        assert_eq!(ep.scheme, Scheme::Hdfs);
        assert_eq!(ep.namenode_authority, "namenode:9870");
        assert_eq!(ep.remote_path, "/warehouse/t/part-0.parquet");

        let ep = resolve("webhdfs://gw/a.csv").unwrap();
        assert_eq!(ep.scheme, Scheme::WebHdfs);
        assert_eq!(ep.namenode_authority, "gw");
    }

    #[test]
    fn rejects_unknown_schemes_and_missing_paths() {
        assert!(matches!(resolve("s3://b/k"), Err(FsError::MalformedUrl(_))));
        assert!(matches!(resolve("data/x.csv"), Err(FsError::MalformedUrl(_))));
        assert!(matches!(resolve("hdfs://nn"), Err(FsError::MalformedUrl(_))));
        assert!(matches!(resolve("hdfs://nn/"), Err(FsError::MalformedUrl(_))));
    }

    #[test]
    fn namenode_override() {
        let ep = resolve("hdfs://ignored:1/f").unwrap();

        let plain = ep.clone().with_namenode("nn.example:9870").unwrap();
        assert_eq!(plain.namenode_authority, "nn.example:9870");
        assert!(!plain.secure);

        let tls = ep.with_namenode("https://nn.example:9871/").unwrap();
        assert_eq!(tls.namenode_authority, "nn.example:9871");
        assert!(tls.secure);
    }

    #[test]
    fn builds_gateway_urls() {
        let mut ep = resolve("hdfs://nn:9870/dir/my file.csv").unwrap();
        assert_eq!(
            ep.status_url().unwrap(),
            "http://nn:9870/webhdfs/v1/dir/my%20file.csv?op=GETFILESTATUS"
        );
        assert_eq!(
            ep.open_url(Some((10, 20))).unwrap(),
            "http://nn:9870/webhdfs/v1/dir/my%20file.csv?op=OPEN&offset=10&length=20"
        );

        ep.user = Some("etl".into());
        assert_eq!(
            ep.open_url(None).unwrap(),
            "http://nn:9870/webhdfs/v1/dir/my%20file.csv?op=OPEN&user.name=etl"
        );
    }

    #[test]
    fn empty_authority_needs_override() {
        let ep = resolve("hdfs:///data/f.parquet").unwrap();
        assert!(ep.namenode_authority.is_empty());
        assert!(matches!(ep.status_url(), Err(FsError::MalformedUrl(_))));

        let ep = ep.with_namenode("nn:9870").unwrap();
        assert!(ep.status_url().unwrap().starts_with("http://nn:9870/webhdfs/v1/data/f.parquet"));
    }

    #[test]
    fn auth_modes() {
        assert_eq!(AuthMode::parse("none").unwrap(), AuthMode::None);
        assert_eq!(AuthMode::parse("Negotiate").unwrap(), AuthMode::Negotiate);
        assert!(AuthMode::parse("basic").is_err());
    }
}
