//! `GETFILESTATUS` call and parsing of the WebHDFS status document.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;

use crate::core::{FsError, Result};
use crate::endpoint::Endpoint;
use crate::plug::{BlockingHttp, HttpResponse, RequestContext};

/// Remote file attributes, fetched once per handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteFileMetadata {
    pub length: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatusDocument {
    file_status: FileStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatus {
    length: u64,
    /// Milliseconds since the epoch.
    modification_time: i64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionDocument {
    remote_exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn fetch_metadata(
    transport: &dyn BlockingHttp,
    endpoint: &Endpoint,
    ctx: &RequestContext,
) -> Result<RemoteFileMetadata> {
    let url = endpoint.status_url()?;
    debug!("fetching status of {endpoint}");

    let response = transport.get(&url, None, ctx)?;
    interpret_status_response(endpoint, &response)
}

fn interpret_status_response(
    endpoint: &Endpoint,
    response: &HttpResponse,
) -> Result<RemoteFileMetadata> {
    if response.status == 404 {
        let detail = remote_message(&response.data).unwrap_or_else(|| endpoint.to_string());
        return Err(FsError::NotFound(detail));
    }

    if !response.is_success() {
        let detail = remote_message(&response.data).unwrap_or_default();
        warn!(
            "status request for {endpoint} failed with HTTP {}",
            response.status
        );
        return Err(FsError::RemoteRead(format!(
            "HTTP {} fetching status of {endpoint} {detail}",
            response.status
        )));
    }

    let doc: FileStatusDocument = serde_json::from_slice(&response.data).map_err(|e| {
        FsError::MalformedResponse(format!("status of {endpoint}: {e}"))
    })?;
    let status = doc.file_status;

    if status.kind.as_deref() == Some("DIRECTORY") {
        return Err(FsError::UnsupportedOperation(format!(
            "{endpoint} is a directory"
        )));
    }

    let last_modified = DateTime::<Utc>::from_timestamp_millis(status.modification_time)
        .ok_or_else(|| {
            FsError::MalformedResponse(format!(
                "status of {endpoint}: modificationTime {} out of range",
                status.modification_time
            ))
        })?;

    Ok(RemoteFileMetadata {
        length: status.length,
        last_modified,
    })
}

fn remote_message(body: &[u8]) -> Option<String> {
    let doc: RemoteExceptionDocument = serde_json::from_slice(body).ok()?;
    let ex = doc.remote_exception;
    match (ex.exception, ex.message) {
        (Some(name), Some(message)) => Some(format!("{name}: {message}")),
        (None, Some(message)) => Some(message),
        (Some(name), None) => Some(name),
        (None, None) => None,
    }
}
