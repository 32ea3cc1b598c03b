//! File download (optionally server-side converted to PDF) and chunked upload.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use spsync_core::{DriveItemRef, LibraryRef, Result, SyncError};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::graph::{GraphClient, RequestOptions};
use crate::transport::{encode_component, map_reqwest_error, Deadline};

/// Upload chunk size: 60 MiB (a multiple of 320 KiB as upload sessions require).
pub const UPLOAD_CHUNK_SIZE: u64 = 60 * 1024 * 1024;

/// Extensions the server can render as PDF.
pub const DEFAULT_PDF_EXTENSIONS: &[&str] = &[
    "csv", "doc", "docx", "odp", "ods", "odt", "pot", "potm", "potx", "pps", "ppsx", "ppsxm",
    "ppt", "pptm", "pptx", "rtf", "xls", "xlsx",
];

/// True when `file_name`'s extension is in `allow_list` (case-insensitive).
pub fn should_convert_to_pdf(file_name: &str, allow_list: &[String]) -> bool {
    let Some((stem, extension)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || extension.is_empty() {
        return false;
    }
    allow_list
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
}

/// Replace the extension of `file_name` with `.pdf`.
pub fn pdf_file_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.pdf"),
        _ => format!("{file_name}.pdf"),
    }
}

/// Unique local path in `work_dir` for an intermediate copy of `file_name`.
/// Only the final component of `file_name` is used.
pub fn work_file_path(work_dir: &Path, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    work_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), base))
}

/// Graph content resource for a drive item, optionally pinned to its version.
pub fn content_resource(item: &DriveItemRef, as_pdf: bool) -> String {
    let mut resource = format!("drives/{}/items/{}", item.drive_id, item.item_id);
    if let Some(version) = &item.version {
        resource.push_str(&format!("/versions/{version}"));
    }
    resource.push_str("/content");
    if as_pdf {
        resource.push_str("?format=pdf");
    }
    resource
}

/// Stream a drive item's content into `sink`. Returns the number of bytes written.
#[instrument(skip(graph, sink), level = "debug")]
pub async fn download<W>(
    graph: &GraphClient,
    item: &DriveItemRef,
    as_pdf: bool,
    sink: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let resource = content_resource(item, as_pdf);
    let mut stream = graph
        .request_stream(&resource, &RequestOptions::get())
        .await?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;

    debug!("Downloaded {} bytes from {}", written, resource);
    Ok(written)
}

/// Download into a local file. A partially written file is removed on failure.
pub async fn download_to_path(
    graph: &GraphClient,
    item: &DriveItemRef,
    as_pdf: bool,
    path: &Path,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    match download(graph, item, as_pdf, &mut file).await {
        Ok(written) => {
            info!("Saved {} bytes to {}", written, path.display());
            Ok(written)
        }
        Err(e) => {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!(
                    "Failed to remove partial download {}: {}",
                    path.display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(default)]
    pub expiration_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub size: u64,
    pub duration: Duration,
    /// The committed drive item returned by the final chunk.
    pub response: Value,
}

/// Upload a local file to a library via an upload session, replacing any
/// existing file with the same name.
pub async fn upload(
    graph: &GraphClient,
    library: &LibraryRef,
    local_file: &Path,
    destination_name: &str,
) -> Result<UploadOutcome> {
    upload_in_chunks(graph, library, local_file, destination_name, UPLOAD_CHUNK_SIZE).await
}

/// `upload` with an explicit chunk size.
///
/// Chunks are read from disk one at a time and PUT strictly in order with
/// `Content-Range: bytes {start}-{end}/{total}`.
#[instrument(skip(graph, library), level = "debug", fields(site = %library.site_id, list = %library.list_id))]
pub async fn upload_in_chunks(
    graph: &GraphClient,
    library: &LibraryRef,
    local_file: &Path,
    destination_name: &str,
    chunk_size: u64,
) -> Result<UploadOutcome> {
    if chunk_size == 0 {
        return Err(SyncError::InvalidInput("chunk size must be positive".into()));
    }
    let mut file = tokio::fs::File::open(local_file).await?;
    let total = file.metadata().await?.len();
    if total == 0 {
        return Err(SyncError::InvalidInput(format!(
            "{} is empty, upload sessions cannot commit zero bytes",
            local_file.display()
        )));
    }

    let resource = format!(
        "sites/{}/lists/{}/drive/items/root:/{}:/createUploadSession",
        library.site_id,
        library.list_id,
        encode_component(destination_name)
    );
    let body = json!({ "item": { "@microsoft.graph.conflictBehavior": "replace" } });
    let session: UploadSession =
        serde_json::from_value(graph.request(&resource, &RequestOptions::post(body)).await?)?;
    debug!(
        "Upload session for {} expires at {:?}",
        destination_name, session.expiration_date_time
    );

    let transport = graph.transport();
    let started = Instant::now();
    let mut start = 0u64;
    let mut response = Value::Null;

    while start < total {
        let len = chunk_size.min(total - start);
        let end = start + len - 1;
        let mut chunk = vec![0u8; len as usize];
        file.read_exact(&mut chunk).await?;

        debug!("Uploading bytes {}-{}/{}", start, end, total);
        let request = transport
            .client()
            .put(&session.upload_url)
            .header("Content-Range", format!("bytes {start}-{end}/{total}"))
            .body(chunk);
        let resp = transport.send(Deadline::Transfer, request).await?;

        let bytes = resp.bytes().await.map_err(map_reqwest_error)?;
        response = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        start += len;
    }

    let duration = started.elapsed();
    info!(
        "Uploaded {} ({} bytes) in {:.1} seconds",
        destination_name,
        total,
        duration.as_secs_f64()
    );
    Ok(UploadOutcome {
        size: total,
        duration,
        response,
    })
}
