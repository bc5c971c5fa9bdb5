use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::SodbError;

pub const CHUNK_SIZE: usize = 8 * 1024;

/// Moves the bytes behind `url` to `destination`. Implementations must leave
/// `destination` untouched unless the whole payload arrived and verified.
pub trait Fetcher {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        expected_hash_prefix: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<(), SodbError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        expected_hash_prefix: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<(), SodbError> {
        (**self).fetch(url, destination, expected_hash_prefix, sink)
    }
}

pub fn http_client(timeout: Option<Duration>) -> Result<Client, SodbError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("sodb-client/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| SodbError::Download(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| SodbError::Download(err.to_string()))
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        expected_hash_prefix: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<(), SodbError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SodbError::Download(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(SodbError::DownloadStatus { status, message });
        }

        let total = response.content_length();
        sink.event(ProgressEvent::DownloadStarted {
            url: url.to_string(),
            total,
        });
        let written =
            download_to_path(response, total, destination, expected_hash_prefix, sink);
        sink.event(ProgressEvent::DownloadFinished);
        let written = written?;
        tracing::info!(%url, bytes = written, path = %destination, "download complete");
        Ok(())
    }
}

/// Streams `reader` into a temp file next to `destination` and renames it into
/// place once every chunk is on disk and the digest matches. Returns the number
/// of bytes published.
///
/// The temp file lives in the destination's directory so the final rename never
/// crosses a filesystem. It is removed on every error path.
pub fn download_to_path<R: Read>(
    mut reader: R,
    total: Option<u64>,
    destination: &Utf8Path,
    expected_hash_prefix: Option<&str>,
    sink: &dyn ProgressSink,
) -> Result<u64, SodbError> {
    let parent = match destination.parent() {
        Some(parent) if parent.as_str().is_empty() => Utf8Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(SodbError::Filesystem(format!(
                "invalid destination path: {destination}"
            )));
        }
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".sodb-download")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SodbError::Filesystem(err.to_string()))?;

    let mut hasher = expected_hash_prefix.map(|_| Sha256::new());
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(SodbError::Download(format!(
                    "transfer interrupted after {written} bytes: {err}"
                )));
            }
        };
        temp.write_all(&buffer[..read])
            .map_err(|err| SodbError::Filesystem(err.to_string()))?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&buffer[..read]);
        }
        written += read as u64;
        sink.event(ProgressEvent::DownloadAdvanced { bytes: read as u64 });
    }

    if let Some(total) = total
        && written != total
    {
        tracing::debug!(written, total, "declared content length differs from payload");
    }

    if let (Some(expected), Some(hasher)) = (expected_hash_prefix, hasher) {
        let actual = format!("{:x}", hasher.finalize());
        if !hash_matches(&actual, expected) {
            return Err(SodbError::Integrity {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    temp.as_file()
        .sync_all()
        .map_err(|err| SodbError::Filesystem(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| SodbError::Filesystem(err.to_string()))?;
    Ok(written)
}

fn hash_matches(actual: &str, expected_prefix: &str) -> bool {
    actual
        .get(..expected_prefix.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(expected_prefix))
        .unwrap_or(false)
}
