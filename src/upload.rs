//! File upload with progress reporting.
//!
//! The orchestrator only submits the file. The returned job id is handed to
//! the poller; server-side processing progress is invisible until then.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Phase of an upload as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    /// Bytes are still being sent.
    Uploading,
    /// All bytes sent; the server is processing.
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
    /// 0 to 100; reaches 100 only when `sent == total`.
    pub percent: u8,
    pub phase: UploadPhase,
}

/// Derives progress from transferred bytes.
///
/// Non-decreasing: a lower byte count (e.g. a replayed request restarting
/// its body) never moves progress backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    sent: u64,
    last_reported: Option<(u8, UploadPhase)>,
}

impl ProgressTracker {
    /// Tracker for an upload of `total` bytes.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            sent: 0,
            last_reported: None,
        }
    }

    /// Progress at the current byte count.
    #[must_use]
    pub fn snapshot(&self) -> UploadProgress {
        let percent = if self.total == 0 {
            100
        } else {
            // Floor, so 100 only when every byte is sent.
            (self.sent.saturating_mul(100) / self.total) as u8
        };
        let phase = if self.sent >= self.total {
            UploadPhase::Processing
        } else {
            UploadPhase::Uploading
        };
        UploadProgress {
            sent: self.sent,
            total: self.total,
            percent,
            phase,
        }
    }

    /// Record `sent` bytes; returns progress if percent or phase changed.
    pub fn observe(&mut self, sent: u64) -> Option<UploadProgress> {
        self.sent = self.sent.max(sent.min(self.total));
        let progress = self.snapshot();
        let key = (progress.percent, progress.phase);
        if self.last_reported == Some(key) {
            return None;
        }
        self.last_reported = Some(key);
        Some(progress)
    }
}

/// Optional parsing configuration sent alongside the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadConfig {
    /// Source column → target field.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub column_mapping: BTreeMap<String, String>,
    /// Additional parser options passed through verbatim.
    #[serde(flatten)]
    pub options: JsonMap<String, JsonValue>,
}

impl UploadConfig {
    /// Empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a source column to a target field.
    #[must_use]
    pub fn map_column(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.column_mapping.insert(source.into(), target.into());
        self
    }

    /// Pass a parser option through verbatim.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Content type guessed from the file extension.
#[must_use]
pub fn guess_mime(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(feature = "http")]
pub use self::http::UploadFile;

#[cfg(feature = "http")]
mod http {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::stream;
    use reqwest::Body;
    use reqwest::multipart::{Form, Part};

    use super::{ProgressTracker, UploadConfig, UploadProgress, guess_mime};
    use crate::error::Error;
    use crate::transport::ApiClient;
    use crate::types::UploadReceipt;

    const CHUNK_SIZE: usize = 64 * 1024;

    /// A file held in memory for upload.
    #[derive(Debug, Clone)]
    pub struct UploadFile {
        name: String,
        content: Bytes,
        mime: Option<String>,
    }

    impl UploadFile {
        /// File named `name` holding `content`.
        #[must_use]
        pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
            Self {
                name: name.into(),
                content: content.into(),
                mime: None,
            }
        }

        /// Read a file from disk.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Storage`] if the file cannot be read.
        pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
            let path = path.as_ref();
            let content = tokio::fs::read(path)
                .await
                .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".into());
            Ok(Self::new(name, content))
        }

        /// Override the content type guessed from the extension.
        #[must_use]
        pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
            self.mime = Some(mime.into());
            self
        }

        /// File name sent in the multipart part.
        #[must_use]
        pub fn name(&self) -> &str {
            &self.name
        }

        /// Size in bytes.
        #[must_use]
        pub fn len(&self) -> u64 {
            self.content.len() as u64
        }

        /// Whether the file has no content.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.content.is_empty()
        }

        /// Content type, explicit or guessed from the extension.
        #[must_use]
        pub fn mime(&self) -> &str {
            self.mime.as_deref().unwrap_or_else(|| guess_mime(&self.name))
        }
    }

    type Reporter = Arc<Mutex<(ProgressTracker, Box<dyn FnMut(UploadProgress) + Send>)>>;

    /// Body that reports progress as chunks are handed to the connection.
    fn progress_body(content: Bytes, reporter: Option<Reporter>) -> Body {
        let Some(reporter) = reporter else {
            return Body::from(content);
        };
        let total = content.len();
        let chunks: Vec<Bytes> = (0..total)
            .step_by(CHUNK_SIZE)
            .map(|start| content.slice(start..(start + CHUNK_SIZE).min(total)))
            .collect();

        let mut sent = 0u64;
        let stream = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Ok(mut guard) = reporter.lock() {
                let (tracker, callback) = &mut *guard;
                if let Some(progress) = tracker.observe(sent) {
                    callback(progress);
                }
            }
            Ok::<_, std::io::Error>(chunk)
        }));
        Body::wrap_stream(stream)
    }

    impl ApiClient {
        /// Upload a file, optionally with a parsing config, and return the
        /// job the server created for it.
        ///
        /// `on_progress` is called whenever the percentage or phase changes;
        /// the final call has `percent == 100` and phase `Processing`.
        ///
        /// # Errors
        ///
        /// [`Error::Validation`] for an empty file or one over the configured
        /// ceiling; nothing is sent and a `ValidationError` notification is
        /// applied. Otherwise the transport's classified errors, unchanged.
        pub async fn upload<P>(
            &self,
            file: UploadFile,
            on_progress: Option<P>,
            config: Option<&UploadConfig>,
        ) -> Result<UploadReceipt, Error>
        where
            P: FnMut(UploadProgress) + Send + 'static,
        {
            if file.is_empty() {
                return Err(self.reject_locally(format!("{} is empty", file.name())));
            }
            if let Some(limit) = self.config().max_upload_bytes() {
                if file.len() > limit {
                    return Err(self.reject_locally(format!(
                        "{} is {} bytes; the limit for your plan is {limit} bytes",
                        file.name(),
                        file.len()
                    )));
                }
            }

            let config_json = config.map(serde_json::to_string).transpose()?;
            let url = self.config().endpoint("upload")?;
            let timeout = self.config().upload_timeout();
            let mime = file.mime().to_string();
            let reporter: Option<Reporter> = on_progress.map(|callback| {
                let callback: Box<dyn FnMut(UploadProgress) + Send> = Box::new(callback);
                Arc::new(Mutex::new((ProgressTracker::new(file.len()), callback)))
            });

            tracing::info!(filename = %file.name(), size = file.len(), "Uploading file");

            let result = self
                .send(|http| {
                    let body = progress_body(file.content.clone(), reporter.clone());
                    let part = Part::stream_with_length(body, file.len())
                        .file_name(file.name.clone())
                        .mime_str(&mime)?;
                    let mut form = Form::new().part("file", part);
                    if let Some(json) = &config_json {
                        form = form.part(
                            "config",
                            Part::text(json.clone()).mime_str("application/json")?,
                        );
                    }
                    Ok(http.post(url.clone()).timeout(timeout).multipart(form))
                })
                .await;

            let receipt = match result {
                Ok(response) => self.decode::<UploadReceipt>(response).await,
                Err(e) => Err(e),
            };

            match &receipt {
                Ok(receipt) => tracing::info!(
                    filename = %file.name(),
                    job_id = %receipt.job_id,
                    "Upload accepted"
                ),
                Err(e) => tracing::warn!(
                    filename = %file.name(),
                    size = file.len(),
                    error = %e,
                    "Upload failed"
                ),
            }
            receipt
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn upload_file_from_bytes() {
            let file = UploadFile::new("orders.CSV", b"a,b\n1,2\n".to_vec());
            assert_eq!(file.len(), 8);
            assert!(!file.is_empty());
            assert_eq!(file.mime(), "text/csv");
            assert_eq!(file.clone().with_mime("text/plain").mime(), "text/plain");
        }

        #[tokio::test]
        async fn upload_file_from_path() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("report.xlsx");
            std::fs::write(&path, b"PK\x03\x04").unwrap();
            let file = UploadFile::from_path(&path).await.unwrap();
            assert_eq!(file.name(), "report.xlsx");
            assert_eq!(file.len(), 4);
        }

        #[tokio::test]
        async fn missing_path_is_storage_error() {
            let result = UploadFile::from_path("/definitely/not/here.csv").await;
            assert!(matches!(result, Err(Error::Storage(_))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_reaches_100_only_at_total() {
        let mut tracker = ProgressTracker::new(1000);
        let p = tracker.observe(999).unwrap();
        assert_eq!(p.percent, 99);
        assert_eq!(p.phase, UploadPhase::Uploading);

        let p = tracker.observe(1000).unwrap();
        assert_eq!(p.percent, 100);
        assert_eq!(p.phase, UploadPhase::Processing);
    }

    #[test]
    fn progress_never_decreases() {
        let mut tracker = ProgressTracker::new(200);
        tracker.observe(150);
        assert!(tracker.observe(20).is_none());
        assert_eq!(tracker.snapshot().sent, 150);
        assert_eq!(tracker.snapshot().percent, 75);
    }

    #[test]
    fn unchanged_percent_is_not_reported_twice() {
        let mut tracker = ProgressTracker::new(10_000);
        assert!(tracker.observe(100).is_some());
        assert!(tracker.observe(120).is_none());
        assert!(tracker.observe(200).is_some());
    }

    #[test]
    fn overshoot_is_clamped() {
        let mut tracker = ProgressTracker::new(10);
        let p = tracker.observe(25).unwrap();
        assert_eq!(p.sent, 10);
        assert_eq!(p.percent, 100);
    }

    #[test]
    fn sequence_is_monotonic() {
        let mut tracker = ProgressTracker::new(777);
        let mut last = 0;
        for sent in (0..=777).step_by(13).chain([777]) {
            if let Some(p) = tracker.observe(sent) {
                assert!(p.percent >= last);
                assert_eq!(p.percent == 100, p.phase == UploadPhase::Processing);
                last = p.percent;
            }
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn config_serializes_mapping_and_options() {
        let config = UploadConfig::new()
            .map_column("Order #", "order_id")
            .with_option("delimiter", serde_json::json!(";"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "column_mapping": {"Order #": "order_id"},
                "delimiter": ";"
            })
        );
        assert_eq!(serde_json::to_value(UploadConfig::new()).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn mime_guess() {
        assert_eq!(guess_mime("a.json"), "application/json");
        assert_eq!(guess_mime("noext"), "application/octet-stream");
    }
}
