//! Report ingestion: token and format checks, bounded body read, parsing,
//! artifact storage and the branch head update.

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::web::{self, Bytes, BytesMut};
use aocov_core::{
    ArtifactLocation, BADGE_FILE, Badge, CoreError, FileSystem, Format, FormatRegistry,
    GradientStyle, HeadContext, HeadIdentity, InvalidReportDocument,
};
use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::db::StoreError;
use crate::metadata::MetadataStore;
use crate::token::UploadToken;

/// Reasons an upload is refused or fails.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request token does not match the upload token.
    #[error("Invalid token")]
    InvalidToken,
    /// The requested format is not registered.
    #[error("Invalid reporting format")]
    UnknownFormat,
    /// A path segment would escape the host directory.
    #[error("Invalid path")]
    InvalidPath(#[source] CoreError),
    /// The body exceeds the upload limit.
    #[error("Uploaded file is too large")]
    TooLarge,
    /// The body could not be parsed by the format.
    #[error(transparent)]
    InvalidDocument(#[from] InvalidReportDocument),
    /// The client stream failed before completing.
    #[error("upload interrupted: {0}")]
    Payload(String),
    /// The store did not acknowledge the branch update.
    #[error("branch update was not acknowledged")]
    NotAcknowledged,
    /// The metadata store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Writing artifacts failed.
    #[error("writing artifacts failed: {0}")]
    Storage(#[source] CoreError),
    /// A blocking task was cancelled.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Identity and credentials of one upload, as taken from the request.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Owning organization.
    pub organization: String,
    /// Repository name.
    pub repository: String,
    /// Branch name.
    pub branch: String,
    /// Commit identifier.
    pub commit: String,
    /// Claimed report format.
    pub format: Option<String>,
    /// Upload token candidate.
    pub token: Option<String>,
}

impl UploadRequest {
    fn identity(&self, format: &str) -> HeadIdentity {
        HeadIdentity {
            organization: self.organization.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            head: HeadContext::new(self.commit.clone(), format),
        }
    }
}

/// Turns uploaded reports into stored artifacts and branch heads.
#[derive(Clone)]
pub struct IngestService {
    registry: FormatRegistry,
    store: Arc<dyn MetadataStore>,
    fs: Arc<dyn FileSystem + Send + Sync>,
    token: UploadToken,
    host_dir: PathBuf,
    gradient: GradientStyle,
    upload_limit: usize,
}

impl IngestService {
    /// Build the service from its collaborators and the server configuration.
    pub fn new(
        registry: FormatRegistry,
        store: Arc<dyn MetadataStore>,
        fs: Arc<dyn FileSystem + Send + Sync>,
        token: UploadToken,
        config: &ServerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            fs,
            token,
            host_dir: config.host_dir.clone(),
            gradient: config.gradient,
            upload_limit: config.upload_limit,
        }
    }

    /// Accept an upload and return the parsed coverage.
    ///
    /// Checks run in order: token, format, path, declared length, streamed
    /// length, parse. Nothing is written until all of them pass.
    pub async fn ingest<S, E>(
        &self,
        request: UploadRequest,
        declared_length: Option<u64>,
        body: S,
    ) -> Result<f64, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        if !self.token.verify(request.token.as_deref()) {
            return Err(IngestError::InvalidToken);
        }
        let format = request
            .format
            .as_deref()
            .and_then(|id| self.registry.get_format(id))
            .ok_or(IngestError::UnknownFormat)?;
        let location = ArtifactLocation::new(
            request.organization.as_str(),
            request.repository.as_str(),
            request.branch.as_str(),
            request.commit.as_str(),
        )
        .map_err(IngestError::InvalidPath)?;
        if declared_length.is_some_and(|length| length > self.upload_limit as u64) {
            return Err(IngestError::TooLarge);
        }

        let body = read_limited(body, self.upload_limit).await?;
        let coverage = parse_report(format.clone(), body.clone()).await?;

        let identity = request.identity(format.id());
        let service = self.clone();
        web::block(move || service.store_report(&location, &identity, format.as_ref(), coverage, &body))
            .await
            .map_err(|err| IngestError::Task(err.to_string()))??;
        Ok(coverage)
    }

    fn store_report(
        &self,
        location: &ArtifactLocation,
        identity: &HeadIdentity,
        format: &dyn Format,
        coverage: f64,
        body: &[u8],
    ) -> Result<(), IngestError> {
        self.fs
            .create_dir_all(&location.dir(&self.host_dir))
            .map_err(IngestError::Storage)?;

        let color = format.match_color(coverage, &self.gradient);
        let badge = Badge::coverage(coverage, color).render();
        self.fs
            .write(&location.file(&self.host_dir, BADGE_FILE), badge.as_bytes())
            .map_err(IngestError::Storage)?;
        // A commit keeps one report; drop any left by an upload in another format.
        for other in self.registry.formats() {
            if other.file_name() != format.file_name() {
                self.fs
                    .remove_file(&location.file(&self.host_dir, other.file_name()))
                    .map_err(IngestError::Storage)?;
            }
        }
        self.fs
            .write(&location.file(&self.host_dir, format.file_name()), body)
            .map_err(IngestError::Storage)?;

        if !self.store.update_branch(identity)? {
            return Err(IngestError::NotAcknowledged);
        }
        Ok(())
    }
}

/// Collect a body stream, failing as soon as it grows past `limit` bytes.
pub async fn read_limited<S, E>(mut body: S, limit: usize) -> Result<Bytes, IngestError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| IngestError::Payload(err.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(IngestError::TooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Parse a report off the async runtime. Non UTF-8 bodies are invalid.
pub async fn parse_report(format: Arc<dyn Format>, body: Bytes) -> Result<f64, IngestError> {
    let parsed = web::block(move || {
        let contents = std::str::from_utf8(&body).map_err(|_| InvalidReportDocument)?;
        format.parse_coverage(contents)
    })
    .await
    .map_err(|err| IngestError::Task(err.to_string()))?;
    Ok(parsed?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MockMetadataStore;
    use aocov_core::{StdFileSystem, Tarpaulin};
    use futures::stream;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TARPAULIN_REPORT: &str =
        include_str!("../../example_reports/tarpaulin-report.html");
    const TARPAULIN_EMPTY: &str = include_str!("../../example_reports/tarpaulin-empty.html");
    const COBERTURA_REPORT: &str = include_str!("../../example_reports/cobertura-report.xml");

    fn config(host_dir: &std::path::Path, upload_limit: usize) -> ServerConfig {
        let host = host_dir.display().to_string();
        let mut config = ServerConfig::from_lookup(|name| match name {
            "HOST_DIR" => Some(host.clone()),
            "DATABASE_URL" => Some("postgres://localhost/aocov".to_string()),
            _ => None,
        })
        .expect("config");
        config.upload_limit = upload_limit;
        config
    }

    fn service(store: MockMetadataStore, host_dir: &std::path::Path) -> IngestService {
        IngestService::new(
            FormatRegistry::builtin(),
            Arc::new(store),
            Arc::new(StdFileSystem::new()),
            UploadToken::from_secret("zzzz"),
            &config(host_dir, 4_194_304),
        )
    }

    fn request(format: &str, token: &str) -> UploadRequest {
        UploadRequest {
            organization: "testorg".to_string(),
            repository: "testrepo".to_string(),
            branch: "testbranch".to_string(),
            commit: "testcommit".to_string(),
            format: Some(format.to_string()),
            token: Some(token.to_string()),
        }
    }

    fn body(contents: &str) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        let chunks: Vec<Result<Bytes, Infallible>> = contents
            .as_bytes()
            .chunks(512)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        stream::iter(chunks)
    }

    fn commit_dir(host: &std::path::Path) -> PathBuf {
        host.join("testorg/testrepo/testbranch/testcommit")
    }

    #[actix_web::test]
    async fn read_limited_accepts_bodies_at_the_limit() {
        let bytes = read_limited(body("0123456789"), 10).await.expect("read");
        assert_eq!(bytes, Bytes::from_static(b"0123456789"));
    }

    #[actix_web::test]
    async fn read_limited_stops_pulling_past_the_limit() {
        let pulled = AtomicUsize::new(0);
        let chunks = stream::iter((0..100).map(|_| Ok::<_, Infallible>(Bytes::from_static(b"aaaa"))))
            .inspect(|_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            });
        let err = read_limited(chunks, 10).await.unwrap_err();
        assert!(matches!(err, IngestError::TooLarge));
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[actix_web::test]
    async fn read_limited_reports_stream_errors() {
        let chunks = stream::iter(vec![Ok(Bytes::from_static(b"a")), Err("reset by peer")]);
        let err = read_limited(chunks, 10).await.unwrap_err();
        assert_eq!(err.to_string(), "upload interrupted: reset by peer");
    }

    #[actix_web::test]
    async fn parse_report_rejects_non_utf8() {
        let err = parse_report(Arc::new(Tarpaulin), Bytes::from_static(&[0xff, 0xfe, 0x00]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid report document");
    }

    #[actix_web::test]
    async fn upload_stores_artifacts_and_updates_branch() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store
            .expect_update_branch()
            .withf(|identity| {
                identity.organization == "testorg"
                    && identity.repository == "testrepo"
                    && identity.branch == "testbranch"
                    && identity.head == HeadContext::new("testcommit", "tarpaulin")
            })
            .times(1)
            .returning(|_| Ok(true));

        let coverage = service(store, host.path())
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .expect("ingest");

        assert_eq!(format!("{coverage:.2}"), "96.15");
        let dir = commit_dir(host.path());
        assert_eq!(
            std::fs::read_to_string(dir.join("index.html")).expect("report"),
            TARPAULIN_REPORT
        );
        let badge = std::fs::read_to_string(dir.join("badge.svg")).expect("badge");
        assert!(badge.contains("96%"));
        assert!(badge.contains("#4c1"));
    }

    #[actix_web::test]
    async fn cobertura_uploads_use_their_own_file_name() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store
            .expect_update_branch()
            .withf(|identity| identity.head.format == "cobertura")
            .returning(|_| Ok(true));

        service(store, host.path())
            .ingest(request("cobertura", "zzzz"), None, body(COBERTURA_REPORT))
            .await
            .expect("ingest");

        let dir = commit_dir(host.path());
        assert!(dir.join("index.xml").is_file());
        assert!(!dir.join("index.html").exists());
    }

    #[actix_web::test]
    async fn reupload_in_another_format_replaces_the_report() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store.expect_update_branch().times(2).returning(|_| Ok(true));
        let service = service(store, host.path());

        service
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .expect("tarpaulin upload");
        service
            .ingest(request("cobertura", "zzzz"), None, body(COBERTURA_REPORT))
            .await
            .expect("cobertura upload");

        let dir = commit_dir(host.path());
        assert!(!dir.join("index.html").exists());
        assert_eq!(
            std::fs::read_to_string(dir.join("index.xml")).expect("report"),
            COBERTURA_REPORT
        );
    }

    #[actix_web::test]
    async fn zero_coverage_renders_a_red_badge() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store.expect_update_branch().returning(|_| Ok(true));

        let coverage = service(store, host.path())
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_EMPTY))
            .await
            .expect("ingest");

        assert_eq!(coverage, 0.0);
        let badge =
            std::fs::read_to_string(commit_dir(host.path()).join("badge.svg")).expect("badge");
        assert!(badge.contains("0%"));
        assert!(badge.contains("#e11"));
    }

    #[actix_web::test]
    async fn wrong_token_writes_nothing() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store.expect_update_branch().never();

        let err = service(store, host.path())
            .ingest(request("tarpaulin", "zzzzz"), None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::InvalidToken));
        assert!(!host.path().join("testorg").exists());
    }

    #[actix_web::test]
    async fn missing_token_is_invalid() {
        let host = tempfile::tempdir().expect("host dir");
        let mut upload = request("tarpaulin", "zzzz");
        upload.token = None;

        let err = service(MockMetadataStore::new(), host.path())
            .ingest(upload, None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[actix_web::test]
    async fn unknown_format_is_refused() {
        let host = tempfile::tempdir().expect("host dir");
        let err = service(MockMetadataStore::new(), host.path())
            .ingest(request("pepperoni", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid reporting format");
        assert!(!host.path().join("testorg").exists());
    }

    #[actix_web::test]
    async fn traversal_segments_are_refused() {
        let host = tempfile::tempdir().expect("host dir");
        let mut upload = request("tarpaulin", "zzzz");
        upload.branch = "..".to_string();

        let err = service(MockMetadataStore::new(), host.path())
            .ingest(upload, None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid path");
    }

    #[actix_web::test]
    async fn declared_length_over_limit_is_refused_before_reading() {
        let host = tempfile::tempdir().expect("host dir");
        let limited = IngestService::new(
            FormatRegistry::builtin(),
            Arc::new(MockMetadataStore::new()),
            Arc::new(StdFileSystem::new()),
            UploadToken::from_secret("zzzz"),
            &config(host.path(), 16),
        );
        let untouched = stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(b"a"))])
            .inspect(|_| panic!("body must not be read"));

        let err = limited
            .ingest(request("tarpaulin", "zzzz"), Some(17), untouched)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Uploaded file is too large");
    }

    #[actix_web::test]
    async fn streamed_body_over_limit_is_refused() {
        let host = tempfile::tempdir().expect("host dir");
        let limited = IngestService::new(
            FormatRegistry::builtin(),
            Arc::new(MockMetadataStore::new()),
            Arc::new(StdFileSystem::new()),
            UploadToken::from_secret("zzzz"),
            &config(host.path(), 512),
        );

        let err = limited
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::TooLarge));
        assert!(!host.path().join("testorg").exists());
    }

    #[actix_web::test]
    async fn invalid_documents_are_refused() {
        let host = tempfile::tempdir().expect("host dir");
        let err = service(MockMetadataStore::new(), host.path())
            .ingest(request("tarpaulin", "zzzz"), None, body("This is not a file"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid report document");
        assert!(!host.path().join("testorg").exists());
    }

    #[actix_web::test]
    async fn unacknowledged_update_is_an_error() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store.expect_update_branch().returning(|_| Ok(false));

        let err = service(store, host.path())
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotAcknowledged));
    }

    #[actix_web::test]
    async fn store_failures_propagate() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store
            .expect_update_branch()
            .returning(|_| Err(StoreError::Task("gone".to_string())));

        let err = service(store, host.path())
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[actix_web::test]
    async fn reupload_overwrites_artifacts() {
        let host = tempfile::tempdir().expect("host dir");
        let mut store = MockMetadataStore::new();
        store.expect_update_branch().times(2).returning(|_| Ok(true));
        let service = service(store, host.path());

        service
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_REPORT))
            .await
            .expect("first");
        service
            .ingest(request("tarpaulin", "zzzz"), None, body(TARPAULIN_EMPTY))
            .await
            .expect("second");

        let dir = commit_dir(host.path());
        assert_eq!(
            std::fs::read_to_string(dir.join("index.html")).expect("report"),
            TARPAULIN_EMPTY
        );
        assert!(
            std::fs::read_to_string(dir.join("badge.svg"))
                .expect("badge")
                .contains("#e11")
        );
    }
}
