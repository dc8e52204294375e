//! Serving stored artifacts by commit or by branch head.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::web;
use aocov_core::{ArtifactLocation, BADGE_FILE, CoreError, FileSystem, FormatRegistry, HeadLookup};
use thiserror::Error;

use crate::db::StoreError;
use crate::metadata::MetadataStore;

/// Reasons an artifact cannot be served.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No such artifact on disk, or an unusable path or extension.
    #[error("File not found")]
    FileNotFound,
    /// The repository or branch has no recorded head.
    #[error("{}", HeadLookup::NOT_FOUND_MESSAGE)]
    BranchNotFound,
    /// The metadata store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reading an existing artifact failed.
    #[error("reading artifact failed: {0}")]
    Read(#[source] CoreError),
    /// A blocking task was cancelled.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// A stored file ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name within the commit directory.
    pub file_name: String,
    /// Raw contents.
    pub contents: Vec<u8>,
}

impl Artifact {
    /// MIME type derived from the file name.
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Looks up and reads stored badges and reports.
#[derive(Clone)]
pub struct RetrievalService {
    registry: FormatRegistry,
    store: Arc<dyn MetadataStore>,
    fs: Arc<dyn FileSystem + Send + Sync>,
    host_dir: PathBuf,
}

impl RetrievalService {
    /// Build the service.
    pub fn new(
        registry: FormatRegistry,
        store: Arc<dyn MetadataStore>,
        fs: Arc<dyn FileSystem + Send + Sync>,
        host_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            store,
            fs,
            host_dir,
        }
    }

    /// File name served for a requested extension: the badge for `svg`,
    /// otherwise the report file of the format using that extension.
    pub fn file_for_extension(&self, extension: &str) -> Option<&'static str> {
        if extension == "svg" {
            return Some(BADGE_FILE);
        }
        self.registry
            .list_formats()
            .into_iter()
            .filter_map(|id| self.registry.get_format(id))
            .map(|format| format.file_name())
            .find(|file_name| {
                Path::new(file_name)
                    .extension()
                    .is_some_and(|ext| ext == extension)
            })
    }

    /// Serve an artifact of an exact commit.
    pub async fn commit_artifact(
        &self,
        organization: &str,
        repository: &str,
        branch: &str,
        commit: &str,
        extension: &str,
    ) -> Result<Artifact, RetrievalError> {
        let file_name = self
            .file_for_extension(extension)
            .ok_or(RetrievalError::FileNotFound)?;
        self.read_blocking(organization, repository, branch, commit, file_name)
            .await
    }

    /// Serve an artifact of the latest commit recorded for a branch.
    ///
    /// Reports are served in the format recorded with the head, whatever
    /// report extension was requested.
    pub async fn branch_artifact(
        &self,
        organization: &str,
        repository: &str,
        branch: &str,
        extension: &str,
    ) -> Result<Artifact, RetrievalError> {
        self.file_for_extension(extension)
            .ok_or(RetrievalError::FileNotFound)?;

        let store = self.store.clone();
        let (org, repo, name) = (
            organization.to_string(),
            repository.to_string(),
            branch.to_string(),
        );
        let lookup = web::block(move || store.get_head_commit(&org, &repo, &name))
            .await
            .map_err(|err| RetrievalError::Task(err.to_string()))??;
        let head = match lookup {
            HeadLookup::Found(head) => head,
            HeadLookup::BranchNotFound => return Err(RetrievalError::BranchNotFound),
        };

        let file_name = if extension == "svg" {
            BADGE_FILE
        } else {
            self.registry
                .get_format(&head.format)
                .map(|format| format.file_name())
                .ok_or(RetrievalError::FileNotFound)?
        };
        self.read_blocking(organization, repository, branch, &head.commit, file_name)
            .await
    }

    async fn read_blocking(
        &self,
        organization: &str,
        repository: &str,
        branch: &str,
        commit: &str,
        file_name: &'static str,
    ) -> Result<Artifact, RetrievalError> {
        let location = ArtifactLocation::new(organization, repository, branch, commit)
            .map_err(|_| RetrievalError::FileNotFound)?;
        let path = location.file(&self.host_dir, file_name);
        let fs = self.fs.clone();
        web::block(move || {
            if !fs.is_file(&path) {
                return Err(RetrievalError::FileNotFound);
            }
            let contents = fs.read(&path).map_err(RetrievalError::Read)?;
            Ok(Artifact {
                file_name: file_name.to_string(),
                contents,
            })
        })
        .await
        .map_err(|err| RetrievalError::Task(err.to_string()))?
    }
}
