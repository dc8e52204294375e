#![deny(missing_docs)]
//! ao-coverage core library.
//!
//! Report format parsing, badge colors and rendering, and the domain types
//! shared by the ao-coverage server and uploader.

pub mod artifact;
pub mod badge;
pub mod domain;
pub mod error;
pub mod formats;
pub mod fs;
pub mod gradient;
pub mod templates;

pub use artifact::{ArtifactLocation, BADGE_FILE, validate_segment};
pub use badge::{Badge, COVERAGE_LABEL};
pub use domain::{
    BranchEntry, BranchMap, HeadContext, HeadIdentity, HeadLookup, LEGACY_HEAD_FORMAT,
    RepositoryDocument, StoredHead,
};
pub use error::{CoreError, InvalidReportDocument, Result};
pub use formats::{Cobertura, Format, FormatRegistry, Tarpaulin};
pub use fs::{FileSystem, StdFileSystem};
pub use gradient::{FULL_GREEN, GradientStyle, match_color};
pub use templates::{
    CURL_HTTPS, TARGET_URL, Template, TemplateContext, TemplateOutcome, landing_templates,
    persist_or_keep, persist_template, render_template,
};
