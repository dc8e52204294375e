//! Coverage report formats and their registry.

mod cobertura;
mod tarpaulin;

use std::sync::Arc;

use crate::error::InvalidReportDocument;
use crate::gradient::{GradientStyle, match_color};

pub use cobertura::Cobertura;
pub use tarpaulin::Tarpaulin;

/// A coverage report format that can be uploaded and served.
pub trait Format: Send + Sync {
    /// Registry identifier (e.g. "tarpaulin").
    fn id(&self) -> &'static str;
    /// File name the report is stored under.
    fn file_name(&self) -> &'static str;
    /// Extract the coverage percentage (0-100) from the report contents.
    fn parse_coverage(&self, contents: &str) -> Result<f64, InvalidReportDocument>;
    /// Color token for the badge of a report with the given coverage.
    fn match_color(&self, coverage: f64, style: &GradientStyle) -> String {
        match_color(coverage, style)
    }
}

/// Ordered set of formats, looked up by identifier.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn Format>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.list_formats())
            .finish()
    }
}

impl FormatRegistry {
    /// Registry with every format shipped by ao-coverage.
    pub fn builtin() -> Self {
        Self {
            formats: vec![Arc::new(Tarpaulin), Arc::new(Cobertura)],
        }
    }

    /// Registered formats in registration order.
    pub fn formats(&self) -> impl Iterator<Item = &dyn Format> + '_ {
        self.formats.iter().map(|format| format.as_ref())
    }

    /// Identifiers in registration order.
    pub fn list_formats(&self) -> Vec<&'static str> {
        self.formats.iter().map(|format| format.id()).collect()
    }

    /// Look up a format by identifier.
    pub fn get_format(&self, id: &str) -> Option<Arc<dyn Format>> {
        self.formats
            .iter()
            .find(|format| format.id() == id)
            .cloned()
    }

    /// Whether a format with this identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.formats.iter().any(|format| format.id() == id)
    }
}
