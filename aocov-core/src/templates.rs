//! Landing page and upload script templates.
//!
//! Templates live under `<public>/templates` and are rendered once at startup
//! into the host directory, where they are served as `/` and `/sh`.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::fs::FileSystem;

/// Placeholder token for the public URL of the service.
pub const TARGET_URL: &str = "{{TARGET_URL}}";
/// Placeholder token for extra curl flags when the service is served over https.
pub const CURL_HTTPS: &str = "{{CURL_HTTPS}}";

const HTTPS_CURL_FLAGS: &str = "--proto '=https' --tlsv1.2 ";

/// Values substituted into templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    /// Text replacement for the target URL placeholder.
    pub target_url: String,
    /// Text replacement for the curl flags placeholder.
    pub curl_https: String,
}

impl TemplateContext {
    /// Build the context for a service reachable at `target_url`.
    pub fn for_target(target_url: &str) -> Self {
        let curl_https = if target_url.starts_with("https") {
            HTTPS_CURL_FLAGS.to_string()
        } else {
            String::new()
        };
        Self {
            target_url: target_url.trim_end_matches('/').to_string(),
            curl_https,
        }
    }
}

/// A template file and where its rendering is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Template source.
    pub input_file: PathBuf,
    /// Rendered output.
    pub output_file: PathBuf,
}

/// Result of persisting a template.
#[derive(Debug)]
pub enum TemplateOutcome {
    /// The output was rendered and written.
    Generated,
    /// Rendering failed, but a previously generated output is still readable.
    KeptExisting(CoreError),
}

/// The upload script and landing page templates.
pub fn landing_templates(public_dir: &Path, host_dir: &Path) -> [Template; 2] {
    let templates = public_dir.join("templates");
    [
        Template {
            input_file: templates.join("sh.tmpl"),
            output_file: host_dir.join("sh"),
        },
        Template {
            input_file: templates.join("index.html.tmpl"),
            output_file: host_dir.join("index.html"),
        },
    ]
}

/// Substitute every known placeholder.
pub fn render_template(template: &str, context: &TemplateContext) -> String {
    template
        .replace(TARGET_URL, &context.target_url)
        .replace(CURL_HTTPS, &context.curl_https)
}

/// Render a template and write its output, returning the rendered text.
pub fn persist_template<F: FileSystem + ?Sized>(
    fs: &F,
    template: &Template,
    context: &TemplateContext,
) -> Result<String> {
    let source = fs.read_to_string(&template.input_file)?;
    let rendered = render_template(&source, context);
    fs.write(&template.output_file, rendered.as_bytes())?;
    Ok(rendered)
}

/// Persist a template, tolerating failure when an older output exists.
pub fn persist_or_keep<F: FileSystem + ?Sized>(
    fs: &F,
    template: &Template,
    context: &TemplateContext,
) -> Result<TemplateOutcome> {
    match persist_template(fs, template, context) {
        Ok(_) => Ok(TemplateOutcome::Generated),
        Err(err) if fs.is_file(&template.output_file) => Ok(TemplateOutcome::KeptExisting(err)),
        Err(err) => Err(CoreError::Other(format!(
            "cannot generate {}: {err}",
            template.output_file.display()
        ))),
    }
}
