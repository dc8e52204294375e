//! cargo-tarpaulin HTML reports.
//!
//! Tarpaulin embeds its results as JSON inside the first `<script>` element.
//! Every `"covered"` and `"coverable"` counter in that script is summed,
//! regardless of nesting.

use std::sync::LazyLock;

use regex::Regex;

use super::Format;
use crate::error::InvalidReportDocument;

static SCRIPT_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<script\b[^>]*>").expect("script open regex"));
static SCRIPT_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</script\s*>").expect("script close regex"));
static COVERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""covered":(\d+)"#).expect("covered regex"));
static COVERABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""coverable":(\d+)"#).expect("coverable regex"));

/// HTML report produced by `cargo tarpaulin --out Html`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tarpaulin;

impl Format for Tarpaulin {
    fn id(&self) -> &'static str {
        "tarpaulin"
    }

    fn file_name(&self) -> &'static str {
        "index.html"
    }

    fn parse_coverage(&self, contents: &str) -> Result<f64, InvalidReportDocument> {
        let script = first_script(contents).ok_or(InvalidReportDocument)?;
        let covered = accumulate(&COVERED_RE, script);
        let coverable = accumulate(&COVERABLE_RE, script);
        if coverable == 0.0 {
            return Ok(0.0);
        }
        Ok(100.0 * covered / coverable)
    }
}

fn first_script(contents: &str) -> Option<&str> {
    let open = SCRIPT_OPEN_RE.find(contents)?;
    let body = &contents[open.end()..];
    let end = SCRIPT_CLOSE_RE
        .find(body)
        .map(|close| close.start())
        .unwrap_or(body.len());
    Some(&body[..end])
}

fn accumulate(pattern: &Regex, text: &str) -> f64 {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|value| value.as_str().parse::<f64>().ok())
        .sum()
}
