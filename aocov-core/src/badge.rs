//! Flat SVG badge rendering.

use std::fmt::Write;

/// Label shown on the left side of coverage badges.
pub const COVERAGE_LABEL: &str = "coverage";

const HEIGHT: u32 = 20;
const PADDING: u32 = 5;
const LABEL_COLOR: &str = "555";
const FONT_FAMILY: &str = "Verdana,DejaVu Sans,sans-serif";

/// A two-part status badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    /// Left-hand label.
    pub label: String,
    /// Right-hand status text.
    pub status: String,
    /// Status background as a hex color token, without `#`.
    pub color: String,
}

impl Badge {
    /// Coverage badge: `coverage | NN%`, with the percentage floored.
    pub fn coverage(coverage: f64, color: impl Into<String>) -> Self {
        let percent = if coverage.is_finite() {
            coverage.floor() as i64
        } else {
            0
        };
        Self {
            label: COVERAGE_LABEL.to_string(),
            status: format!("{percent}%"),
            color: color.into(),
        }
    }

    /// Render the badge as a standalone SVG document.
    pub fn render(&self) -> String {
        let label_text = text_width(&self.label);
        let status_text = text_width(&self.status);
        let label_width = label_text + 2 * PADDING;
        let status_width = status_text + 2 * PADDING;
        let width = label_width + status_width;
        let label = escape_xml(&self.label);
        let status = escape_xml(&self.status);
        let color = escape_xml(self.color.trim_start_matches('#'));

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg width="{width}" height="{HEIGHT}" viewBox="0 0 {vw} {vh}" xmlns="http://www.w3.org/2000/svg" role="img" aria-label="{label}: {status}">"#,
            vw = width * 10,
            vh = HEIGHT * 10,
        );
        let _ = writeln!(svg, "  <title>{label}: {status}</title>");
        let _ = writeln!(
            svg,
            r##"  <linearGradient id="a" x2="0" y2="100%"><stop offset="0" stop-opacity=".1" stop-color="#EEE"/><stop offset="1" stop-opacity=".1"/></linearGradient>"##
        );
        let _ = writeln!(
            svg,
            r##"  <mask id="m"><rect width="{w}" height="{h}" rx="30" fill="#FFF"/></mask>"##,
            w = width * 10,
            h = HEIGHT * 10,
        );
        let _ = writeln!(svg, r#"  <g mask="url(#m)">"#);
        let _ = writeln!(
            svg,
            r##"    <rect width="{w}" height="{h}" fill="#{LABEL_COLOR}"/>"##,
            w = label_width * 10,
            h = HEIGHT * 10,
        );
        let _ = writeln!(
            svg,
            r##"    <rect width="{w}" height="{h}" fill="#{color}" x="{x}"/>"##,
            w = status_width * 10,
            h = HEIGHT * 10,
            x = label_width * 10,
        );
        let _ = writeln!(
            svg,
            r#"    <rect width="{w}" height="{h}" fill="url(#a)"/>"#,
            w = width * 10,
            h = HEIGHT * 10,
        );
        let _ = writeln!(svg, "  </g>");
        let _ = writeln!(
            svg,
            r##"  <g aria-hidden="true" fill="#fff" text-anchor="start" font-family="{FONT_FAMILY}" font-size="110">"##
        );
        write_text(&mut svg, PADDING * 10, label_text * 10, &label);
        write_text(&mut svg, (label_width + PADDING) * 10, status_text * 10, &status);
        let _ = writeln!(svg, "  </g>");
        let _ = write!(svg, "</svg>");
        svg
    }
}

fn write_text(svg: &mut String, x: u32, length: u32, text: &str) {
    let _ = writeln!(
        svg,
        r##"    <text x="{sx}" y="148" textLength="{length}" fill="#000" opacity="0.25">{text}</text>"##,
        sx = x + 10,
    );
    let _ = writeln!(
        svg,
        r#"    <text x="{x}" y="138" textLength="{length}">{text}</text>"#
    );
}

// Approximate Verdana 11px advance widths, rounded up per string.
fn text_width(text: &str) -> u32 {
    let width: f64 = text
        .chars()
        .map(|ch| match ch {
            'i' | 'l' | 'j' | '.' | ',' | ':' | ';' | '!' | '|' | '\'' => 3.1,
            'f' | 't' | 'r' | 'I' | ' ' | '(' | ')' | '[' | ']' | '-' => 4.3,
            'm' | 'w' | 'M' | 'W' => 9.8,
            '%' => 11.9,
            '0'..='9' => 7.0,
            'A'..='Z' => 7.5,
            _ => 6.6,
        })
        .sum();
    width.ceil() as u32
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
