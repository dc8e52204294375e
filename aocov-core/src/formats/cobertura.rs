//! Cobertura XML reports.
//!
//! Only the root element is consulted:
//!   <coverage lines-valid="..." lines-covered="..." ...>
//! The rest of the document must still be well-formed.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::Format;
use crate::error::InvalidReportDocument;

/// XML report in the Cobertura schema (e.g. `cargo tarpaulin --out Xml`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Cobertura;

impl Format for Cobertura {
    fn id(&self) -> &'static str {
        "cobertura"
    }

    fn file_name(&self) -> &'static str {
        "index.xml"
    }

    fn parse_coverage(&self, contents: &str) -> Result<f64, InvalidReportDocument> {
        let (valid, covered) = root_line_counts(contents)?;
        if valid == 0.0 {
            return Ok(0.0);
        }
        Ok(100.0 * covered / valid)
    }
}

fn root_line_counts(contents: &str) -> Result<(f64, f64), InvalidReportDocument> {
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);

    let mut counts = None;
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Err(_) => return Err(InvalidReportDocument),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                if depth == 0 {
                    counts = Some(root_counts(e, counts.is_some())?);
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) if depth == 0 => {
                counts = Some(root_counts(e, counts.is_some())?);
            }
            Ok(Event::End(_)) => {
                depth = depth.checked_sub(1).ok_or(InvalidReportDocument)?;
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) if depth == 0 => {
                return Err(InvalidReportDocument);
            }
            Ok(_) => {}
        }
    }
    // quick-xml does not report elements left open at EOF.
    if depth != 0 {
        return Err(InvalidReportDocument);
    }
    counts.ok_or(InvalidReportDocument)
}

/// The single `<coverage>` root; a second top-level element is invalid.
fn root_counts(
    element: &BytesStart<'_>,
    seen_root: bool,
) -> Result<(f64, f64), InvalidReportDocument> {
    if seen_root || element.local_name().as_ref() != b"coverage" {
        return Err(InvalidReportDocument);
    }
    Ok((
        numeric_attribute(element, "lines-valid")?,
        numeric_attribute(element, "lines-covered")?,
    ))
}

fn numeric_attribute(element: &BytesStart<'_>, name: &str) -> Result<f64, InvalidReportDocument> {
    let attribute = element
        .try_get_attribute(name)
        .map_err(|_| InvalidReportDocument)?
        .ok_or(InvalidReportDocument)?;
    let value = attribute
        .unescape_value()
        .map_err(|_| InvalidReportDocument)?;
    let number = value
        .trim()
        .parse::<f64>()
        .map_err(|_| InvalidReportDocument)?;
    if number.is_finite() && number >= 0.0 {
        Ok(number)
    } else {
        Err(InvalidReportDocument)
    }
}
