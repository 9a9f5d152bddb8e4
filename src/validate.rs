//! Heuristic validation of acquired full-text content.
//!
//! Publishers sometimes return error pages, interstitials, or truncated
//! payloads with a 200 status. Each format therefore gets a cheap structural
//! sniff before anything is written to disk:
//!
//! - XML and HTML must parse and contain a non-empty `body` element
//! - PDF and TIFF must start with the expected magic bytes
//! - TXT must *fail* every other format's validator

use quick_xml::events::Event;
use thiserror::Error;

use crate::format::FormatName;

/// Errors raised when content fails a format sniff.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The data could not be parsed as markup at all.
    #[error("cannot parse into {format}: {detail}")]
    NotMarkup {
        /// The format that was expected.
        format: FormatName,
        /// Parser diagnostic.
        detail: String,
    },

    /// Parsed markup has no `body` element.
    #[error("no `body` element found in {format} data")]
    NoBody {
        /// The format that was expected.
        format: FormatName,
    },

    /// The `body` element exists but has no content.
    #[error("{format} `body` element has no content")]
    EmptyBody {
        /// The format that was expected.
        format: FormatName,
    },

    /// Magic bytes do not match the expected file type.
    #[error("expected {expected} magic bytes")]
    WrongMagic {
        /// The format that was expected.
        expected: FormatName,
    },

    /// Data intended as plain text validated as a structured format instead.
    #[error("data passes validation for {other} rather than text")]
    TextMatchesOther {
        /// The structured format the data matched.
        other: FormatName,
    },
}

/// Validates that `data` looks like content of the given format.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the first failed check.
pub fn validate_data(data: &[u8], format: FormatName) -> Result<(), ValidationError> {
    match format {
        FormatName::Xml => validate_xml(data),
        FormatName::Html => validate_html(data),
        FormatName::Pdf => validate_pdf(data),
        FormatName::Tiff => validate_tiff(data),
        FormatName::Txt => validate_txt(data),
    }
}

/// Validates XML by requiring a well-formed document with a non-empty
/// `body` element.
pub fn validate_xml(data: &[u8]) -> Result<(), ValidationError> {
    check_markup_body(data, FormatName::Xml, true)
}

/// Validates HTML by requiring a parseable document with a non-empty
/// `body` element. Parsing is lenient about unmatched end tags, as real-world
/// HTML rarely survives strict checking.
pub fn validate_html(data: &[u8]) -> Result<(), ValidationError> {
    check_markup_body(data, FormatName::Html, false)
}

fn check_markup_body(
    data: &[u8],
    format: FormatName,
    strict: bool,
) -> Result<(), ValidationError> {
    let mut reader = quick_xml::Reader::from_reader(data);
    let config = reader.config_mut();
    config.check_end_names = strict;
    config.allow_unmatched_ends = !strict;

    let mut body_depth: usize = 0;
    let mut saw_body = false;
    let mut body_has_content = false;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let is_body = start.local_name().as_ref().eq_ignore_ascii_case(b"body");
                if body_depth > 0 {
                    body_has_content = true;
                    body_depth += 1;
                } else if is_body {
                    saw_body = true;
                    body_depth = 1;
                }
            }
            Ok(Event::End(_)) => {
                body_depth = body_depth.saturating_sub(1);
            }
            Ok(Event::Text(text)) => {
                // Whitespace between tags does not count as body content.
                if body_depth > 0 && !text.as_ref().iter().all(u8::is_ascii_whitespace) {
                    body_has_content = true;
                }
            }
            Ok(Event::Empty(_) | Event::CData(_)) => {
                if body_depth > 0 {
                    body_has_content = true;
                }
            }
            Ok(_) => {}
            Err(error) => {
                return Err(ValidationError::NotMarkup {
                    format,
                    detail: error.to_string(),
                });
            }
        }
    }

    if !saw_body {
        return Err(ValidationError::NoBody { format });
    }

    if !body_has_content {
        return Err(ValidationError::EmptyBody { format });
    }

    Ok(())
}

/// Validates a PDF by its magic bytes.
pub fn validate_pdf(data: &[u8]) -> Result<(), ValidationError> {
    if data.starts_with(b"%PDF-") {
        Ok(())
    } else {
        Err(ValidationError::WrongMagic {
            expected: FormatName::Pdf,
        })
    }
}

/// Validates a TIFF by its magic bytes (both byte orders).
pub fn validate_tiff(data: &[u8]) -> Result<(), ValidationError> {
    if data.starts_with(b"II\x2a\x00") || data.starts_with(b"MM\x00\x2a") {
        Ok(())
    } else {
        Err(ValidationError::WrongMagic {
            expected: FormatName::Tiff,
        })
    }
}

/// Validates plain text by checking that it does not validate as any of the
/// structured formats.
pub fn validate_txt(data: &[u8]) -> Result<(), ValidationError> {
    let others: [(FormatName, fn(&[u8]) -> Result<(), ValidationError>); 4] = [
        (FormatName::Xml, validate_xml),
        (FormatName::Html, validate_html),
        (FormatName::Pdf, validate_pdf),
        (FormatName::Tiff, validate_tiff),
    ];

    for (other, validator) in others {
        if validator(data).is_ok() {
            return Err(ValidationError::TextMatchesOther { other });
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const XML_WITH_BODY: &[u8] = b"<article><body><p>Some content.</p></body></article>";
    const XML_EMPTY_BODY: &[u8] = b"<article><body></body></article>";
    const XML_NO_BODY: &[u8] = b"<article><front>meta</front></article>";
    const PDF_MAGIC: &[u8] = b"%PDF-1.7 rest of file";
    const TIFF_LE: &[u8] = b"II\x2a\x00more";
    const TIFF_BE: &[u8] = b"MM\x00\x2amore";

    // ==================== XML Tests ====================

    #[test]
    fn test_xml_with_body_content_valid() {
        assert!(validate_xml(XML_WITH_BODY).is_ok());
    }

    #[test]
    fn test_xml_empty_body_invalid() {
        let result = validate_xml(XML_EMPTY_BODY);
        assert!(matches!(result, Err(ValidationError::EmptyBody { .. })));
    }

    #[test]
    fn test_xml_no_body_invalid() {
        let result = validate_xml(XML_NO_BODY);
        assert!(matches!(result, Err(ValidationError::NoBody { .. })));
    }

    #[test]
    fn test_xml_unparseable_invalid() {
        let result = validate_xml(b"<article><body></article>");
        assert!(result.is_err());
    }

    #[test]
    fn test_xml_body_with_nested_elements_valid() {
        let data = b"<article><body><sec><title>T</title></sec></body></article>";
        assert!(validate_xml(data).is_ok());
    }

    // ==================== HTML Tests ====================

    #[test]
    fn test_html_with_body_valid() {
        let data = b"<html><head><title>T</title></head><body><p>Hello</p></body></html>";
        assert!(validate_html(data).is_ok());
    }

    #[test]
    fn test_html_without_body_invalid() {
        let data = b"<html><head><title>T</title></head></html>";
        assert!(matches!(
            validate_html(data),
            Err(ValidationError::NoBody { .. })
        ));
    }

    // ==================== Magic Byte Tests ====================

    #[test]
    fn test_pdf_magic_valid() {
        assert!(validate_pdf(PDF_MAGIC).is_ok());
    }

    #[test]
    fn test_pdf_wrong_magic_invalid() {
        assert!(matches!(
            validate_pdf(b"plain text"),
            Err(ValidationError::WrongMagic { .. })
        ));
    }

    #[test]
    fn test_tiff_both_byte_orders_valid() {
        assert!(validate_tiff(TIFF_LE).is_ok());
        assert!(validate_tiff(TIFF_BE).is_ok());
    }

    #[test]
    fn test_tiff_wrong_magic_invalid() {
        assert!(validate_tiff(b"not a tiff").is_err());
    }

    // ==================== TXT Exclusion Tests ====================

    #[test]
    fn test_txt_plain_text_valid() {
        assert!(validate_txt(b"Just some ordinary prose.\nAnother line.").is_ok());
    }

    #[test]
    fn test_txt_rejects_pdf_data() {
        let result = validate_txt(PDF_MAGIC);
        assert!(matches!(
            result,
            Err(ValidationError::TextMatchesOther {
                other: FormatName::Pdf
            })
        ));
    }

    #[test]
    fn test_txt_rejects_xml_data() {
        let result = validate_txt(XML_WITH_BODY);
        assert!(result.is_err());
    }

    // ==================== Dispatch Tests ====================

    #[test]
    fn test_validate_data_dispatches_by_format() {
        assert!(validate_data(PDF_MAGIC, FormatName::Pdf).is_ok());
        assert!(validate_data(PDF_MAGIC, FormatName::Txt).is_err());
        assert!(validate_data(XML_WITH_BODY, FormatName::Xml).is_ok());
        assert!(validate_data(TIFF_LE, FormatName::Tiff).is_ok());
    }
}
