//! Plain-text extraction from document bytes (spec §6 "Text extractor").
//!
//! Spec §4.2 classifies "Unsupported MIME type" as non-retryable, so an
//! unknown type must raise that exact phrasing for the back-off
//! classifier (spec §4.7) to recognize it.

use async_trait::async_trait;
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::TextExtractor;

/// Extracts UTF-8 plain text from `text/*` MIME types; anything else is
/// rejected as unsupported.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        if !mime_type.starts_with("text/") {
            return Err(Error::invalid_argument(format!("Unsupported MIME type: {mime_type}")));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::invalid_argument(format!("Unsupported MIME type: {mime_type} (not valid UTF-8)")))
    }
}
