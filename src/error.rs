//! Error types for PDF Form Filler

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for PDF Form Filler
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PDF Form Filler
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Input bytes are not a parseable PDF
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Input exceeds the configured size limit
    #[error("File too large: {size} bytes (max: {max_size} bytes)")]
    FileTooLarge { size: u64, max_size: u64 },

    /// Fill or preview requested before a document was loaded
    #[error("No PDF document loaded")]
    NoDocumentLoaded,

    /// Unknown form session
    #[error("Form session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Preview handle was revoked or evicted
    #[error("Preview not found: {key}")]
    PreviewNotFound { key: String },

    /// Preview bytes exceed the whole preview store budget
    #[error("Preview too large: {size} bytes (max: {max_size} bytes)")]
    PreviewTooLarge { size: u64, max_size: u64 },

    /// Field edit rejected
    #[error("Invalid field {name}: {reason}")]
    InvalidField { name: String, reason: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PDF object model error
    #[error("PDF error: {reason}")]
    Pdf { reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => {
                "Failed to load PDF. Please ensure the PDF is not corrupted".to_string()
            }
            Error::FileTooLarge { max_size, .. } => {
                format!("File exceeds maximum size of {} bytes", max_size)
            }
            Error::NoDocumentLoaded => "No PDF document loaded".to_string(),
            Error::SessionNotFound { .. } => "Form session not found".to_string(),
            Error::PreviewNotFound { .. } => "Preview not found".to_string(),
            Error::PreviewTooLarge { .. } => "Preview too large".to_string(),
            Error::InvalidField { name, reason } => format!("Invalid field {}: {}", name, reason),
            Error::SourceResolution { .. } => "Failed to resolve PDF source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Pdf { .. } => "PDF processing error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
        }
    }
}

/// A single field value that could not be written into its native field.
///
/// Never fatal: a fill collects these and carries on with the other fields.
#[derive(Error, Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[error("Failed to fill field \"{name}\": {reason}")]
pub struct FieldApplyError {
    /// Field name
    pub name: String,
    /// Why the value was not applied
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_details() {
        let err = Error::InvalidPdf {
            reason: "xref table at offset 1234 is broken".to_string(),
        };
        assert!(!err.client_message().contains("1234"));

        let err = Error::PdfNotFound {
            path: "/secret/location/form.pdf".to_string(),
        };
        assert_eq!(err.client_message(), "PDF not found");
    }

    #[test]
    fn test_field_apply_error_display() {
        let err = FieldApplyError {
            name: "country".to_string(),
            reason: "\"Atlantis\" is not one of the field's options".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fill field \"country\": \"Atlantis\" is not one of the field's options"
        );
    }
}
