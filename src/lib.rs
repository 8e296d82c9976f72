//! PDF Form Filler Library
//!
//! Maps the AcroForm of a fillable PDF onto generic form fields and writes
//! edited values back. The MCP server exposes this through tools:
//! - `load_form`: Load a PDF and extract its fields
//! - `update_fields`, `add_custom_field`, `remove_field`: Edit the field set
//! - `fill_form`, `preview_form`, `download_form`: Produce the filled PDF
//! - `export_debug`: Dump extraction details as JSON
//! - `revoke_preview`, `close_session`: Release previews and sessions

pub mod error;
pub mod form;
pub mod server;
pub mod source;

pub use error::{Error, FieldApplyError, Result};
pub use form::{
    Field, FieldKind, FieldValue, FillOutcome, FormData, FormFieldProcessor, FormProgress,
};
pub use server::{run_server_with_config, FormServer, PdfSource, ServerConfig};
