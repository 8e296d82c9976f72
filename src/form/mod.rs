//! Form extraction, editing and filling

pub mod classify;
pub mod debug;
pub mod download;
pub mod field;
pub mod native;
pub mod preview;
pub mod processor;

#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
pub(crate) mod fixtures;

pub use debug::DebugSnapshot;
pub use download::{filled_file_name, DirectoryTarget, SaveTarget};
pub use field::{
    add_custom_field, remove_field, update_value, Field, FieldKind, FieldValue, FormData,
    FormProgress,
};
pub use preview::{PreviewHandle, PDF_MEDIA_TYPE};
pub use processor::{FillOutcome, FormFieldProcessor, Preview, DEFAULT_MAX_INPUT_BYTES};
