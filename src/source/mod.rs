//! Source resolution and preview storage

pub mod cache;
pub mod resolver;

pub use cache::PreviewStore;
pub use resolver::{resolve_base64, resolve_path, resolve_url, ResolvedPdf};
