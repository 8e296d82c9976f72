//! MCP Server implementation using rmcp

use crate::error::{Error, FieldApplyError};
use crate::form::preview::{parse_preview_uri, preview_uri};
use crate::form::{
    add_custom_field, remove_field, update_value, DebugSnapshot, DirectoryTarget, Field,
    FieldKind, FieldValue, FormFieldProcessor, FormProgress, PreviewHandle, PDF_MEDIA_TYPE,
};
use crate::source::{resolve_base64, resolve_path, resolve_url, PreviewStore, ResolvedPdf};
use anyhow::Result;
use base64::Engine;
use lru::LruCache;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where to read a PDF from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// URL to download PDF from
    Url {
        /// URL of the PDF file
        url: String,
    },
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", or \"url\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        for key in ["path", "base64", "url"] {
            let Some(v) = obj.get(key) else {
                continue;
            };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => PdfSource::Path { path: s },
                "base64" => PdfSource::Base64 { base64: s },
                _ => PdfSource::Url { url: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\", or \"url\", but got keys: {:?}",
            keys
        )))
    }
}

/// Security and resource configuration for the form server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories path sources and downloads are confined to (empty: unrestricted)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum upload size in bytes for any source (default: 50MB)
    pub max_input_bytes: u64,
    /// Maximum total bytes held by live previews (default: 256MB)
    pub preview_max_bytes: usize,
    /// Maximum number of live previews (default: 32)
    pub preview_max_entries: usize,
    /// Maximum number of open sessions; the least recently used is closed first (default: 16)
    pub max_sessions: usize,
    /// Directory `download_form` writes to when the call names none (default: ".")
    pub download_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_input_bytes: crate::form::DEFAULT_MAX_INPUT_BYTES,
            preview_max_bytes: 256 * 1024 * 1024, // 256MB
            preview_max_entries: 32,
            max_sessions: 16,
            download_dir: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PDF_FORM_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dirs) = lookup("PDF_FORM_RESOURCE_DIRS") {
            config.resource_dirs = std::env::split_paths(&dirs)
                .map(|dir| dir.to_string_lossy().into_owned())
                .filter(|dir| !dir.is_empty())
                .collect();
        }
        if let Some(dir) = lookup("PDF_FORM_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        match lookup("PDF_FORM_MAX_INPUT_BYTES").map(|v| v.parse::<u64>()) {
            Some(Ok(max)) => config.max_input_bytes = max,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring invalid PDF_FORM_MAX_INPUT_BYTES")
            }
            None => {}
        }
        match lookup("PDF_FORM_MAX_SESSIONS").map(|v| v.parse::<usize>()) {
            Some(Ok(max)) => config.max_sessions = max,
            Some(Err(e)) => tracing::warn!(error = %e, "Ignoring invalid PDF_FORM_MAX_SESSIONS"),
            None => {}
        }
        if let Some(allow) = lookup("PDF_FORM_ALLOW_PRIVATE_URLS") {
            config.allow_private_urls = matches!(allow.as_str(), "1" | "true");
        }

        config
    }
}

/// One uploaded document with the user's edits
struct FormSession {
    processor: FormFieldProcessor,
    fields: Vec<Field>,
    /// At most one live preview per session
    preview: Option<PreviewHandle>,
}

impl FormSession {
    fn progress(&self) -> FormProgress {
        FormProgress::of(&self.fields)
    }

    fn release_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(mut handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Drop the preview and the parsed document
    fn close(&mut self) -> bool {
        let released = self.release_preview();
        self.processor.reset();
        released
    }
}

/// Open sessions, least recently used first out
type SessionCache = LruCache<String, Arc<Mutex<FormSession>>>;

/// PDF form filling MCP server
#[derive(Clone)]
pub struct FormServer {
    sessions: Arc<parking_lot::Mutex<SessionCache>>,
    previews: Arc<PreviewStore>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for load_form
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadFormParams {
    /// PDF to load
    pub source: PdfSource,
    /// Name used for the download (defaults to the source's file name)
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct LoadFormResult {
    /// Source identifier
    pub source: String,
    /// Session to pass to the other tools
    pub session_id: String,
    pub file_name: String,
    pub page_count: u32,
    pub fillable_fields_count: usize,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<FormProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for field editing
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FieldUpdate {
    /// Field name
    pub name: String,
    /// New value: boolean for checkboxes, string otherwise
    pub value: FieldValue,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateFieldsParams {
    pub session_id: String,
    /// Values to set, applied in order
    pub updates: Vec<FieldUpdate>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RejectedUpdate {
    /// Field name
    pub name: String,
    /// Reason the update was rejected
    pub reason: String,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct UpdateFieldsResult {
    pub session_id: String,
    /// Number of updates applied
    pub updated: usize,
    pub rejected: Vec<RejectedUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<FormProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddCustomFieldParams {
    pub session_id: String,
    /// Field name (trimmed; must be unique)
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Whether the field is required (default: false)
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveFieldParams {
    pub session_id: String,
    /// Name of a field without document options
    pub name: String,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct FieldEditResult {
    pub session_id: String,
    /// The added or removed field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<FormProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for fill_form / preview_form / download_form
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillFormParams {
    pub session_id: String,
    /// Output file path (optional). If provided, saves the filled PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
    /// Return the filled PDF as base64 (default: false)
    #[serde(default)]
    pub include_base64: bool,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct FillFormResult {
    pub session_id: String,
    /// Number of native fields written
    pub fields_filled: usize,
    /// Fields with no counterpart in the PDF (custom fields)
    pub fields_skipped: Vec<String>,
    /// Fields whose value could not be written
    pub failures: Vec<FieldApplyError>,
    /// Size of the filled PDF
    pub size_bytes: usize,
    /// Path where PDF was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionParams {
    pub session_id: String,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct PreviewFormResult {
    pub session_id: String,
    /// Resource URI to read the preview from
    pub preview_uri: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub failures: Vec<FieldApplyError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadFormParams {
    pub session_id: String,
    /// Directory to save into (defaults to the server's download directory)
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct DownloadFormResult {
    pub session_id: String,
    /// Saved file name (`<stem>_filled.pdf`)
    pub file_name: String,
    pub path: String,
    pub failures: Vec<FieldApplyError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ExportDebugResult {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<DebugSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct SessionActionResult {
    pub session_id: String,
    /// Whether there was anything to release
    pub released: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Pdf {
        reason: format!("Task join error: {}", e),
    }
}

fn respond<T: Serialize>(result: T) -> String {
    let response = serde_json::json!({ "results": [result] });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl FormServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new FormServer with specified resource directories
    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    /// Create a new FormServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let previews = PreviewStore::new(config.preview_max_entries, config.preview_max_bytes);
        let max_sessions = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Arc::new(parking_lot::Mutex::new(LruCache::new(max_sessions))),
            previews: Arc::new(previews),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Load a fillable PDF and open an editing session
    #[tool(
        description = "Load a fillable PDF and extract its form fields. Returns a session_id used by every other tool.

Each field has a name, type (text, checkbox, radio, dropdown, date, number), current value (boolean for checkboxes, string otherwise), placeholder, and options for dropdown/radio fields. Text fields are typed date/number from their names.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, or {\"base64\": \"...\"}. Maximum size is 50MB by default."
    )]
    async fn load_form(&self, Parameters(params): Parameters<LoadFormParams>) -> String {
        let result = self.process_load_form(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "load_form failed");
            LoadFormResult {
                source: Self::source_name(&params.source),
                error: Some(e.client_message()),
                ..Default::default()
            }
        });
        respond(result)
    }

    /// Set field values in a session
    #[tool(
        description = "Update field values in a form session. Checkbox values must be booleans; other values are strings. Dropdown and radio values must be one of the field's options (or \"\" to clear). Rejected updates are listed without stopping the others."
    )]
    async fn update_fields(&self, Parameters(params): Parameters<UpdateFieldsParams>) -> String {
        let result = self
            .process_update_fields(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "update_fields failed");
                UpdateFieldsResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Append a custom field
    #[tool(
        description = "Add a custom field to a form session. The name is trimmed and must be non-empty and unique. Custom fields are kept with the session but are not written into the PDF."
    )]
    async fn add_custom_field(
        &self,
        Parameters(params): Parameters<AddCustomFieldParams>,
    ) -> String {
        let result = self
            .process_add_custom_field(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "add_custom_field failed");
                FieldEditResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Remove a field without document options
    #[tool(
        description = "Remove a field from a form session. Dropdown and radio fields that came with options from the PDF cannot be removed."
    )]
    async fn remove_field(&self, Parameters(params): Parameters<RemoveFieldParams>) -> String {
        let result = self
            .process_remove_field(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "remove_field failed");
                FieldEditResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Fill the PDF with the session's values
    #[tool(
        description = "Write the session's field values into a copy of the loaded PDF.

Fields that cannot be written (e.g. a value that is not one of a dropdown's options) are reported in failures; the rest are still filled. Custom fields are reported in fields_skipped.

Optionally saves to output_path and/or returns the PDF as base64."
    )]
    async fn fill_form(&self, Parameters(params): Parameters<FillFormParams>) -> String {
        let result = self.process_fill_form(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "fill_form failed");
            FillFormResult {
                session_id: params.session_id.clone(),
                error: Some(e.client_message()),
                ..Default::default()
            }
        });
        respond(result)
    }

    /// Fill and publish the result as a preview resource
    #[tool(
        description = "Fill the PDF with the session's values and publish it as a preview resource (preview://<key>, application/pdf). Creating a preview replaces the session's previous one."
    )]
    async fn preview_form(&self, Parameters(params): Parameters<SessionParams>) -> String {
        let result = self.process_preview_form(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "preview_form failed");
            PreviewFormResult {
                session_id: params.session_id.clone(),
                error: Some(e.client_message()),
                ..Default::default()
            }
        });
        respond(result)
    }

    /// Release the session's preview
    #[tool(description = "Release the session's preview resource. Safe to call repeatedly.")]
    async fn revoke_preview(&self, Parameters(params): Parameters<SessionParams>) -> String {
        let result = self
            .process_revoke_preview(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "revoke_preview failed");
                SessionActionResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Save the filled PDF
    #[tool(
        description = "Fill the PDF and save it as <original name>_filled.pdf into a directory (the server's download directory by default). Returns the saved path."
    )]
    async fn download_form(&self, Parameters(params): Parameters<DownloadFormParams>) -> String {
        let result = self
            .process_download_form(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "download_form failed");
                DownloadFormResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Dump extraction details for troubleshooting
    #[tool(
        description = "Export a debug snapshot of the session as JSON: file name, page count, fields detected, counts per field type, fields with options, and each field's value, options and position."
    )]
    async fn export_debug(&self, Parameters(params): Parameters<SessionParams>) -> String {
        let result = self
            .process_export_debug(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "export_debug failed");
                ExportDebugResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }

    /// Discard a session
    #[tool(description = "Close a form session, discarding its document, edits and preview.")]
    async fn close_session(&self, Parameters(params): Parameters<SessionParams>) -> String {
        let result = self
            .process_close_session(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "close_session failed");
                SessionActionResult {
                    session_id: params.session_id.clone(),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        respond(result)
    }
}

impl FormServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::Url { url } => url.clone(),
        }
    }

    async fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedPdf> {
        let max_bytes = self.config.max_input_bytes;
        match source {
            PdfSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path, max_bytes)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64, max_bytes),
            PdfSource::Url { url } => {
                resolve_url(url, self.config.allow_private_urls, max_bytes).await
            }
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        self.within_resource_dirs(&canonical)
            .then_some(canonical)
            .ok_or_else(|| Error::PathAccessDenied {
                path: path.to_string(),
            })
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };

        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| denied())?;
        let canonical_target = match path_obj.file_name() {
            Some(name) => canonical_parent.join(name),
            None => return Err(denied()),
        };

        self.within_resource_dirs(&canonical_target)
            .then_some(canonical_target)
            .ok_or_else(denied)
    }

    fn within_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|canonical_dir| canonical.starts_with(&canonical_dir))
                .unwrap_or(false)
        })
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        self.validate_output_path_access(path_str)?;

        let path = Path::new(path_str);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, data)?;
        Ok(Some(path_str.clone()))
    }

    /// Look up a session and mark it as recently used
    fn session(&self, session_id: &str) -> crate::error::Result<Arc<Mutex<FormSession>>> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    pub async fn process_load_form(
        &self,
        params: &LoadFormParams,
    ) -> crate::error::Result<LoadFormResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name;
        let file_name = params.file_name.clone().unwrap_or(resolved.file_name);
        let data = resolved.data;
        let max_input_bytes = self.config.max_input_bytes;

        // Parse and extract: CPU-bound lopdf work
        let (processor, form) = tokio::task::spawn_blocking(move || {
            let mut processor = FormFieldProcessor::with_max_input_bytes(max_input_bytes);
            let form = processor.load(&data, &file_name)?;
            Ok::<_, Error>((processor, form))
        })
        .await
        .map_err(join_error)??;

        let session_id = uuid::Uuid::new_v4().to_string();
        let session = FormSession {
            processor,
            fields: form.fields.clone(),
            preview: None,
        };
        let progress = session.progress();

        let evicted = self
            .sessions
            .lock()
            .push(session_id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %session_id, source = %source_name, "Opened form session");

        if let Some((evicted_id, evicted)) = evicted {
            evicted.lock().await.close();
            tracing::info!(session_id = %evicted_id, "Closed least recently used form session");
        }

        Ok(LoadFormResult {
            source: source_name,
            session_id,
            file_name: form.file_name,
            page_count: form.page_count,
            fillable_fields_count: form.fillable_fields_count,
            fields: form.fields,
            progress: Some(progress),
            error: None,
        })
    }

    pub async fn process_update_fields(
        &self,
        params: &UpdateFieldsParams,
    ) -> crate::error::Result<UpdateFieldsResult> {
        let session = self.session(&params.session_id)?;
        let mut session = session.lock().await;

        let mut updated = 0;
        let mut rejected = Vec::new();
        for update in &params.updates {
            match update_value(&mut session.fields, &update.name, update.value.clone()) {
                Ok(()) => updated += 1,
                Err(Error::InvalidField { name, reason }) => {
                    tracing::debug!(field = %name, reason = %reason, "Rejected field update");
                    rejected.push(RejectedUpdate { name, reason });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(UpdateFieldsResult {
            session_id: params.session_id.clone(),
            updated,
            rejected,
            progress: Some(session.progress()),
            error: None,
        })
    }

    pub async fn process_add_custom_field(
        &self,
        params: &AddCustomFieldParams,
    ) -> crate::error::Result<FieldEditResult> {
        let session = self.session(&params.session_id)?;
        let mut session = session.lock().await;

        let field =
            add_custom_field(&mut session.fields, &params.name, params.kind, params.required)?
                .clone();

        Ok(FieldEditResult {
            session_id: params.session_id.clone(),
            field: Some(field),
            progress: Some(session.progress()),
            error: None,
        })
    }

    pub async fn process_remove_field(
        &self,
        params: &RemoveFieldParams,
    ) -> crate::error::Result<FieldEditResult> {
        let session = self.session(&params.session_id)?;
        let mut session = session.lock().await;

        let field = remove_field(&mut session.fields, &params.name)?;

        Ok(FieldEditResult {
            session_id: params.session_id.clone(),
            field: Some(field),
            progress: Some(session.progress()),
            error: None,
        })
    }

    pub async fn process_fill_form(
        &self,
        params: &FillFormParams,
    ) -> crate::error::Result<FillFormResult> {
        let session = self.session(&params.session_id)?.lock_owned().await;

        // Fill and serialize: CPU-bound lopdf work
        let outcome = tokio::task::spawn_blocking(move || session.processor.fill(&session.fields))
            .await
            .map_err(join_error)??;

        let output_path = self.write_output(&params.output_path, &outcome.bytes)?;
        let base64 = params
            .include_base64
            .then(|| base64::engine::general_purpose::STANDARD.encode(&outcome.bytes));

        Ok(FillFormResult {
            session_id: params.session_id.clone(),
            fields_filled: outcome.applied,
            fields_skipped: outcome.skipped,
            failures: outcome.failures,
            size_bytes: outcome.bytes.len(),
            output_path,
            base64,
            error: None,
        })
    }

    pub async fn process_preview_form(
        &self,
        params: &SessionParams,
    ) -> crate::error::Result<PreviewFormResult> {
        let mut session = self.session(&params.session_id)?.lock_owned().await;
        let store = Arc::clone(&self.previews);

        let (session, preview) = tokio::task::spawn_blocking(move || {
            // Free the old preview's budget before filling the new one
            session.release_preview();
            let preview = session.processor.preview(&session.fields, &store);
            (session, preview)
        })
        .await
        .map_err(join_error)?;
        let preview = preview?;

        let mut session = session;
        let preview_uri = preview.handle.uri();
        session.preview = Some(preview.handle);

        Ok(PreviewFormResult {
            session_id: params.session_id.clone(),
            preview_uri,
            mime_type: PDF_MEDIA_TYPE.to_string(),
            size_bytes: preview.size_bytes,
            failures: preview.failures,
            error: None,
        })
    }

    pub async fn process_revoke_preview(
        &self,
        params: &SessionParams,
    ) -> crate::error::Result<SessionActionResult> {
        let session = self.session(&params.session_id)?;
        let released = session.lock().await.release_preview();

        Ok(SessionActionResult {
            session_id: params.session_id.clone(),
            released,
            error: None,
        })
    }

    pub async fn process_download_form(
        &self,
        params: &DownloadFormParams,
    ) -> crate::error::Result<DownloadFormResult> {
        let directory = match &params.directory {
            Some(dir) => PathBuf::from(dir),
            None => self.config.download_dir.clone(),
        };
        let directory = self.validate_output_path_access(&directory.to_string_lossy())?;
        let target = DirectoryTarget::new(directory);

        let session = self.session(&params.session_id)?.lock_owned().await;

        let (path, failures) = tokio::task::spawn_blocking(move || {
            let outcome = session.processor.fill(&session.fields)?;
            let file_name = session.processor.file_name().unwrap_or_default().to_string();
            let path = session
                .processor
                .download(outcome.bytes, &file_name, &target)?;
            Ok::<_, Error>((path, outcome.failures))
        })
        .await
        .map_err(join_error)??;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DownloadFormResult {
            session_id: params.session_id.clone(),
            file_name,
            path: path.to_string_lossy().into_owned(),
            failures,
            error: None,
        })
    }

    pub async fn process_export_debug(
        &self,
        params: &SessionParams,
    ) -> crate::error::Result<ExportDebugResult> {
        let session = self.session(&params.session_id)?;
        let session = session.lock().await;

        let snapshot = DebugSnapshot::capture(
            session.processor.file_name().unwrap_or_default(),
            session.processor.page_count().unwrap_or(0),
            &session.fields,
        );
        Ok(ExportDebugResult {
            session_id: params.session_id.clone(),
            snapshot: Some(snapshot),
            error: None,
        })
    }

    pub async fn process_close_session(
        &self,
        params: &SessionParams,
    ) -> crate::error::Result<SessionActionResult> {
        let session = self
            .sessions
            .lock()
            .pop(&params.session_id)
            .ok_or_else(|| Error::SessionNotFound {
                session_id: params.session_id.clone(),
            })?;

        let released = session.lock().await.close();
        tracing::info!(session_id = %params.session_id, "Closed form session");

        Ok(SessionActionResult {
            session_id: params.session_id.clone(),
            released,
            error: None,
        })
    }

    /// Live previews as MCP resources
    fn preview_resources(&self) -> Vec<Annotated<RawResource>> {
        self.previews
            .entries()
            .into_iter()
            .map(|(key, size)| {
                let mut resource = RawResource::new(preview_uri(&key), format!("preview-{}.pdf", key));
                resource.mime_type = Some(PDF_MEDIA_TYPE.to_string());
                resource.description = Some(format!("Filled PDF preview ({} bytes)", size));
                resource.size = Some(size as u32);

                Annotated {
                    raw: resource,
                    annotations: None,
                }
            })
            .collect()
    }

    fn read_preview(&self, uri: &str) -> crate::error::Result<Vec<u8>> {
        let key = parse_preview_uri(uri).ok_or_else(|| Error::PreviewNotFound {
            key: uri.to_string(),
        })?;
        self.previews.get(key).ok_or_else(|| Error::PreviewNotFound {
            key: key.to_string(),
        })
    }
}

impl Default for FormServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for FormServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Form Filler loads fillable PDFs, lets you edit their fields and produces filled copies. \
                 Start with load_form; live previews are exposed as preview:// resources."
                    .into(),
            ),
        }
    }

    /// List live preview resources
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: self.preview_resources(),
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Read a preview as a base64 PDF blob
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = &request.uri;

        match self.read_preview(uri) {
            Ok(data) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::BlobResourceContents {
                    uri: uri.clone(),
                    mime_type: Some(PDF_MEDIA_TYPE.to_string()),
                    blob: base64::engine::general_purpose::STANDARD.encode(&data),
                    meta: Default::default(),
                }],
            }),
            Err(e) => {
                tracing::warn!(error = %e, "read_resource failed");
                Err(ErrorData::invalid_params(e.client_message(), None))
            }
        }
    }
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = FormServer::with_config(config);

    tracing::info!("PDF Form Filler ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
