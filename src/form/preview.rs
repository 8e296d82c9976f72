//! Transient preview handles

use crate::source::PreviewStore;
use std::fmt;
use std::sync::Arc;

/// Media type of every stored preview
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

const URI_SCHEME: &str = "preview://";

/// Resource URI for a preview key
pub fn preview_uri(key: &str) -> String {
    format!("{}{}", URI_SCHEME, key)
}

/// Key part of a `preview://` URI
pub fn parse_preview_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(URI_SCHEME).filter(|key| !key.is_empty())
}

/// Scoped reference to filled bytes in a [`PreviewStore`].
///
/// The bytes stay addressable until [`release`](Self::release) is called or
/// the handle is dropped, whichever comes first.
pub struct PreviewHandle {
    store: Arc<PreviewStore>,
    key: String,
    released: bool,
}

impl PreviewHandle {
    pub(crate) fn new(store: Arc<PreviewStore>, key: String) -> Self {
        Self {
            store,
            key,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn uri(&self) -> String {
        preview_uri(&self.key)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drop the stored bytes. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.store.remove(&self.key).is_some() {
            tracing::debug!(key = %self.key, "Released preview");
        }
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(data: &[u8]) -> (Arc<PreviewStore>, PreviewHandle) {
        let store = Arc::new(PreviewStore::new(4, 1024));
        let key = store.insert(data.to_vec()).unwrap();
        let handle = PreviewHandle::new(Arc::clone(&store), key);
        (store, handle)
    }

    #[test]
    fn test_uri_round_trip() {
        let uri = preview_uri("abc");
        assert_eq!(uri, "preview://abc");
        assert_eq!(parse_preview_uri(&uri), Some("abc"));
        assert_eq!(parse_preview_uri("preview://"), None);
        assert_eq!(parse_preview_uri("file:///tmp/x.pdf"), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (store, mut handle) = store_with(b"%PDF-1.7");
        assert!(store.contains(handle.key()));

        handle.release();
        handle.release();

        assert!(handle.is_released());
        assert!(store.is_empty());
    }

    #[test]
    fn test_drop_releases() {
        let (store, handle) = store_with(b"%PDF-1.7");
        let key = handle.key().to_string();
        drop(handle);
        assert!(!store.contains(&key));
    }

    #[test]
    fn test_release_after_eviction() {
        let (store, mut handle) = store_with(b"%PDF-1.7");
        store.remove(handle.key());
        handle.release();
        assert!(handle.is_released());
    }
}
