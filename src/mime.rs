//! MIME type registry.
//!
//! MIME types are interned: one handle per type name for the lifetime of
//! the process, so identity comparison is enough to test for the well-known
//! types. Detection combines extension guessing (`mime_guess`) with content
//! sniffing (`infer`), the cheap check first.
//!
//! Each type also carries the list of external thumbnailer programs
//! registered for it, consumed by the thumbnail engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};

use crate::icon::Icon;
use crate::thumbnail::thumbnailer::Thumbnailer;

static REGISTRY: Lazy<Mutex<HashMap<String, MimeType>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct MimeInner {
    name: String,
    icon: OnceCell<Icon>,
    thumbnailers: RwLock<Vec<Arc<Thumbnailer>>>,
}

#[derive(Clone)]
pub struct MimeType {
    inner: Arc<MimeInner>,
}

impl MimeType {
    /// Returns the interned handle for a MIME type name.
    pub fn from_name(name: &str) -> MimeType {
        let mut registry = REGISTRY.lock();
        if let Some(mime) = registry.get(name) {
            return mime.clone();
        }
        let mime = MimeType {
            inner: Arc::new(MimeInner {
                name: name.to_string(),
                icon: OnceCell::new(),
                thumbnailers: RwLock::new(Vec::new()),
            }),
        };
        registry.insert(name.to_string(), mime.clone());
        mime
    }

    /// Detects the MIME type of a native file.
    ///
    /// Directories map to `inode/directory`. Regular files are guessed from
    /// the extension first; when that is inconclusive the file content is
    /// sniffed. Unrecognised files fall back to
    /// `application/octet-stream`.
    pub fn from_native_file(path: &Path) -> MimeType {
        if path.is_dir() {
            return Self::inode_directory();
        }
        // Desktop entries are a freedesktop notion generic extension
        // tables miss.
        if path.extension().is_some_and(|ext| ext == "desktop") {
            return Self::application_x_desktop();
        }
        if let Some(guess) = mime_guess::from_path(path).first() {
            return Self::from_name(guess.essence_str());
        }
        if let Ok(Some(kind)) = infer::get_from_path(path) {
            return Self::from_name(kind.mime_type());
        }
        Self::octet_stream()
    }

    /// Guesses a MIME type from a file name alone, without touching disk.
    pub fn from_file_name(name: &str) -> Option<MimeType> {
        if name.ends_with(".desktop") {
            return Some(Self::application_x_desktop());
        }
        mime_guess::from_path(name)
            .first()
            .map(|guess| Self::from_name(guess.essence_str()))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The themed icon for this type, following the icon naming
    /// convention of replacing `/` with `-`.
    pub fn icon(&self) -> Icon {
        self.inner
            .icon
            .get_or_init(|| Icon::from_name(&self.inner.name.replace('/', "-")))
            .clone()
    }

    pub fn is_image(&self) -> bool {
        self.inner.name.starts_with("image/")
    }

    pub fn is_text(&self) -> bool {
        self.inner.name.starts_with("text/")
    }

    /// Whether content of this type may be an executable program.
    pub fn can_be_executable(&self) -> bool {
        self.is_text()
            || matches!(
                self.inner.name.as_str(),
                "application/x-executable"
                    | "application/x-sharedlib"
                    | "application/x-shellscript"
                    | "application/x-sh"
                    | "application/x-ms-dos-executable"
            )
    }

    pub fn is_unknown(&self) -> bool {
        self.inner.name == "application/octet-stream"
    }

    /// Registered external thumbnailers for this type, in registration
    /// order.
    pub fn thumbnailers(&self) -> Vec<Arc<Thumbnailer>> {
        self.inner.thumbnailers.read().clone()
    }

    pub fn add_thumbnailer(&self, thumbnailer: Arc<Thumbnailer>) {
        self.inner.thumbnailers.write().push(thumbnailer);
    }

    pub fn remove_thumbnailer(&self, id: &str) {
        self.inner.thumbnailers.write().retain(|t| t.id() != id);
    }

    pub fn inode_directory() -> MimeType {
        Self::from_name("inode/directory")
    }

    pub fn x_shortcut() -> MimeType {
        Self::from_name("inode/x-shortcut")
    }

    pub fn x_mountable() -> MimeType {
        Self::from_name("inode/x-mountable")
    }

    pub fn application_x_desktop() -> MimeType {
        Self::from_name("application/x-desktop")
    }

    pub fn octet_stream() -> MimeType {
        Self::from_name("application/octet-stream")
    }
}

impl PartialEq for MimeType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MimeType {}

impl std::fmt::Debug for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MimeType").field(&self.inner.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_yields_identity() {
        let a = MimeType::from_name("image/png");
        let b = MimeType::from_name("image/png");
        assert_eq!(a, b);
        assert_ne!(a, MimeType::from_name("image/jpeg"));
    }

    #[test]
    fn icon_name_from_type() {
        let mime = MimeType::from_name("text/plain");
        assert_eq!(mime.icon().name(), "text-plain");
    }

    #[test]
    fn predicates() {
        assert!(MimeType::from_name("image/jpeg").is_image());
        assert!(MimeType::from_name("text/x-python").is_text());
        assert!(MimeType::from_name("text/x-python").can_be_executable());
        assert!(MimeType::from_name("application/x-executable").can_be_executable());
        assert!(!MimeType::from_name("image/png").can_be_executable());
        assert!(MimeType::octet_stream().is_unknown());
    }

    #[test]
    fn from_file_name_guesses_by_extension() {
        let mime = MimeType::from_file_name("clip.mkv").unwrap();
        assert!(mime.name().starts_with("video/"));
        assert!(MimeType::from_file_name("no-extension").is_none());
    }
}
