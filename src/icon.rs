//! Named icon handles.
//!
//! Icons are interned by themed name, so equality is pointer identity and
//! clones are cheap. Rendering icon names into pixel data is the job of the
//! embedding toolkit; this registry only guarantees that the same name
//! always yields the same handle.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static REGISTRY: Lazy<Mutex<HashMap<String, Icon>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone)]
pub struct Icon {
    name: Arc<str>,
}

impl Icon {
    /// Returns the interned icon handle for a themed icon name.
    pub fn from_name(name: &str) -> Icon {
        let mut registry = REGISTRY.lock();
        if let Some(icon) = registry.get(name) {
            return icon.clone();
        }
        let icon = Icon {
            name: Arc::from(name),
        };
        registry.insert(name.to_string(), icon.clone());
        icon
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Icon {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.name, &other.name)
    }
}

impl Eq for Icon {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_handles_are_identical() {
        let a = Icon::from_name("folder-music");
        let b = Icon::from_name("folder-music");
        let c = Icon::from_name("folder-videos");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name(), "folder-music");
    }
}
