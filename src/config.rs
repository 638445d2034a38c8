//! Library-wide configuration.
//!
//! A single process-wide [`Config`] instance drives the behaviors that the
//! embedding file manager exposes as user preferences. Readers take a cheap
//! snapshot with [`get`]; the UI layer applies preference changes through
//! [`update`].

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Options recognised by the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Skip built-in thumbnail generation for sources larger than this
    /// many KiB. 0 means no limit.
    pub thumbnail_max_kb: u32,
    /// Use SI units (base 1000) instead of binary units (base 1024) when
    /// formatting file sizes.
    pub si_unit: bool,
    /// Resolve MIME types on a background loader instead of at file-info
    /// construction time.
    pub defer_mime_type_loading: bool,
    /// Treat `~`-suffixed backup files as hidden.
    pub backup_as_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thumbnail_max_kb: 2048,
            si_unit: false,
            defer_mime_type_loading: false,
            backup_as_hidden: false,
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Returns a snapshot of the current configuration.
pub fn get() -> Config {
    CONFIG.read().clone()
}

/// Applies a change to the process-wide configuration.
pub fn update(f: impl FnOnce(&mut Config)) {
    let mut cfg = CONFIG.write();
    f(&mut cfg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.thumbnail_max_kb, 2048);
        assert!(!cfg.si_unit);
        assert!(!cfg.defer_mime_type_loading);
        assert!(!cfg.backup_as_hidden);
    }
}
