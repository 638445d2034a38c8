//! In-memory thumbnail cache.
//!
//! The engine maps each source path to a small bucket of
//! `(display size, weak image)` entries. The cache itself never keeps an
//! image alive: requesters hold the strong references, and when the last
//! one goes away the [`Thumbnail`] drop hook removes its own entry (and
//! the bucket, if that was the last entry) under the engine lock. Memory
//! follows what the UI actually displays, with no separate eviction
//! policy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tracing::trace;

use super::backend::Image;
use super::Engine;

/// A scaled, shareable thumbnail delivered to requesters.
pub struct Thumbnail {
    image: Image,
    width: u32,
    height: u32,
    size: u16,
    path: PathBuf,
    engine: Weak<Engine>,
}

impl Thumbnail {
    pub(crate) fn new(
        engine: &Arc<Engine>,
        path: PathBuf,
        size: u16,
        image: Image,
        width: u32,
        height: u32,
    ) -> Arc<Thumbnail> {
        Arc::new(Thumbnail {
            image,
            width,
            height,
            size,
            path,
            engine: Arc::downgrade(engine),
        })
    }

    /// The backend image object, to hand to the toolkit for display.
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The display size this thumbnail was scaled for.
    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Thumbnail {
    fn drop(&mut self) {
        // Last strong reference gone; deregister. The engine may already be
        // finalized, in which case the map is gone too.
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let mut state = engine.state.lock();
        remove_entry(
            &mut state.cache,
            &self.path,
            self.size,
            self as *const Thumbnail,
        );
    }
}

#[derive(Default)]
pub(crate) struct CacheBucket {
    entries: Vec<CacheEntry>,
}

struct CacheEntry {
    size: u16,
    image: Weak<Thumbnail>,
}

/// Returns the cached image for `(path, size)` if one is still alive.
pub(crate) fn lookup(
    cache: &HashMap<PathBuf, CacheBucket>,
    path: &Path,
    size: u16,
) -> Option<Arc<Thumbnail>> {
    cache
        .get(path)?
        .entries
        .iter()
        .find(|entry| entry.size == size)?
        .image
        .upgrade()
}

/// Registers a freshly produced thumbnail.
///
/// If a live entry of the same size already exists, it wins and is
/// returned so all requesters share one image; the caller must release
/// the rejected thumbnail only after dropping the engine lock. A dead
/// entry (drop hook still pending) is displaced in place; its hook later
/// misses on the pointer comparison and leaves the new entry alone.
pub(crate) fn insert(
    cache: &mut HashMap<PathBuf, CacheBucket>,
    thumbnail: &Arc<Thumbnail>,
) -> Option<Arc<Thumbnail>> {
    let bucket = cache.entry(thumbnail.path.clone()).or_default();
    if let Some(entry) = bucket
        .entries
        .iter_mut()
        .find(|entry| entry.size == thumbnail.size)
    {
        if let Some(existing) = entry.image.upgrade() {
            return Some(existing);
        }
        entry.image = Arc::downgrade(thumbnail);
        return None;
    }
    trace!(path = %thumbnail.path.display(), size = thumbnail.size, "cached thumbnail");
    bucket.entries.push(CacheEntry {
        size: thumbnail.size,
        image: Arc::downgrade(thumbnail),
    });
    None
}

fn remove_entry(
    cache: &mut HashMap<PathBuf, CacheBucket>,
    path: &Path,
    size: u16,
    image: *const Thumbnail,
) {
    let Some(bucket) = cache.get_mut(path) else {
        return;
    };
    bucket
        .entries
        .retain(|entry| !(entry.size == size && Weak::as_ptr(&entry.image) == image));
    if bucket.entries.is_empty() {
        cache.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellable::Cancellable;
    use crate::mainloop::MainDispatcher;
    use crate::thumbnail::store::ThumbnailStore;
    use crate::thumbnail::EngineState;
    use parking_lot::Mutex;

    struct NullDispatcher;

    impl MainDispatcher for NullDispatcher {
        fn post(&self, _func: Box<dyn FnOnce() + Send>) {}
    }

    fn test_engine() -> Arc<Engine> {
        Arc::new(Engine {
            state: Mutex::new(EngineState::new()),
            dispatcher: Box::new(NullDispatcher),
            generator_cancellable: Cancellable::new(),
            store: ThumbnailStore::with_root(Path::new("/nonexistent/.thumbnails")),
        })
    }

    fn blank_image() -> Image {
        Arc::new(()) as Image
    }

    #[test]
    fn entries_self_evict_when_dropped() {
        let engine = test_engine();
        let path = PathBuf::from("/tmp/photo.jpg");

        let thumb = Thumbnail::new(&engine, path.clone(), 128, blank_image(), 128, 96);
        {
            let mut state = engine.state.lock();
            assert!(insert(&mut state.cache, &thumb).is_none());
            assert!(lookup(&state.cache, &path, 128).is_some());
            assert!(lookup(&state.cache, &path, 256).is_none());
        }

        drop(thumb);
        let state = engine.state.lock();
        assert!(state.cache.is_empty());
    }

    #[test]
    fn one_entry_per_size() {
        let engine = test_engine();
        let path = PathBuf::from("/tmp/photo.jpg");

        let first = Thumbnail::new(&engine, path.clone(), 128, blank_image(), 128, 96);
        let second = Thumbnail::new(&engine, path.clone(), 128, blank_image(), 128, 96);
        let other_size = Thumbnail::new(&engine, path.clone(), 96, blank_image(), 96, 72);

        let (canonical, _rejected) = {
            let mut state = engine.state.lock();
            assert!(insert(&mut state.cache, &first).is_none());
            let canonical = insert(&mut state.cache, &second);
            assert!(insert(&mut state.cache, &other_size).is_none());
            assert_eq!(state.cache.get(&path).unwrap().entries.len(), 2);
            (canonical, second)
        };
        // The earlier live entry wins.
        assert!(Arc::ptr_eq(&canonical.unwrap(), &first));
    }

    #[test]
    fn reinsert_after_eviction_registers_the_new_image() {
        let engine = test_engine();
        let path = PathBuf::from("/tmp/photo.jpg");

        let first = Thumbnail::new(&engine, path.clone(), 128, blank_image(), 128, 96);
        {
            let mut state = engine.state.lock();
            insert(&mut state.cache, &first);
        }
        drop(first);

        let second = Thumbnail::new(&engine, path.clone(), 128, blank_image(), 128, 96);
        {
            let mut state = engine.state.lock();
            assert!(insert(&mut state.cache, &second).is_none());
        }
        let found = {
            let state = engine.state.lock();
            lookup(&state.cache, &path, 128)
        };
        assert!(Arc::ptr_eq(&found.unwrap(), &second));
    }
}
