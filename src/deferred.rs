//! Deferred MIME-type resolution.
//!
//! When `defer_mime_type_loading` is on, native file-info construction does
//! not sniff content types inline; descriptors are queued here and a
//! lazily spawned worker resolves them off the critical path. Descriptors
//! are held weakly: if every consumer drops one before the worker reaches
//! it, the work is skipped.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use crate::file_info::FileInfo;

struct LoaderState {
    queue: VecDeque<Weak<FileInfo>>,
    running: bool,
}

static LOADER: Lazy<Mutex<LoaderState>> = Lazy::new(|| {
    Mutex::new(LoaderState {
        queue: VecDeque::new(),
        running: false,
    })
});

/// Queues a descriptor for background MIME resolution, starting the worker
/// if it is not running.
pub(crate) fn schedule(fi: &Arc<FileInfo>) {
    let mut state = LOADER.lock();
    state.queue.push_back(Arc::downgrade(fi));
    if !state.running {
        state.running = true;
        let spawned = thread::Builder::new()
            .name("fm-deferred-load".into())
            .spawn(worker);
        if spawned.is_err() {
            state.running = false;
        }
    }
}

fn worker() {
    loop {
        let next = {
            let mut state = LOADER.lock();
            match state.queue.pop_front() {
                Some(weak) => weak,
                None => {
                    state.running = false;
                    return;
                }
            }
        };
        if let Some(fi) = next.upgrade() {
            trace!(path = %fi.path().display(), "deferred mime load");
            let _ = fi.mime_type();
        }
    }
}
