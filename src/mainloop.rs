//! The "post to main" primitive.
//!
//! The engine never runs user callbacks on its worker thread. Completed
//! requests are queued and a closure that drains them is handed to a
//! [`MainDispatcher`] installed at engine init. The embedding UI decides
//! what "the main thread" means: a GTK idle source, a winit event-loop
//! proxy, or the bundled [`channel`] pair for plain event loops and tests.

use std::sync::mpsc::{self, Receiver, Sender};

/// Posts closures onto the thread that owns the UI event loop.
///
/// Implementations must execute posted closures on a single thread, the
/// one the application calls [`crate::thumbnail::load`] from, and should
/// run them at low priority relative to input handling.
pub trait MainDispatcher: Send + Sync {
    fn post(&self, func: Box<dyn FnOnce() + Send>);
}

/// Creates a channel-backed dispatcher for hosts without a native
/// idle-callback mechanism. The returned [`MainLoopQueue`] is pumped from
/// the main thread.
pub fn channel() -> (ChannelDispatcher, MainLoopQueue) {
    let (tx, rx) = mpsc::channel();
    (ChannelDispatcher { tx }, MainLoopQueue { rx })
}

#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: Sender<Box<dyn FnOnce() + Send>>,
}

impl MainDispatcher for ChannelDispatcher {
    fn post(&self, func: Box<dyn FnOnce() + Send>) {
        // The receiver disappearing means the main loop already shut down;
        // the closure is dropped with it.
        let _ = self.tx.send(func);
    }
}

pub struct MainLoopQueue {
    rx: Receiver<Box<dyn FnOnce() + Send>>,
}

impl MainLoopQueue {
    /// Runs every closure posted so far. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(func) = self.rx.try_recv() {
            func();
            ran += 1;
        }
        ran
    }
}
