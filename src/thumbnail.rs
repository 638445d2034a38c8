//! Thumbnail caching and generation engine.
//!
//! The engine mediates between a UI that wants a scaled preview for a
//! file and the slow machinery that produces one: the on-disk thumbnail
//! store, the built-in image generator and external per-MIME helper
//! programs. Concurrent requests for one file share a single task, every
//! `(path, size)` pair is served by at most one in-memory image, and all
//! results are delivered back on the caller's thread in bounded batches.
//!
//! Lifecycle: install an [`ImageBackend`] once with [`set_backend`], call
//! [`init`] with the host's [`MainDispatcher`], then [`load`] away. The
//! single loader worker is started on demand and exits when its queue
//! drains; [`finalize`] cancels everything in flight.
//!
//! ```no_run
//! use fmcore::file_info::FileInfo;
//! use fmcore::thumbnail::{self, RasterBackend, SourceRef};
//!
//! # fn example() -> fmcore::FmResult<()> {
//! thumbnail::set_backend(Box::new(RasterBackend));
//! let (dispatcher, main_queue) = fmcore::mainloop::channel();
//! thumbnail::init(Box::new(dispatcher))?;
//!
//! let fi = FileInfo::from_native_file("/home/user/Pictures/cat.jpg".as_ref())?;
//! let request = thumbnail::load(SourceRef::from_file_info(&fi), 96, |req| {
//!     if let Some(thumb) = req.result() {
//!         println!("{}x{}", thumb.width(), thumb.height());
//!     }
//! });
//! // ... pump main_queue.run_pending() from the event loop ...
//! # drop(request); Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cancellable::Cancellable;
use crate::config;
use crate::error::{FmError, FmResult, IOErrorEnum};
use crate::file_info::FileInfo;
use crate::mainloop::MainDispatcher;

pub mod backend;
pub mod cache;
mod generator;
pub mod store;
pub mod thumbnailer;

pub use backend::{set_backend, Image, ImageBackend, RasterBackend};
pub use cache::Thumbnail;
pub use store::ThumbnailStore;
pub use thumbnailer::Thumbnailer;

use cache::CacheBucket;

/// Display sizes at or below this use the normal (128 px) on-disk class;
/// anything above uses the large (256 px) class.
const NORMAL_CLASS_MAX: u16 = 128;

/// Callbacks delivered per idle batch before the drain re-arms.
const READY_BATCH: usize = 200;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct TaskFlags: u8 {
        const LOAD_NORMAL = 1 << 0;
        const LOAD_LARGE = 1 << 1;
        const GENERATE_NORMAL = 1 << 2;
        const GENERATE_LARGE = 1 << 3;
    }
}

impl TaskFlags {
    fn generate_any() -> TaskFlags {
        TaskFlags::GENERATE_NORMAL | TaskFlags::GENERATE_LARGE
    }
}

/// Immutable snapshot of the fields a thumbnailing job needs from a file.
pub struct SourceRef {
    path: PathBuf,
    mtime: i64,
    size: u64,
    mime: Option<crate::mime::MimeType>,
    is_image: bool,
}

impl SourceRef {
    pub fn from_file_info(fi: &FileInfo) -> Arc<SourceRef> {
        Arc::new(SourceRef {
            path: fi.path().to_path_buf(),
            mtime: fi.mtime(),
            size: fi.size(),
            mime: fi.mime_type(),
            is_image: fi.is_image(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime(&self) -> Option<crate::mime::MimeType> {
        self.mime.clone()
    }

    pub fn is_image(&self) -> bool {
        self.is_image
    }
}

type Callback = Box<dyn FnOnce(&ThumbnailRequest) + Send>;

/// Per-caller ticket for one `(path, size)` pair.
///
/// Returned by [`load`]; pass it to [`cancel`] to withdraw the request.
/// Once the callback has fired, [`result`](Self::result) stays readable
/// for as long as the caller keeps the handle.
pub struct ThumbnailRequest {
    source: Arc<SourceRef>,
    size: u16,
    callback: Mutex<Option<Callback>>,
    cancelled: AtomicBool,
    done: AtomicBool,
    result: Mutex<Option<Arc<Thumbnail>>>,
    task: Mutex<Option<Weak<Task>>>,
}

impl ThumbnailRequest {
    /// The source snapshot this request is for.
    pub fn source(&self) -> &Arc<SourceRef> {
        &self.source
    }

    /// The requested display size in pixels.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// The produced thumbnail; `None` until the callback fires, and still
    /// `None` afterwards when every producer failed.
    pub fn result(&self) -> Option<Arc<Thumbnail>> {
        self.result.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_result(&self, thumbnail: Option<Arc<Thumbnail>>) {
        *self.result.lock() = thumbnail;
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Deduplicated unit of work for one source path. Carries every live
/// request for that path until the worker finishes or the task is
/// cancelled.
pub(crate) struct Task {
    source: Arc<SourceRef>,
    flags: Mutex<TaskFlags>,
    cancelled: AtomicBool,
    locked: AtomicBool,
    requests: Mutex<Vec<Arc<ThumbnailRequest>>>,
}

impl Task {
    fn new(source: Arc<SourceRef>) -> Task {
        Task {
            source,
            flags: Mutex::new(TaskFlags::empty()),
            cancelled: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }
}

pub(crate) struct EngineState {
    loader_queue: VecDeque<Arc<Task>>,
    /// The task the worker holds right now. Kept out of the queue so task
    /// lookup never attaches to it.
    cur_loading: Option<Arc<Task>>,
    ready_queue: VecDeque<Arc<ThumbnailRequest>>,
    ready_armed: bool,
    worker_running: bool,
    pub(crate) cache: HashMap<PathBuf, CacheBucket>,
    /// Pid of the single external thumbnailer allowed in flight.
    pub(crate) thumbnailer_pid: Option<i32>,
}

impl EngineState {
    pub(crate) fn new() -> EngineState {
        EngineState {
            loader_queue: VecDeque::new(),
            cur_loading: None,
            ready_queue: VecDeque::new(),
            ready_armed: false,
            worker_running: false,
            cache: HashMap::new(),
            thumbnailer_pid: None,
        }
    }
}

pub(crate) struct Engine {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) dispatcher: Box<dyn MainDispatcher>,
    pub(crate) generator_cancellable: Cancellable,
    pub(crate) store: ThumbnailStore,
}

static ENGINE: Lazy<Mutex<Option<Arc<Engine>>>> = Lazy::new(|| Mutex::new(None));

fn engine() -> Option<Arc<Engine>> {
    ENGINE.lock().clone()
}

/// Initializes the engine with the conventional store under the user's
/// home directory.
pub fn init(dispatcher: Box<dyn MainDispatcher>) -> FmResult<()> {
    let store = ThumbnailStore::new_default().ok_or_else(|| {
        FmError::new(IOErrorEnum::NotFound, "cannot determine home directory")
    })?;
    init_with_store(dispatcher, store)
}

/// Initializes the engine with an explicit thumbnail store.
pub fn init_with_store(dispatcher: Box<dyn MainDispatcher>, store: ThumbnailStore) -> FmResult<()> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(FmError::new(
            IOErrorEnum::Exists,
            "thumbnail engine already initialized",
        ));
    }
    *slot = Some(Arc::new(Engine {
        state: Mutex::new(EngineState::new()),
        dispatcher,
        generator_cancellable: Cancellable::new(),
        store,
    }));
    Ok(())
}

/// Shuts the engine down: every in-flight request is cancelled, the
/// helper process (if any) is killed and no callback fires afterwards.
/// The worker thread observes the cancellation and exits on its own;
/// shared images survive as long as their holders keep them.
pub fn finalize() {
    let Some(engine) = ENGINE.lock().take() else {
        return;
    };
    let dropped: Vec<Arc<ThumbnailRequest>> = {
        let mut state = engine.state.lock();
        engine.generator_cancellable.cancel();
        if let Some(pid) = state.thumbnailer_pid.take() {
            unsafe { libc::kill(pid, libc::SIGTERM) };
        }
        if let Some(cur) = &state.cur_loading {
            cur.cancelled.store(true, Ordering::SeqCst);
            for request in cur.requests.lock().iter() {
                request.cancelled.store(true, Ordering::SeqCst);
            }
        }
        let mut dropped = Vec::new();
        while let Some(task) = state.loader_queue.pop_front() {
            task.cancelled.store(true, Ordering::SeqCst);
            for request in task.requests.lock().drain(..) {
                request.cancelled.store(true, Ordering::SeqCst);
                *request.task.lock() = None;
                dropped.push(request);
            }
        }
        for request in state.ready_queue.drain(..) {
            request.cancelled.store(true, Ordering::SeqCst);
            dropped.push(request);
        }
        state.ready_armed = false;
        state.cache.clear();
        dropped
    };
    // Handles may hold the last reference to cached images; their drop
    // hooks take the engine lock, so release them only after the guard.
    drop(dropped);
    debug!("thumbnail engine finalized");
}

/// Schedules loading or generation of a thumbnail for `source` at
/// `size` pixels.
///
/// The callback fires exactly once, on the dispatcher's thread, unless
/// the request is cancelled first. A `None` result signals that no
/// thumbnail could be produced. Returns `None` only when the engine is
/// not initialized.
pub fn load(
    source: Arc<SourceRef>,
    size: u16,
    callback: impl FnOnce(&ThumbnailRequest) + Send + 'static,
) -> Option<Arc<ThumbnailRequest>> {
    let Some(engine) = engine() else {
        warn!("thumbnail::load called before init");
        return None;
    };

    let request = Arc::new(ThumbnailRequest {
        source,
        size,
        callback: Mutex::new(Some(Box::new(callback))),
        cancelled: AtomicBool::new(false),
        done: AtomicBool::new(false),
        result: Mutex::new(None),
        task: Mutex::new(None),
    });
    trace!(path = %request.source.path().display(), size, "thumbnail requested");

    let mut state = engine.state.lock();

    if let Some(thumbnail) = cache::lookup(&state.cache, request.source.path(), size) {
        trace!(path = %request.source.path().display(), size, "memory cache hit");
        request.set_result(Some(thumbnail));
        state.ready_queue.push_back(request.clone());
        arm_ready_drain(&engine, &mut state);
        return Some(request);
    }

    let task = match find_queued_task(&state.loader_queue, request.source.path()) {
        Some(task) => task,
        None => {
            let task = Arc::new(Task::new(request.source.clone()));
            state.loader_queue.push_back(task.clone());
            task
        }
    };
    *request.task.lock() = Some(Arc::downgrade(&task));
    let class = if size > NORMAL_CLASS_MAX {
        TaskFlags::LOAD_LARGE
    } else {
        TaskFlags::LOAD_NORMAL
    };
    *task.flags.lock() |= class;
    task.requests.lock().push(request.clone());

    spawn_worker_if_needed(&engine, &mut state);
    Some(request)
}

/// Cancels a request. The callback will not be invoked afterwards. When
/// every request of the underlying task is cancelled the task itself is
/// cancelled, aborting any running generation and external helper.
/// Idempotent.
pub fn cancel(request: &ThumbnailRequest) {
    request.cancelled.store(true, Ordering::SeqCst);
    let Some(engine) = engine() else {
        return;
    };
    let state = engine.state.lock();

    let task = request.task.lock().as_ref().and_then(Weak::upgrade);
    let Some(task) = task else {
        return;
    };
    if task
        .requests
        .lock()
        .iter()
        .any(|r| !r.cancelled.load(Ordering::SeqCst))
    {
        return;
    }
    task.cancelled.store(true, Ordering::SeqCst);

    let is_current = state
        .cur_loading
        .as_ref()
        .is_some_and(|cur| Arc::ptr_eq(cur, &task));
    if is_current {
        debug!(path = %task.source.path().display(), "cancelling running task");
        engine.generator_cancellable.cancel();
        let mut state = state;
        if let Some(pid) = state.thumbnailer_pid.take() {
            unsafe { libc::kill(pid, libc::SIGTERM) };
        }
    }
}

/// An open task for `path`: still queued, not cancelled, not yet taken by
/// the worker.
fn find_queued_task(queue: &VecDeque<Arc<Task>>, path: &Path) -> Option<Arc<Task>> {
    queue
        .iter()
        .find(|task| {
            !task.cancelled.load(Ordering::SeqCst)
                && !task.locked.load(Ordering::SeqCst)
                && task.source.path() == path
        })
        .cloned()
}

fn arm_ready_drain(engine: &Arc<Engine>, state: &mut EngineState) {
    if state.ready_armed {
        return;
    }
    state.ready_armed = true;
    let drain_engine = engine.clone();
    engine
        .dispatcher
        .post(Box::new(move || drain_ready(&drain_engine)));
}

/// Drains up to [`READY_BATCH`] completed requests, firing callbacks for
/// the ones not cancelled. Runs on the dispatcher's thread; re-posts
/// itself while work remains.
fn drain_ready(engine: &Arc<Engine>) {
    let mut budget = READY_BATCH;
    loop {
        let request = {
            let mut state = engine.state.lock();
            match state.ready_queue.pop_front() {
                Some(request) => request,
                None => {
                    state.ready_armed = false;
                    return;
                }
            }
        };
        if !request.cancelled.load(Ordering::SeqCst) {
            if let Some(callback) = request.callback.lock().take() {
                callback(&request);
            }
        }
        // The handle (and possibly the last image reference) is released
        // here, outside the lock.
        drop(request);

        budget -= 1;
        if budget == 0 {
            let mut state = engine.state.lock();
            if state.ready_queue.is_empty() {
                state.ready_armed = false;
            } else {
                let drain_engine = engine.clone();
                engine
                    .dispatcher
                    .post(Box::new(move || drain_ready(&drain_engine)));
            }
            return;
        }
    }
}

/// Moves every request of a finished task to the ready queue. Called with
/// the state lock held.
fn free_task(engine: &Arc<Engine>, state: &mut EngineState, task: &Arc<Task>) {
    let mut pushed = false;
    for request in task.requests.lock().drain(..) {
        *request.task.lock() = None;
        state.ready_queue.push_back(request);
        pushed = true;
    }
    if pushed {
        arm_ready_drain(engine, state);
    }
}

fn spawn_worker_if_needed(engine: &Arc<Engine>, state: &mut EngineState) {
    if state.worker_running {
        return;
    }
    let worker_engine = engine.clone();
    let spawned = thread::Builder::new()
        .name("fm-thumbnail-loader".into())
        .spawn(move || worker_loop(worker_engine));
    match spawned {
        Ok(_) => state.worker_running = true,
        Err(err) => warn!(%err, "failed to spawn thumbnail loader"),
    }
}

/// The single loader worker. Pops tasks, resolves them in two cycles
/// (load from disk, then generate if stale or missing) and exits when the
/// queue drains; [`load`] starts a fresh worker on demand.
fn worker_loop(engine: Arc<Engine>) {
    if let Err(err) = engine.store.ensure_dirs() {
        warn!(%err, "cannot create thumbnail directories");
    }
    debug!("thumbnail loader started");

    loop {
        let task = {
            let mut state = engine.state.lock();
            match state.loader_queue.pop_front() {
                Some(task) => {
                    // Once locked, late requesters must open a new task.
                    task.locked.store(true, Ordering::SeqCst);
                    state.cur_loading = Some(task.clone());
                    task
                }
                None => {
                    state.worker_running = false;
                    state.cur_loading = None;
                    debug!("thumbnail loader idle, exiting");
                    return;
                }
            }
        };

        let uri = store::path_to_uri(task.source.path());
        let md5 = store::md5_hex(&uri);
        let normal_path = engine.store.normal_path(&md5);
        let large_path = engine.store.large_path(&md5);

        let flags = *task.flags.lock();
        if flags.intersects(TaskFlags::generate_any()) {
            generate_thumbnails(&engine, &task, &uri, &normal_path, &large_path);
        } else {
            load_thumbnails(&engine, &task, &normal_path, &large_path);
        }

        let mut state = engine.state.lock();
        state.cur_loading = None;
        if engine.generator_cancellable.is_cancelled() {
            debug!("thumbnail generation cancelled");
            engine.generator_cancellable.reset();
        }
        let needs_generation = task.flags.lock().intersects(TaskFlags::generate_any());
        if task.cancelled.load(Ordering::SeqCst) || !needs_generation {
            free_task(&engine, &mut state, &task);
        } else {
            // Second cycle runs after any queued load-only tasks, so a
            // burst of cache hits is served before expensive generation.
            state.loader_queue.push_back(task.clone());
        }
    }
}

/// First cycle: try the on-disk PNGs for each requested class. Stale or
/// missing files flip the task into the generation cycle.
fn load_thumbnails(engine: &Arc<Engine>, task: &Arc<Task>, normal_path: &Path, large_path: &Path) {
    let mut normal_pix: Option<Image> = None;
    let mut large_pix: Option<Image> = None;

    if let Some(backend) = backend::installed() {
        let flags = *task.flags.lock();
        let mtime = task.source.mtime();
        trace!(path = %task.source.path().display(), "loading cached thumbnails");

        if flags.contains(TaskFlags::LOAD_NORMAL) && !task.cancelled.load(Ordering::SeqCst) {
            normal_pix = backend
                .read_from_file(normal_path)
                .ok()
                .filter(|pix| !store::is_thumbnail_outdated(backend, pix, normal_path, mtime));
            if normal_pix.is_none() {
                *task.flags.lock() |= TaskFlags::GENERATE_NORMAL;
            }
        }

        if flags.contains(TaskFlags::LOAD_LARGE) && !task.cancelled.load(Ordering::SeqCst) {
            large_pix = backend
                .read_from_file(large_path)
                .ok()
                .filter(|pix| !store::is_thumbnail_outdated(backend, pix, large_path, mtime));
            if large_pix.is_none() {
                *task.flags.lock() |= TaskFlags::GENERATE_LARGE;
            }
        }
    }

    if !task.cancelled.load(Ordering::SeqCst) && !task.requests.lock().is_empty() {
        finish_task(engine, task, normal_pix.as_ref(), large_pix.as_ref());
    }
}

/// Second cycle: produce whatever the load cycle could not serve.
fn generate_thumbnails(
    engine: &Arc<Engine>,
    task: &Arc<Task>,
    uri: &str,
    normal_path: &Path,
    large_path: &Path,
) {
    if let Some(backend) = backend::installed() {
        if task.source.is_image() {
            let max_kb = config::get().thumbnail_max_kb as u64;
            if max_kb == 0 || task.source.size() <= (max_kb << 10) {
                let flags = *task.flags.lock();
                let (normal, large) = generator::generate_with_builtin(
                    backend,
                    &task.source,
                    flags,
                    normal_path,
                    large_path,
                    uri,
                    &engine.generator_cancellable,
                );
                finish_task(engine, task, normal.as_ref(), large.as_ref());
            }
            // Oversized images are skipped entirely; requesters get no
            // result.
        } else {
            let (normal, large) =
                generate_with_thumbnailers(engine, backend, task, uri, normal_path, large_path);
            finish_task(engine, task, normal.as_ref(), large.as_ref());
        }
    }
    // Fully done now; the worker loop frees the task on this mark.
    task.cancelled.store(true, Ordering::SeqCst);
}

fn generate_with_thumbnailers(
    engine: &Arc<Engine>,
    backend: &dyn ImageBackend,
    task: &Arc<Task>,
    uri: &str,
    normal_path: &Path,
    large_path: &Path,
) -> (Option<Image>, Option<Image>) {
    let mut normal: Option<Image> = None;
    let mut large: Option<Image> = None;

    let Some(mime) = task.source.mime() else {
        return (None, None);
    };
    let wanted = *task.flags.lock() & TaskFlags::generate_any();
    let mut generated = TaskFlags::empty();

    for thumbnailer in mime.thumbnailers() {
        if task.cancelled.load(Ordering::SeqCst) {
            break;
        }
        if wanted.contains(TaskFlags::GENERATE_NORMAL)
            && !generated.contains(TaskFlags::GENERATE_NORMAL)
            && thumbnailer::run(engine, &thumbnailer, uri, normal_path, 128)
        {
            generated |= TaskFlags::GENERATE_NORMAL;
            normal = backend.read_from_file(normal_path).ok();
        }
        if wanted.contains(TaskFlags::GENERATE_LARGE)
            && !generated.contains(TaskFlags::GENERATE_LARGE)
            && thumbnailer::run(engine, &thumbnailer, uri, large_path, 256)
        {
            generated |= TaskFlags::GENERATE_LARGE;
            large = backend.read_from_file(large_path).ok();
        }
        if generated == wanted {
            break;
        }
    }
    (normal, large)
}

/// Scales the class images to each requester's size and publishes the
/// results. Requests are walked in ascending size order so consecutive
/// equal sizes share one scaled image.
fn finish_task(
    engine: &Arc<Engine>,
    task: &Arc<Task>,
    normal_pix: Option<&Image>,
    large_pix: Option<&Image>,
) {
    let requests: Vec<Arc<ThumbnailRequest>> = {
        let mut requests = task.requests.lock();
        requests.sort_by_key(|r| r.size);
        requests.clone()
    };
    let Some(backend) = backend::installed() else {
        return;
    };

    let mut last: Option<(u16, Option<Arc<Thumbnail>>)> = None;
    for request in requests {
        if request.done.load(Ordering::SeqCst) || request.cancelled.load(Ordering::SeqCst) {
            continue;
        }
        if let Some((last_size, last_thumb)) = &last {
            if *last_size == request.size {
                trace!(size = request.size, "sharing scaled thumbnail");
                request.set_result(last_thumb.clone());
                continue;
            }
        }

        let class_pix = if request.size <= NORMAL_CLASS_MAX {
            normal_pix
        } else {
            large_pix
        };
        let thumbnail = class_pix
            .and_then(|pix| generator::scale_image(backend, pix, request.size as u32).ok())
            .map(|pix| {
                let width = backend.width(&pix);
                let height = backend.height(&pix);
                Thumbnail::new(
                    engine,
                    task.source.path().to_path_buf(),
                    request.size,
                    pix,
                    width,
                    height,
                )
            });

        let thumbnail = thumbnail.map(|fresh| {
            let existing = {
                let mut state = engine.state.lock();
                cache::insert(&mut state.cache, &fresh)
            };
            // A rejected `fresh` is released here, after the guard.
            existing.unwrap_or(fresh)
        });

        if thumbnail.is_some() {
            request.set_result(thumbnail.clone());
        }
        // Remember the last product even on failure, matching the sharing
        // rule; the previous one is released outside the lock.
        last = Some((request.size, thumbnail));
    }
}
