//! # fmcore - file-manager support library
//!
//! Building blocks for a Linux file manager: reference-counted file-info
//! descriptors with lazily derived metadata, and a thumbnail
//! caching/generation engine over the conventional on-disk store.
//!
//! ## Core concepts
//!
//! - **FileInfo**: snapshot of one file's metadata (`lstat`, a VFS record
//!   or a shortcut item) with memoized MIME type, icon, collate keys and
//!   formatted fields
//! - **Thumbnail engine**: deduplicated request/task registry, a single
//!   background loader worker, a weak in-memory cache and main-thread
//!   delivery of results in bounded batches
//! - **ImageBackend**: pluggable pixel operations, installed once per
//!   process; [`thumbnail::RasterBackend`] is the bundled implementation
//! - **MimeType / Icon**: interned handles; MIME types also carry the
//!   external thumbnailer programs registered for them
//!
//! ## Example
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
//! println!("{} ({})", fi.disp_name(), fi.disp_size().unwrap_or("-"));
//!
//! if fi.can_thumbnail() {
//!     thumbnail::load(SourceRef::from_file_info(&fi), 96, |req| {
//!         if let Some(thumb) = req.result() {
//!             println!("thumbnail: {}x{}", thumb.width(), thumb.height());
//!         }
//!     });
//! }
//! // The host event loop pumps main_queue.run_pending() to deliver
//! // callbacks.
//! # Ok(())
//! # }
//! ```

pub mod cancellable;
pub mod config;
mod deferred;
pub mod error;
pub mod file_info;
pub mod icon;
pub mod mainloop;
pub mod mime;
pub mod places;
pub mod thumbnail;

pub use cancellable::Cancellable;
pub use error::{FmError, FmResult, IOErrorEnum};
pub use file_info::{FileInfo, FileType, ShortcutItem, ShortcutKind, VfsFileInfo};
pub use icon::Icon;
pub use mainloop::MainDispatcher;
pub use mime::MimeType;
pub use thumbnail::{
    set_backend, Image, ImageBackend, RasterBackend, SourceRef, Thumbnail, ThumbnailRequest,
    ThumbnailStore, Thumbnailer,
};
