//! File information descriptors.
//!
//! [`FileInfo`] is the reference-counted metadata record the rest of the
//! library keys off: the thumbnail engine snapshots it into a
//! [`crate::thumbnail::SourceRef`], directory models sort by its collate
//! keys, views render its icon and formatted fields.
//!
//! A descriptor can be built from a native file (`lstat`), from a
//! [`VfsFileInfo`] record produced by a VFS layer, or from a
//! [`ShortcutItem`]. Expensive derived fields (MIME type, icon, collate
//! keys, formatted size and time, highlight color) are computed lazily on
//! first access and memoized; every lazy field uses its own double-checked
//! cell so concurrent readers race at most to duplicate work, never to
//! corrupt state.

use std::ffi::CString;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

use crate::config;
use crate::deferred;
use crate::error::{FmError, FmResult};
use crate::icon::Icon;
use crate::mime::MimeType;
use crate::places::{self, UserDirectory};

static ICON_LOCKED_FOLDER: Lazy<Icon> = Lazy::new(|| Icon::from_name("folder-locked"));

/// Interned filesystem-id strings for non-native files. Interning keeps
/// same-fs comparison a pointer check even across many descriptors.
static FS_IDS: Lazy<Mutex<Vec<Arc<str>>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn intern_fs_id(id: &str) -> Arc<str> {
    let mut ids = FS_IDS.lock();
    if let Some(existing) = ids.iter().find(|s| &***s == id) {
        return existing.clone();
    }
    let interned: Arc<str> = Arc::from(id);
    ids.push(interned.clone());
    interned
}

/// Highlight policy hook. Installed once by the embedding application;
/// consulted the first time a descriptor's color is read.
static HIGHLIGHTER: OnceCell<Box<dyn Fn(&FileInfo) -> u64 + Send + Sync>> = OnceCell::new();

/// Installs the highlighting policy. Returns false if one is already set.
pub fn set_highlighter(f: impl Fn(&FileInfo) -> u64 + Send + Sync + 'static) -> bool {
    HIGHLIGHTER.set(Box::new(f)).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    SymbolicLink,
    Special,
    Shortcut,
    Mountable,
}

/// A generic file-info record as produced by a VFS layer.
///
/// Only `display_name` is mandatory; everything else defaults to "absent"
/// and [`FileInfo::new_from_vfs`] composes sensible values the same way a
/// file manager must when a remote backend reports partial metadata.
#[derive(Debug, Clone, Default)]
pub struct VfsFileInfo {
    pub display_name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub unix_mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub file_type: FileType,
    pub can_read: Option<bool>,
    pub target_uri: Option<String>,
    pub symlink_target: Option<String>,
    pub icon_name: Option<String>,
    pub device: u64,
    pub filesystem_id: Option<String>,
    pub mtime: i64,
    pub atime: i64,
    pub is_hidden: bool,
    pub is_backup: bool,
    /// Whether the path refers to a local UNIX file.
    pub native: bool,
}

impl Default for FileType {
    fn default() -> Self {
        FileType::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKind {
    Directory,
    Application,
}

/// An application-menu style item a descriptor can be built from.
#[derive(Debug, Clone)]
pub struct ShortcutItem {
    pub name: String,
    pub icon_name: Option<String>,
    pub kind: ShortcutKind,
    pub file_path: Option<PathBuf>,
}

/// Collate keys that match the display name byte-for-byte are not stored
/// twice; the sentinel says "answer with the display name".
#[derive(Debug, Clone)]
enum CollateKey {
    ReuseDispName,
    Key(String),
}

pub struct FileInfo {
    path: PathBuf,
    basename: String,

    mode: u32,
    dev: u64,
    fs_id: Option<Arc<str>>,
    uid: u32,
    gid: u32,
    size: u64,
    mtime: i64,
    atime: i64,
    blksize: u64,
    blocks: u64,

    /// None exactly when the display name equals the base name.
    disp_name: Option<String>,
    target: Option<String>,

    accessible: bool,
    hidden: bool,
    backup: bool,
    from_native_file: bool,

    mime: OnceCell<Option<MimeType>>,
    icon: OnceCell<Icon>,
    collate_key: OnceCell<CollateKey>,
    collate_key_case: OnceCell<CollateKey>,
    disp_size: OnceCell<String>,
    disp_mtime: OnceCell<String>,
    color: OnceCell<u64>,
}

fn basename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

impl FileInfo {
    fn empty(path: PathBuf) -> FileInfo {
        let basename = basename_of(&path);
        FileInfo {
            path,
            basename,
            mode: 0,
            dev: 0,
            fs_id: None,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            atime: 0,
            blksize: 0,
            blocks: 0,
            disp_name: None,
            target: None,
            accessible: true,
            hidden: false,
            backup: false,
            from_native_file: false,
            mime: OnceCell::new(),
            icon: OnceCell::new(),
            collate_key: OnceCell::new(),
            collate_key_case: OnceCell::new(),
            disp_size: OnceCell::new(),
            disp_mtime: OnceCell::new(),
            color: OnceCell::new(),
        }
    }

    /// Builds a descriptor for a native file via `lstat`.
    ///
    /// The returned error carries the system errno translated into the
    /// library taxonomy.
    pub fn from_native_file(path: &Path) -> FmResult<Arc<FileInfo>> {
        let st = lstat(path).map_err(|e| FmError::from_io(e, path.display().to_string()))?;

        let mut fi = FileInfo::empty(path.to_path_buf());
        fi.from_native_file = true;
        fi.mode = st.st_mode;
        fi.mtime = st.st_mtime;
        fi.atime = st.st_atime;
        fi.size = st.st_size as u64;
        fi.dev = st.st_dev;
        fi.uid = st.st_uid;
        fi.gid = st.st_gid;
        fi.blksize = st.st_blksize as u64;
        fi.blocks = st.st_blocks as u64;

        if (st.st_mode & libc::S_IFMT) == libc::S_IFLNK {
            fi.target = std::fs::read_link(path)
                .ok()
                .map(|t| t.to_string_lossy().into_owned());
        }

        let defer_mime = config::get().defer_mime_type_loading;
        if !defer_mime {
            let _ = fi.mime.set(Some(MimeType::from_native_file(path)));
        }

        fi.accessible = access_readable(path);

        // Desktop entry files override icon and display name from their own
        // key file.
        if fi.is_desktop_entry() {
            let (icon_name, title) = desktop_entry_fields(path);
            if let Some(icon_name) = icon_name {
                let _ = fi.icon.set(Icon::from_name(strip_icon_extension(&icon_name)));
            }
            if let Some(title) = title {
                fi.disp_name = Some(title);
            }
        }

        // The display name stays unset when it would only repeat the base
        // name; the basename is already a lossy UTF-8 rendering.

        fi.hidden = fi.basename.starts_with('.');
        fi.backup = (st.st_mode & libc::S_IFMT) != libc::S_IFDIR && fi.basename.ends_with('~');

        let fi = Arc::new(fi);
        if defer_mime {
            deferred::schedule(&fi);
        }
        Ok(fi)
    }

    /// Builds a descriptor from a VFS-layer info record.
    pub fn new_from_vfs(path: &Path, info: &VfsFileInfo) -> Arc<FileInfo> {
        let mut fi = FileInfo::empty(path.to_path_buf());
        fi.set_from_vfs_info(info);
        Arc::new(fi)
    }

    fn set_from_vfs_info(&mut self, info: &VfsFileInfo) {
        if info.display_name != self.basename {
            self.disp_name = Some(info.display_name.clone());
        }

        self.size = info.size;
        if let Some(content_type) = &info.content_type {
            let _ = self.mime.set(Some(MimeType::from_name(content_type)));
        }

        self.mode = info.unix_mode;
        self.uid = info.uid.unwrap_or(u32::MAX);
        self.gid = info.gid.unwrap_or(u32::MAX);

        // No UNIX mode from the backend: compose one from the file type so
        // the mode-derived predicates still work.
        if self.mode == 0 {
            self.mode = match info.file_type {
                FileType::Regular => libc::S_IFREG,
                FileType::Directory => libc::S_IFDIR,
                FileType::SymbolicLink => libc::S_IFLNK,
                FileType::Special => match info.content_type.as_deref() {
                    Some("inode/chardevice") => libc::S_IFCHR,
                    Some("inode/blockdevice") => libc::S_IFBLK,
                    Some("inode/fifo") => libc::S_IFIFO,
                    Some("inode/socket") => libc::S_IFSOCK,
                    _ => 0,
                },
                _ => 0,
            };
        }

        self.accessible = info.can_read.unwrap_or(true);

        match info.file_type {
            FileType::Mountable | FileType::Shortcut => {
                if let Some(uri) = &info.target_uri {
                    self.target = Some(filename_from_uri(uri));
                    if self.mime.get().is_none() {
                        if let Some(m) = self.target.as_deref().and_then(MimeType::from_file_name) {
                            let _ = self.mime.set(Some(m));
                        }
                    }
                }
                if self.mime.get().is_none() {
                    let fallback = if info.file_type == FileType::Shortcut {
                        MimeType::x_shortcut()
                    } else {
                        MimeType::x_mountable()
                    };
                    let _ = self.mime.set(Some(fallback));
                }
            }
            FileType::Directory => {
                let _ = self.mime.set(Some(MimeType::inode_directory()));
            }
            FileType::SymbolicLink => {
                if let Some(target) = &info.symlink_target {
                    self.target = Some(target.clone());
                    if self.mime.get().is_none() {
                        if let Some(m) = MimeType::from_file_name(target) {
                            let _ = self.mime.set(Some(m));
                        }
                    }
                }
                if self.mime.get().is_none() {
                    if let Some(m) = MimeType::from_file_name(&self.basename) {
                        let _ = self.mime.set(Some(m));
                    }
                }
            }
            _ => {
                if self.mime.get().is_none() {
                    if let Some(m) = MimeType::from_file_name(&self.basename) {
                        let _ = self.mime.set(Some(m));
                    }
                }
            }
        }

        // File-specific icon first, then the locked-folder marker, then the
        // MIME fallback.
        if let Some(icon_name) = &info.icon_name {
            let _ = self.icon.set(Icon::from_name(icon_name));
        } else if !self.accessible && info.file_type == FileType::Directory {
            let _ = self.icon.set(ICON_LOCKED_FOLDER.clone());
        } else if let Some(Some(mime)) = self.mime.get() {
            let _ = self.icon.set(mime.icon());
        }

        if info.native {
            self.dev = info.device;
        } else {
            self.fs_id = info.filesystem_id.as_deref().map(intern_fs_id);
        }

        self.mtime = info.mtime;
        self.atime = info.atime;
        self.hidden = info.is_hidden;
        self.backup = info.is_backup;
    }

    /// Builds a descriptor from an application-menu shortcut item.
    pub fn from_shortcut_item(path: &Path, item: &ShortcutItem) -> Arc<FileInfo> {
        let mut fi = FileInfo::empty(path.to_path_buf());
        if item.name != fi.basename {
            fi.disp_name = Some(item.name.clone());
        }
        if let Some(icon_name) = &item.icon_name {
            let _ = fi.icon.set(Icon::from_name(strip_icon_extension(icon_name)));
        }
        match item.kind {
            ShortcutKind::Directory => fi.mode |= libc::S_IFDIR,
            ShortcutKind::Application => {
                fi.mode |= libc::S_IFREG;
                fi.target = item
                    .file_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned());
            }
        }
        let _ = fi.mime.set(Some(MimeType::x_shortcut()));
        Arc::new(fi)
    }

    /// Copies the observable content of `src` into `self`.
    ///
    /// Shared handles (MIME, icon, interned fs id) are cloned before any
    /// field of `self` is replaced, so updating a descriptor from itself or
    /// from one sharing sub-objects is safe.
    pub fn update(&mut self, src: &FileInfo) {
        let mime = src.mime.clone();
        let icon = src.icon.clone();
        let fs_id = src.fs_id.clone();

        self.path = src.path.clone();
        self.basename = src.basename.clone();
        self.mime = mime;
        self.icon = icon;

        self.mode = src.mode;
        self.dev = src.dev;
        self.fs_id = fs_id;
        self.uid = src.uid;
        self.gid = src.gid;
        self.size = src.size;
        self.mtime = src.mtime;
        self.atime = src.atime;
        self.blksize = src.blksize;
        self.blocks = src.blocks;

        self.disp_name = src.disp_name.clone();
        self.collate_key = src.collate_key.clone();
        self.collate_key_case = src.collate_key_case.clone();
        self.disp_size = src.disp_size.clone();
        self.disp_mtime = src.disp_mtime.clone();
        self.target = src.target.clone();

        self.accessible = src.accessible;
        self.hidden = src.hidden;
        self.backup = src.backup;
        self.from_native_file = src.from_native_file;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the file in filesystem encoding.
    pub fn name(&self) -> &str {
        &self.basename
    }

    /// Display name shown in the UI. Falls back to the base name.
    pub fn disp_name(&self) -> &str {
        self.disp_name.as_deref().unwrap_or(&self.basename)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn atime(&self) -> i64 {
        self.atime
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Device id for native files.
    pub fn dev(&self) -> u64 {
        self.dev
    }

    /// Filesystem id string for non-native files.
    pub fn fs_id(&self) -> Option<&str> {
        self.fs_id.as_deref()
    }

    /// Target of a symlink or shortcut.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_native(&self) -> bool {
        self.fs_id.is_none()
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    /// The MIME type, resolving it on first access for native files.
    pub fn mime_type(&self) -> Option<MimeType> {
        self.mime
            .get_or_init(|| {
                if self.from_native_file {
                    Some(MimeType::from_native_file(&self.path))
                } else {
                    None
                }
            })
            .clone()
    }

    /// The icon used to show the file, computed on first access.
    pub fn icon(&self) -> Icon {
        self.icon.get_or_init(|| self.compute_icon()).clone()
    }

    fn compute_icon(&self) -> Icon {
        if self.from_native_file {
            if !self.accessible && (self.mode & libc::S_IFMT) == libc::S_IFDIR {
                return ICON_LOCKED_FOLDER.clone();
            }
            if let Some(home) = places::home_dir() {
                if self.path == home {
                    return Icon::from_name("user-home");
                }
            }
            for dir in UserDirectory::ALL {
                if places::special_dir(dir) == Some(self.path.as_path()) {
                    return Icon::from_name(dir.icon_name());
                }
            }
            if self.path == Path::new("/") {
                return Icon::from_name("gtk-harddisk");
            }
        }
        self.mime_type()
            .map(|m| m.icon())
            .unwrap_or_else(|| Icon::from_name("unknown"))
    }

    /// Locale collate key over the casefolded display name. Keys of
    /// different files compare directly with byte comparison.
    pub fn collate_key(&self) -> &str {
        let key = self.collate_key.get_or_init(|| {
            let disp_name = self.disp_name();
            let collate = filename_collate_key(&casefold(disp_name));
            if collate == disp_name {
                CollateKey::ReuseDispName
            } else {
                CollateKey::Key(collate)
            }
        });
        match key {
            CollateKey::ReuseDispName => self.disp_name(),
            CollateKey::Key(k) => k,
        }
    }

    /// Case-sensitive variant of [`collate_key`](Self::collate_key).
    pub fn collate_key_nocasefold(&self) -> &str {
        let key = self.collate_key_case.get_or_init(|| {
            let disp_name = self.disp_name();
            let collate = filename_collate_key(disp_name);
            if collate == disp_name {
                CollateKey::ReuseDispName
            } else {
                CollateKey::Key(collate)
            }
        });
        match key {
            CollateKey::ReuseDispName => self.disp_name(),
            CollateKey::Key(k) => k,
        }
    }

    /// Human-readable file size; only regular files have one.
    pub fn disp_size(&self) -> Option<&str> {
        if (self.mode & libc::S_IFMT) != libc::S_IFREG {
            return None;
        }
        Some(
            self.disp_size
                .get_or_init(|| file_size_to_str(self.size, config::get().si_unit)),
        )
    }

    /// Modification time formatted for display (`%x %R`, local time).
    pub fn disp_mtime(&self) -> Option<&str> {
        if self.mtime <= 0 {
            return None;
        }
        let mtime = self.mtime;
        Some(self.disp_mtime.get_or_init(|| {
            Local
                .timestamp_opt(mtime, 0)
                .single()
                .map(|dt| dt.format("%x %R").to_string())
                .unwrap_or_default()
        }))
    }

    /// Highlight color, filled by the installed policy on first read.
    pub fn color(&self) -> u64 {
        *self
            .color
            .get_or_init(|| HIGHLIGHTER.get().map(|f| f(self)).unwrap_or(0))
    }

    pub fn set_color(&self, color: u64) {
        let _ = self.color.set(color);
    }

    pub fn is_directory(&self) -> bool {
        let fmt = self.mode & libc::S_IFMT;
        fmt == libc::S_IFDIR
            || (fmt == libc::S_IFLNK
                && self.mime_type().is_some_and(|m| m == MimeType::inode_directory()))
    }

    pub fn is_symlink(&self) -> bool {
        (self.mode & libc::S_IFMT) == libc::S_IFLNK
    }

    pub fn is_shortcut(&self) -> bool {
        self.mime_type().is_some_and(|m| m == MimeType::x_shortcut())
    }

    pub fn is_mountable(&self) -> bool {
        self.mime_type().is_some_and(|m| m == MimeType::x_mountable())
    }

    pub fn is_image(&self) -> bool {
        self.mime_type().is_some_and(|m| m.is_image())
    }

    pub fn is_text(&self) -> bool {
        self.mime_type().is_some_and(|m| m.is_text())
    }

    pub fn is_desktop_entry(&self) -> bool {
        if self.from_native_file {
            // Cheap suffix test first; it saves a MIME sniff for almost
            // every file.
            let native = self.path.to_string_lossy();
            let effective = self.target.as_deref().unwrap_or(native.as_ref());
            if !effective.ends_with(".desktop") {
                return false;
            }
        }
        self.mime_type()
            .is_some_and(|m| m == MimeType::application_x_desktop())
    }

    pub fn is_unknown_type(&self) -> bool {
        self.mime_type().map_or(true, |m| m.is_unknown())
    }

    /// Whether the file looks like an executable program. Text types are
    /// only reported as executable for native files with an execute bit
    /// and a `#!` shebang.
    pub fn is_executable_type(&self) -> bool {
        let Some(mime) = self.mime_type() else {
            return false;
        };
        if mime.is_text() {
            if self.is_native() && (self.mode & 0o111) != 0 {
                let mut buf = [0u8; 2];
                if let Ok(mut f) = std::fs::File::open(&self.path) {
                    if f.read_exact(&mut buf).is_ok() && &buf == b"#!" {
                        return true;
                    }
                }
            }
            return false;
        }
        mime.can_be_executable()
    }

    /// Hidden per dot-prefix, optionally folding `~`-suffixed backups in.
    pub fn is_hidden(&self) -> bool {
        self.hidden || (config::get().backup_as_hidden && self.backup)
    }

    /// Whether the thumbnail engine may try to produce a preview.
    pub fn can_thumbnail(&self) -> bool {
        // A bit test rather than a format comparison: symlinks to regular
        // files qualify too.
        self.size != 0
            && (self.mode & libc::S_IFREG) != 0
            && !self.is_desktop_entry()
            && !self.is_unknown_type()
    }
}

impl std::fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInfo")
            .field("path", &self.path)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("size", &self.size)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

fn lstat(path: &Path) -> std::io::Result<libc::stat> {
    let cstr = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let mut st = std::mem::MaybeUninit::<libc::stat>::uninit();
    let rc = unsafe { libc::lstat(cstr.as_ptr(), st.as_mut_ptr()) };
    if rc == 0 {
        Ok(unsafe { st.assume_init() })
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn access_readable(path: &Path) -> bool {
    let Ok(cstr) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cstr.as_ptr(), libc::R_OK) == 0 }
}

/// Extracts `Icon=` and `Name=` from the `[Desktop Entry]` group.
fn desktop_entry_fields(path: &Path) -> (Option<String>, Option<String>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return (None, None);
    };
    let mut in_entry = false;
    let mut icon = None;
    let mut name = None;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "Icon" if icon.is_none() => icon = Some(value.trim().to_string()),
                "Name" if name.is_none() => name = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    (icon, name)
}

/// Non-standard desktop entries name icon files instead of themed icons;
/// strip the image extension unless the name is an absolute path.
fn strip_icon_extension(name: &str) -> &str {
    if name.starts_with('/') {
        return name;
    }
    for ext in [".png", ".svg", ".xpm"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            return stripped;
        }
    }
    name
}

fn filename_from_uri(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("file://") {
        percent_encoding::percent_decode_str(rest)
            .decode_utf8_lossy()
            .into_owned()
    } else {
        uri.to_string()
    }
}

fn casefold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Collation key for filenames: digit runs compare numerically and dots
/// sort before everything else, so `a2.txt` < `a10.txt`.
fn filename_collate_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut run = String::new();
            run.push(c);
            while chars.peek().is_some_and(char::is_ascii_digit) {
                run.push(chars.next().unwrap());
            }
            let trimmed = run.trim_start_matches('0');
            let digits = if trimmed.is_empty() { "0" } else { trimmed };
            key.push('\u{1}');
            key.push_str(&format!("{:08}", digits.len()));
            key.push_str(digits);
        } else if c == '.' {
            key.push('\u{2}');
        } else {
            key.push(c);
        }
    }
    key
}

/// Formats a byte count for humans, honoring the SI-unit preference.
pub fn file_size_to_str(size: u64, si_unit: bool) -> String {
    let (base, units): (f64, [&str; 5]) = if si_unit {
        (1000.0, ["B", "kB", "MB", "GB", "TB"])
    } else {
        (1024.0, ["B", "KiB", "MiB", "GiB", "TiB"])
    };
    let mut value = size as f64;
    let mut unit = 0;
    while value >= base && unit < units.len() - 1 {
        value /= base;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", size)
    } else {
        format!("{:.1} {}", value, units[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collate_key_orders_numbers_numerically() {
        let a = filename_collate_key("file2.txt");
        let b = filename_collate_key("file10.txt");
        assert!(a < b);

        let a = filename_collate_key("file002");
        let b = filename_collate_key("file2");
        assert_eq!(a, b);
    }

    #[test]
    fn collate_key_identity_for_plain_names() {
        assert_eq!(filename_collate_key("readme"), "readme");
        assert_ne!(filename_collate_key("a.b"), "a.b");
    }

    #[test]
    fn casefold_lowers() {
        assert_eq!(casefold("Straße.TXT"), "straße.txt");
    }

    #[test]
    fn size_formatting() {
        assert_eq!(file_size_to_str(512, false), "512 B");
        assert_eq!(file_size_to_str(2048, false), "2.0 KiB");
        assert_eq!(file_size_to_str(2048, true), "2.0 kB");
        assert_eq!(file_size_to_str(5 * 1024 * 1024, false), "5.0 MiB");
        assert_eq!(file_size_to_str(1_500_000, true), "1.5 MB");
    }

    #[test]
    fn icon_extension_stripping() {
        assert_eq!(strip_icon_extension("firefox.png"), "firefox");
        assert_eq!(strip_icon_extension("firefox.svg"), "firefox");
        assert_eq!(strip_icon_extension("/usr/share/pixmaps/x.png"), "/usr/share/pixmaps/x.png");
        assert_eq!(strip_icon_extension("firefox"), "firefox");
    }

    #[test]
    fn uri_to_filename_decodes() {
        assert_eq!(filename_from_uri("file:///tmp/a%20b"), "/tmp/a b");
        assert_eq!(filename_from_uri("sftp://host/x"), "sftp://host/x");
    }
}
