//! On-disk thumbnail store.
//!
//! Layout follows the thumbnail-cache convention the rest of the desktop
//! reads: `<home>/.thumbnails/normal/<md5-of-uri>.png` for the 128 px
//! class and `large/` for 256 px. Directories are created mode 0700 and
//! thumbnails 0600. Every PNG carries a `Thumb::MTime` text tag recording
//! the source mtime; freshness is judged against it, falling back to the
//! PNG's own file mtime when the tag is absent.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::error::{FmError, FmResult};
use crate::places;

use super::backend::{Image, ImageBackend};

/// Characters left unescaped when turning a path into a file:// URI.
const URI_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const MTIME_TAG: &str = "Thumb::MTime";

pub struct ThumbnailStore {
    normal_dir: PathBuf,
    large_dir: PathBuf,
}

impl ThumbnailStore {
    /// The conventional store under the user's home directory.
    pub fn new_default() -> Option<ThumbnailStore> {
        Some(Self::with_root(&places::home_dir()?.join(".thumbnails")))
    }

    /// A store rooted at an explicit directory. Intended for embedders
    /// with relocated caches and for tests.
    pub fn with_root(root: &Path) -> ThumbnailStore {
        ThumbnailStore {
            normal_dir: root.join("normal"),
            large_dir: root.join("large"),
        }
    }

    pub(crate) fn ensure_dirs(&self) -> std::io::Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true).mode(0o700);
        builder.create(&self.normal_dir)?;
        builder.create(&self.large_dir)?;
        Ok(())
    }

    pub fn normal_path(&self, md5: &str) -> PathBuf {
        self.normal_dir.join(format!("{}.png", md5))
    }

    pub fn large_path(&self, md5: &str) -> PathBuf {
        self.large_dir.join(format!("{}.png", md5))
    }
}

/// Canonical file:// URI for a local path.
pub fn path_to_uri(path: &Path) -> String {
    format!(
        "file://{}",
        utf8_percent_encode(&path.to_string_lossy(), URI_PATH_SET)
    )
}

/// Lowercase hex MD5, the thumbnail file stem for a URI.
pub fn md5_hex(uri: &str) -> String {
    format!("{:x}", md5::compute(uri))
}

/// C `atol` semantics: optional sign, leading digits, 0 on garbage. The
/// mtime tags of foreign generators sometimes carry fractional seconds or
/// trailing junk; only the integral part counts.
fn atol(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: &str = &rest[..rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len())];
    let value = digits.parse::<i64>().unwrap_or(0);
    if negative {
        -value
    } else {
        value
    }
}

/// Applies the freshness rule to a loaded thumbnail and unlinks it when it
/// lost. Returns true when the thumbnail must be regenerated.
pub(crate) fn is_thumbnail_outdated(
    backend: &dyn ImageBackend,
    thumbnail: &Image,
    thumbnail_path: &Path,
    source_mtime: i64,
) -> bool {
    let outdated = match backend.get_text(thumbnail, MTIME_TAG) {
        Some(tag) => atol(&tag) != source_mtime,
        // No tag: compare against the thumbnail file's own mtime.
        None => match std::fs::metadata(thumbnail_path) {
            Ok(meta) => source_mtime > meta.mtime(),
            Err(_) => true,
        },
    };
    if outdated {
        debug!(path = %thumbnail_path.display(), "stale thumbnail, unlinking");
        let _ = std::fs::remove_file(thumbnail_path);
    }
    outdated
}

/// Writes a thumbnail atomically: a `mkstemp` sibling chmod'ed to 0600,
/// encoded through the backend, then renamed over the target.
pub(crate) fn save_thumbnail(
    backend: &dyn ImageBackend,
    image: &Image,
    target: &Path,
    uri: &str,
    source_mtime: i64,
) -> FmResult<()> {
    let mut template = target.as_os_str().to_os_string().into_vec();
    template.extend_from_slice(b".XXXXXX\0");
    let fd = unsafe { libc::mkstemp(template.as_mut_ptr() as *mut libc::c_char) };
    if fd < 0 {
        return Err(FmError::from_io(
            std::io::Error::last_os_error(),
            target.display().to_string(),
        ));
    }
    unsafe {
        libc::fchmod(fd, 0o600);
        libc::close(fd);
    }
    template.pop(); // trailing NUL
    let tmp_path = PathBuf::from(OsString::from_vec(template));

    let written = backend.write(image, &tmp_path, uri, &source_mtime.to_string());
    match written {
        Ok(()) => {
            std::fs::rename(&tmp_path, target)
                .map_err(|e| FmError::from_io(e, target.display().to_string()))?;
            debug!(path = %target.display(), "thumbnail saved");
            Ok(())
        }
        Err(err) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_encoding() {
        assert_eq!(
            path_to_uri(Path::new("/home/user/Pictures/a photo.jpg")),
            "file:///home/user/Pictures/a%20photo.jpg"
        );
        assert_eq!(path_to_uri(Path::new("/tmp/x.png")), "file:///tmp/x.png");
    }

    #[test]
    fn md5_names_are_32_hex() {
        let sum = md5_hex("file:///tmp/x.png");
        assert_eq!(sum.len(), 32);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Stable across calls.
        assert_eq!(sum, md5_hex("file:///tmp/x.png"));
    }

    #[test]
    fn store_paths() {
        let store = ThumbnailStore::with_root(Path::new("/cache/.thumbnails"));
        let md5 = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            store.normal_path(md5),
            Path::new("/cache/.thumbnails/normal/0123456789abcdef0123456789abcdef.png")
        );
        assert_eq!(
            store.large_path(md5),
            Path::new("/cache/.thumbnails/large/0123456789abcdef0123456789abcdef.png")
        );
    }

    #[test]
    fn atol_parses_like_c() {
        assert_eq!(atol("1700000000"), 1700000000);
        assert_eq!(atol("  42"), 42);
        assert_eq!(atol("-7"), -7);
        assert_eq!(atol("1699.5"), 1699);
        assert_eq!(atol("123abc"), 123);
        assert_eq!(atol("abc"), 0);
        assert_eq!(atol(""), 0);
    }

    #[test]
    fn ensure_dirs_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ThumbnailStore::with_root(&dir.path().join(".thumbnails"));
        store.ensure_dirs().unwrap();

        let meta = std::fs::metadata(dir.path().join(".thumbnails/normal")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        assert!(dir.path().join(".thumbnails/large").is_dir());
    }
}
