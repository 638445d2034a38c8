//! Built-in thumbnail generation for image sources.
//!
//! JPEG sources get a fast path: the EXIF block is scanned for the
//! orientation tag and for an embedded preview, which is decoded instead
//! of the full image whenever the normal size class is enough. Everything
//! else is decoded through the backend, scaled to fit the class box with
//! the aspect ratio preserved, rotated per the orientation tag and saved
//! atomically with the freshness tag.

use std::io::{BufReader, Cursor, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use crate::cancellable::Cancellable;
use crate::error::FmResult;

use super::backend::{Image, ImageBackend};
use super::store;
use super::{SourceRef, TaskFlags};

/// Scales `image` to fit a `size` x `size` box, keeping aspect ratio.
/// Returns the image itself when it already fits or the size would not
/// change; thumbnails are never scaled up.
pub(crate) fn scale_image(
    backend: &dyn ImageBackend,
    image: &Image,
    size: u32,
) -> FmResult<Image> {
    let width = backend.width(image);
    let height = backend.height(image);
    let (new_width, new_height) = scaled_dimensions(width, height, size);

    if (new_width == width && new_height == height) || (size > width && size > height) {
        Ok(image.clone())
    } else {
        backend.scale(image, new_width, new_height)
    }
}

/// The box-fit size: the longer side becomes `size`, the shorter side is
/// scaled by the same factor and rounded toward zero. A square stays
/// square.
fn scaled_dimensions(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width > height {
        let aspect = height as f64 / width as f64;
        (size, (size as f64 * aspect) as u32)
    } else if width < height {
        let aspect = width as f64 / height as f64;
        ((size as f64 * aspect) as u32, size)
    } else {
        (size, size)
    }
}

/// Generates the requested size classes for an image source. Returns the
/// produced class images; a `None` means that class failed and the
/// requester gets no result.
pub(crate) fn generate_with_builtin(
    backend: &dyn ImageBackend,
    source: &SourceRef,
    flags: TaskFlags,
    normal_path: &Path,
    large_path: &Path,
    uri: &str,
    cancellable: &Cancellable,
) -> (Option<Image>, Option<Image>) {
    debug!(path = %source.path().display(), "generating thumbnail");

    let (original, rotate_degrees) = load_source_image(backend, source, flags, cancellable);
    let Some(original) = original else {
        return (None, None);
    };

    let width = backend.width(&original);
    let height = backend.height(&original);

    let produce = |target_size: u32, target_path: &Path| -> Option<Image> {
        // Sources already within the box are used verbatim and not saved.
        let (mut pix, need_save) = if width <= target_size && height <= target_size {
            (original.clone(), false)
        } else {
            (scale_image(backend, &original, target_size).ok()?, true)
        };
        if rotate_degrees != 0 {
            pix = backend.rotate(&pix, rotate_degrees).ok()?;
        }
        if need_save {
            if let Err(err) =
                store::save_thumbnail(backend, &pix, target_path, uri, source.mtime())
            {
                warn!(path = %target_path.display(), %err, "saving thumbnail failed");
            }
        }
        Some(pix)
    };

    let normal = flags
        .contains(TaskFlags::GENERATE_NORMAL)
        .then(|| produce(128, normal_path))
        .flatten();
    let large = flags
        .contains(TaskFlags::GENERATE_LARGE)
        .then(|| produce(256, large_path))
        .flatten();
    (normal, large)
}

/// Opens and decodes the source, returning the image and the rotation in
/// clockwise degrees recovered from EXIF (0 when absent).
fn load_source_image(
    backend: &dyn ImageBackend,
    source: &SourceRef,
    flags: TaskFlags,
    cancellable: &Cancellable,
) -> (Option<Image>, u16) {
    let mut rotate_degrees = 0;

    let file = match std::fs::File::open(source.path()) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %source.path().display(), %err, "cannot open thumbnail source");
            return (None, 0);
        }
    };

    // The embedded EXIF preview is big enough for the normal class only.
    let use_exif = source.mime().is_some_and(|m| m.name() == "image/jpeg")
        && !flags.contains(TaskFlags::GENERATE_LARGE);

    let mut file = if use_exif {
        let (picture, degrees, file) = exif_fast_path(backend, file, source, cancellable);
        rotate_degrees = degrees;
        if picture.is_some() {
            return (picture, rotate_degrees);
        }
        match file {
            Some(file) => file,
            None => return (None, rotate_degrees),
        }
    } else {
        file
    };

    let picture = backend
        .read_from_stream(&mut file, source.size(), cancellable)
        .ok();
    (picture, rotate_degrees)
}

/// Scans the EXIF block for orientation and an embedded preview. Returns
/// the decoded preview if there was one, plus a file handle rewound to
/// the start (reopened when rewinding fails) for the full decode.
fn exif_fast_path(
    backend: &dyn ImageBackend,
    file: std::fs::File,
    source: &SourceRef,
    cancellable: &Cancellable,
) -> (Option<Image>, u16, Option<std::fs::File>) {
    let mut reader = BufReader::new(file);
    let mut rotate_degrees = 0;
    let mut picture = None;

    if let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) {
        if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
            rotate_degrees = match field.value.get_uint(0) {
                Some(3) => 180,
                Some(6) => 90,
                Some(8) => 270,
                _ => 0,
            };
        }
        if let Some(thumb) = embedded_thumbnail(&exif) {
            picture = backend
                .read_from_stream(&mut Cursor::new(&thumb), thumb.len() as u64, cancellable)
                .ok();
        }
    }

    if picture.is_some() {
        return (picture, rotate_degrees, None);
    }

    // No usable preview: rewind for the full decode.
    let mut file = reader.into_inner();
    if file.seek(SeekFrom::Start(0)).is_err() {
        return match std::fs::File::open(source.path()) {
            Ok(reopened) => (None, rotate_degrees, Some(reopened)),
            Err(_) => (None, rotate_degrees, None),
        };
    }
    (None, rotate_degrees, Some(file))
}

/// The JPEG preview embedded in the thumbnail IFD, when present and in
/// bounds.
fn embedded_thumbnail(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(exif::Tag::JPEGInterchangeFormat, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(exif::Tag::JPEGInterchangeFormatLength, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf()
        .get(offset..offset.checked_add(length)?)
        .map(<[u8]>::to_vec)
}
