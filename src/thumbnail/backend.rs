//! Pluggable image backend.
//!
//! The engine never manipulates pixels itself; every decode, scale, rotate
//! and encode goes through an [`ImageBackend`] vtable installed once per
//! process. Toolkit embedders plug their own pixbuf type in; everyone else
//! can install the bundled [`RasterBackend`].
//!
//! Image objects are opaque to the engine (`Arc<dyn Any>`); only the
//! backend that produced them looks inside.

use std::any::Any;
use std::collections::HashMap;
use std::io::{BufWriter, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use image::GenericImageView;
use once_cell::sync::OnceCell;
use png::text_metadata::TEXtChunk;

use crate::cancellable::Cancellable;
use crate::error::{FmError, FmResult, IOErrorEnum};

/// An opaque, shareable image object produced by the installed backend.
pub type Image = Arc<dyn Any + Send + Sync>;

pub trait ImageBackend: Send + Sync {
    /// Decodes an image file.
    fn read_from_file(&self, path: &Path) -> FmResult<Image>;

    /// Decodes an image from a byte stream, checking the cancellation
    /// token between reads. `size_hint` is the expected total size.
    fn read_from_stream(
        &self,
        reader: &mut dyn Read,
        size_hint: u64,
        cancellable: &Cancellable,
    ) -> FmResult<Image>;

    fn width(&self, image: &Image) -> u32;

    fn height(&self, image: &Image) -> u32;

    /// Scales to exactly `width` x `height`.
    fn scale(&self, image: &Image, width: u32, height: u32) -> FmResult<Image>;

    /// Rotates clockwise; `degrees` is one of 0, 90, 180, 270.
    fn rotate(&self, image: &Image, degrees: u16) -> FmResult<Image>;

    /// Encodes a PNG at `target` carrying `Thumb::URI` and `Thumb::MTime`
    /// text tags.
    fn write(&self, image: &Image, target: &Path, uri: &str, mtime: &str) -> FmResult<()>;

    /// Reads a textual tag embedded in the image file, e.g. `Thumb::MTime`.
    fn get_text(&self, image: &Image, key: &str) -> Option<String>;
}

static BACKEND: OnceCell<Box<dyn ImageBackend>> = OnceCell::new();

/// Installs the image backend. Only one installation per process is
/// accepted; every subsequent call returns false and changes nothing.
pub fn set_backend(backend: Box<dyn ImageBackend>) -> bool {
    BACKEND.set(backend).is_ok()
}

pub(crate) fn installed() -> Option<&'static dyn ImageBackend> {
    BACKEND.get().map(|b| b.as_ref())
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Cap on how much a stream read will buffer when the size hint is absent
/// or absurd.
const MAX_STREAM_BUFFER: u64 = 64 << 20;

/// Backend implementation over the `image` and `png` crates.
pub struct RasterBackend;

struct RasterImage {
    frame: image::DynamicImage,
    text: HashMap<String, String>,
}

impl RasterBackend {
    fn decode(bytes: &[u8], what: &str) -> FmResult<Image> {
        let text = if bytes.starts_with(&PNG_SIGNATURE) {
            png_text_chunks(bytes)
        } else {
            HashMap::new()
        };
        let frame = image::load_from_memory(bytes).map_err(|e| {
            FmError::with_source(
                IOErrorEnum::DecodeFailed,
                format!("{}: decode failed", what),
                Box::new(e),
            )
        })?;
        Ok(Arc::new(RasterImage { frame, text }))
    }

    fn raster<'a>(image: &'a Image) -> FmResult<&'a RasterImage> {
        image.downcast_ref::<RasterImage>().ok_or_else(|| {
            FmError::new(IOErrorEnum::InvalidArg, "image not produced by this backend")
        })
    }
}

impl ImageBackend for RasterBackend {
    fn read_from_file(&self, path: &Path) -> FmResult<Image> {
        let bytes =
            std::fs::read(path).map_err(|e| FmError::from_io(e, path.display().to_string()))?;
        Self::decode(&bytes, &path.display().to_string())
    }

    fn read_from_stream(
        &self,
        reader: &mut dyn Read,
        size_hint: u64,
        cancellable: &Cancellable,
    ) -> FmResult<Image> {
        let mut bytes = Vec::with_capacity(size_hint.min(MAX_STREAM_BUFFER) as usize);
        let mut chunk = [0u8; 8192];
        loop {
            cancellable.check()?;
            let n = reader.read(&mut chunk).map_err(FmError::from)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
        }
        Self::decode(&bytes, "stream")
    }

    fn width(&self, image: &Image) -> u32 {
        Self::raster(image).map(|r| r.frame.dimensions().0).unwrap_or(0)
    }

    fn height(&self, image: &Image) -> u32 {
        Self::raster(image).map(|r| r.frame.dimensions().1).unwrap_or(0)
    }

    fn scale(&self, image: &Image, width: u32, height: u32) -> FmResult<Image> {
        let raster = Self::raster(image)?;
        let frame = raster
            .frame
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        Ok(Arc::new(RasterImage {
            frame,
            text: HashMap::new(),
        }))
    }

    fn rotate(&self, image: &Image, degrees: u16) -> FmResult<Image> {
        let raster = Self::raster(image)?;
        let frame = match degrees {
            0 => raster.frame.clone(),
            90 => raster.frame.rotate90(),
            180 => raster.frame.rotate180(),
            270 => raster.frame.rotate270(),
            _ => {
                return Err(FmError::new(
                    IOErrorEnum::InvalidArg,
                    format!("unsupported rotation: {} degrees", degrees),
                ))
            }
        };
        Ok(Arc::new(RasterImage {
            frame,
            text: HashMap::new(),
        }))
    }

    fn write(&self, image: &Image, target: &Path, uri: &str, mtime: &str) -> FmResult<()> {
        let raster = Self::raster(image)?;
        let rgba = raster.frame.to_rgba8();
        let (width, height) = rgba.dimensions();

        let file = std::fs::File::create(target)
            .map_err(|e| FmError::from_io(e, target.display().to_string()))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let encode_err = |e: png::EncodingError| {
            FmError::with_source(
                IOErrorEnum::Failed,
                format!("{}: png encode failed", target.display()),
                Box::new(e),
            )
        };
        let mut writer = encoder.write_header().map_err(encode_err)?;
        writer
            .write_text_chunk(&TEXtChunk::new("Thumb::URI", uri))
            .map_err(encode_err)?;
        writer
            .write_text_chunk(&TEXtChunk::new("Thumb::MTime", mtime))
            .map_err(encode_err)?;
        writer.write_image_data(rgba.as_raw()).map_err(encode_err)?;
        writer.finish().map_err(encode_err)?;
        Ok(())
    }

    fn get_text(&self, image: &Image, key: &str) -> Option<String> {
        Self::raster(image).ok()?.text.get(key).cloned()
    }
}

fn png_text_chunks(bytes: &[u8]) -> HashMap<String, String> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    match decoder.read_info() {
        Ok(reader) => reader
            .info()
            .uncompressed_latin1_text
            .iter()
            .map(|chunk| (chunk.keyword.clone(), chunk.text.clone()))
            .collect(),
        Err(_) => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32) -> Image {
        let frame = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 255]),
        ));
        Arc::new(RasterImage {
            frame,
            text: HashMap::new(),
        })
    }

    #[test]
    fn scale_and_rotate_dimensions() {
        let backend = RasterBackend;
        let img = solid_image(200, 100);
        assert_eq!(backend.width(&img), 200);
        assert_eq!(backend.height(&img), 100);

        let scaled = backend.scale(&img, 128, 64).unwrap();
        assert_eq!(backend.width(&scaled), 128);
        assert_eq!(backend.height(&scaled), 64);

        let rotated = backend.rotate(&scaled, 90).unwrap();
        assert_eq!(backend.width(&rotated), 64);
        assert_eq!(backend.height(&rotated), 128);

        assert!(backend.rotate(&img, 45).is_err());
    }

    #[test]
    fn png_round_trip_preserves_text_tags() {
        let backend = RasterBackend;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("thumb.png");

        let img = solid_image(32, 16);
        backend
            .write(&img, &target, "file:///tmp/source.jpg", "1700000000")
            .unwrap();

        let loaded = backend.read_from_file(&target).unwrap();
        assert_eq!(backend.width(&loaded), 32);
        assert_eq!(backend.height(&loaded), 16);
        assert_eq!(
            backend.get_text(&loaded, "Thumb::MTime").as_deref(),
            Some("1700000000")
        );
        assert_eq!(
            backend.get_text(&loaded, "Thumb::URI").as_deref(),
            Some("file:///tmp/source.jpg")
        );
        assert!(backend.get_text(&loaded, "Thumb::Size").is_none());
    }

    #[test]
    fn stream_read_honors_cancellation() {
        let backend = RasterBackend;
        let cancellable = Cancellable::new();
        cancellable.cancel();
        let mut cursor = Cursor::new(vec![0u8; 128]);
        let err = backend
            .read_from_stream(&mut cursor, 128, &cancellable)
            .unwrap_err();
        assert_eq!(err.kind(), IOErrorEnum::Cancelled);
    }
}
