//! Thumbnail derivation for raster image uploads.
//!
//! Recognized formats live in [`CODECS`], each with its decode and encode
//! function. A file whose extension is not in the table simply gets no
//! thumbnail. Nothing in here reports failure to the caller: a thumbnail that
//! cannot be produced is logged and skipped.

use crate::services::{path_guard::SafePath, store::AssetStore};
use bytes::Bytes;
use image::{
    DynamicImage, ImageFormat, ImageResult, codecs::jpeg::JpegEncoder, imageops::FilterType,
};
use std::{io::Cursor, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Reserved name prefix of derived thumbnails. Canonical names never start
/// with `_`, so no upload can collide with it.
pub const THUMBNAIL_PREFIX: &str = "_thumb_";

const JPEG_QUALITY: u8 = 85;

/// Largest width and height a thumbnail may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            max_width: 200,
            max_height: 200,
        }
    }
}

#[derive(Debug, Error)]
enum ThumbnailError {
    #[error("image has zero width or height")]
    Empty,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Store(#[from] crate::services::store::StoreError),
    #[error("thumbnail task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type Encode = fn(&DynamicImage, &mut Cursor<Vec<u8>>) -> ImageResult<()>;

/// Decode/encode pair for one recognized raster format.
pub struct ImageCodec {
    pub extensions: &'static [&'static str],
    pub format: ImageFormat,
    encode: Encode,
}

impl ImageCodec {
    fn decode(&self, data: &[u8]) -> ImageResult<DynamicImage> {
        image::load_from_memory_with_format(data, self.format)
    }
}

fn encode_png(img: &DynamicImage, out: &mut Cursor<Vec<u8>>) -> ImageResult<()> {
    img.write_to(out, ImageFormat::Png)
}

fn encode_jpeg(img: &DynamicImage, out: &mut Cursor<Vec<u8>>) -> ImageResult<()> {
    // JPEG has no alpha channel.
    JpegEncoder::new_with_quality(out, JPEG_QUALITY).encode_image(&img.to_rgb8())
}

fn encode_gif(img: &DynamicImage, out: &mut Cursor<Vec<u8>>) -> ImageResult<()> {
    DynamicImage::ImageRgba8(img.to_rgba8()).write_to(out, ImageFormat::Gif)
}

fn encode_webp(img: &DynamicImage, out: &mut Cursor<Vec<u8>>) -> ImageResult<()> {
    DynamicImage::ImageRgba8(img.to_rgba8()).write_to(out, ImageFormat::WebP)
}

pub static CODECS: &[ImageCodec] = &[
    ImageCodec {
        extensions: &["jpg", "jpeg"],
        format: ImageFormat::Jpeg,
        encode: encode_jpeg,
    },
    ImageCodec {
        extensions: &["png"],
        format: ImageFormat::Png,
        encode: encode_png,
    },
    ImageCodec {
        extensions: &["gif"],
        format: ImageFormat::Gif,
        encode: encode_gif,
    },
    ImageCodec {
        extensions: &["webp"],
        format: ImageFormat::WebP,
        encode: encode_webp,
    },
];

/// Codec for a file name, by its (case-insensitive) extension.
pub fn codec_for(file_name: &str) -> Option<&'static ImageCodec> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    CODECS.iter().find(|c| c.extensions.contains(&ext.as_str()))
}

/// Name of the thumbnail that belongs to `file_name`.
pub fn thumbnail_name(file_name: &str) -> String {
    format!("{}{}", THUMBNAIL_PREFIX, file_name)
}

pub fn is_thumbnail(file_name: &str) -> bool {
    file_name.starts_with(THUMBNAIL_PREFIX)
}

/// Target size: `floor(scale * side)` with `scale = min(max_w / w, max_h / h)`,
/// never below one pixel. Images smaller than the box are scaled up to touch it.
/// Computed on integers so exact ratios do not lose a pixel to rounding.
pub fn fit_within(width: u32, height: u32, bounds: Bounds) -> (u32, u32) {
    let (w, h) = (u64::from(width.max(1)), u64::from(height.max(1)));
    let (max_w, max_h) = (u64::from(bounds.max_width), u64::from(bounds.max_height));
    // max_w / w <= max_h / h, cross-multiplied.
    let (tw, th) = if max_w * h <= max_h * w {
        (max_w, h * max_w / w)
    } else {
        (w * max_h / h, max_h)
    };
    (
        u32::try_from(tw).unwrap_or(u32::MAX).max(1),
        u32::try_from(th).unwrap_or(u32::MAX).max(1),
    )
}

fn render(codec: &ImageCodec, data: &[u8], bounds: Bounds) -> Result<Vec<u8>, ThumbnailError> {
    let source = codec.decode(data)?;
    if source.width() == 0 || source.height() == 0 {
        return Err(ThumbnailError::Empty);
    }
    let (w, h) = fit_within(source.width(), source.height(), bounds);
    let resized = source.resize_exact(w, h, FilterType::Lanczos3);

    let mut out = Cursor::new(Vec::new());
    (codec.encode)(&resized, &mut out)?;
    Ok(out.into_inner())
}

async fn try_derive(
    store: &Arc<dyn AssetStore>,
    codec: &'static ImageCodec,
    dir: &SafePath,
    file_name: &str,
    bounds: Bounds,
) -> Result<SafePath, ThumbnailError> {
    let source_path = dir.join(file_name);
    let data = store.read(source_path.as_str()).await?;

    let encoded = tokio::task::spawn_blocking(move || render(codec, &data, bounds)).await??;

    let thumb_path = dir.join(&thumbnail_name(file_name));
    store
        .write(thumb_path.as_str(), Bytes::from(encoded))
        .await?;
    Ok(thumb_path)
}

/// Derive the thumbnail of `dir/file_name` and return its public URL.
///
/// Returns `None` for non-image files and for any decode, resize, encode or
/// write failure.
pub async fn derive(
    store: &Arc<dyn AssetStore>,
    dir: &SafePath,
    file_name: &str,
    bounds: Bounds,
) -> Option<String> {
    let codec = codec_for(file_name)?;
    match try_derive(store, codec, dir, file_name, bounds).await {
        Ok(path) => {
            debug!("derived thumbnail {}", path);
            Some(path.public_url())
        }
        Err(err) => {
            warn!("no thumbnail for {}: {}", dir.join(file_name), err);
            None
        }
    }
}
