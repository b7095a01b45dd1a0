//! Snapshot encoding, display thumbnails, and preview image loading.

use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{CachePolicy, ResolverConfig};
use crate::fetch::{FetchRequest, Fetcher};
use crate::types::{PreviewError, PreviewResult, RenderedSnapshot};

/// Decode image bytes in any format the `image` crate recognises.
pub fn decode_image(bytes: &[u8]) -> PreviewResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

pub fn encode_png(img: &DynamicImage) -> PreviewResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Downscale so neither edge exceeds `max`, preserving aspect ratio.
/// Images already small enough are returned unchanged.
pub fn thumbnail(img: &DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w > max || h > max {
        img.resize(max, max, image::imageops::FilterType::Lanczos3)
    } else {
        img.clone()
    }
}

/// `data:` URI for embedding bytes in JSON or HTML output.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

impl RenderedSnapshot {
    /// Wrap captured PNG bytes, reading their dimensions.
    pub fn from_png(source_url: Url, png: Vec<u8>) -> PreviewResult<Self> {
        let (width, height) = decode_image(&png)
            .map_err(|e| PreviewError::Capture(format!("capture is not a valid image: {e}")))?
            .dimensions();
        Ok(Self {
            source_url,
            width,
            height,
            png,
        })
    }

    /// PNG thumbnail sized for the preview slot.
    pub fn thumbnail_png(&self, max: u32) -> PreviewResult<Vec<u8>> {
        let img = decode_image(&self.png)?;
        encode_png(&thumbnail(&img, max))
    }

    pub fn to_data_uri(&self) -> String {
        data_uri("image/png", &self.png)
    }
}

/// A downloaded `og:image`, re-encoded as a display thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub source_url: Url,
    pub original_width: u32,
    pub original_height: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Loads the image an extracted record points at.
///
/// Uses the same cache policy and timeout as page fetches but no crawler
/// user agent.
pub struct ImageLoader {
    fetcher: Fetcher,
    cache_policy: CachePolicy,
    timeout: std::time::Duration,
    thumbnail_size: u32,
}

impl ImageLoader {
    pub fn new(fetcher: Fetcher, config: &ResolverConfig) -> Self {
        Self {
            fetcher,
            cache_policy: config.cache_policy,
            timeout: config.timeout,
            thumbnail_size: config.thumbnail_size,
        }
    }

    /// Download and thumbnail `url`; `None` on any failure.
    pub async fn load(&self, url: &Url) -> Option<PreviewImage> {
        match self.try_load(url).await {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::warn!(url = %url, "preview image unavailable: {e}");
                None
            }
        }
    }

    pub async fn try_load(&self, url: &Url) -> PreviewResult<PreviewImage> {
        let request = FetchRequest::new(url.clone())
            .with_cache_policy(self.cache_policy)
            .with_timeout(self.timeout)
            .without_user_agent();
        let bytes = self.fetcher.try_fetch(&request).await?;

        let img = decode_image(&bytes)?;
        let (original_width, original_height) = img.dimensions();
        let thumb = thumbnail(&img, self.thumbnail_size);
        let (width, height) = thumb.dimensions();

        Ok(PreviewImage {
            source_url: url.clone(),
            original_width,
            original_height,
            width,
            height,
            png: encode_png(&thumb)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_of(w: u32, h: u32) -> Vec<u8> {
        encode_png(&DynamicImage::new_rgb8(w, h)).unwrap()
    }

    #[test]
    fn test_thumbnail_small_image_unchanged() {
        let img = DynamicImage::new_rgb8(50, 30);
        assert_eq!(thumbnail(&img, 140).dimensions(), (50, 30));
    }

    #[test]
    fn test_thumbnail_large_image_keeps_aspect() {
        let img = DynamicImage::new_rgb8(1000, 500);
        let (w, h) = thumbnail(&img, 140).dimensions();
        assert_eq!(w, 140);
        assert_eq!(h, 70);
    }

    #[test]
    fn test_snapshot_from_png_reads_dimensions() {
        let url = Url::parse("https://example.com").unwrap();
        let snap = RenderedSnapshot::from_png(url, png_of(390, 390)).unwrap();
        assert_eq!((snap.width, snap.height), (390, 390));

        let thumb = decode_image(&snap.thumbnail_png(140).unwrap()).unwrap();
        assert_eq!(thumb.dimensions(), (140, 140));
        assert!(snap.to_data_uri().starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn test_snapshot_from_garbage_is_capture_error() {
        let url = Url::parse("https://example.com").unwrap();
        let err = RenderedSnapshot::from_png(url, b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, PreviewError::Capture(_)));
    }
}
