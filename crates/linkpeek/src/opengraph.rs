//! Open Graph extraction: title, description and image from page HTML.

use url::Url;

use crate::decode::TextDecoding;
use crate::html::HtmlDocument;
use crate::types::{LinkMetadata, PreviewError, PreviewResult};

pub const OG_TITLE: &str = "og:title";
pub const OG_DESCRIPTION: &str = "og:description";
pub const OG_IMAGE: &str = "og:image";

/// Extract Open Graph metadata from raw HTML bytes.
///
/// `None` only when the bytes cannot be parsed as HTML. A page without any
/// Open Graph tags yields an empty record.
pub fn extract(bytes: &[u8], decoding: TextDecoding) -> Option<LinkMetadata> {
    extract_detailed(bytes, decoding).map(|e| e.metadata)
}

/// Extraction result that also keeps why a present `og:image` was dropped.
#[derive(Debug)]
pub struct Extraction {
    pub metadata: LinkMetadata,
    /// Set when the page had an `og:image` that was not an absolute URL.
    pub image_error: Option<PreviewError>,
}

/// Like [`extract`], keeping the `og:image` rejection reason.
pub fn extract_detailed(bytes: &[u8], decoding: TextDecoding) -> Option<Extraction> {
    let document = HtmlDocument::parse(bytes, decoding)?;
    Some(read_document(&document))
}

/// Run the three lookups against an already parsed document.
pub fn from_document(document: &HtmlDocument) -> LinkMetadata {
    read_document(document).metadata
}

fn read_document(document: &HtmlDocument) -> Extraction {
    let image = document.content_of(OG_IMAGE).map(|raw| resolve_image(&raw));
    let (image, image_error) = match image {
        Some(Ok(url)) => (Some(url), None),
        Some(Err(e)) => {
            tracing::debug!("dropping og:image: {e}");
            (None, Some(e))
        }
        None => (None, None),
    };

    Extraction {
        metadata: LinkMetadata {
            title: document.content_of(OG_TITLE),
            description: document.content_of(OG_DESCRIPTION),
            image,
        },
        image_error,
    }
}

/// Interpret an `og:image` value as an absolute URL.
///
/// Relative references are not joined against the page URL; they fail.
pub fn resolve_image(raw: &str) -> PreviewResult<Url> {
    Url::parse(raw).map_err(|e| PreviewError::ImageUrlInvalid(format!("{raw:?}: {e}")))
}
