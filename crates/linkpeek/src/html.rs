//! Minimal HTML document query: `<meta>` lookups in the document head.
//!
//! Parsing goes through `scraper` (html5ever), so malformed markup is
//! handled best-effort. Only the head is searched.

use scraper::{Html, Selector};

use crate::decode::TextDecoding;

/// One parsed HTML payload. Never mutated after construction.
pub struct HtmlDocument {
    document: Html,
}

impl HtmlDocument {
    /// Decode `bytes` with `decoding` and parse them.
    ///
    /// Returns `None` when the bytes are invalid under the decoding strategy
    /// or the decoded text is not markup at all.
    pub fn parse(bytes: &[u8], decoding: TextDecoding) -> Option<Self> {
        let text = decoding.decode(bytes)?;
        Self::parse_str(&text)
    }

    /// Parse already-decoded text.
    pub fn parse_str(html: &str) -> Option<Self> {
        if !looks_like_markup(html) {
            return None;
        }
        Some(Self {
            document: Html::parse_document(html),
        })
    }

    /// `content` of the first head `<meta>` whose `property` or `name`
    /// attribute equals `property` exactly.
    ///
    /// The first match in document order wins whichever attribute matched;
    /// if that element has no `content`, the answer is `None`.
    pub fn content_of(&self, property: &str) -> Option<String> {
        let head_sel = Selector::parse("head").ok()?;
        let meta_sel = Selector::parse("meta").ok()?;

        let head = self.document.select(&head_sel).next()?;
        let element = head.select(&meta_sel).find(|el| {
            let attrs = el.value();
            attrs.attr("property") == Some(property) || attrs.attr("name") == Some(property)
        })?;

        element.value().attr("content").map(str::to_string)
    }
}

/// Empty payloads, binary payloads (NUL bytes) and text without a single
/// tag are rejected before parsing.
fn looks_like_markup(text: &str) -> bool {
    !text.trim().is_empty() && !text.contains('\0') && text.contains('<')
}
