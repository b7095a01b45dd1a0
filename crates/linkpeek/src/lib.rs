//! Link preview resolution: Open Graph metadata first, an off-screen render
//! snapshot when that fails.

pub mod config;
pub mod decode;
pub mod fetch;
pub mod html;
pub mod opengraph;
pub mod renderer;
pub mod resolver;
pub mod snapshot;
pub mod types;

pub use config::{CachePolicy, ResolverConfig, Viewport};
pub use decode::TextDecoding;
pub use fetch::{FetchRequest, Fetcher, ResponseCache};
pub use html::HtmlDocument;
pub use renderer::chromium::ChromiumRenderer;
pub use renderer::{FallbackRenderer, NoopRenderer, RenderSurface, Renderer};
pub use resolver::{ResolutionHandle, ResolutionState, Resolver};
pub use snapshot::{ImageLoader, PreviewImage};
pub use types::*;
