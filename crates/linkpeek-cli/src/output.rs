//! Printing completions and writing image files.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use base64::Engine;
use linkpeek::{Completion, LinkMetadata, PreviewImage, Resolution};
use serde_json::Value;

/// Human-readable summary of a completion.
pub fn render_text(completion: &Completion) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "url:          {}", completion.url);
    let _ = writeln!(out, "result:       {}", kind_label(&completion.resolution));

    if let Some(md) = completion.resolution.metadata() {
        write_metadata(&mut out, md);
    }
    if let Some(snap) = completion.resolution.snapshot() {
        let _ = writeln!(
            out,
            "snapshot:     {}x{} png, {} bytes",
            snap.width,
            snap.height,
            snap.png.len()
        );
    }
    if let Some(cause) = completion.fallback_cause {
        let _ = writeln!(out, "fallback:     {cause}");
    }
    if let Some(failure) = completion.render_failure {
        let _ = writeln!(out, "render error: {failure}");
    }
    let _ = writeln!(out, "elapsed:      {} ms", completion.elapsed_ms);
    out
}

/// Metadata fields only, for `extract`.
pub fn render_metadata(md: &LinkMetadata) -> String {
    let mut out = String::new();
    write_metadata(&mut out, md);
    out
}

fn write_metadata(out: &mut String, md: &LinkMetadata) {
    let field = |v: Option<&str>| v.unwrap_or("-").to_string();
    let _ = writeln!(out, "title:        {}", field(md.title.as_deref()));
    let _ = writeln!(out, "description:  {}", field(md.description.as_deref()));
    let _ = writeln!(
        out,
        "image:        {}",
        field(md.image.as_ref().map(|u| u.as_str()))
    );
}

fn kind_label(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::Metadata(_) => "metadata",
        Resolution::Snapshot(_) => "snapshot",
        Resolution::MetadataWithSnapshot { .. } => "metadata+snapshot",
        Resolution::Nothing => "nothing",
    }
}

/// JSON form of a completion. Snapshot PNG bytes are replaced by their
/// length unless `include_png` is set.
pub fn render_json(completion: &Completion, include_png: bool) -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(completion)?;
    if !include_png {
        if let Some(resolution) = value.get_mut("resolution") {
            strip_png(resolution);
            if let Some(snapshot) = resolution.get_mut("snapshot") {
                strip_png(snapshot);
            }
        }
    }
    Ok(value)
}

fn strip_png(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        if let Some(Value::String(b64)) = obj.remove("png") {
            let len = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map(|bytes| bytes.len())
                .unwrap_or_default();
            obj.insert("png_bytes".into(), len.into());
        }
    }
}

/// Summary line for a downloaded `og:image`.
pub fn render_image(img: &PreviewImage) -> String {
    format!(
        "preview image: {} ({}x{} → {}x{})",
        img.source_url, img.original_width, img.original_height, img.width, img.height
    )
}

/// Write PNG bytes to `path`, creating parent directories.
pub fn write_png(path: &Path, png: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = png.len(), "wrote image");
    Ok(())
}
