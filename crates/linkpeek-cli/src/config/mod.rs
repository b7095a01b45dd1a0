//! Configuration loading and path resolution.

use std::path::{Path, PathBuf};

use anyhow::Context;
use linkpeek::ResolverConfig;

/// Environment variable naming the Chromium executable.
pub const CHROMIUM_ENV: &str = "LINKPEEK_CHROMIUM_PATH";

/// Environment variable naming a resolver config file.
pub const CONFIG_ENV: &str = "LINKPEEK_CONFIG";

/// Load the resolver config.
///
/// Order: `explicit`, then `LINKPEEK_CONFIG`, then `~/.linkpeek/config.json`
/// if it exists. With none of those, the built-in defaults are used.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ResolverConfig> {
    match resolve_config_path(explicit) {
        Some(path) => read_config(&path),
        None => Ok(ResolverConfig::default()),
    }
}

/// Read and parse a JSON config file. Missing fields take their defaults.
pub fn read_config(path: &Path) -> anyhow::Result<ResolverConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = ResolverConfig::from_json(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let default = dirs::home_dir()?.join(".linkpeek/config.json");
    default.exists().then_some(default)
}

/// Find a Chromium executable for the fallback renderer.
///
/// Order: `explicit`, `LINKPEEK_CHROMIUM_PATH`, `~/.linkpeek/chromium/`,
/// then `google-chrome`, `chromium`, `chromium-browser` on `PATH`.
pub fn resolve_chromium_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(p) = std::env::var(CHROMIUM_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(path) = dirs::home_dir().and_then(|home| find_installed_chromium(&home)) {
        return Some(path);
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Look for a Chrome-for-Testing style install under `<home>/.linkpeek/chromium/`.
pub fn find_installed_chromium(home: &Path) -> Option<PathBuf> {
    let root = home.join(".linkpeek/chromium");
    let candidates = if cfg!(target_os = "macos") {
        vec![
            root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            root.join("chrome"),
        ]
    } else {
        vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
    };
    candidates.into_iter().find(|c| c.exists())
}
