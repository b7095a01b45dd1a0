//! Entry point for the `linkpeek` binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::oneshot;
use url::Url;

use linkpeek::{
    opengraph, CachePolicy, ChromiumRenderer, Fetcher, ImageLoader, NoopRenderer, PreviewRequest,
    Renderer, Resolver, ResolverConfig, TextDecoding, Viewport,
};
use linkpeek_cli::config::{load_config, resolve_chromium_path};
use linkpeek_cli::output;

#[derive(Parser)]
#[command(
    name = "linkpeek",
    about = "Resolve link previews from Open Graph tags, with a rendered snapshot fallback",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Path to a Chromium executable for the snapshot fallback.
    /// Also reads from LINKPEEK_CHROMIUM_PATH.
    #[arg(long, global = true)]
    chromium: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a preview for one URL.
    Resolve(ResolveArgs),

    /// Extract Open Graph metadata from a local HTML file.
    Extract {
        /// HTML file to read.
        file: PathBuf,

        /// Byte decoding (latin1, ascii, utf8, utf8-lossy).
        #[arg(long, default_value = "latin1")]
        decoding: TextDecoding,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   linkpeek completions bash > ~/.local/share/bash-completion/completions/linkpeek
    ///   linkpeek completions zsh > ~/.zfunc/_linkpeek
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Absolute URL to resolve.
    url: String,

    /// Skip resolution entirely (metadata disabled).
    #[arg(long)]
    no_metadata: bool,

    /// Write the fallback snapshot PNG here, if one was captured.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Download the og:image and write its thumbnail here.
    #[arg(long)]
    image_out: Option<PathBuf>,

    /// JSON resolver config. Also reads from LINKPEEK_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the completion as JSON.
    #[arg(long)]
    json: bool,

    /// Include snapshot PNG data (base64) in JSON output.
    #[arg(long, requires = "json")]
    include_png: bool,

    /// Fetch timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Byte decoding for the fetched page.
    #[arg(long)]
    decoding: Option<TextDecoding>,

    /// Bypass the response cache.
    #[arg(long)]
    reload: bool,

    /// Also render a snapshot when metadata has no image.
    #[arg(long)]
    render_on_missing_image: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Resolve(args) => resolve(args, cli.chromium).await?,

        Commands::Extract {
            file,
            decoding,
            json,
        } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let metadata = opengraph::extract(&bytes, decoding).with_context(|| {
                format!(
                    "{} is not decodable as {} HTML",
                    file.display(),
                    decoding.as_str()
                )
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                print!("{}", output::render_metadata(&metadata));
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "linkpeek", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn apply_overrides(config: &mut ResolverConfig, args: &ResolveArgs) {
    if let Some(ms) = args.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(decoding) = args.decoding {
        config.decoding = decoding;
    }
    if args.reload {
        config.cache_policy = CachePolicy::ReloadIgnoringCache;
    }
    if args.render_on_missing_image {
        config.render_on_missing_image = true;
    }
}

async fn launch_renderer(explicit: Option<PathBuf>, viewport: Viewport) -> Arc<dyn Renderer> {
    let Some(path) = resolve_chromium_path(explicit.as_deref()) else {
        tracing::warn!("Chromium not found; snapshot fallback disabled");
        return Arc::new(NoopRenderer);
    };

    match ChromiumRenderer::launch(path.clone(), viewport).await {
        Ok(renderer) => {
            tracing::debug!(path = %path.display(), "Chromium launched");
            Arc::new(renderer)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "{e:#}; snapshot fallback disabled");
            Arc::new(NoopRenderer)
        }
    }
}

async fn resolve(args: ResolveArgs, chromium: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let url = Url::parse(&args.url).with_context(|| format!("not an absolute URL: {}", args.url))?;
    let fetcher = Fetcher::from_config(&config)?;
    let renderer = launch_renderer(chromium, config.viewport).await;
    let resolver = Arc::new(Resolver::new(
        fetcher.clone(),
        Arc::clone(&renderer),
        config.clone(),
    ));

    let (tx, rx) = oneshot::channel();
    let request = PreviewRequest::new(Some(url), !args.no_metadata);
    let Some(handle) = resolver.dispatch(request, tx) else {
        println!("No link found or metadata disabled");
        renderer.shutdown().await?;
        return Ok(());
    };

    let completion = tokio::select! {
        completion = rx => completion.context("resolution ended without a completion")?,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            renderer.shutdown().await?;
            anyhow::bail!("interrupted");
        }
    };

    if args.json {
        let value = output::render_json(&completion, args.include_png)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", output::render_text(&completion));
    }

    if let Some(path) = &args.snapshot_out {
        match completion.resolution.snapshot() {
            Some(snapshot) => output::write_png(path, &snapshot.png)?,
            None => tracing::warn!("no snapshot captured; {} not written", path.display()),
        }
    }

    if let Some(path) = &args.image_out {
        match completion.resolution.metadata().and_then(|md| md.image.as_ref()) {
            Some(image_url) => {
                let loader = ImageLoader::new(fetcher, &config);
                match loader.load(image_url).await {
                    Some(image) => {
                        if !args.json {
                            println!("{}", output::render_image(&image));
                        }
                        output::write_png(path, &image.png)?;
                    }
                    None => tracing::warn!(
                        "og:image could not be loaded; {} not written",
                        path.display()
                    ),
                }
            }
            None => tracing::warn!("no og:image; {} not written", path.display()),
        }
    }

    renderer.shutdown().await?;
    Ok(())
}
