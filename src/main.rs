use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rune_config::RuneConfig;
use rune_critical::{Inliner, PreloadMode};
use rune_io::FsStore;

/// rune-inline - Inline critical CSS into pre-rendered HTML
#[derive(Parser, Debug)]
#[command(name = "rune-inline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTML files to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file (defaults to ./rune.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write results here instead of overwriting the inputs
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Base directory stylesheets are resolved under
    #[arg(long)]
    path: Option<String>,

    /// Public URL prefix stripped from stylesheet hrefs
    #[arg(long)]
    public_path: Option<String>,

    /// Preload mode (default, body, js, js-lazy, media, swap, swap-low, swap-high, false)
    #[arg(long)]
    preload: Option<PreloadMode>,

    /// Rewrite external stylesheets to hold only non-critical rules
    #[arg(long)]
    prune_source: bool,

    /// Inline whole stylesheets smaller than this many bytes
    #[arg(long)]
    inline_threshold: Option<usize>,

    /// Inline everything when the non-critical remainder is smaller than this
    #[arg(long)]
    minimum_external_size: Option<usize>,

    /// Pretty-print the emitted CSS
    #[arg(long)]
    no_compress: bool,
}

fn init_logging(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    match (out_dir, input.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => input.to_path_buf(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RuneConfig::load(cli.config.as_deref()).map_err(anyhow::Error::msg)?;
    init_logging(config.logging.filter());

    let options = &mut config.critical;
    if let Some(path) = cli.path {
        options.path = path;
    }
    if let Some(public_path) = cli.public_path {
        options.public_path = public_path;
    }
    if let Some(preload) = cli.preload {
        options.preload = preload;
    }
    if cli.prune_source {
        options.prune_source = true;
    }
    if let Some(threshold) = cli.inline_threshold {
        options.inline_threshold = threshold;
    }
    if let Some(size) = cli.minimum_external_size {
        options.minimum_external_size = size;
    }
    if cli.no_compress {
        options.compress = false;
    }

    if let Some(dir) = &cli.out_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let inliner = Inliner::new(config.critical, Arc::new(FsStore::new()));
    for input in &cli.inputs {
        let html = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read {}", input.display()))?;
        let output = inliner
            .process(&html)
            .await
            .with_context(|| format!("failed to process {}", input.display()))?;
        let target = output_path(input, cli.out_dir.as_deref());
        tokio::fs::write(&target, output)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::info!(input = %input.display(), output = %target.display(), "processed document");
    }
    inliner.flush().await;

    Ok(())
}
