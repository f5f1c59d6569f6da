use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use idor_scout::browser::chrome::ChromeSession;
use idor_scout::config::RunConfig;
use idor_scout::crawl::TraversalController;
use idor_scout::intercept::{RequestInterceptor, TestQueue};
use idor_scout::output::artifacts::{Artifacts, RUN_LOG_FILE, SITEMAP_FILE};
use idor_scout::replay::ReplayVerifier;
use idor_scout::scope::ScopeFilter;
use idor_scout::sitemap::SitemapStore;

fn print_ascii_logo() {
    println!(
        r#"
         ___ ___   ___  ___     ___  ___ ___  _   _ _____
        |_ _|   \ / _ \| _ \   / __|/ __/ _ \| | | |_   _|
         | || |) | (_) |   /   \__ \ (_| (_) | |_| | | |
        |___|___/ \___/|_|_\   |___/\___\___/ \___/  |_|

                    IDOR Scanner v0.1.0
    "#
    );
}

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Scan { config, out, headless } => {
            let mut run_config = RunConfig::from_file(Path::new(&config))?;
            if let Some(out) = out {
                run_config.log_dir = out;
            }
            if let Some(headless) = headless {
                run_config.headless = headless;
            }

            let log_dir = PathBuf::from(&run_config.log_dir);
            idor_scout::utils::ensure_dir(&log_dir)?;
            init_logging(cli.debug, cli.verbose, Some(&log_dir.join(RUN_LOG_FILE)))?;

            run_scan(run_config).await
        }
        Commands::Brute { url, userlist, passlist, success_marker } => {
            init_logging(cli.debug, cli.verbose, None)?;
            idor_scout::brute::run(
                &url,
                Path::new(&userlist),
                Path::new(&passlist),
                &success_marker,
            )
            .await
        }
    }
}

/// Configure logging from the global flags. The console stays at the
/// requested level while the run log file always captures info; external
/// crates (reqwest/hyper/chromiumoxide) are capped to avoid flooding.
fn init_logging(debug: bool, verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let crate_level = if debug { "debug" } else if verbose { "info" } else { "warn" };
    let filter_str =
        format!("idor_scout={crate_level},reqwest=info,hyper=info,h2=info,chromiumoxide=warn");
    let console_filter =
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_filter(console_filter);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("failed to open run log {}", path.display()))?;
            let file_filter = EnvFilter::try_new("idor_scout=info,chromiumoxide=warn")
                .unwrap_or_else(|_| EnvFilter::new("info"));
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file))
                .with_filter(file_filter);
            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
        }
    }
    Ok(())
}

async fn run_scan(config: RunConfig) -> anyhow::Result<()> {
    anyhow::ensure!(!config.start_urls.is_empty(), "no start urls configured");
    anyhow::ensure!(!config.scope.is_empty(), "no scope configured");

    print_ascii_logo();
    println!("[>] Scope: {}", config.scope.join(", "));
    println!("[>] Start URLs: {}", config.start_urls.join(", "));
    println!("[~] Interesting keys: {}", config.keys.len());
    if !config.graphql_paths.is_empty() {
        println!("[~] GraphQL paths: {}", config.graphql_paths.join(", "));
    }
    println!("\n{}\n", "-".repeat(60));

    let log_dir = PathBuf::from(&config.log_dir);
    let artifacts = Artifacts::prepare(&log_dir)?;
    let sitemap = Arc::new(SitemapStore::open(&log_dir.join(SITEMAP_FILE))?);
    let queue = Arc::new(TestQueue::new());
    let interceptor = Arc::new(RequestInterceptor::new(&config, sitemap.clone(), queue.clone()));

    // Phase 1: spidering & collection. A browser that won't launch is the
    // one unrecoverable failure.
    println!("[*] Starting spidering phase");
    let session = ChromeSession::launch(&config, interceptor)
        .await
        .context("cannot start browsing session")?;

    let scope = ScopeFilter::new(&config.scope, &config.excluded_domains);
    let mut controller = TraversalController::new(&session, &scope, &config);
    if let Err(e) = controller.run().await {
        tracing::error!(error = %e, "unexpected error during crawl");
    }
    let pages = controller.pages_visited();
    let elements = controller.elements_interacted();
    drop(controller);

    println!(
        "[+] Crawl finished: {} pages visited, {} elements interacted, {} endpoint shapes discovered",
        pages,
        elements,
        sitemap.len()
    );
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "browser shutdown failed");
    }

    // Phase 2: offline analysis.
    let items = queue.drain();
    println!("[*] Starting analysis phase: testing {} requests", items.len());
    let verifier = ReplayVerifier::new(&config, &artifacts);
    let summary = verifier.run(items).await;

    println!("\n{}\n", "-".repeat(60));
    println!("[+] Scan complete");
    println!("    Vulnerable:    {}", summary.vulnerable);
    println!("    Ignored:       {}", summary.ignored);
    println!("    Replay errors: {}", summary.failed);
    println!("    Findings and logs in {}", log_dir.display());
    Ok(())
}
