// Copyright 2026 Pagefetch Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagefetch_runtime::config::BrowserBackend;
use pagefetch_runtime::{logging, FetchConfig, FetchMode, FetchRequest, Fetcher};

#[derive(Parser)]
#[command(
    name = "pagefetch",
    about = "Pagefetch: fetch pages through rate limits and bot challenges",
    version
)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a page over plain HTTP
    Get {
        url: String,
    },
    /// Render a page in a browser and wait for a selector
    Render {
        url: String,
        /// CSS selector that marks the page as ready
        #[arg(long, default_value = "body")]
        selector: String,
    },
    /// Fetch over HTTP, escalating to a browser when the page is not ready
    Auto {
        url: String,
        #[arg(long)]
        selector: Option<String>,
    },
    /// Check configuration and report the selected browser backend
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    let config = FetchConfig::from_env().context("failed to load configuration")?;

    let result = match cli.command {
        Commands::Get { url } => get(config, &url).await,
        Commands::Render { url, selector } => render(config, &url, &selector).await,
        Commands::Auto { url, selector } => auto(config, &url, selector).await,
        Commands::Doctor => doctor(&config),
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}

async fn get(config: FetchConfig, url: &str) -> Result<()> {
    let fetcher = Fetcher::http_only(config)?;
    let resp = fetcher.http().get(url).await?;
    eprintln!("  HTTP {} {}", resp.status, resp.final_url);
    println!("{}", resp.body);
    Ok(())
}

async fn render(config: FetchConfig, url: &str, selector: &str) -> Result<()> {
    let fetcher = Fetcher::new(config)?;
    let request = fetcher.page_request(url, selector);
    let html = fetcher.try_fetch(&request).await?;
    if html.is_empty() {
        anyhow::bail!("no content rendered for {url}");
    }
    println!("{html}");
    Ok(())
}

async fn auto(config: FetchConfig, url: &str, selector: Option<String>) -> Result<()> {
    let timeout = config.browser_fetch_timeout();
    let fetcher = match Fetcher::new(config.clone()) {
        Ok(fetcher) => fetcher,
        Err(e) if e.is_configuration() => {
            eprintln!("  No browser backend ({e}); plain HTTP only.");
            Fetcher::http_only(config)?
        }
        Err(e) => return Err(e.into()),
    };

    let mut request = FetchRequest::new(url, FetchMode::Auto, timeout);
    if let Some(selector) = selector {
        request = request.with_selector(selector);
    }
    println!("{}", fetcher.try_fetch(&request).await?);
    Ok(())
}

fn doctor(config: &FetchConfig) -> Result<()> {
    println!("  retry budget      {}", config.retry_budget);
    println!("  request timeout   {}ms", config.timeout_ms);
    println!("  render deadline   {}ms", config.render_deadline_ms);
    println!("  cache ttl         {}s", config.cache.ttl_secs);

    match config.browser_backend()? {
        BrowserBackend::RemoteService(url) => println!("  browser backend   remote service at {url}"),
        BrowserBackend::Local { executable } => {
            println!("  browser backend   local {}", executable.display())
        }
    }
    Ok(())
}
