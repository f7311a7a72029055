//! gitlab-dl CLI - search a GitLab instance and download every matching file

use clap::Parser;
use gitlab_dl::{Config, Event, GitLabApi, SearchDownloader, Summary};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gitlab-dl")]
#[command(version)]
#[command(about = "Search a GitLab instance and download every matching file")]
#[command(long_about = r#"
Enumerates blob search results from a GitLab instance, resolves each result
to its owning project, and downloads the matching files in parallel.

Downloads are resumable: re-running the same search into the same output
directory skips files that are already present.

Example usage:
  gitlab-dl 'GeneratedValue' --hostname gitlab.example.com
  gitlab-dl 'class MyService' --hostname gitlab.example.com --workers 20
  gitlab-dl 'fn main' --hostname gitlab.example.com --group platform/backend
"#)]
struct Cli {
    /// Search term to find in repository files
    query: String,

    /// GitLab hostname to search
    #[arg(long)]
    hostname: String,

    /// Restrict the search to a group path
    #[arg(long)]
    group: Option<String>,

    /// Number of parallel downloads (1-50)
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// Max retries for rate-limited requests
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Output directory (default: a timestamped directory under the temp dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Personal access token (falls back to the GITLAB_TOKEN env var)
    #[arg(long)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> gitlab_dl::Result<()> {
    let mut config = Config::new(cli.hostname, cli.query);
    config.group = cli.group;
    config.workers = cli.workers;
    config.retry.max_retries = cli.max_retries;
    config.token = cli.token.or_else(|| std::env::var("GITLAB_TOKEN").ok());
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    println!("Searching '{}' on {}", config.query, config.hostname);
    if let Some(group) = &config.group {
        println!("Scoped to group: {group}");
    }
    println!("Output directory: {}", config.output_dir.display());
    println!("Parallel workers: {}", config.workers);

    let api = Arc::new(GitLabApi::new(&config.hostname, config.token.clone())?);
    let output_dir = config.output_dir.clone();
    let downloader = SearchDownloader::new(config, api).await?;

    // Ctrl-C cancels the run; partial results remain resumable
    let cancel = downloader.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, finishing in-flight downloads...");
            cancel.cancel();
        }
    });

    let mut events = downloader.subscribe();
    let renderer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::Progress {
                    completed,
                    total,
                    success,
                    skipped,
                    failed,
                }) => render_progress(completed, total, success, skipped, failed),
                Ok(Event::Finished { .. }) | Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    });

    let result = downloader.run().await;
    let _ = renderer.await;
    println!();

    match result {
        Ok(summary) => {
            print_summary(&summary, &output_dir);
            Ok(())
        }
        Err(e) => {
            // Partial results are already persisted; report them before failing
            let summary = downloader.summary().await;
            print_summary(&summary, &output_dir);
            Err(e)
        }
    }
}

fn render_progress(completed: u64, total: u64, success: u64, skipped: u64, failed: u64) {
    const BAR_WIDTH: u64 = 40;
    let filled = if total > 0 {
        (BAR_WIDTH * completed / total).min(BAR_WIDTH)
    } else {
        0
    };
    let percent = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let bar: String = "=".repeat(filled as usize) + &"-".repeat((BAR_WIDTH - filled) as usize);
    print!(
        "\r[{bar}] {completed}/{total} ({percent:.1}%) | \u{2713}{success} \u{2298}{skipped} \u{2717}{failed}"
    );
    let _ = std::io::stdout().flush();
}

fn print_summary(summary: &Summary, output_dir: &std::path::Path) {
    println!("Files downloaded: {}", summary.success);
    println!("Files skipped (already present): {}", summary.skipped);
    println!("Failed downloads: {}", summary.failed);
    println!("Output directory: {}", output_dir.display());
    println!(
        "Metadata: {}",
        output_dir.join(gitlab_dl::METADATA_FILE_NAME).display()
    );
    println!(
        "Attempt log: {}",
        output_dir.join(gitlab_dl::ATTEMPT_LOG_FILE_NAME).display()
    );
}
