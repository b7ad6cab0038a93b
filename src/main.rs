use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use seo_enricher::config::ConfigLoader;
use seo_enricher::job::{CancelOutcome, DirQueue, JobQueue, JobRequest};
use seo_enricher::limiter::RateLimiters;
use seo_enricher::metrics::MetricsCollector;
use seo_enricher::record::Provider;
use seo_enricher::sources::Sources;
use seo_enricher::worker::QueueWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

#[derive(Parser)]
#[command(name = "seo-enricher")]
#[command(version)]
#[command(about = "Queue worker that enriches URL lists with SEO metrics", long_about = None)]
struct Cli {
    /// Path to the worker configuration file (JSON/YAML/TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue worker until Ctrl-C
    Run {
        /// Show a progress bar for the running job (stderr)
        #[arg(short, long)]
        progress: bool,
    },
    /// Queue a new job and print its id
    Submit {
        /// URL to enrich; repeatable
        #[arg(long = "url")]
        urls: Vec<String>,

        /// File with one URL per line
        #[arg(long)]
        urls_file: Option<PathBuf>,

        /// Enables Majestic topics
        #[arg(long)]
        majestic_key: Option<String>,

        /// Enables Ahrefs metrics
        #[arg(long)]
        ahrefs_key: Option<String>,

        /// Enables DataForSEO metrics (`login:password`)
        #[arg(long)]
        dataforseo_key: Option<String>,
    },
    /// Print a job's status as JSON
    Status { id: String },
    /// Cancel a queued or running job
    Cancel { id: String },
    /// Copy a completed job's report out of the results directory
    Download {
        id: String,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate the configuration
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let level = logger.filter();
    let multi = indicatif::MultiProgress::new();

    if matches!(cli.command, Commands::Run { progress: true }) {
        indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init()?;
    } else {
        log::set_boxed_logger(Box::new(logger))?;
    }
    log::set_max_level(level);

    if let Commands::Check = cli.command {
        match ConfigLoader::load_or_default(cli.config.as_deref()) {
            Ok(cfg) => {
                println!("✅ Config is valid:");
                println!("   Jobs dir: {}", cfg.jobs_dir.display());
                println!("   Results dir: {}", cfg.results_dir.display());
                println!("   Format: {}", cfg.export.format.extension());
                println!("   Max connections: {}", cfg.max_connections);
            }
            Err(e) => {
                eprintln!("❌ Config error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    let queue = Arc::new(DirQueue::from_config(&config));
    queue.ensure_dirs().await?;

    match cli.command {
        Commands::Run { progress } => {
            let limiters = RateLimiters::from_config(&config.rate_limits);
            let factory = Arc::new(Sources::new(config.clone(), limiters));
            let metrics = MetricsCollector::new();
            let watcher = QueueWatcher::new(&config, queue, factory, metrics.clone());

            let progress_task = if progress {
                let pb = multi.add(ProgressBar::new(0));
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                        .progress_chars("#>-"),
                );
                let mut updates = WatchStream::new(watcher.processor().subscribe());
                Some(tokio::spawn(async move {
                    while let Some(update) = updates.next().await {
                        if let Some(current) = update {
                            pb.set_length(current.total as u64);
                            pb.set_position(current.processed as u64);
                            pb.set_message(format!("job {}", current.job_id));
                        }
                    }
                }))
            } else {
                None
            };

            watcher
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                    log::info!("Shutting down...");
                })
                .await?;

            if let Some(task) = progress_task {
                task.abort();
            }

            let final_metrics = metrics.snapshot();
            println!("\n✅ Worker stopped:");
            println!("   Jobs Completed: {}", final_metrics.jobs_completed);
            println!("   Jobs Failed: {}", final_metrics.jobs_failed);
            println!("   Jobs Cancelled: {}", final_metrics.jobs_cancelled);
            println!("   URLs Processed: {}", final_metrics.urls_processed);
            println!("   Uptime: {:.1}s", final_metrics.uptime_seconds);
        }
        Commands::Submit {
            mut urls,
            urls_file,
            majestic_key,
            ahrefs_key,
            dataforseo_key,
        } => {
            if let Some(path) = urls_file {
                let contents = tokio::fs::read_to_string(&path).await?;
                urls.extend(contents.lines().map(str::to_owned));
            }

            let mut request = JobRequest::new(urls);
            let keys = [
                (Provider::Majestic, majestic_key),
                (Provider::Ahrefs, ahrefs_key),
                (Provider::DataForSeo, dataforseo_key),
            ];
            for (provider, key) in keys {
                if let Some(key) = key {
                    request = request.with_source(provider, key);
                }
            }

            let id = queue.enqueue(&request).await?;
            println!("{}", id);
        }
        Commands::Status { id } => {
            let view = queue.status(&id).await?;
            println!("{}", serde_json::to_string_pretty(&view.to_json())?);
        }
        Commands::Cancel { id } => {
            let message = match queue.cancel(&id).await? {
                CancelOutcome::Dequeued => "Job removed from queue",
                CancelOutcome::CancelRequested => "Job cancellation requested",
                CancelOutcome::AlreadyFinished => "Job already finished",
                CancelOutcome::NotFound => "Job not found",
            };
            println!("{}", message);
        }
        Commands::Download { id, out } => {
            let artifact = queue.artifact(&id).await?;
            let target = out.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
            tokio::fs::copy(&artifact.path, &target).await?;
            println!("Saved {} ({}) to {}", artifact.file_name, artifact.content_type, target.display());
        }
        Commands::Check => {}
    }

    Ok(())
}
