use clap::Parser;
use site_clone::{CloneError, CloneRequest, Cloner};

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    if let Err(e) = run(&args).await {
        ::log::error!("Clone of {} failed ({}): {}", args.url, e.kind(), e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<(), CloneError> {
    let mut cloner = match &args.config {
        Some(path) => Cloner::new().with_config_file(path)?,
        None => Cloner::new(),
    };

    let mut config = cloner.config().clone();
    config.apply_env();
    cloner = cloner.with_config(config);
    if let Some(url) = &args.webdriver_url {
        cloner = cloner.with_webdriver_url(url);
    }

    if !args.light {
        ::log::info!(
            "Browser renders use the WebDriver server at {}",
            cloner.config().webdriver_url
        );
    }

    let orchestrator = cloner.build()?;

    let start_time = std::time::Instant::now();
    let outcome = orchestrator
        .clone_site(&CloneRequest::new(args.url.as_str(), args.light))
        .await?;
    ::log::info!(
        "{} (artifact {}) in {:.2} seconds",
        outcome.message,
        outcome.artifact_id,
        start_time.elapsed().as_secs_f64()
    );
    for attempt in &outcome.attempts {
        ::log::debug!(
            "{:?} path: {} after {:?}",
            attempt.path,
            attempt.error.as_deref().unwrap_or("ok"),
            attempt.elapsed
        );
    }

    let preview = orchestrator.preview(&outcome.artifact_id).await?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, preview)?;
            ::log::info!("Wrote {}", path.display());
        }
        None => println!("{}", preview),
    }
    Ok(())
}
