use clap::Parser;
use render_crawl::sink::JsonLinesSink;
use render_crawl::{CrawlState, Crawler, WebDriverRenderer};
use std::process::ExitCode;
use std::time::Duration;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            ::log::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    ::log::info!(
        "Starting crawler for {} seed(s): {}",
        config.seeds.len(),
        config.seeds.join(", ")
    );
    ::log::info!(
        "Rendering requires a WebDriver server at {} (override with --webdriver-url or WEBDRIVER_URL)",
        config.render.webdriver_url
    );

    let renderer = WebDriverRenderer::new(config.render.clone());
    let crawler = Crawler::new(config, renderer);

    let token = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupted, finishing in-flight pages");
            token.cancel();
        }
    });

    if let Some(total_timeout) = args.total_timeout {
        let token = crawler.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(total_timeout)).await;
            ::log::warn!("Total timeout of {}s reached, stopping", total_timeout);
            token.cancel();
        });
    }

    let start_time = std::time::Instant::now();
    let report = match crawler.run(JsonLinesSink::new(std::io::stdout())).await {
        Ok(report) => report,
        Err(e) => {
            ::log::error!("Failed to start crawler: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for failure in &report.failures {
        ::log::warn!("{} {}: {}", failure.cause, failure.url, failure.message);
    }
    ::log::info!(
        "Crawling complete in {:.2} seconds - {}",
        start_time.elapsed().as_secs_f64(),
        report
    );

    if report.state == CrawlState::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
