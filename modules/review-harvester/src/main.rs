use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_common::{HarvestConfig, ScoreSet, SubjectQuery};
use review_harvester::run_log::{EventSink, RunLog, Tee, TracingSink};
use review_harvester::webdriver::WebDriverSurface;
use review_harvester::Harvester;
use webdriver_client::{BrowserOptions, WebDriverClient};

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

#[derive(Parser)]
#[command(name = "review-harvester", about = "Harvest low-score reviews for one place")]
struct Cli {
    /// Name of the place, as typed into the map search.
    name: String,

    /// Optional location appended to the search.
    #[arg(long)]
    location: Option<String>,

    /// Comma-separated star ratings to keep.
    #[arg(long, default_value = "1,2,3")]
    stars: String,

    /// WebDriver endpoint. Falls back to WEBDRIVER_URL.
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Write the structured run log as JSON to this path.
    #[arg(long)]
    run_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("review_harvester=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let wanted = ScoreSet::parse_list(&cli.stars)?;
    let query = SubjectQuery::new(cli.name, cli.location);

    let config = HarvestConfig::from_env()?;
    config.log_summary();

    let webdriver_url = cli
        .webdriver_url
        .or_else(|| std::env::var("WEBDRIVER_URL").ok())
        .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
    info!(webdriver_url = webdriver_url.as_str(), "Using WebDriver endpoint");

    let client = WebDriverClient::new(&webdriver_url, BrowserOptions::default())?;
    let surface = Arc::new(WebDriverSurface::new(client));

    let run_log = Arc::new(RunLog::new());
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink) as Arc<dyn EventSink>, run_log.clone()];
    let sink = Arc::new(Tee(sinks));

    let harvester = Harvester::new(surface, config, sink);
    let report = harvester.harvest(&query, &wanted).await;

    for record in &report.records {
        println!("{}", serde_json::to_string(record)?);
    }
    eprintln!("{}", report.stats);
    if let Some(diagnostic) = &report.diagnostic {
        eprintln!("Harvest aborted: {diagnostic}");
    }

    if let Some(path) = cli.run_log {
        let json = serde_json::to_string_pretty(&run_log.to_json()?)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing run log to {}", path.display()))?;
        info!(path = %path.display(), events = run_log.events().len(), "Run log written");
    }

    Ok(())
}
