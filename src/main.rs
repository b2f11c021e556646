use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::error;

use relister::{
    config::Config,
    content::TemplateGenerator,
    ingest,
    progress::{self, RunPhase},
    store::ListingStore,
};

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "RELISTER_CONFIG")]
    config: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a listings spreadsheet: extract images, bind them to rows and
    /// store the unseen listings as pending.
    Ingest { file: PathBuf },
    /// List stored listings still awaiting a post.
    Pending,
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = tokio::fs::read_to_string(&opts.config)
        .await
        .with_context(|| "read config")?;
    let config: Config = serde_yaml::from_str(&config)
        .with_context(|| format!("parse config from {}", opts.config.display()))?;
    config.validate().map_err(|msg| anyhow!("{msg}"))?;
    for caveat in config.caveats() {
        tracing::warn!("{caveat}");
    }

    let listings = ListingStore::open(&config.database)
        .await
        .with_context(|| format!("open listing store {}", config.database))?;

    match opts.command {
        Command::Ingest { file } => {
            let reporter = progress::create_reporter();
            let generator = TemplateGenerator {
                max_title_len: config.max_title_len,
                max_description_len: config.max_description_len,
            };
            let outcome =
                match ingest::run(&file, &config, &listings, &generator, reporter.as_ref()).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        reporter.add_error(&error.to_string());
                        reporter.set_phase(RunPhase::Failed(error.to_string()));
                        reporter.finish();
                        return Err(error.into());
                    }
                };
            for warning in &outcome.report.warnings {
                reporter.add_debug(&warning.to_string());
            }
            reporter.finish();
            let report = &outcome.report;
            println!(
                "{} rows, {} images ({} anchored, {} bound), {} new, {} known, {} conflicts, {} warnings",
                report.rows_decoded,
                report.images_extracted,
                report.anchored,
                report.bound,
                report.new_listings,
                report.already_known,
                report.conflicts,
                report.warnings.len(),
            );
            if !report.warnings.is_empty() {
                let grouped = report
                    .warnings_by_stage()
                    .iter()
                    .map(|(stage, count)| format!("{stage}: {count}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("degraded units by stage: {grouped}");
            }
        }
        Command::Pending => {
            for listing in listings.pending().await? {
                println!(
                    "{}\t{}\t{}",
                    listing.item_code,
                    listing
                        .price
                        .map(|price| price.to_string())
                        .unwrap_or_else(|| "-".to_owned()),
                    listing.description.unwrap_or_default(),
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(opts).await {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
