use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bigquery_client::{auth, BigQueryClient};
use poi_confidence::cli::Cli;
use poi_confidence::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("poi_confidence=info".parse()?)
                .add_directive("bigquery_client=info".parse()?),
        )
        .init();

    info!("POI confidence run starting...");

    let config = Config::from_env()?;
    let token = match config.access_token.clone() {
        Some(token) => token,
        None => {
            info!("GOOGLE_OAUTH_ACCESS_TOKEN not set, asking gcloud for a token");
            auth::gcloud_access_token().await?
        }
    };

    let client =
        BigQueryClient::new(&config.project, token).with_location(config.location.clone());
    let summary = poi_confidence::run(&client, &config.datasets(), &cli.run_options()).await?;

    for (table, outcome) in &summary.loads {
        info!(table = %table, ?outcome, "Load");
    }
    info!(column = ?summary.column, exported = summary.export.rows, "Done");
    Ok(())
}
