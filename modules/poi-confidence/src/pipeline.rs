use std::path::PathBuf;

use anyhow::Result;
use bigquery_client::TableReference;
use tracing::info;

use crate::exporter::{export_csv, ExportSummary};
use crate::loader::{load_csv, LoadOutcome};
use crate::schema::{ensure_confidence_column, ColumnOutcome};
use crate::scoring::update_confidence;
use crate::tables::Datasets;
use crate::traits::Warehouse;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upload the three CSVs before scoring. Only needed on the first run.
    pub load_data: bool,
    pub osm_poi: PathBuf,
    pub google_poi: PathBuf,
    pub google_osm_poi_matching: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub loads: Vec<(TableReference, LoadOutcome)>,
    pub column: ColumnOutcome,
    pub export: ExportSummary,
}

/// Load (optionally), add the score column, score every match, export.
///
/// Steps run strictly in order. Scoring assumes both POI tables, the matching
/// table and the min/max view already exist.
pub async fn run<W: Warehouse + ?Sized>(
    warehouse: &W,
    datasets: &Datasets,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let mut loads = Vec::new();
    if opts.load_data {
        for path in [&opts.osm_poi, &opts.google_poi, &opts.google_osm_poi_matching] {
            let table = datasets.table_for_csv(path)?;
            let outcome = load_csv(warehouse, datasets, path).await?;
            loads.push((table, outcome));
        }
    } else {
        info!("Skipping CSV load (pass --load_data on the first run)");
    }

    let matching = datasets.table_for_csv(&opts.google_osm_poi_matching)?;
    let column = ensure_confidence_column(warehouse, &matching).await?;

    update_confidence(warehouse, datasets).await?;

    let export = export_csv(warehouse, datasets, &opts.output).await?;
    info!(rows = export.rows, path = %export.path.display(), "Run complete");

    Ok(RunSummary {
        loads,
        column,
        export,
    })
}
