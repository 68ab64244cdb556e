use std::path::Path;

use anyhow::{Context, Result};
use bigquery_client::{JobConfigurationLoad, TableReference, WriteDisposition};
use tracing::{info, warn};

use crate::tables::Datasets;
use crate::traits::Warehouse;

/// Input CSVs are `;`-separated.
pub const CSV_DELIMITER: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: u64 },
    /// Destination already held data; nothing was written.
    AlreadyLoaded,
}

/// Load job settings for one of the input CSVs. WRITE_EMPTY makes a second
/// load of the same table fail instead of duplicating rows.
pub fn csv_load_config(destination: TableReference) -> JobConfigurationLoad {
    let mut load = JobConfigurationLoad::csv(destination);
    load.skip_leading_rows = Some(1);
    load.field_delimiter = Some(CSV_DELIMITER.to_string());
    load.allow_quoted_newlines = Some(true);
    load.autodetect = Some(true);
    load.write_disposition = Some(WriteDisposition::WriteEmpty);
    load
}

/// Load `path` into the table named after it. Loading a table that already
/// has data is reported as `AlreadyLoaded`, not as an error.
pub async fn load_csv<W: Warehouse + ?Sized>(
    warehouse: &W,
    datasets: &Datasets,
    path: &Path,
) -> Result<LoadOutcome> {
    let table = datasets.table_for_csv(path)?;

    match warehouse.load_file(path, csv_load_config(table.clone())).await {
        Ok(_) => {}
        Err(e) if e.is_conflict() => {
            warn!(table = %table, error = %e, "Table already has data, skipping load");
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("loading {} into {table}", path.display()))
        }
    }

    let loaded = warehouse
        .get_table(&table)
        .await
        .with_context(|| format!("reading metadata of {table}"))?;
    let rows = loaded.num_rows();
    info!("Loaded {rows} rows into {table}.");

    Ok(LoadOutcome::Loaded { rows })
}
