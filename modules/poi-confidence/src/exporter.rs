use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bigquery_client::TableFieldSchema;
use csv::WriterBuilder;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::tables::{Datasets, CONFIDENCE_COLUMN, POI_MATCHING};
use crate::traits::Warehouse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
}

pub fn export_sql(datasets: &Datasets) -> String {
    format!(
        "SELECT * FROM {} ORDER BY {CONFIDENCE_COLUMN} DESC",
        datasets.quoted(POI_MATCHING)
    )
}

/// Append the ranked matching table to `path` as comma-separated CSV: one
/// header row with the result column names, then one row per match.
///
/// The file is never truncated, so every run adds another header + rows block.
/// Nothing is created on disk until the first result page has arrived.
pub async fn export_csv<W: Warehouse + ?Sized>(
    warehouse: &W,
    datasets: &Datasets,
    path: &Path,
) -> Result<ExportSummary> {
    let job = warehouse
        .run_query(&export_sql(datasets))
        .await
        .context("querying ranked matches")?;

    let mut page = warehouse
        .query_results(&job.job_reference, None)
        .await
        .context("reading ranked matches")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    let fields = page.schema.take().map(|s| s.fields).unwrap_or_default();
    if !fields.is_empty() {
        writer.write_record(fields.iter().map(|f| f.name.as_str()))?;
    }

    let mut rows = 0;
    loop {
        for row in &page.rows {
            writer.write_record(
                row.f
                    .iter()
                    .zip(&fields)
                    .map(|(cell, field)| render_cell(&cell.v, field)),
            )?;
        }
        rows += page.rows.len();
        debug!(rows, "Wrote result page");

        match page.page_token.take() {
            Some(token) => {
                page = warehouse
                    .query_results(&job.job_reference, Some(&token))
                    .await
                    .context("reading ranked matches")?;
            }
            None => break,
        }
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;

    info!("Exported to {}", path.display());
    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows,
    })
}

/// NULL becomes an empty field, scalars are written as BigQuery renders them,
/// REPEATED and RECORD values as compact JSON.
fn render_cell(value: &Value, field: &TableFieldSchema) -> String {
    match plain(value, field) {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Strip the `{"v": ...}` / `{"f": [...]}` envelopes of nested cells.
fn plain(value: &Value, field: &TableFieldSchema) -> Value {
    if field.mode.as_deref() == Some("REPEATED") {
        if let Value::Array(items) = value {
            return Value::Array(
                items
                    .iter()
                    .map(|item| plain_single(item.get("v").unwrap_or(item), field))
                    .collect(),
            );
        }
    }
    plain_single(value, field)
}

fn plain_single(value: &Value, field: &TableFieldSchema) -> Value {
    let (Some(cells), Some(children)) = (
        value.get("f").and_then(Value::as_array),
        field.fields.as_deref(),
    ) else {
        return value.clone();
    };

    let mut record = Map::new();
    for (cell, child) in cells.iter().zip(children) {
        let inner = cell.get("v").unwrap_or(&Value::Null);
        record.insert(child.name.clone(), plain(inner, child));
    }
    Value::Object(record)
}
