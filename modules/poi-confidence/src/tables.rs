use std::path::Path;

use anyhow::{anyhow, Result};
use bigquery_client::TableReference;

/// Google Places export (source A).
pub const GOOGLE_POI: &str = "google_poi";
/// OpenStreetMap export (source B).
pub const OSM_POI: &str = "osm_poi";
/// Google ↔ OSM pairs; owns `confidence_score`.
pub const POI_MATCHING: &str = "google_osm_poi_matching";
/// Single row: smallest and largest pair distance across all matches.
pub const MIN_MAX_LOCATION_VIEW: &str = "min_max_location_view";
/// Persistent UDF returning a 0-100 token-set Levenshtein ratio.
pub const LEVENSHTEIN_SET_RATIO: &str = "levenshtein_set_ratio";

pub const CONFIDENCE_COLUMN: &str = "confidence_score";

/// The project + dataset every table of this pipeline lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datasets {
    pub project: String,
    pub dataset: String,
}

impl Datasets {
    pub fn new(project: &str, dataset: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
        }
    }

    pub fn table(&self, name: &str) -> TableReference {
        TableReference::new(&self.project, &self.dataset, name)
    }

    /// Destination table for a CSV file: its base name without extension.
    pub fn table_for_csv(&self, path: &Path) -> Result<TableReference> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("cannot derive a table name from {}", path.display()))?;
        Ok(self.table(stem))
    }

    /// Backtick-quoted identifier for a table or routine in this dataset.
    pub fn quoted(&self, name: &str) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, name)
    }
}
