use anyhow::Result;

use crate::tables::Datasets;

const DEFAULT_PROJECT: &str = "poi-confidence";
const DEFAULT_DATASET: &str = "poi_dataset";

/// Warehouse settings loaded from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub project: String,
    pub dataset: String,
    /// Dataset location, e.g. `US` or `EU`. Left to BigQuery when unset.
    pub location: Option<String>,
    /// OAuth token for the BigQuery API. Falls back to `gcloud auth print-access-token`.
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            project: non_empty("BIGQUERY_PROJECT").unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            dataset: non_empty("BIGQUERY_DATASET").unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            location: non_empty("BIGQUERY_LOCATION"),
            access_token: non_empty("GOOGLE_OAUTH_ACCESS_TOKEN"),
        };

        config.log_keys();
        Ok(config)
    }

    pub fn datasets(&self) -> Datasets {
        Datasets::new(&self.project, &self.dataset)
    }

    fn log_keys(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.len().min(5);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  BIGQUERY_PROJECT: {}", self.project);
        tracing::info!("  BIGQUERY_DATASET: {}", self.dataset);
        tracing::info!(
            "  BIGQUERY_LOCATION: {}",
            self.location.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  GOOGLE_OAUTH_ACCESS_TOKEN: {}", preview(&self.access_token));
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
