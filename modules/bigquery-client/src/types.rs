use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- References ---

/// Fully-qualified table address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(project_id: &str, dataset_id: &str, table_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }
}

/// Renders as `project.dataset.table`, the form used in SQL and log lines.
impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// --- Tables ---

/// Table metadata as returned by `tables.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_reference: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    /// Int64 values arrive as JSON strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
}

impl Table {
    pub fn num_rows(&self) -> u64 {
        self.num_rows
            .as_deref()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    pub fn fields(&self) -> &[TableFieldSchema] {
        self.schema.as_ref().map(|s| s.fields.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

/// A column definition. Properties this crate does not model (policy tags,
/// collation, default values...) are kept in `extra` so a read-modify-write
/// of the schema sends them back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<TableFieldSchema>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TableFieldSchema {
    pub fn nullable(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: Some("NULLABLE".to_string()),
            fields: None,
            extra: Map::new(),
        }
    }

    /// Legacy and standard SQL spellings of the same type.
    pub fn is_float(&self) -> bool {
        matches!(self.field_type.as_str(), "FLOAT" | "FLOAT64")
    }
}

// --- Jobs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: JobReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<JobConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JobStatistics>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }

    pub fn error_result(&self) -> Option<&ErrorProto> {
        self.status.as_ref().and_then(|s| s.error_result.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorProto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<JobConfigurationLoad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JobConfigurationQuery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    Csv,
    NewlineDelimitedJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Fail the job if the destination already holds data.
    WriteEmpty,
    WriteAppend,
    WriteTruncate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationLoad {
    pub destination_table: TableReference,
    pub source_format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_leading_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_quoted_newlines: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autodetect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
}

impl JobConfigurationLoad {
    pub fn csv(destination_table: TableReference) -> Self {
        Self {
            destination_table,
            source_format: SourceFormat::Csv,
            skip_leading_rows: None,
            field_delimiter: None,
            allow_quoted_newlines: None,
            autodetect: None,
            write_disposition: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: String,
    pub use_legacy_sql: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub query: Option<JobStatisticsQuery>,
    #[serde(default)]
    pub load: Option<JobStatisticsLoad>,
}

impl JobStatistics {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis(self.creation_time.as_deref())
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        millis(self.end_time.as_deref())
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.ended_at()? - self.created_at()?)
    }
}

fn millis(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(raw?.parse().ok()?)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatisticsQuery {
    #[serde(default)]
    pub statement_type: Option<String>,
    #[serde(default)]
    pub num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatisticsLoad {
    #[serde(default)]
    pub output_rows: Option<String>,
    #[serde(default)]
    pub bad_records: Option<String>,
}

// --- Query results ---

/// One page of `jobs.getQueryResults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub total_rows: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub job_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

/// `v` is null, a string-encoded scalar, an array of cells (REPEATED) or a
/// nested row (RECORD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

// --- Error envelope ---

/// Body of a non-2xx response: `{"error": {"code", "message", "errors": [...]}}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_load_job_exposes_error_result() {
        let job: Job = serde_json::from_value(json!({
            "jobReference": {"projectId": "p", "jobId": "j1", "location": "US"},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "duplicate", "message": "Already Exists: Table p:d.osm_poi"},
                "errors": [{"reason": "duplicate", "message": "Already Exists: Table p:d.osm_poi"}]
            },
            "statistics": {"creationTime": "1700000000000", "endTime": "1700000002500"}
        }))
        .unwrap();

        assert!(job.is_done());
        assert_eq!(job.error_result().unwrap().reason.as_deref(), Some("duplicate"));
        assert_eq!(job.statistics.unwrap().elapsed().unwrap().num_milliseconds(), 2500);
    }

    #[test]
    fn field_schema_keeps_unmodelled_properties() {
        let raw = json!({
            "name": "tags",
            "type": "STRING",
            "mode": "NULLABLE",
            "description": "free-text OSM tags",
            "maxLength": "1024"
        });
        let field: TableFieldSchema = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(field.extra.get("description"), Some(&json!("free-text OSM tags")));
        assert_eq!(serde_json::to_value(&field).unwrap(), raw);
    }

    #[test]
    fn load_configuration_uses_wire_names() {
        let mut load = JobConfigurationLoad::csv(TableReference::new("p", "d", "osm_poi"));
        load.skip_leading_rows = Some(1);
        load.field_delimiter = Some(";".to_string());
        load.write_disposition = Some(WriteDisposition::WriteEmpty);

        let value = serde_json::to_value(&load).unwrap();
        assert_eq!(value["sourceFormat"], "CSV");
        assert_eq!(value["writeDisposition"], "WRITE_EMPTY");
        assert_eq!(value["destinationTable"]["tableId"], "osm_poi");
        assert!(value.get("autodetect").is_none());
    }

    #[test]
    fn num_rows_defaults_to_zero() {
        let table: Table = serde_json::from_value(json!({
            "tableReference": {"projectId": "p", "datasetId": "d", "tableId": "t"}
        }))
        .unwrap();
        assert_eq!(table.num_rows(), 0);
        assert!(table.fields().is_empty());
        assert_eq!(table.table_reference.to_string(), "p.d.t");
    }
}
