// Test double for the Warehouse seam.
//
// MockWarehouse keeps tables in memory: schema plus a row count. Loads parse the
// CSV with the load job's own delimiter/header settings, honour WRITE_EMPTY, and
// fail with the same `duplicate` job error BigQuery reports. Queries are
// recorded verbatim; their results come from `with_results`, served in pages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bigquery_client::{
    BigQueryError, Job, JobConfigurationLoad, JobReference, JobStatus, QueryResults, Result,
    Table, TableCell, TableFieldSchema, TableReference, TableRow, TableSchema, WriteDisposition,
};
use serde_json::Value;

use crate::traits::Warehouse;

const MOCK_PROJECT: &str = "mock-project";

#[derive(Debug, Clone)]
struct MockTable {
    schema: TableSchema,
    rows: u64,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MockTable>,
    loads: Vec<PathBuf>,
    queries: Vec<String>,
    schema_updates: usize,
    jobs: usize,
}

pub struct MockWarehouse {
    state: Mutex<State>,
    results: Option<(TableSchema, Vec<Vec<Value>>)>,
    page_size: usize,
    reject_schema_updates: bool,
    query_failure: Option<(String, String)>,
    results_failure: Option<(u16, String)>,
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            results: None,
            page_size: 100,
            reject_schema_updates: false,
            query_failure: None,
            results_failure: None,
        }
    }

    /// Pre-create a table with the given columns and row count.
    pub fn with_table(self, table: &TableReference, fields: Vec<TableFieldSchema>, rows: u64) -> Self {
        self.lock().tables.insert(
            table.to_string(),
            MockTable {
                schema: TableSchema { fields },
                rows,
            },
        );
        self
    }

    /// Rows every query returns. Cell values use the wire encoding.
    pub fn with_results(mut self, fields: Vec<TableFieldSchema>, rows: Vec<Vec<Value>>) -> Self {
        self.results = Some((TableSchema { fields }, rows));
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every schema update fails with HTTP 400.
    pub fn rejecting_schema_updates(mut self) -> Self {
        self.reject_schema_updates = true;
        self
    }

    /// Every query job finishes with this error result.
    pub fn failing_queries(mut self, reason: &str, message: &str) -> Self {
        self.query_failure = Some((reason.to_string(), message.to_string()));
        self
    }

    /// Every `query_results` call fails with an API error of this status.
    pub fn failing_result_pages(mut self, status: u16, message: &str) -> Self {
        self.results_failure = Some((status, message.to_string()));
        self
    }

    // --- Inspection ---

    pub fn row_count(&self, table_id: &str) -> Option<u64> {
        self.lock().tables.get(table_id).map(|t| t.rows)
    }

    pub fn schema(&self, table: &TableReference) -> Option<TableSchema> {
        self.lock()
            .tables
            .get(&table.to_string())
            .map(|t| t.schema.clone())
    }

    /// Every file a load was attempted for, in order.
    pub fn loads(&self) -> Vec<PathBuf> {
        self.lock().loads.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn schema_updates(&self) -> usize {
        self.lock().schema_updates
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn done_job(&self, state: &mut State) -> Job {
        state.jobs += 1;
        Job {
            job_reference: JobReference {
                project_id: MOCK_PROJECT.to_string(),
                job_id: format!("job_{}", state.jobs),
                location: None,
            },
            configuration: None,
            status: Some(JobStatus {
                state: "DONE".to_string(),
                error_result: None,
                errors: Vec::new(),
            }),
            statistics: None,
        }
    }
}

/// Parse a CSV the way the load job describes it: column names and row count.
fn read_csv(path: &Path, load: &JobConfigurationLoad) -> Result<(Vec<String>, u64)> {
    let delimiter = load
        .field_delimiter
        .as_deref()
        .and_then(|d| d.bytes().next())
        .unwrap_or(b',');
    let has_header = load.skip_leading_rows.unwrap_or(0) > 0;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_header)
        .from_path(path)
        .map_err(|e| BigQueryError::Io(format!("{}: {e}", path.display())))?;

    let headers = if has_header {
        reader
            .headers()
            .map_err(|e| BigQueryError::Parse(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let mut rows = 0;
    for record in reader.records() {
        record.map_err(|e| BigQueryError::Parse(e.to_string()))?;
        rows += 1;
    }
    Ok((headers, rows))
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn load_file(&self, path: &Path, load: JobConfigurationLoad) -> Result<Job> {
        let table_id = load.destination_table.to_string();
        self.lock().loads.push(path.to_path_buf());

        let (headers, rows) = read_csv(path, &load)?;

        let mut state = self.lock();
        let existing_rows = state.tables.get(&table_id).map(|t| t.rows).unwrap_or(0);
        if load.write_disposition == Some(WriteDisposition::WriteEmpty) && existing_rows > 0 {
            state.jobs += 1;
            return Err(BigQueryError::Job {
                job_id: format!("job_{}", state.jobs),
                reason: "duplicate".to_string(),
                message: format!("Already Exists: Table {table_id}"),
            });
        }

        let fields = headers
            .iter()
            .map(|h| TableFieldSchema::nullable(h, "STRING"))
            .collect();
        let table = state.tables.entry(table_id).or_insert(MockTable {
            schema: TableSchema { fields },
            rows: 0,
        });
        table.rows += rows;

        Ok(self.done_job(&mut state))
    }

    async fn get_table(&self, table: &TableReference) -> Result<Table> {
        let state = self.lock();
        let found = state.tables.get(&table.to_string()).ok_or_else(|| BigQueryError::Api {
            status: 404,
            reason: Some("notFound".to_string()),
            message: format!("Not found: Table {table}"),
        })?;

        Ok(Table {
            table_reference: table.clone(),
            schema: Some(found.schema.clone()),
            num_rows: Some(found.rows.to_string()),
            etag: None,
            table_type: Some("TABLE".to_string()),
        })
    }

    async fn update_schema(&self, table: &TableReference, schema: &TableSchema) -> Result<Table> {
        let bad_request = |message: String| BigQueryError::Api {
            status: 400,
            reason: Some("invalid".to_string()),
            message,
        };
        if self.reject_schema_updates {
            return Err(bad_request("Schema update rejected".to_string()));
        }

        let mut names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(bad_request(format!("Field {} already exists in schema", pair[0])));
        }

        {
            let mut state = self.lock();
            let existing = state.tables.get_mut(&table.to_string()).ok_or_else(|| {
                BigQueryError::Api {
                    status: 404,
                    reason: Some("notFound".to_string()),
                    message: format!("Not found: Table {table}"),
                }
            })?;
            existing.schema = schema.clone();
            state.schema_updates += 1;
        }

        self.get_table(table).await
    }

    async fn run_query(&self, sql: &str) -> Result<Job> {
        let mut state = self.lock();
        state.queries.push(sql.to_string());

        if let Some((reason, message)) = &self.query_failure {
            state.jobs += 1;
            return Err(BigQueryError::Job {
                job_id: format!("job_{}", state.jobs),
                reason: reason.clone(),
                message: message.clone(),
            });
        }
        Ok(self.done_job(&mut state))
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResults> {
        if let Some((status, message)) = &self.results_failure {
            return Err(BigQueryError::Api {
                status: *status,
                reason: None,
                message: message.clone(),
            });
        }
        let (schema, rows) = match &self.results {
            Some((schema, rows)) => (schema.clone(), rows.as_slice()),
            None => (TableSchema::default(), &[][..]),
        };

        let start: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| BigQueryError::Parse(format!("bad page token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(rows.len());
        let page_rows = rows[start.min(end)..end]
            .iter()
            .map(|values| TableRow {
                f: values.iter().map(|v| TableCell { v: v.clone() }).collect(),
            })
            .collect();

        Ok(QueryResults {
            schema: Some(schema),
            job_reference: Some(job.clone()),
            total_rows: Some(rows.len().to_string()),
            page_token: (end < rows.len()).then(|| end.to_string()),
            rows: page_rows,
            job_complete: true,
        })
    }
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write test csv");
    path
}
