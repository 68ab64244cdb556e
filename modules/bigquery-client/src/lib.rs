pub mod auth;
pub mod error;
pub mod types;

pub use error::{BigQueryError, Result};
pub use types::{
    ErrorProto, Job, JobConfiguration, JobConfigurationLoad, JobConfigurationQuery, JobReference,
    JobStatistics, JobStatus, QueryResults, SourceFormat, Table, TableCell, TableFieldSchema,
    TableReference, TableRow, TableSchema, WriteDisposition,
};

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::{Body, Response};
use tokio_util::io::ReaderStream;
use serde::de::DeserializeOwned;
use types::ErrorEnvelope;

const BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const UPLOAD_URL: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

/// Interval between `jobs.get` polls while a job is PENDING or RUNNING.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rows requested per `getQueryResults` page.
const PAGE_SIZE: u32 = 10_000;

pub struct BigQueryClient {
    client: reqwest::Client,
    project_id: String,
    location: Option<String>,
    token: String,
}

impl BigQueryClient {
    pub fn new(project_id: &str, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            project_id: project_id.to_string(),
            location: None,
            token,
        }
    }

    /// Pin jobs to a dataset location (e.g. `EU`). BigQuery infers it when unset.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Fetch table metadata, including schema and row count.
    pub async fn get_table(&self, table: &TableReference) -> Result<Table> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            BASE_URL, table.project_id, table.dataset_id, table.table_id
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        json_or_error(resp).await
    }

    /// Replace the table schema. Only the `schema` property is sent, so other
    /// table metadata is left alone.
    pub async fn patch_table_schema(
        &self,
        table: &TableReference,
        schema: &TableSchema,
    ) -> Result<Table> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            BASE_URL, table.project_id, table.dataset_id, table.table_id
        );
        let body = serde_json::json!({ "schema": schema });
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let updated: Table = json_or_error(resp).await?;
        tracing::debug!(table = %table, fields = updated.fields().len(), "Table schema patched");
        Ok(updated)
    }

    /// Start a load job via a resumable upload session, streaming `media`
    /// (`len` bytes) as the job's data. Returns as soon as the job is accepted.
    pub async fn insert_load_job(
        &self,
        load: JobConfigurationLoad,
        media: Body,
        len: u64,
    ) -> Result<Job> {
        let job = Job {
            job_reference: self.new_job_reference(),
            configuration: Some(JobConfiguration {
                load: Some(load),
                query: None,
            }),
            status: None,
            statistics: None,
        };

        let url = format!(
            "{}/projects/{}/jobs?uploadType=resumable",
            UPLOAD_URL, self.project_id
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", len.to_string())
            .json(&job)
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let session_url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                BigQueryError::Parse("upload session response had no Location header".to_string())
            })?;

        tracing::debug!(job_id = %job.job_reference.job_id, bytes = len, "Uploading load job media");
        let resp = self
            .client
            .put(&session_url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/octet-stream")
            .header(CONTENT_LENGTH, len.to_string())
            .body(media)
            .send()
            .await?;

        json_or_error(resp).await
    }

    /// Start a standard-SQL query (or multi-statement script) job.
    pub async fn insert_query_job(&self, sql: &str) -> Result<Job> {
        let job = Job {
            job_reference: self.new_job_reference(),
            configuration: Some(JobConfiguration {
                load: None,
                query: Some(JobConfigurationQuery {
                    query: sql.to_string(),
                    use_legacy_sql: false,
                }),
            }),
            status: None,
            statistics: None,
        };

        let url = format!("{}/projects/{}/jobs", BASE_URL, self.project_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&job)
            .send()
            .await?;

        json_or_error(resp).await
    }

    pub async fn get_job(&self, job: &JobReference) -> Result<Job> {
        let url = format!("{}/projects/{}/jobs/{}", BASE_URL, job.project_id, job.job_id);
        let mut req = self.client.get(&url).bearer_auth(&self.token);
        if let Some(ref location) = job.location {
            req = req.query(&[("location", location)]);
        }
        let resp = req.send().await?;

        json_or_error(resp).await
    }

    /// Poll until a job reaches DONE. A job that finished with an error
    /// result is returned as `BigQueryError::Job`.
    pub async fn wait_for_job(&self, job: &JobReference) -> Result<Job> {
        loop {
            let current = self.get_job(job).await?;
            if current.is_done() {
                if let Some(err) = current.error_result() {
                    return Err(BigQueryError::Job {
                        job_id: current.job_reference.job_id.clone(),
                        reason: err.reason.clone().unwrap_or_default(),
                        message: err.message.clone().unwrap_or_default(),
                    });
                }
                let elapsed_ms = current
                    .statistics
                    .as_ref()
                    .and_then(|s| s.elapsed())
                    .map(|d| d.num_milliseconds());
                tracing::debug!(job_id = %current.job_reference.job_id, ?elapsed_ms, "Job done");
                return Ok(current);
            }

            tracing::debug!(
                job_id = %job.job_id,
                state = current.status.as_ref().map(|s| s.state.as_str()).unwrap_or("UNKNOWN"),
                "Job still in progress"
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Fetch one page of a finished query job's results. Pass the previous
    /// page's `page_token` to continue.
    pub async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResults> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            BASE_URL, job.project_id, job.job_id
        );
        loop {
            let mut params: Vec<(&str, String)> = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(ref location) = job.location {
                params.push(("location", location.clone()));
            }
            if let Some(token) = page_token {
                params.push(("pageToken", token.to_string()));
            }

            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&params)
                .send()
                .await?;

            let page: QueryResults = json_or_error(resp).await?;
            if page.job_complete {
                return Ok(page);
            }
            tracing::debug!(job_id = %job.job_id, "Query results not ready yet");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Upload a local file into a table and wait for the load job to finish.
    pub async fn load_file(&self, path: &Path, load: JobConfigurationLoad) -> Result<Job> {
        let (media, len) = open_media(path).await?;

        let destination = load.destination_table.to_string();
        let job = self.insert_load_job(load, media, len).await?;
        tracing::info!(job_id = %job.job_reference.job_id, destination = %destination, "Load job started, polling for completion");

        self.wait_for_job(&job.job_reference).await
    }

    /// Run a query and wait for it to finish.
    pub async fn query(&self, sql: &str) -> Result<Job> {
        let job = self.insert_query_job(sql).await?;
        tracing::debug!(job_id = %job.job_reference.job_id, "Query job started, polling for completion");

        self.wait_for_job(&job.job_reference).await
    }

    fn new_job_reference(&self) -> JobReference {
        JobReference {
            project_id: self.project_id.clone(),
            job_id: format!("poi_confidence_{}", uuid::Uuid::new_v4().simple()),
            location: self.location.clone(),
        }
    }
}

/// Open a file as a streaming request body, with its size for the upload headers.
async fn open_media(path: &Path) -> Result<(Body, u64)> {
    let io_err = |e: std::io::Error| BigQueryError::Io(format!("{}: {e}", path.display()));
    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let len = file.metadata().await.map_err(io_err)?.len();

    Ok((Body::wrap_stream(ReaderStream::new(file)), len))
}

async fn error_for_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let (reason, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (
            envelope.error.errors.first().and_then(|e| e.reason.clone()),
            envelope.error.message,
        ),
        Err(_) => (None, body),
    };
    Err(BigQueryError::Api {
        status: status.as_u16(),
        reason,
        message,
    })
}

async fn json_or_error<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = error_for_status(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
