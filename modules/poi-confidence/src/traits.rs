// Warehouse seam for the pipeline steps.
//
// BigQueryClient is the only production implementation. testing::MockWarehouse
// keeps tables in memory so every step can be exercised without credentials.
//
// Methods return the client's own error type so callers can tell a conflict or
// a bad request apart from everything else.

use std::path::Path;

use async_trait::async_trait;
use bigquery_client::{
    BigQueryClient, Job, JobConfigurationLoad, JobReference, QueryResults, Result, Table,
    TableReference, TableSchema,
};

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Upload a local file into `load.destination_table` and wait for the job.
    async fn load_file(&self, path: &Path, load: JobConfigurationLoad) -> Result<Job>;

    async fn get_table(&self, table: &TableReference) -> Result<Table>;

    /// Push a full replacement schema for the table.
    async fn update_schema(&self, table: &TableReference, schema: &TableSchema) -> Result<Table>;

    /// Run a standard-SQL statement or script and wait for it to finish.
    async fn run_query(&self, sql: &str) -> Result<Job>;

    /// One page of a finished query's rows.
    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResults>;
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn load_file(&self, path: &Path, load: JobConfigurationLoad) -> Result<Job> {
        self.load_file(path, load).await
    }

    async fn get_table(&self, table: &TableReference) -> Result<Table> {
        self.get_table(table).await
    }

    async fn update_schema(&self, table: &TableReference, schema: &TableSchema) -> Result<Table> {
        self.patch_table_schema(table, schema).await
    }

    async fn run_query(&self, sql: &str) -> Result<Job> {
        self.query(sql).await
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResults> {
        self.get_query_results(job, page_token).await
    }
}
