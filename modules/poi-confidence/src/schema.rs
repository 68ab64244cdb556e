use anyhow::{Context, Result};
use bigquery_client::{TableFieldSchema, TableReference, TableSchema};
use tracing::{info, warn};

use crate::tables::CONFIDENCE_COLUMN;
use crate::traits::Warehouse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOutcome {
    Added,
    AlreadyPresent,
    /// The warehouse refused the schema update; the run carries on.
    Rejected,
}

fn has_confidence_column(fields: &[TableFieldSchema]) -> bool {
    fields
        .iter()
        .any(|f| f.name == CONFIDENCE_COLUMN && f.is_float())
}

/// Make sure `table` has a nullable FLOAT `confidence_score` column.
pub async fn ensure_confidence_column<W: Warehouse + ?Sized>(
    warehouse: &W,
    table: &TableReference,
) -> Result<ColumnOutcome> {
    let current = warehouse
        .get_table(table)
        .await
        .with_context(|| format!("reading schema of {table}"))?;

    if has_confidence_column(current.fields()) {
        return Ok(ColumnOutcome::AlreadyPresent);
    }

    let mut schema = current.schema.unwrap_or_default();
    schema
        .fields
        .push(TableFieldSchema::nullable(CONFIDENCE_COLUMN, "FLOAT"));

    match warehouse.update_schema(table, &schema).await {
        Ok(_) => {
            info!(table = %table, column = CONFIDENCE_COLUMN, "Added column");
            Ok(ColumnOutcome::Added)
        }
        Err(e) if e.is_bad_request() => {
            warn!(table = %table, error = %e, "Schema update rejected");
            Ok(ColumnOutcome::Rejected)
        }
        Err(e) => Err(e).with_context(|| format!("updating schema of {table}")),
    }
}

/// Number of `confidence_score` columns in `schema`.
pub fn confidence_columns(schema: &TableSchema) -> usize {
    schema
        .fields
        .iter()
        .filter(|f| f.name == CONFIDENCE_COLUMN)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWarehouse;

    fn matching_table() -> TableReference {
        TableReference::new("p", "d", "google_osm_poi_matching")
    }

    fn seeded() -> MockWarehouse {
        MockWarehouse::new().with_table(
            &matching_table(),
            vec![
                TableFieldSchema::nullable("internal_id", "STRING"),
                TableFieldSchema::nullable("osm_id", "INTEGER"),
            ],
            3,
        )
    }

    #[tokio::test]
    async fn adds_column_once() {
        let warehouse = seeded();

        let first = ensure_confidence_column(&warehouse, &matching_table())
            .await
            .unwrap();
        let second = ensure_confidence_column(&warehouse, &matching_table())
            .await
            .unwrap();

        assert_eq!(first, ColumnOutcome::Added);
        assert_eq!(second, ColumnOutcome::AlreadyPresent);
        let schema = warehouse.schema(&matching_table()).unwrap();
        assert_eq!(confidence_columns(&schema), 1);
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(warehouse.schema_updates(), 1);
    }

    #[tokio::test]
    async fn float64_spelling_counts_as_present() {
        let warehouse = MockWarehouse::new().with_table(
            &matching_table(),
            vec![TableFieldSchema::nullable(CONFIDENCE_COLUMN, "FLOAT64")],
            0,
        );

        let outcome = ensure_confidence_column(&warehouse, &matching_table())
            .await
            .unwrap();

        assert_eq!(outcome, ColumnOutcome::AlreadyPresent);
        assert_eq!(warehouse.schema_updates(), 0);
    }

    #[tokio::test]
    async fn rejected_update_is_downgraded() {
        let warehouse = seeded().rejecting_schema_updates();

        let outcome = ensure_confidence_column(&warehouse, &matching_table())
            .await
            .unwrap();

        assert_eq!(outcome, ColumnOutcome::Rejected);
        assert_eq!(confidence_columns(&warehouse.schema(&matching_table()).unwrap()), 0);
    }

    #[tokio::test]
    async fn same_name_with_other_type_is_rejected_by_warehouse() {
        // A STRING confidence_score is not accepted as present; appending a second
        // field with the same name is refused and the run continues.
        let warehouse = MockWarehouse::new().with_table(
            &matching_table(),
            vec![TableFieldSchema::nullable(CONFIDENCE_COLUMN, "STRING")],
            0,
        );

        let outcome = ensure_confidence_column(&warehouse, &matching_table())
            .await
            .unwrap();

        assert_eq!(outcome, ColumnOutcome::Rejected);
    }

    #[tokio::test]
    async fn missing_table_propagates() {
        let warehouse = MockWarehouse::new();
        assert!(ensure_confidence_column(&warehouse, &matching_table())
            .await
            .is_err());
    }
}
