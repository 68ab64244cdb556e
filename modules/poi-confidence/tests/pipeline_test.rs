use std::path::Path;

use bigquery_client::{TableFieldSchema, TableReference};
use serde_json::{json, Value};

use poi_confidence::exporter::export_csv;
use poi_confidence::loader::LoadOutcome;
use poi_confidence::schema::{confidence_columns, ColumnOutcome};
use poi_confidence::scoring::confidence_update_sql;
use poi_confidence::testing::{write_csv, MockWarehouse};
use poi_confidence::{run, Datasets, RunOptions};

fn datasets() -> Datasets {
    Datasets::new("poi-confidence", "poi_dataset")
}

fn matching_table() -> TableReference {
    datasets().table("google_osm_poi_matching")
}

fn result_fields() -> Vec<TableFieldSchema> {
    vec![
        TableFieldSchema::nullable("internal_id", "STRING"),
        TableFieldSchema::nullable("osm_id", "INTEGER"),
        TableFieldSchema::nullable("confidence_score", "FLOAT"),
    ]
}

fn result_rows() -> Vec<Vec<Value>> {
    vec![
        vec![json!("g-1"), json!("101"), json!("0.9")],
        vec![json!("g-2"), json!("102"), json!("0.4")],
        vec![json!("g-3"), json!("103"), Value::Null],
    ]
}

struct Inputs {
    _dir: tempfile::TempDir,
    opts: RunOptions,
}

fn inputs(load_data: bool) -> Inputs {
    let dir = tempfile::tempdir().unwrap();
    let osm_poi = write_csv(
        dir.path(),
        "osm_poi.csv",
        "osm_id;name;tags;latitude;longitude;categories\n\
         101;Cafe Uno;\"amenity=cafe\ncuisine=coffee\";52.52;13.40;cafe\n\
         102;Bar Due;amenity=bar;52.53;13.41;bar\n",
    );
    let google_poi = write_csv(
        dir.path(),
        "google_poi.csv",
        "internal_id;name;address;latitude;longitude;categories\n\
         g-1;Cafe Uno;Main St 1;52.52;13.40;cafe\n\
         g-2;Bar Due;Elm St 2;52.53;13.41;bar\n",
    );
    let matching = write_csv(
        dir.path(),
        "google_osm_poi_matching.csv",
        "internal_id;osm_id\ng-1;101\ng-2;102\n",
    );
    let output = dir.path().join("out").join("ranked.csv");

    Inputs {
        opts: RunOptions {
            load_data,
            osm_poi,
            google_poi,
            google_osm_poi_matching: matching,
            output,
        },
        _dir: dir,
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn first_run_loads_scores_and_exports() {
    let inputs = inputs(true);
    let warehouse = MockWarehouse::new().with_results(result_fields(), result_rows());

    let summary = run(&warehouse, &datasets(), &inputs.opts).await.unwrap();

    let outcomes: Vec<_> = summary.loads.iter().map(|(t, o)| (t.table_id.as_str(), *o)).collect();
    assert_eq!(
        outcomes,
        vec![
            ("osm_poi", LoadOutcome::Loaded { rows: 2 }),
            ("google_poi", LoadOutcome::Loaded { rows: 2 }),
            ("google_osm_poi_matching", LoadOutcome::Loaded { rows: 2 }),
        ]
    );
    assert_eq!(summary.column, ColumnOutcome::Added);
    assert_eq!(summary.export.rows, 3);

    let queries = warehouse.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0], confidence_update_sql(&datasets()));
    assert!(queries[1].ends_with("ORDER BY confidence_score DESC"));

    assert_eq!(
        read(&inputs.opts.output),
        "internal_id,osm_id,confidence_score\ng-1,101,0.9\ng-2,102,0.4\ng-3,103,\n"
    );
}

#[tokio::test]
async fn without_load_flag_nothing_is_loaded() {
    let inputs = inputs(false);
    let warehouse = MockWarehouse::new()
        .with_table(
            &matching_table(),
            vec![
                TableFieldSchema::nullable("internal_id", "STRING"),
                TableFieldSchema::nullable("osm_id", "INTEGER"),
            ],
            2,
        )
        .with_results(result_fields(), result_rows());

    let summary = run(&warehouse, &datasets(), &inputs.opts).await.unwrap();

    assert!(summary.loads.is_empty());
    assert!(warehouse.loads().is_empty());
    assert_eq!(warehouse.row_count("poi-confidence.poi_dataset.osm_poi"), None);
    assert_eq!(summary.column, ColumnOutcome::Added);
}

#[tokio::test]
async fn rerun_with_load_flag_is_idempotent() {
    let inputs = inputs(true);
    let warehouse = MockWarehouse::new().with_results(result_fields(), result_rows());

    run(&warehouse, &datasets(), &inputs.opts).await.unwrap();
    let second = run(&warehouse, &datasets(), &inputs.opts).await.unwrap();

    assert!(second
        .loads
        .iter()
        .all(|(_, outcome)| *outcome == LoadOutcome::AlreadyLoaded));
    assert_eq!(second.column, ColumnOutcome::AlreadyPresent);
    assert_eq!(
        warehouse.row_count("poi-confidence.poi_dataset.google_osm_poi_matching"),
        Some(2)
    );
    assert_eq!(confidence_columns(&warehouse.schema(&matching_table()).unwrap()), 1);
}

#[tokio::test]
async fn rejected_schema_update_does_not_stop_the_run() {
    let inputs = inputs(true);
    let warehouse = MockWarehouse::new()
        .rejecting_schema_updates()
        .with_results(result_fields(), result_rows());

    let summary = run(&warehouse, &datasets(), &inputs.opts).await.unwrap();

    assert_eq!(summary.column, ColumnOutcome::Rejected);
    assert_eq!(warehouse.queries().len(), 2);
}

#[tokio::test]
async fn failing_update_stops_before_export() {
    let inputs = inputs(true);
    let warehouse = MockWarehouse::new()
        .failing_queries("invalidQuery", "Not found: Table poi-confidence:poi_dataset.min_max_location_view")
        .with_results(result_fields(), result_rows());

    let err = run(&warehouse, &datasets(), &inputs.opts).await.unwrap_err();

    assert!(format!("{err:#}").contains("min_max_location_view"));
    assert!(!inputs.opts.output.exists());
}

#[tokio::test]
async fn failed_first_page_leaves_no_output_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("ranked.csv");
    let warehouse = MockWarehouse::new()
        .with_results(result_fields(), result_rows())
        .failing_result_pages(503, "Backend error");

    let err = export_csv(&warehouse, &datasets(), &path).await.unwrap_err();

    assert!(format!("{err:#}").contains("Backend error"));
    assert!(!path.exists());
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn exporting_twice_appends_two_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranked.csv");
    let warehouse = MockWarehouse::new().with_results(result_fields(), result_rows());

    export_csv(&warehouse, &datasets(), &path).await.unwrap();
    export_csv(&warehouse, &datasets(), &path).await.unwrap();

    let block = "internal_id,osm_id,confidence_score\ng-1,101,0.9\ng-2,102,0.4\ng-3,103,\n";
    assert_eq!(read(&path), format!("{block}{block}"));
}

#[tokio::test]
async fn export_follows_page_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranked.csv");
    let rows: Vec<Vec<Value>> = (0..5)
        .map(|i| vec![json!(format!("g-{i}")), json!(format!("{}", 100 + i)), json!("0.5")])
        .collect();
    let warehouse = MockWarehouse::new()
        .with_results(result_fields(), rows)
        .with_page_size(2);

    let summary = export_csv(&warehouse, &datasets(), &path).await.unwrap();

    assert_eq!(summary.rows, 5);
    let contents = read(&path);
    assert_eq!(contents.lines().count(), 6);
    assert_eq!(contents.matches("internal_id").count(), 1);
    assert!(contents.ends_with("g-4,104,0.5\n"));
}

#[tokio::test]
async fn fields_with_commas_are_quoted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranked.csv");
    let warehouse = MockWarehouse::new().with_results(
        vec![TableFieldSchema::nullable("address", "STRING")],
        vec![vec![json!("Main St 1, Springfield")]],
    );

    export_csv(&warehouse, &datasets(), &path).await.unwrap();

    assert_eq!(read(&path), "address\n\"Main St 1, Springfield\"\n");
}
