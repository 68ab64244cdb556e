//! Confidence scoring for matched POI pairs.
//!
//! The score is computed by BigQuery in one UPDATE script. Each matched pair
//! gets five component ratios; four of them are averaged with equal weight:
//!
//! ```text
//! location_diff     = 1 - (distance - min_location_diff) / (max_location_diff - min_location_diff)
//! name_diff         = levenshtein_set_ratio(google.name,       osm.name)       / 100
//! name_tags_diff    = levenshtein_set_ratio(google.name,       osm.tags)       / 100   (not averaged)
//! address_tags_diff = levenshtein_set_ratio(google.address,    osm.tags)       / 100
//! categories_diff   = levenshtein_set_ratio(google.categories, osm.categories) / 100
//!
//! confidence_score  = (location_diff + name_diff + address_tags_diff + categories_diff) / 4
//! ```
//!
//! `location_diff` is not clamped: a pair farther apart than the view's
//! maximum scores below zero, a pair closer than its minimum above one.

use anyhow::{Context, Result};
use bigquery_client::Job;
use tracing::info;

use crate::tables::{
    Datasets, GOOGLE_POI, LEVENSHTEIN_SET_RATIO, MIN_MAX_LOCATION_VIEW, OSM_POI, POI_MATCHING,
};
use crate::traits::Warehouse;

/// The DECLARE + UPDATE script writing `confidence_score` for every matched pair.
pub fn confidence_update_sql(datasets: &Datasets) -> String {
    let view = datasets.quoted(MIN_MAX_LOCATION_VIEW);
    let matching = datasets.quoted(POI_MATCHING);
    let google = datasets.quoted(GOOGLE_POI);
    let osm = datasets.quoted(OSM_POI);
    let ratio = datasets.quoted(LEVENSHTEIN_SET_RATIO);

    format!(
        r#"DECLARE location_diffs
DEFAULT (SELECT AS STRUCT * FROM {view} LIMIT 1);

UPDATE {matching} poi_matching
SET confidence_score = (location_diff + name_diff + address_tags_diff + categories_diff) / 4
FROM
(
    SELECT
        poi_matching.internal_id,
        (1 - (ST_DISTANCE(ST_GEOGPOINT(gpoi.longitude, gpoi.latitude),
            ST_GEOGPOINT(opoi.longitude, opoi.latitude)) - location_diffs.min_location_diff)
            / (location_diffs.max_location_diff - location_diffs.min_location_diff)
        ) location_diff,
        {ratio}(gpoi.name, opoi.name) / 100 name_diff,
        {ratio}(gpoi.name, opoi.tags) / 100 name_tags_diff,
        {ratio}(gpoi.address, opoi.tags) / 100 address_tags_diff,
        {ratio}(gpoi.categories, opoi.categories) / 100 categories_diff,
    FROM {google} gpoi
    JOIN {matching} poi_matching
    ON gpoi.internal_id = poi_matching.internal_id
    JOIN {osm} opoi
    ON poi_matching.osm_id = opoi.osm_id
) poi_confidence_table
WHERE poi_confidence_table.internal_id = poi_matching.internal_id;
"#
    )
}

/// Recompute `confidence_score` for the whole matching table in one statement.
pub async fn update_confidence<W: Warehouse + ?Sized>(
    warehouse: &W,
    datasets: &Datasets,
) -> Result<Job> {
    let matching = datasets.table(POI_MATCHING);
    let job = warehouse
        .run_query(&confidence_update_sql(datasets))
        .await
        .with_context(|| format!("updating confidence scores in {matching}"))?;

    let affected = job
        .statistics
        .as_ref()
        .and_then(|s| s.query.as_ref())
        .and_then(|q| q.num_dml_affected_rows.as_deref())
        .unwrap_or("unknown");
    info!(table = %matching, job_id = %job.job_reference.job_id, affected, "Confidence scores updated");

    Ok(job)
}
