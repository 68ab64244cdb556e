use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::pipeline::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "poi-confidence")]
#[command(about = "Score matched Google/OSM points of interest in BigQuery and export the ranking")]
#[command(version)]
pub struct Cli {
    /// Load the three CSV files into BigQuery first (needed on the first run)
    #[arg(
        long = "load_data",
        visible_alias = "load-data",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub load_data: bool,

    /// osm_poi.csv file path
    #[arg(long = "osm_poi", default_value = "csv_data/osm_poi.csv")]
    pub osm_poi: PathBuf,

    /// google_poi.csv file path
    #[arg(long = "google_poi", default_value = "csv_data/google_poi.csv")]
    pub google_poi: PathBuf,

    /// google_osm_poi_matching.csv file path
    #[arg(
        long = "google_osm_poi_matching",
        default_value = "csv_data/google_osm_poi_matching.csv"
    )]
    pub google_osm_poi_matching: PathBuf,

    /// Ranked output CSV; appended to, never overwritten
    #[arg(
        long,
        default_value = "csv_data/google_osm_poi_matching_with_confidence.csv"
    )]
    pub output: PathBuf,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            load_data: self.load_data,
            osm_poi: self.osm_poi.clone(),
            google_poi: self.google_poi.clone(),
            google_osm_poi_matching: self.google_osm_poi_matching.clone(),
            output: self.output.clone(),
        }
    }
}
