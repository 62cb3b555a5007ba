use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rannoy::{DistanceType, Reader};
use tracing_subscriber::EnvFilter;

/// Query an Annoy index file for the nearest neighbors of a stored item.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path of the index file to query.
    index: PathBuf,

    /// Number of dimensions the index was built with.
    dimensions: usize,

    /// Distance metric the index was built with: angular, euclidean or dot.
    distance_type: DistanceType,

    /// Id of the stored item to use as the query point.
    query_item: u32,

    /// Number of neighbors to report.
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Number of candidates the search collects before re-ranking,
    /// defaults to the count times the number of trees.
    #[arg(long)]
    search_k: Option<NonZeroUsize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let Args { index, dimensions, distance_type, query_item, count, search_k } = Args::parse();

    let reader = Reader::open(&index, dimensions, distance_type, None)
        .with_context(|| format!("while opening {}", index.display()))?;

    let query_vector = reader.item_vector(query_item)?;
    let rendered: Vec<_> = query_vector.iter().map(f32::to_string).collect();
    println!("{}", rendered.join(" "));

    for (item, score) in reader.nns_by_item(query_item, count, search_k)? {
        println!("{query_item} {item} {score}");
    }

    Ok(())
}
