//! Segment an ad-campaign table in standardized and bottleneck space.
//!
//! ```text
//! cargo run --release --example segment_campaigns -- KAG_conversion_data.csv
//! RUST_LOG=adcluster=debug cargo run --example segment_campaigns -- data.csv
//! ```

use std::error::Error;

use adcluster::{
    BottleneckParams, InertiaCurve, RawRecord, Reduction, Segmentation, SegmentationConfig,
    Segmenter, FEATURE_NAMES,
};
use tracing_subscriber::EnvFilter;

fn print_curve(title: &str, curve: &InertiaCurve) {
    println!("=== {title} ===");
    for (k, inertia) in curve.iter() {
        println!("  k = {k:2}  inertia = {inertia:12.3}");
    }
}

fn print_segments(title: &str, seg: &Segmentation) {
    println!("\n=== {title} ===");
    for (c, size) in seg.fit.cluster_sizes().iter().enumerate() {
        println!("  segment {c}: {size} ads");
    }
    println!("  centroids (original units):");
    println!("    {}", FEATURE_NAMES.join(" | "));
    for (c, row) in seg.centroids_original_units.outer_iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.2}")).collect();
        println!("    {c}: {}", cells.join(" | "));
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: segment_campaigns <campaigns.csv>")?;
    let records = csv::Reader::from_path(&path)?
        .deserialize()
        .collect::<Result<Vec<RawRecord>, _>>()?;
    println!("{} records from {path}\n", records.len());

    // Standardized features, five segments.
    let direct = Segmenter::new(SegmentationConfig {
        n_clusters: 5,
        seed: Some(42),
        ..Default::default()
    });
    let prepared = direct.prepare(&records)?;
    let embedding = direct.reduce(&prepared)?;
    print_curve("elbow (standardized)", &direct.inertia_curve(&embedding, 19)?);
    let seg = direct.segment(&prepared, embedding)?;
    print_segments("segments (standardized, k = 5)", &seg);

    // Bottleneck space, three segments.
    let bottleneck = Segmenter::new(SegmentationConfig {
        n_clusters: 3,
        seed: Some(42),
        reduction: Reduction::Bottleneck(BottleneckParams::default()),
        visualization_dim: 3,
        ..Default::default()
    });
    println!();
    let embedding = bottleneck.reduce(&prepared)?;
    print_curve("elbow (bottleneck)", &bottleneck.inertia_curve(&embedding, 19)?);
    let seg = bottleneck.segment(&prepared, embedding)?;
    if let Some(loss) = seg.reconstruction_loss {
        println!("\nreconstruction loss: {loss:.5}");
    }
    print_segments("segments (bottleneck, k = 3)", &seg);

    match bottleneck.visualize(&seg) {
        Ok(rows) => {
            println!("\nfirst projected rows:");
            for row in rows.iter().take(5) {
                println!("  {:?} -> segment {}", row.coords, row.cluster);
            }
        }
        Err(e) => println!("\nno projection: {e}"),
    }

    Ok(())
}
