//! trailgraph CLI - Debug tool for trail network construction
//!
//! Usage:
//!   trailgraph-cli build <folder> [--output <dir>] [--config <file>]
//!   trailgraph-cli split <folder> [--config <file>]
//!
//! Every track of every GPX file in the folder becomes one trail. The tool
//! logs each pipeline stage and can export the finished graph as GeoJSON
//! together with the build reports.

use clap::{Parser, Subcommand};
use gpx::{Gpx, read};
use log::{info, warn};
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use trailgraph::{
    NetworkConfig, Trail, TrailAttributes, TrailGraph, TrailNetwork, TrailPoint, build_network,
    detect_intersections, split_trails,
};

#[derive(Parser)]
#[command(name = "trailgraph-cli")]
#[command(about = "Debug tool for trail network construction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with NetworkConfig overrides (camelCase keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, consolidate and validate a network
    Build {
        /// Folder containing GPX files
        folder: PathBuf,

        /// Output directory for edges.geojson and report.json
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Node matching tolerance in meters
        #[arg(long)]
        node_tolerance: Option<f64>,

        /// Maximum edges merged per chain per iteration
        #[arg(long)]
        max_chain_length: Option<usize>,
    },

    /// Only detect intersections and split trails
    Split {
        /// Folder containing GPX files
        folder: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => NetworkConfig::default(),
    };

    match cli.command {
        Commands::Build {
            folder,
            output,
            node_tolerance,
            max_chain_length,
        } => {
            if let Some(t) = node_tolerance {
                config.node_tolerance_meters = t;
            }
            if let Some(n) = max_chain_length {
                config.max_chain_length = n;
            }
            let trails = load_gpx_trails(&folder);
            let network = build_network(&trails, &config)?;
            print_summary(&network);
            if let Some(dir) = output {
                export_network(&network, &dir)?;
            }
        }
        Commands::Split { folder } => {
            config.validate()?;
            let trails = load_gpx_trails(&folder);
            let intersections = detect_intersections(&trails, &config);
            let split = split_trails(&trails, &intersections, &config);
            println!("\n{}", "=".repeat(60));
            println!("Intersections: {}", intersections.len());
            println!(
                "Segments:      {} ({} trails split, {} short segments dropped)",
                split.stats.segments_out, split.stats.trails_split, split.stats.dropped_short
            );
            println!("{}", "=".repeat(60));
        }
    }

    Ok(())
}

/// Load every GPX track in a folder as a trail.
fn load_gpx_trails(folder: &Path) -> Vec<Trail> {
    info!("Loading GPX files from {}", folder.display());

    let entries = match fs::read_dir(folder) {
        Ok(e) => e,
        Err(e) => {
            warn!("Error reading folder: {}", e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "gpx"))
        .collect();
    paths.sort();

    let mut trails = Vec::new();
    for path in paths {
        match parse_gpx_file(&path) {
            Ok(parsed) => {
                for trail in parsed {
                    info!(
                        "  [OK] {} - {} points, {:.2}km",
                        trail.id,
                        trail.points.len(),
                        trail.length_meters / 1000.0
                    );
                    trails.push(trail);
                }
            }
            Err(e) => warn!("  [ERR] Failed to parse {}: {}", path.display(), e),
        }
    }

    info!("Loaded {} trails", trails.len());
    trails
}

/// Parse a GPX file, one trail per track.
fn parse_gpx_file(path: &Path) -> Result<Vec<Trail>, Box<dyn Error>> {
    let gpx: Gpx = read(BufReader::new(File::open(path)?))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let mut trails = Vec::new();
    for (i, track) in gpx.tracks.iter().enumerate() {
        let points: Vec<TrailPoint> = track
            .segments
            .iter()
            .flat_map(|s| s.points.iter())
            .map(|pt| TrailPoint {
                longitude: pt.point().x(),
                latitude: pt.point().y(),
                elevation: pt.elevation,
            })
            .collect();

        let id = if gpx.tracks.len() == 1 {
            stem.clone()
        } else {
            format!("{stem}-{i}")
        };
        let name = track.name.clone().unwrap_or_else(|| id.clone());
        let attributes = TrailAttributes {
            trail_type: track.type_.clone(),
            ..Default::default()
        };

        match Trail::new(id, name, attributes, points) {
            Ok(trail) => trails.push(trail),
            Err(e) => warn!("  Skipping track {} of {}: {}", i, path.display(), e),
        }
    }

    Ok(trails)
}

fn print_summary(network: &TrailNetwork) {
    let stats = &network.stats;
    let consolidation = &network.consolidation;
    let connectivity = &network.connectivity;

    println!("\n{}", "=".repeat(60));
    println!("Trails:        {}", stats.trails_in);
    println!("Intersections: {}", stats.intersections);
    println!(
        "Segments:      {} ({} dropped short)",
        stats.split.segments_out, stats.split.dropped_short
    );
    println!(
        "Graph:         {} -> {} edges, {} -> {} nodes",
        consolidation.edges_before,
        consolidation.edges_after,
        consolidation.nodes_before,
        consolidation.nodes_after
    );
    println!(
        "Merging:       {} chains in {} iterations, {} rejected, {} loops",
        consolidation.chains_merged,
        consolidation.iterations,
        consolidation.rejected.len(),
        consolidation.unresolved_loops.len()
    );
    println!("Degrees:       {:?}", connectivity.degree_histogram);
    println!(
        "Connectivity:  {} components, {:.1}% reachable, healthy: {}",
        connectivity.component_count,
        connectivity.reachability_percent,
        connectivity.is_healthy()
    );
    println!("{}", "=".repeat(60));
}

fn export_network(network: &TrailNetwork, dir: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(dir)?;

    let geojson = dir.join("edges.geojson");
    write_edges_geojson(&network.graph, &geojson)?;

    let report = dir.join("report.json");
    let writer = BufWriter::new(File::create(&report)?);
    serde_json::to_writer_pretty(
        writer,
        &serde_json::json!({
            "stats": network.stats,
            "consolidation": network.consolidation,
            "connectivity": network.connectivity,
        }),
    )?;

    info!("Exported {} and {}", geojson.display(), report.display());
    Ok(())
}

/// Write all edges to a single GeoJSON FeatureCollection.
fn write_edges_geojson(graph: &TrailGraph, path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, r#"{{"type": "FeatureCollection", "features": ["#)?;

    let count = graph.edge_count();
    for (i, edge) in graph.edges().enumerate() {
        let coords: Vec<String> = edge
            .geometry
            .iter()
            .map(|p| format!("[{:.7}, {:.7}]", p.longitude, p.latitude))
            .collect();
        let trails: Vec<String> = edge
            .trail_ids()
            .map(|t| format!("\"{}\"", t.replace('"', "'")))
            .collect();

        write!(
            writer,
            r#"  {{"type": "Feature", "properties": {{"id": {}, "source": {}, "target": {}, "length_m": {:.1}, "length_3d_m": {:.1}, "gain_m": {:.1}, "loss_m": {:.1}, "trails": [{}]}}, "geometry": {{"type": "LineString", "coordinates": [{}]}}}}"#,
            edge.id,
            edge.source,
            edge.target,
            edge.length_meters,
            edge.length_3d_meters,
            edge.elevation_gain,
            edge.elevation_loss,
            trails.join(", "),
            coords.join(", ")
        )?;

        if i + 1 < count {
            writeln!(writer, ",")?;
        } else {
            writeln!(writer)?;
        }
    }

    writeln!(writer, "]}}")?;
    Ok(())
}
