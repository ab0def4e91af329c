use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lapscope::{
    AnalysisConfig, FileZoneStore, IbtReader, LapscopeError, ZoneLookup, analyze_file, writer,
};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze IBT files and write one session file per input
    Ingest {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, default_value = "sessions")]
        output: PathBuf,

        /// Config file; defaults to the user's config directory
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of per-track zone files
        #[arg(short, long)]
        tracks: Option<PathBuf>,
    },
    /// Print the header, session facts and channel table of an IBT file
    Channels {
        input: PathBuf,

        /// Also print the raw session info block
        #[arg(long)]
        raw: bool,
    },
    /// Write the effective analysis config, defaults included
    Config {
        /// Config file to read; defaults to the user's config directory
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write; defaults to the user's config directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the tracks that have zone files
    Zones {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of per-track zone files
        #[arg(short, long)]
        tracks: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, LapscopeError> {
    match path {
        Some(path) => AnalysisConfig::from_path(path),
        None => Ok(AnalysisConfig::from_local_file()?.unwrap_or_default()),
    }
}

fn zone_store(
    tracks: Option<PathBuf>,
    config: &AnalysisConfig,
) -> Result<FileZoneStore, LapscopeError> {
    match tracks.or_else(|| config.track_zones_dir.clone()) {
        Some(dir) => FileZoneStore::new(dir),
        None => FileZoneStore::new_default(),
    }
}

fn load_zones(tracks: Option<PathBuf>, config: &AnalysisConfig) -> Option<FileZoneStore> {
    match zone_store(tracks, config) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Track zones unavailable, events will not be tagged: {}", e);
            None
        }
    }
}

fn ingest(
    inputs: &[PathBuf],
    output: &Path,
    config: Option<&Path>,
    tracks: Option<PathBuf>,
) -> Result<usize, LapscopeError> {
    let config = load_config(config)?;
    let zones = load_zones(tracks, &config);
    let lookup = zones.as_ref().map(|z| z as &dyn ZoneLookup);

    let mut succeeded = 0;
    for input in inputs {
        // a bad file must not stop the batch
        let written = analyze_file(input, &config, lookup)
            .and_then(|report| writer::write_session(output, &report));
        match written {
            Ok(path) => {
                info!("Wrote {:?}", path);
                succeeded += 1;
            }
            Err(e) => error!("Skipping {:?}: {}", input, e),
        }
    }
    Ok(succeeded)
}

fn channels(input: &Path, raw: bool) -> Result<(), LapscopeError> {
    let reader = IbtReader::open(input)?;
    let header = reader.header();
    let disk_header = reader.disk_header();
    let info = reader.session_info();
    println!(
        "{} | {} | {}",
        info.track_name,
        info.car_name.as_deref().unwrap_or("-"),
        info.session_type.as_deref().unwrap_or("-")
    );
    println!(
        "version {}, {} Hz, {} records of {} bytes, {} laps",
        header.version,
        header.tick_rate,
        disk_header.record_count,
        header.buf_len,
        disk_header.session_lap_count
    );
    for channel in reader.channels() {
        println!(
            "{:<32} {:<9} {:>6} x{:<3} {:<10} {}",
            channel.name,
            format!("{:?}", channel.var_type),
            channel.offset,
            channel.count,
            channel.unit,
            channel.description
        );
    }
    if raw {
        println!("{}", reader.session_info_raw());
    }
    Ok(())
}

fn write_config(config: Option<&Path>, output: Option<&Path>) -> Result<(), LapscopeError> {
    let config = load_config(config)?;
    match output {
        Some(path) => {
            config.save_to(path)?;
            info!("Wrote config to {:?}", path);
        }
        None => {
            config.save()?;
            info!("Wrote config to {:?}", AnalysisConfig::default_path());
        }
    }
    Ok(())
}

fn list_zones(config: Option<&Path>, tracks: Option<PathBuf>) -> Result<(), LapscopeError> {
    let config = load_config(config)?;
    let store = zone_store(tracks, &config)?;
    info!("Zone files in {:?}", store.storage_path());
    for track_id in store.list_tracks() {
        let count = store.zones(&track_id).map_or(0, |z| z.zones.len());
        println!("{:<40} {} zones", track_id, count);
    }
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    match &cli.command {
        Commands::Ingest {
            inputs,
            output,
            config,
            tracks,
        } => match ingest(inputs, output, config.as_deref(), tracks.clone()) {
            Ok(0) => {
                error!("No file could be analyzed");
                std::process::exit(1);
            }
            Ok(count) => info!("Analyzed {} of {} files", count, inputs.len()),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        Commands::Channels { input, raw } => {
            if let Err(e) = channels(input, *raw) {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Config { config, output } => {
            if let Err(e) = write_config(config.as_deref(), output.as_deref()) {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Zones { config, tracks } => {
            if let Err(e) = list_zones(config.as_deref(), tracks.clone()) {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    };
}
