//! CLI for indexing solar imagery datasets and fetching source images.

mod error;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use log::debug;
use snafu::ResultExt;
use solarframes_core::{
    acquisition::{
        self, AcquisitionConfig, DEFAULT_CADENCE, DEFAULT_REMOTE_ROOT, DEFAULT_WAVELENGTH,
        HMI_FILENAME_PATTERN, HttpFetcher,
    },
    dataset::{
        CacheMode, ChannelSet, Dataset, DatasetOptions, FrameQuery, format_iso,
        parse_iso_timestamp,
    },
    storage,
};
use tracing_subscriber::EnvFilter;

use crate::error::{
    AcquisitionSnafu, CliResult, InvalidChannelsSnafu, OpenDatasetSnafu, ReadFrameSnafu,
    WriteFrameSnafu,
};

fn parse_date(s: &str) -> Result<NaiveDateTime, String> {
    parse_iso_timestamp(s).map_err(|e| e.to_string())
}

#[derive(Debug, clap::Args)]
struct DatasetArgs {
    /// Directory holding the shard manifest (*.json) and tar shards
    #[arg(long = "data-dir")]
    data_dir: PathBuf,

    /// Repeatable channel name; stack order follows the flags (default: all seven)
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Neither read nor write the index cache
    #[arg(long, default_value_t = false, conflicts_with = "rebuild_cache")]
    no_cache: bool,

    /// Ignore an existing index cache and overwrite it
    #[arg(long, default_value_t = false)]
    rebuild_cache: bool,
}

impl DatasetArgs {
    fn options(&self) -> CliResult<DatasetOptions> {
        let channels = if self.channels.is_empty() {
            ChannelSet::default()
        } else {
            ChannelSet::new(self.channels.iter().cloned()).context(InvalidChannelsSnafu)?
        };
        let cache = match (self.no_cache, self.rebuild_cache) {
            (true, _) => CacheMode::Disabled,
            (false, true) => CacheMode::Rebuild,
            (false, false) => CacheMode::ReadWrite,
        };
        Ok(DatasetOptions { channels, cache })
    }
}

#[derive(Debug, clap::Args)]
struct FetchArgs {
    /// Inclusive start (ISO-8601)
    #[arg(long = "date-start", value_parser = parse_date, default_value = "2022-11-01T00:02:00")]
    date_start: NaiveDateTime,

    /// Exclusive end (ISO-8601)
    #[arg(long = "date-end", value_parser = parse_date, default_value = "2024-05-14T19:44:00")]
    date_end: NaiveDateTime,

    /// Minutes between images; even, or 15 for the :00/:14/:30/:44 cycle
    #[arg(long, default_value_t = DEFAULT_CADENCE)]
    cadence: u32,

    #[arg(long = "remote-root", default_value = DEFAULT_REMOTE_ROOT)]
    remote_root: String,

    #[arg(long = "local-root")]
    local_root: PathBuf,

    /// Repeatable wavelength identifier
    #[arg(long = "wavelength", default_values_t = [DEFAULT_WAVELENGTH.to_string()])]
    wavelengths: Vec<String>,

    /// strftime file name pattern; may contain {wavelength}
    #[arg(long = "filename-pattern", default_value = HMI_FILENAME_PATTERN)]
    filename_pattern: String,

    #[arg(long = "max-workers", default_value_t = 1)]
    max_workers: usize,

    #[arg(long = "worker-chunk-size", default_value_t = 1)]
    worker_chunk_size: usize,

    #[arg(long = "total-nodes", default_value_t = 1)]
    total_nodes: usize,

    #[arg(long = "node-index", default_value_t = 0)]
    node_index: usize,

    /// Print this node's jobs without fetching anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl From<FetchArgs> for AcquisitionConfig {
    fn from(args: FetchArgs) -> Self {
        AcquisitionConfig {
            date_start: args.date_start,
            date_end: args.date_end,
            cadence: args.cadence,
            remote_root: args.remote_root,
            local_root: args.local_root,
            wavelengths: args.wavelengths,
            filename_pattern: args.filename_pattern,
            max_workers: args.max_workers,
            worker_chunk_size: args.worker_chunk_size,
            total_nodes: args.total_nodes,
            node_index: args.node_index,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan, partition and download images for this node
    Fetch(FetchArgs),

    /// Build (or load) the temporal index and print a summary
    Index(DatasetArgs),

    /// Resolve one frame by position or ISO timestamp
    Frame {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Zero-based position or ISO-8601 timestamp
        #[arg(long)]
        at: String,

        /// Write the stacked frame as an .npy file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "solarframes", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

async fn cmd_fetch(args: FetchArgs) -> CliResult<()> {
    let dry_run = args.dry_run;
    let config = AcquisitionConfig::from(args);
    debug!("acquisition config: {config:?}");
    config.validate().context(AcquisitionSnafu)?;

    if dry_run {
        let plan = config.node_jobs().context(AcquisitionSnafu)?;
        print_node_header(
            plan.block.total_nodes,
            plan.block.node_index,
            plan.total_jobs,
            plan.jobs.len(),
            plan.block.dropped,
        );
        for job in &plan.jobs {
            println!("{} -> {}", job.remote, job.local.display());
        }
        return Ok(());
    }

    let fetcher = HttpFetcher::new().context(AcquisitionSnafu)?;
    let report = acquisition::run(&config, &fetcher)
        .await
        .context(AcquisitionSnafu)?;
    print_node_header(
        report.block.total_nodes,
        report.block.node_index,
        report.total_jobs,
        report.summary.total,
        report.block.dropped,
    );
    println!("Files downloaded: {}", report.summary.downloaded);
    println!("Files skipped   : {}", report.summary.skipped);
    println!("Files total     : {}", report.summary.total);
    println!("Duration: {:.3}s", report.elapsed.as_secs_f64());
    Ok(())
}

fn print_node_header(
    total_nodes: usize,
    node_index: usize,
    all: usize,
    mine: usize,
    dropped: usize,
) {
    println!("Total nodes: {total_nodes}");
    println!("Node index : {node_index}");
    println!("Total files for all nodes : {all}");
    println!("Total files for this node : {mine}");
    if dropped > 0 {
        println!("Unassigned files          : {dropped}");
    }
}

async fn open_dataset(args: &DatasetArgs) -> CliResult<Dataset> {
    let options = args.options()?;
    Dataset::open(&args.data_dir, options)
        .await
        .context(OpenDatasetSnafu {
            dir: args.data_dir.display().to_string(),
        })
}

async fn cmd_index(args: DatasetArgs) -> CliResult<()> {
    let ds = open_dataset(&args).await?;
    let stats = ds.stats();

    println!("Directory: {}", args.data_dir.display());
    println!("Manifest : {}", ds.store().manifest_path().display());
    println!("Channels : {}", ds.channels());
    if let Some((first, last)) = ds.date_range() {
        println!("Start    : {}", format_iso(&first));
        println!("End      : {}", format_iso(&last));
    }
    println!("Frames total    : {}", stats.frames_total);
    println!("Frames available: {}", stats.frames_available);
    println!("Frames dropped  : {}", stats.frames_dropped);
    match ds.cache_path() {
        Some(path) => println!(
            "Cache    : {} ({})",
            path.display(),
            if stats.from_cache { "loaded" } else { "written" }
        ),
        None => println!("Cache    : disabled"),
    }
    Ok(())
}

fn frame_query(at: &str) -> FrameQuery {
    match at.parse::<usize>() {
        Ok(position) => FrameQuery::Position(position),
        Err(_) => FrameQuery::Iso(at.to_string()),
    }
}

async fn cmd_frame(dataset: DatasetArgs, at: String, output: Option<PathBuf>) -> CliResult<()> {
    let ds = open_dataset(&dataset).await?;
    let (frame, date) = ds
        .get(frame_query(&at))
        .context(ReadFrameSnafu { query: at.as_str() })?;

    println!("Date : {date}");
    println!("Shape: {:?}", frame.shape());
    println!("Dtype: {}", frame.element_type().descr());

    if let Some(path) = output {
        write_frame(&path, &frame.to_npy_bytes()).await?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn write_frame(path: &Path, bytes: &[u8]) -> CliResult<()> {
    storage::write_atomic(path, bytes)
        .await
        .context(WriteFrameSnafu {
            path: path.display().to_string(),
        })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Fetch(args) => cmd_fetch(args).await,
        Command::Index(args) => cmd_index(args).await,
        Command::Frame {
            dataset,
            at,
            output,
        } => cmd_frame(dataset, at, output).await,
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        eprintln!("error ({}): {e}", e.category());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn numeric_at_is_a_position() {
        assert_eq!(frame_query("12"), FrameQuery::Position(12));
        assert_eq!(
            frame_query("2022-11-01T00:00:00"),
            FrameQuery::Iso("2022-11-01T00:00:00".to_string())
        );
    }

    #[test]
    fn fetch_defaults_match_library_defaults() {
        let cli = Cli::try_parse_from(["solarframes", "fetch", "--local-root", "/tmp/x"])
            .expect("valid args");
        let Command::Fetch(args) = cli.cmd else {
            panic!("expected fetch");
        };
        let config = AcquisitionConfig::from(args);
        assert_eq!(
            config,
            AcquisitionConfig {
                local_root: PathBuf::from("/tmp/x"),
                ..AcquisitionConfig::default()
            }
        );
    }

    #[test]
    fn cache_flags_map_to_modes() {
        let cli = Cli::try_parse_from([
            "solarframes",
            "index",
            "--data-dir",
            "d",
            "--rebuild-cache",
        ])
        .expect("valid args");
        let Command::Index(args) = cli.cmd else {
            panic!("expected index");
        };
        assert_eq!(args.options().unwrap().cache, CacheMode::Rebuild);

        assert!(
            Cli::try_parse_from([
                "solarframes",
                "index",
                "--data-dir",
                "d",
                "--no-cache",
                "--rebuild-cache"
            ])
            .is_err()
        );
    }
}
