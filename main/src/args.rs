use std::path::PathBuf;

use clap::Parser;

/// Loads product metadata and embedded user reviews into Postgres.
#[derive(Debug, Clone, Parser)]
#[command(name = "review-loader", version)]
pub struct LoaderArgs {
    /// Product metadata file (line-delimited JSON)
    #[arg(long)]
    pub metadata: PathBuf,

    /// User review file (line-delimited JSON)
    #[arg(long)]
    pub reviews: PathBuf,

    /// Configuration file; environment variables override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// DDL file applied before loading
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Reviews per embedding call and transaction
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Skip reviews whose parent_asin is not present in the metadata file
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub skip_missing_metadata: bool,

    /// Split the review file across all detected accelerators
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub multi_device: bool,

    /// Use at most this many accelerators (0 means no cap)
    #[arg(long)]
    pub max_devices: Option<usize>,

    /// Assume this many accelerators instead of querying the host
    #[arg(long)]
    pub devices: Option<usize>,

    /// Kill workers that run longer than this many seconds
    #[arg(long)]
    pub worker_timeout_secs: Option<u64>,

    /// Worker executable; defaults to review-worker next to this binary
    #[arg(long)]
    pub worker_bin: Option<PathBuf>,

    /// Load a small sample (3 records per file, batches of 2) in one process
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub test: bool,
}

/// Loads one review shard. Launched by `review-loader --multi-device`.
#[derive(Debug, Clone, Parser)]
#[command(name = "review-worker", version)]
pub struct WorkerArgs {
    /// Review shard file
    #[arg(long)]
    pub reviews: PathBuf,

    /// Full metadata file, used for the parent filter
    #[arg(long)]
    pub metadata: PathBuf,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub skip_missing_metadata: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,
}
