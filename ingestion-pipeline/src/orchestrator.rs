use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use common::{error::AppError, utils::config::AppConfig};
use futures::future::join_all;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::{devices::DeviceProbe, splitter::split_jsonl};

/// Device binding variable read by the embedding runtime of each worker.
pub const DEVICE_ENV: &str = "CUDA_VISIBLE_DEVICES";
pub const WORKER_ID_ENV: &str = "WORKER_ID";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub reviews: PathBuf,
    pub metadata: PathBuf,
    pub batch_size: usize,
    pub skip_missing_metadata: bool,
    pub max_devices: Option<usize>,
    /// Kill a worker still running after this long.
    pub worker_timeout: Option<Duration>,
    pub worker_program: PathBuf,
    /// Configuration file handed to every worker, if the run used one.
    pub config_file: Option<PathBuf>,
}

/// Everything needed to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    pub device: usize,
    pub shard: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded,
    /// Exit code, or `None` when the process was ended by a signal.
    Failed(Option<i32>),
    LaunchFailed(String),
    TimedOut,
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutcome {
    pub device: usize,
    pub shard: PathBuf,
    pub outcome: WorkerOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub devices: usize,
    pub total_lines: usize,
    pub shards: Vec<ShardOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.shards.iter().all(|shard| shard.outcome.is_success())
    }

    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardOutcome> {
        self.shards.iter().filter(|shard| !shard.outcome.is_success())
    }
}

/// Splits the review file across the available devices and runs one worker
/// process per shard, collecting an outcome for each.
pub struct Orchestrator {
    probe: Arc<dyn DeviceProbe>,
    app: AppConfig,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(probe: Arc<dyn DeviceProbe>, app: AppConfig, config: OrchestratorConfig) -> Self {
        Self { probe, app, config }
    }

    /// Number of devices the run will use. Zero detected devices is an error;
    /// a cap of zero means no cap.
    pub async fn devices(&self) -> Result<usize, AppError> {
        let detected = self.probe.device_count().await;
        if detected == 0 {
            return Err(AppError::Validation(
                "no accelerator devices detected; multi-device mode cannot run".to_string(),
            ));
        }
        let devices = self
            .config
            .max_devices
            .filter(|cap| *cap > 0)
            .map_or(detected, |cap| detected.min(cap));
        info!(detected, devices, "accelerator devices selected");
        Ok(devices)
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let devices = self.devices().await?;
        self.run_on(devices).await
    }

    /// Splits the input into `devices` shards and supervises one worker per
    /// shard.
    pub async fn run_on(&self, devices: usize) -> Result<RunSummary, AppError> {
        info!(devices, "multi-device review load starting");

        let input = self.config.reviews.clone();
        let out_dir = PathBuf::from(&self.app.shard_dir);
        let prefix = self.app.shard_prefix.clone();
        let split = tokio::task::spawn_blocking(move || split_jsonl(&input, devices, &out_dir, &prefix))
            .await??;

        let launches = plan_launches(&self.config, &self.app, &split.shards);
        let timeout = self.config.worker_timeout;
        let outcomes = join_all(launches.iter().map(|launch| supervise(launch, timeout))).await;

        let shards: Vec<ShardOutcome> = launches
            .into_iter()
            .zip(outcomes)
            .map(|(launch, outcome)| ShardOutcome {
                device: launch.device,
                shard: launch.shard,
                outcome,
            })
            .collect();

        let summary = RunSummary {
            devices,
            total_lines: split.total_lines,
            shards,
        };
        for failed in summary.failed_shards() {
            error!(
                device = failed.device,
                shard = %failed.shard.display(),
                outcome = ?failed.outcome,
                "worker did not complete its shard"
            );
        }
        info!(
            devices,
            total_lines = summary.total_lines,
            succeeded = summary.shards.len() - summary.failed_shards().count(),
            "multi-device review load finished"
        );
        Ok(summary)
    }
}

/// One launch per shard, shard `i` bound to device `i`.
pub fn plan_launches(
    config: &OrchestratorConfig,
    app: &AppConfig,
    shards: &[PathBuf],
) -> Vec<WorkerLaunch> {
    let forwarded: Vec<(String, String)> = app
        .to_env()
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

    shards
        .iter()
        .enumerate()
        .map(|(device, shard)| {
            let mut args = vec![
                "--reviews".to_string(),
                shard.display().to_string(),
                "--metadata".to_string(),
                config.metadata.display().to_string(),
                "--batch-size".to_string(),
                config.batch_size.to_string(),
            ];
            if config.skip_missing_metadata {
                args.push("--skip-missing-metadata".to_string());
            }
            if let Some(path) = &config.config_file {
                args.push("--config".to_string());
                args.push(path.display().to_string());
            }

            let mut env = forwarded.clone();
            env.push((DEVICE_ENV.to_string(), device.to_string()));
            env.push((WORKER_ID_ENV.to_string(), device.to_string()));

            WorkerLaunch {
                device,
                shard: shard.clone(),
                program: config.worker_program.clone(),
                args,
                env,
            }
        })
        .collect()
}

/// Runs one worker to completion, or until `timeout` expires.
pub async fn supervise(launch: &WorkerLaunch, timeout: Option<Duration>) -> WorkerOutcome {
    let mut command = Command::new(&launch.program);
    command
        .args(&launch.args)
        .envs(launch.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(
                device = launch.device,
                program = %launch.program.display(),
                error = %err,
                "failed to launch worker"
            );
            return WorkerOutcome::LaunchFailed(err.to_string());
        }
    };
    info!(
        device = launch.device,
        shard = %launch.shard.display(),
        pid = child.id(),
        "worker launched"
    );

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(device = launch.device, timeout_secs = limit.as_secs(), "worker timed out; killing");
                if let Err(err) = child.kill().await {
                    warn!(device = launch.device, error = %err, "failed to kill timed out worker");
                }
                return WorkerOutcome::TimedOut;
            }
        },
        None => child.wait().await,
    };

    match status {
        Ok(status) if status.success() => {
            info!(device = launch.device, "worker finished");
            WorkerOutcome::Succeeded
        }
        Ok(status) => WorkerOutcome::Failed(status.code()),
        Err(err) => WorkerOutcome::LaunchFailed(err.to_string()),
    }
}

/// Default location of the worker binary: next to the running executable.
pub fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map_or_else(|| PathBuf::from(name), |dir| dir.join(name))
}
