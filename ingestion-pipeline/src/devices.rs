use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Source of the number of accelerator devices on this host.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn device_count(&self) -> usize;
}

/// Asks `nvidia-smi` for the visible GPUs. A missing binary or a failing
/// query counts as zero devices.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: String,
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
        }
    }
}

impl NvidiaSmiProbe {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DeviceProbe for NvidiaSmiProbe {
    async fn device_count(&self) -> usize {
        let output = Command::new(&self.program)
            .args(["--query-gpu=index", "--format=csv,noheader"])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let count = count_listed_devices(&String::from_utf8_lossy(&output.stdout));
                debug!(count, "accelerator devices detected");
                count
            }
            Ok(output) => {
                warn!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "device query failed; assuming no accelerators"
                );
                0
            }
            Err(err) => {
                warn!(program = %self.program, error = %err, "device query unavailable; assuming no accelerators");
                0
            }
        }
    }
}

/// A fixed device count, used for the operator override.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub usize);

#[async_trait]
impl DeviceProbe for FixedProbe {
    async fn device_count(&self) -> usize {
        self.0
    }
}

pub fn count_listed_devices(listing: &str) -> usize {
    listing.lines().filter(|line| !line.trim().is_empty()).count()
}
