#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Reviews per transaction.
    pub batch_size: usize,
    /// Texts per embedding backend call.
    pub embed_batch_size: usize,
    pub max_records: Option<usize>,
    pub worker_id: String,
    /// Device index the process is bound to, if any.
    pub device: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            embed_batch_size: 32,
            max_records: None,
            worker_id: "0".to_string(),
            device: None,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    /// Sets both the transaction size and the embedding call size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.embed_batch_size = self.batch_size;
        self
    }

    #[must_use]
    pub fn with_identity(mut self, worker_id: impl Into<String>, device: Option<String>) -> Self {
        self.worker_id = worker_id.into();
        self.device = device;
        self
    }

    #[must_use]
    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn device_label(&self) -> &str {
        self.device.as_deref().unwrap_or("default")
    }
}
