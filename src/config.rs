use std::time::Duration;

/// Where the sink writes recorded events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// Human-readable lines through the logger
    #[default]
    Log,
    /// One JSON object per line on stdout
    Json,
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(RecordFormat::Log),
            "json" => Ok(RecordFormat::Json),
            other => Err(format!("unknown record format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Motion events generated before the sentinel
    pub event_count: usize,
    /// Pause between events emitted by the source
    pub emit_interval: Duration,
    /// Deadline for all stages to finish, measured from start
    pub stage_timeout: Duration,
    /// Health check period, also used as the stall threshold
    pub health_interval: Duration,
    pub record_format: RecordFormat,
    /// Seed for the generated input; random when unset
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            event_count: 5,
            emit_interval: Duration::ZERO,
            stage_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(5),
            record_format: RecordFormat::Log,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_event_count(mut self, count: usize) -> Self {
        self.event_count = count;
        self
    }

    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
