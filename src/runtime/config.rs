use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 8;
pub const DEFAULT_LINGER_TIME: Duration = Duration::from_secs(60);
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

const ENV_BATCH_SIZE: &str = "BATCHLINE_BATCH_SIZE";
const ENV_WORKERS: &str = "BATCHLINE_WORKERS";
const ENV_CHANNEL_BUFFER_SIZE: &str = "BATCHLINE_CHANNEL_BUFFER_SIZE";
const ENV_LINGER_MS: &str = "BATCHLINE_LINGER_MS";
const ENV_DRAIN_POLL_MS: &str = "BATCHLINE_DRAIN_POLL_MS";
const ENV_METRICS_MS: &str = "BATCHLINE_METRICS_MS";

/// Runtime configuration for an [`Aggregator`](crate::Aggregator).
///
/// All instances must be constructed via [`AggregatorConfig::builder`],
/// [`AggregatorConfig::new`] or [`AggregatorConfig::from_env`] so invariants are
/// validated before any worker observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    batch_size: usize,
    workers: usize,
    channel_buffer_size: usize,
    linger_time: Duration,
    drain_poll_interval: Duration,
    metrics_interval: Option<Duration>,
}

pub struct AggregatorConfigParams {
    pub batch_size: usize,
    pub workers: usize,
    pub channel_buffer_size: usize,
    pub linger_time: Duration,
    pub drain_poll_interval: Duration,
    pub metrics_interval: Option<Duration>,
}

impl AggregatorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> AggregatorConfigBuilder {
        AggregatorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: AggregatorConfigParams) -> Result<Self> {
        let AggregatorConfigParams {
            batch_size,
            workers,
            channel_buffer_size,
            linger_time,
            drain_poll_interval,
            metrics_interval,
        } = params;

        let config = Self {
            batch_size,
            workers,
            channel_buffer_size,
            linger_time,
            drain_poll_interval,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `BATCHLINE_*` environment variables.
    ///
    /// Unset variables fall back to the builder defaults; set but unparsable
    /// values are rejected.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(value) = env_value::<usize>(ENV_BATCH_SIZE)? {
            builder = builder.batch_size(value);
        }
        if let Some(value) = env_value::<usize>(ENV_WORKERS)? {
            builder = builder.workers(value);
        }
        if let Some(value) = env_value::<usize>(ENV_CHANNEL_BUFFER_SIZE)? {
            builder = builder.channel_buffer_size(value);
        }
        if let Some(value) = env_value::<u64>(ENV_LINGER_MS)? {
            builder = builder.linger_time(Duration::from_millis(value));
        }
        if let Some(value) = env_value::<u64>(ENV_DRAIN_POLL_MS)? {
            builder = builder.drain_poll_interval(Duration::from_millis(value));
        }
        if let Some(value) = env_value::<u64>(ENV_METRICS_MS)? {
            builder = builder.metrics_interval(Duration::from_millis(value));
        }
        builder.build()
    }

    /// Maximum number of items handed to the batch handler at once.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of worker tasks draining the queue.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue capacity as configured, before clamping.
    pub fn channel_buffer_size(&self) -> usize {
        self.channel_buffer_size
    }

    /// Effective queue capacity: never smaller than the worker count so every
    /// worker has slack while the others are flushing.
    pub fn queue_capacity(&self) -> usize {
        self.channel_buffer_size.max(self.workers)
    }

    /// Longest time a partial batch waits after its first item arrives.
    pub fn linger_time(&self) -> Duration {
        self.linger_time
    }

    /// Interval at which `safe_stop` re-checks the queue depth.
    pub fn drain_poll_interval(&self) -> Duration {
        self.drain_poll_interval
    }

    /// Interval of the metrics reporter, if enabled.
    pub fn metrics_interval(&self) -> Option<Duration> {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.workers == 0 {
            bail!("workers must be greater than 0");
        }

        if self.linger_time.is_zero() {
            bail!("linger_time must be greater than 0");
        }

        if self.drain_poll_interval.is_zero() {
            bail!("drain_poll_interval must be greater than 0");
        }

        if matches!(self.metrics_interval, Some(interval) if interval.is_zero()) {
            bail!("metrics_interval must be greater than 0 when set");
        }

        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_workers(),
            channel_buffer_size: 0,
            linger_time: DEFAULT_LINGER_TIME,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            metrics_interval: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct AggregatorConfigBuilder {
    batch_size: Option<usize>,
    workers: Option<usize>,
    channel_buffer_size: Option<usize>,
    linger_time: Option<Duration>,
    drain_poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl AggregatorConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count);
        self
    }

    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = Some(size);
        self
    }

    pub fn linger_time(mut self, linger: Duration) -> Self {
        self.linger_time = Some(linger);
        self
    }

    pub fn drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<AggregatorConfig> {
        let params = AggregatorConfigParams {
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            workers: self.workers.unwrap_or_else(default_workers),
            channel_buffer_size: self.channel_buffer_size.unwrap_or(0),
            linger_time: self.linger_time.unwrap_or(DEFAULT_LINGER_TIME),
            drain_poll_interval: self
                .drain_poll_interval
                .unwrap_or(DEFAULT_DRAIN_POLL_INTERVAL),
            metrics_interval: self.metrics_interval,
        };

        AggregatorConfig::new(params)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let value = trimmed
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: {trimmed:?}"))?;
            Ok(Some(value))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("{key} is not valid unicode")),
    }
}
