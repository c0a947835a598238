//! Configuration types for chunk-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest visibility timeout SQS accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Transform provider settings (OpenAI-compatible chat completions)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Provider API key
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the API (default: "https://api.openai.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name (default: "gpt-4o-mini")
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum completion tokens per chunk (default: 150)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Input/output queue settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// URL of the queue messages are consumed from
    #[serde(default)]
    pub input_queue_url: String,

    /// URL of the queue notifications are published to
    #[serde(default)]
    pub output_queue_url: String,

    /// How far each lease extension pushes the visibility window (default: 60 seconds)
    #[serde(default = "default_visibility_extension", with = "duration_serde")]
    pub visibility_extension: Duration,

    /// Maximum messages per receive call, 1..=10 (default: 10)
    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: i32,

    /// Long-poll wait per receive call, 0..=20 seconds (default: 20 seconds)
    #[serde(default = "default_wait_time", with = "duration_serde")]
    pub wait_time: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            input_queue_url: String::new(),
            output_queue_url: String::new(),
            visibility_extension: default_visibility_extension(),
            receive_batch_size: default_receive_batch_size(),
            wait_time: default_wait_time(),
        }
    }
}

/// Object store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket records are written to
    #[serde(default)]
    pub bucket: String,

    /// Key prefix for records (default: "processed_texts")
    #[serde(default = "default_collection_name")]
    pub key_prefix: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key_prefix: default_collection_name(),
        }
    }
}

/// Document store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Connection string (default: derived from `database_name`)
    #[serde(default)]
    pub uri: Option<String>,

    /// Database name, used to derive the connection string when `uri` is unset
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Collection (table) records are written to (default: "processed_texts")
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

impl DocumentStoreConfig {
    /// Effective connection string
    pub fn connection_uri(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}.db", self.database_name))
    }
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database_name: default_database_name(),
            collection_name: default_collection_name(),
        }
    }
}

/// Task processing policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum characters per chunk (default: 500)
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,

    /// Pause between consecutive chunk transforms (default: 1000 ms)
    ///
    /// Throttles calls to the transform provider. Set to zero to disable.
    #[serde(default = "default_inter_chunk_delay", with = "duration_millis_serde")]
    pub inter_chunk_delay: Duration,

    /// Messages processed concurrently by one worker (default: 4)
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// How long shutdown waits for in-flight tasks (default: 30 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            inter_chunk_delay: default_inter_chunk_delay(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Backoff for the consumer's receive loop
///
/// Only queue polling uses this. Task processing never retries on its own;
/// redelivery is left to the queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the worker
///
/// Fields are organized into logical sub-configs:
/// - [`transform`](TransformConfig) - provider credentials and model
/// - [`queue`](QueueConfig) - input/output queues and lease extension
/// - [`object_store`](ObjectStoreConfig) / [`document_store`](DocumentStoreConfig) - persistence
/// - [`processing`](ProcessingConfig) - chunk size, pacing, concurrency
/// - [`retry`](RetryConfig) - receive-loop backoff
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transform provider settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Object store settings
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Document store settings
    #[serde(default)]
    pub document_store: DocumentStoreConfig,

    /// Task processing policy
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Receive-loop backoff
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup
    ///
    /// Unset or blank keys fall back to defaults. Values that are present but
    /// unparsable are reported as [`Error::Config`] naming the key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("OPENAI_API_KEY") {
            config.transform.api_key = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            config.transform.base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            config.transform.model = v;
        }
        if let Some(v) = parse_var(&get, "OPENAI_MAX_TOKENS")? {
            config.transform.max_tokens = v;
        }
        if let Some(secs) = parse_var(&get, "OPENAI_TIMEOUT_SECS")? {
            config.transform.request_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = get("SQS_INPUT_QUEUE_URL") {
            config.queue.input_queue_url = v;
        }
        if let Some(v) = get("SQS_OUTPUT_QUEUE_URL") {
            config.queue.output_queue_url = v;
        }
        if let Some(secs) = parse_var(&get, "VISIBILITY_TIMEOUT_EXTENSION")? {
            config.queue.visibility_extension = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&get, "SQS_RECEIVE_BATCH_SIZE")? {
            config.queue.receive_batch_size = v;
        }
        if let Some(secs) = parse_var(&get, "SQS_WAIT_TIME_SECS")? {
            config.queue.wait_time = Duration::from_secs(secs);
        }

        if let Some(v) = get("S3_BUCKET_NAME") {
            config.object_store.bucket = v;
        }
        if let Some(v) = get("S3_KEY_PREFIX") {
            config.object_store.key_prefix = v;
        }

        config.document_store.uri = get("DOCUMENT_STORE_URI");
        if let Some(v) = get("DOCUMENT_STORE_DB_NAME") {
            config.document_store.database_name = v;
        }
        if let Some(v) = get("DOCUMENT_STORE_COLLECTION_NAME") {
            config.document_store.collection_name = v;
        }

        if let Some(v) = parse_var(&get, "MAX_PART_LENGTH")? {
            config.processing.max_chunk_len = v;
        }
        if let Some(ms) = parse_var(&get, "INTER_CHUNK_DELAY_MS")? {
            config.processing.inter_chunk_delay = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&get, "MAX_CONCURRENT_TASKS")? {
            config.processing.max_concurrent_tasks = v;
        }
        if let Some(secs) = parse_var(&get, "SHUTDOWN_GRACE_SECS")? {
            config.processing.shutdown_grace = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Check the configuration for values the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        require_non_empty("OPENAI_API_KEY", &self.transform.api_key)?;
        require_non_empty("SQS_INPUT_QUEUE_URL", &self.queue.input_queue_url)?;
        require_non_empty("SQS_OUTPUT_QUEUE_URL", &self.queue.output_queue_url)?;
        require_non_empty("S3_BUCKET_NAME", &self.object_store.bucket)?;

        url::Url::parse(&self.transform.base_url)
            .map_err(|e| Error::config("OPENAI_BASE_URL", format!("invalid URL: {e}")))?;

        if self.processing.max_chunk_len == 0 {
            return Err(Error::config("MAX_PART_LENGTH", "must be greater than zero"));
        }
        if self.processing.max_concurrent_tasks == 0 {
            return Err(Error::config(
                "MAX_CONCURRENT_TASKS",
                "must be greater than zero",
            ));
        }

        let extension = self.queue.visibility_extension.as_secs();
        if extension == 0 || extension > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(Error::config(
                "VISIBILITY_TIMEOUT_EXTENSION",
                format!("must be between 1 and {MAX_VISIBILITY_TIMEOUT_SECS} seconds"),
            ));
        }
        if !(1..=10).contains(&self.queue.receive_batch_size) {
            return Err(Error::config(
                "SQS_RECEIVE_BATCH_SIZE",
                "must be between 1 and 10",
            ));
        }
        if self.queue.wait_time.as_secs() > 20 {
            return Err(Error::config(
                "SQS_WAIT_TIME_SECS",
                "must be at most 20 seconds",
            ));
        }

        if !is_sql_identifier(&self.document_store.collection_name) {
            return Err(Error::config(
                "DOCUMENT_STORE_COLLECTION_NAME",
                "must contain only ASCII letters, digits and underscores, and not start with a digit",
            ));
        }

        Ok(())
    }
}

/// Whether `name` can be interpolated into SQL as a bare table name
pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn require_non_empty(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(key, "must be set"));
    }
    Ok(())
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(key, format!("invalid value {raw:?}: {e}")))
        })
        .transpose()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_visibility_extension() -> Duration {
    Duration::from_secs(60)
}

fn default_receive_batch_size() -> i32 {
    10
}

fn default_wait_time() -> Duration {
    Duration::from_secs(20)
}

fn default_database_name() -> String {
    "text_processing".to_string()
}

fn default_collection_name() -> String {
    "processed_texts".to_string()
}

fn default_max_chunk_len() -> usize {
    500
}

fn default_inter_chunk_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
