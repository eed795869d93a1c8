//! Configuration types for bookdrop
//!
//! All tunables live here: feed sources, scoring weights, digest bounds,
//! delivery backoff, storage paths, and the API listener. Every field has a
//! serde default so a partial config file (or `Config::default()`) is enough
//! to run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration for bookdrop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Content sources to aggregate from
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Aggregation loop settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Deduplication and quality scoring settings
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Digest assembly bounds
    #[serde(default)]
    pub digest: DigestConfig,

    /// Delivery protocol settings (attempts, backoff, lease)
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Database and blob storage paths
    #[serde(default)]
    pub storage: StorageConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            aggregation: AggregationConfig::default(),
            scoring: ScoringConfig::default(),
            digest: DigestConfig::default(),
            delivery: DeliveryConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

/// Kind of content source
///
/// Tagged so new adapter kinds can be added without breaking stored configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS or Atom feed
    Rss,
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Rss
    }
}

/// A single content source (feed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier for this source (used in natural keys and logs)
    pub id: String,

    /// Human-readable source name (used for attribution in digests)
    pub name: String,

    /// Feed URL
    pub url: String,

    /// Adapter kind
    #[serde(default)]
    pub kind: SourceKind,

    /// Trust weight in [0.0, 1.0]; feeds into the quality score
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,

    /// How often to poll this source
    #[serde(default = "default_poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,

    /// Per-fetch HTTP timeout
    #[serde(default = "default_fetch_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Whether this source is polled at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            url: String::new(),
            kind: SourceKind::default(),
            trust_weight: default_trust_weight(),
            poll_interval: default_poll_interval(),
            timeout: default_fetch_timeout(),
            enabled: true,
        }
    }
}

fn default_trust_weight() -> f64 {
    0.5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

/// Aggregation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// How often the aggregation loop wakes to look for due sources
    #[serde(default = "default_tick_interval", with = "duration_secs")]
    pub tick_interval: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
        }
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(60)
}

/// Deduplication and quality scoring tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Jaccard similarity at or above which two candidates are duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Half-life of the recency decay component, in hours
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,

    /// Lower edge of the ideal word-count band
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    /// Upper edge of the ideal word-count band
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Weight of the length component
    #[serde(default = "default_length_weight")]
    pub length_weight: f64,

    /// Weight of the source trust component
    #[serde(default = "default_trust_component_weight")]
    pub trust_weight: f64,

    /// Weight of the recency component
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            half_life_hours: default_half_life_hours(),
            min_words: default_min_words(),
            max_words: default_max_words(),
            length_weight: default_length_weight(),
            trust_weight: default_trust_component_weight(),
            recency_weight: default_recency_weight(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.6
}

fn default_half_life_hours() -> f64 {
    24.0
}

fn default_min_words() -> usize {
    100
}

fn default_max_words() -> usize {
    2000
}

fn default_length_weight() -> f64 {
    0.4
}

fn default_trust_component_weight() -> f64 {
    0.3
}

fn default_recency_weight() -> f64 {
    0.3
}

/// Digest assembly bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Maximum number of items in a digest
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Maximum total body bytes in a digest
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Title prefix for generated digests (date is appended)
    #[serde(default = "default_digest_title")]
    pub title_prefix: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_bytes: default_max_bytes(),
            title_prefix: default_digest_title(),
        }
    }
}

fn default_max_items() -> usize {
    25
}

fn default_max_bytes() -> usize {
    512 * 1024
}

fn default_digest_title() -> String {
    "Daily Digest".to_string()
}

/// Delivery protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Attempts before a (device, artifact) pair is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry backoff
    #[serde(default = "default_initial_backoff", with = "duration_secs")]
    pub initial_backoff: Duration,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff", with = "duration_secs")]
    pub max_backoff: Duration,

    /// Backoff multiplier per failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add random jitter to backoff delays
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// How long an IN_FLIGHT delivery may run before the sweep fails it
    #[serde(default = "default_lease", with = "duration_secs")]
    pub lease: Duration,

    /// How often the retry sweep wakes
    #[serde(default = "default_sweep_interval", with = "duration_secs")]
    pub sweep_interval: Duration,

    /// Session token lifetime
    #[serde(default = "default_session_ttl", with = "duration_secs")]
    pub session_ttl: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            lease: default_lease(),
            sweep_interval: default_sweep_interval(),
            session_ttl: default_session_ttl(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_lease() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

/// Database and blob storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file path
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Directory for content-addressed artifact blobs
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            blob_dir: default_blob_dir(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bookdrop.db")
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("blobs")
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether to start the API server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to serve the Swagger UI at /swagger-ui
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_port(),
            swagger_ui: true,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8917
}

impl Config {
    /// Validate the configuration, returning the first problem found
    pub fn validate(&self) -> crate::error::Result<()> {
        for source in &self.sources {
            if source.id.is_empty() {
                return Err(crate::error::Error::Config {
                    message: "source id must not be empty".to_string(),
                    key: Some("sources.id".to_string()),
                });
            }
            if !(0.0..=1.0).contains(&source.trust_weight) {
                return Err(crate::error::Error::Config {
                    message: format!(
                        "trust_weight for source '{}' must be in [0.0, 1.0], got {}",
                        source.id, source.trust_weight
                    ),
                    key: Some("sources.trust_weight".to_string()),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.scoring.similarity_threshold) {
            return Err(crate::error::Error::Config {
                message: format!(
                    "similarity_threshold must be in [0.0, 1.0], got {}",
                    self.scoring.similarity_threshold
                ),
                key: Some("scoring.similarity_threshold".to_string()),
            });
        }
        if self.scoring.half_life_hours <= 0.0 {
            return Err(crate::error::Error::Config {
                message: "half_life_hours must be positive".to_string(),
                key: Some("scoring.half_life_hours".to_string()),
            });
        }
        if self.scoring.min_words > self.scoring.max_words {
            return Err(crate::error::Error::Config {
                message: format!(
                    "min_words ({}) exceeds max_words ({})",
                    self.scoring.min_words, self.scoring.max_words
                ),
                key: Some("scoring.min_words".to_string()),
            });
        }
        if self.delivery.max_attempts == 0 {
            return Err(crate::error::Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("delivery.max_attempts".to_string()),
            });
        }
        if self.delivery.backoff_multiplier < 1.0 {
            return Err(crate::error::Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("delivery.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

/// Serialize/deserialize `Duration` as whole seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
