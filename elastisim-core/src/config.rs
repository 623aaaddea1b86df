// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Every section is optional and falls back to the defaults of the reference
//! allocator. Any invalid field results in a HardValidationError that prevents
//! startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult, HardValidationError};

/// Upper bound for the pool size accepted from configuration.
const MAX_POOL_SIZE: usize = 1024;

/// Raw allocator section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawAllocatorConfig {
    #[serde(default = "default_initial_servers")]
    initial_servers: usize,
    #[serde(default = "default_max_servers")]
    max_servers: usize,
    #[serde(default = "default_scale_up_threshold")]
    scale_up_threshold: f64,
    #[serde(default = "default_scale_down_threshold")]
    scale_down_threshold: f64,
    #[serde(default = "default_status_interval_secs")]
    status_interval_secs: u64,
    #[serde(default = "default_window")]
    response_window: usize,
    #[serde(default = "default_max_requeues")]
    max_requeues: u32,
    #[serde(default)]
    status_file: Option<String>,
}

fn default_initial_servers() -> usize {
    1
}

fn default_max_servers() -> usize {
    5
}

fn default_scale_up_threshold() -> f64 {
    5.0
}

fn default_scale_down_threshold() -> f64 {
    1.0
}

fn default_status_interval_secs() -> u64 {
    10
}

fn default_window() -> usize {
    10
}

fn default_max_requeues() -> u32 {
    3
}

impl Default for RawAllocatorConfig {
    fn default() -> Self {
        Self {
            initial_servers: default_initial_servers(),
            max_servers: default_max_servers(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            status_interval_secs: default_status_interval_secs(),
            response_window: default_window(),
            max_requeues: default_max_requeues(),
            status_file: None,
        }
    }
}

/// Raw cost factors for the synthetic processing-time formula.
#[derive(Debug, Deserialize)]
struct RawCostFactors {
    #[serde(default = "default_length_factor")]
    length_factor: f64,
    #[serde(default = "default_complex_factor")]
    complex_factor: f64,
    #[serde(default = "default_code_factor")]
    code_factor: f64,
    #[serde(default = "default_demand_factor")]
    demand_factor: f64,
    #[serde(default = "default_jitter")]
    jitter: f64,
}

fn default_length_factor() -> f64 {
    0.01
}

fn default_complex_factor() -> f64 {
    0.5
}

fn default_code_factor() -> f64 {
    1.0
}

fn default_demand_factor() -> f64 {
    0.2
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for RawCostFactors {
    fn default() -> Self {
        Self {
            length_factor: default_length_factor(),
            complex_factor: default_complex_factor(),
            code_factor: default_code_factor(),
            demand_factor: default_demand_factor(),
            jitter: default_jitter(),
        }
    }
}

/// Raw simulated server section.
#[derive(Debug, Deserialize)]
struct RawServerConfig {
    #[serde(default = "default_startup_delay_ms")]
    startup_delay_ms: u64,
    #[serde(default = "default_window")]
    history_window: usize,
    #[serde(default)]
    cost: RawCostFactors,
    #[serde(default)]
    seed: Option<u64>,
}

fn default_startup_delay_ms() -> u64 {
    500
}

impl Default for RawServerConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: default_startup_delay_ms(),
            history_window: default_window(),
            cost: RawCostFactors::default(),
            seed: None,
        }
    }
}

/// Raw predictor section.
#[derive(Debug, Deserialize)]
struct RawPredictorConfig {
    #[serde(default)]
    model_path: Option<String>,
    #[serde(default = "default_demand")]
    default_demand: f64,
}

fn default_demand() -> f64 {
    1.0
}

impl Default for RawPredictorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            default_demand: default_demand(),
        }
    }
}

/// Raw metrics section.
#[derive(Debug, Default, Deserialize)]
struct RawMetricsConfig {
    #[serde(default)]
    port: Option<u16>,
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    allocator: RawAllocatorConfig,
    #[serde(default)]
    server: RawServerConfig,
    #[serde(default)]
    predictor: RawPredictorConfig,
    #[serde(default)]
    metrics: RawMetricsConfig,
}

/// Validated allocator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorConfig {
    pub initial_servers: usize,
    pub max_servers: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    /// Minimum spacing between two status reports.
    pub status_interval: Duration,
    /// Capacity of the recent response time buffer.
    pub response_window: usize,
    /// How many times a request may go back to the queue front.
    pub max_requeues: u32,
    /// Where to write the JSON status snapshot, if anywhere.
    pub status_file: Option<PathBuf>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            initial_servers: default_initial_servers(),
            max_servers: default_max_servers(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            status_interval: Duration::from_secs(default_status_interval_secs()),
            response_window: default_window(),
            max_requeues: default_max_requeues(),
            status_file: None,
        }
    }
}

/// Coefficients of the synthetic processing-time formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostFactors {
    pub length_factor: f64,
    pub complex_factor: f64,
    pub code_factor: f64,
    pub demand_factor: f64,
    /// Half-width of the uniform jitter added to every processing time.
    pub jitter: f64,
}

impl Default for CostFactors {
    fn default() -> Self {
        Self {
            length_factor: default_length_factor(),
            complex_factor: default_complex_factor(),
            code_factor: default_code_factor(),
            demand_factor: default_demand_factor(),
            jitter: default_jitter(),
        }
    }
}

/// Validated simulated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub startup_delay: Duration,
    pub history_window: usize,
    pub cost: CostFactors,
    /// Seed for the jitter generator; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_millis(default_startup_delay_ms()),
            history_window: default_window(),
            cost: CostFactors::default(),
            seed: None,
        }
    }
}

/// Validated predictor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    pub model_path: Option<PathBuf>,
    pub default_demand: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            default_demand: default_demand(),
        }
    }
}

/// Validated metrics configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub allocator: AllocatorConfig,
    pub server: ServerConfig,
    pub predictor: PredictorConfig,
    pub metrics: MetricsConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> AllocResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AllocError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| AllocError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    /// An empty document yields the defaults.
    pub fn load_string(content: &str) -> AllocResult<Config> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| AllocError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> AllocResult<Config> {
        Ok(Config {
            allocator: Self::validate_allocator(raw.allocator)?,
            server: Self::validate_server(raw.server)?,
            predictor: Self::validate_predictor(raw.predictor)?,
            metrics: Self::validate_metrics(raw.metrics)?,
        })
    }

    fn validate_allocator(raw: RawAllocatorConfig) -> AllocResult<AllocatorConfig> {
        if raw.max_servers == 0 || raw.max_servers > MAX_POOL_SIZE {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_servers",
                value: raw.max_servers.to_string(),
                reason: format!("Must be between 1 and {}", MAX_POOL_SIZE),
            }
            .into());
        }

        if raw.initial_servers == 0 || raw.initial_servers > raw.max_servers {
            return Err(HardValidationError::InitialPoolOutOfBounds {
                initial: raw.initial_servers,
                max: raw.max_servers,
            }
            .into());
        }

        for (field, value) in [
            ("scale_up_threshold", raw.scale_up_threshold),
            ("scale_down_threshold", raw.scale_down_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: value.to_string(),
                    reason: "Must be a finite, non-negative number".to_string(),
                }
                .into());
            }
        }

        if raw.scale_down_threshold >= raw.scale_up_threshold {
            return Err(HardValidationError::ThresholdOrder {
                lower: raw.scale_down_threshold,
                upper: raw.scale_up_threshold,
            }
            .into());
        }

        if raw.status_interval_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "status_interval_secs",
                value: "0".to_string(),
                reason: "Status interval must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.response_window == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "response_window",
                value: "0".to_string(),
                reason: "Response window must hold at least one sample".to_string(),
            }
            .into());
        }

        Ok(AllocatorConfig {
            initial_servers: raw.initial_servers,
            max_servers: raw.max_servers,
            scale_up_threshold: raw.scale_up_threshold,
            scale_down_threshold: raw.scale_down_threshold,
            status_interval: Duration::from_secs(raw.status_interval_secs),
            response_window: raw.response_window,
            max_requeues: raw.max_requeues,
            status_file: raw.status_file.map(PathBuf::from),
        })
    }

    fn validate_server(raw: RawServerConfig) -> AllocResult<ServerConfig> {
        // Startup delay is capped at one minute
        if raw.startup_delay_ms > 60_000 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "startup_delay_ms",
                value: raw.startup_delay_ms.to_string(),
                reason: "Startup delay must not exceed 60000ms".to_string(),
            }
            .into());
        }

        if raw.history_window == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "history_window",
                value: "0".to_string(),
                reason: "History window must hold at least one sample".to_string(),
            }
            .into());
        }

        let cost = raw.cost;
        for (field, value) in [
            ("length_factor", cost.length_factor),
            ("complex_factor", cost.complex_factor),
            ("code_factor", cost.code_factor),
            ("demand_factor", cost.demand_factor),
            ("jitter", cost.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: value.to_string(),
                    reason: "Cost factors must be finite and non-negative".to_string(),
                }
                .into());
            }
        }

        Ok(ServerConfig {
            startup_delay: Duration::from_millis(raw.startup_delay_ms),
            history_window: raw.history_window,
            cost: CostFactors {
                length_factor: cost.length_factor,
                complex_factor: cost.complex_factor,
                code_factor: cost.code_factor,
                demand_factor: cost.demand_factor,
                jitter: cost.jitter,
            },
            seed: raw.seed,
        })
    }

    fn validate_predictor(raw: RawPredictorConfig) -> AllocResult<PredictorConfig> {
        if !raw.default_demand.is_finite() || raw.default_demand < 0.0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "default_demand",
                value: raw.default_demand.to_string(),
                reason: "Default demand must be finite and non-negative".to_string(),
            }
            .into());
        }

        if let Some(path) = &raw.model_path {
            if path.trim().is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "model_path",
                    value: path.clone(),
                    reason: "Model path cannot be blank".to_string(),
                }
                .into());
            }
        }

        Ok(PredictorConfig {
            model_path: raw.model_path.map(PathBuf::from),
            default_demand: raw.default_demand,
        })
    }

    fn validate_metrics(raw: RawMetricsConfig) -> AllocResult<MetricsConfig> {
        if raw.port == Some(0) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "metrics.port",
                value: "0".to_string(),
                reason: "Port 0 is reserved and cannot be used".to_string(),
            }
            .into());
        }

        Ok(MetricsConfig { port: raw.port })
    }
}
