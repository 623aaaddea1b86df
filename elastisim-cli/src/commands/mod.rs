// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::sync::Arc;

use elastisim_core::{
    AllocError, Config, ConfigLoader, DemandPredictor, LinearDemandModel, PredictorConfig,
};

pub mod predict;
pub mod run;
pub mod stats;
pub mod train;
pub mod validate;

/// Load the configuration, falling back to defaults when the file is absent.
pub fn load_config(path: &str) -> Result<Config, AllocError> {
    match ConfigLoader::load_file(path) {
        Err(AllocError::ConfigNotFound { path }) => {
            tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
            Ok(Config::default())
        }
        other => other,
    }
}

/// Build the predictor described by the `predictor` section.
pub fn build_predictor(config: &PredictorConfig) -> Result<Arc<dyn DemandPredictor>, AllocError> {
    let model = match &config.model_path {
        Some(path) => LinearDemandModel::load_or_untrained(path, config.default_demand)?,
        None => {
            tracing::info!("No model configured, predictor starts untrained");
            LinearDemandModel::untrained(config.default_demand)
        }
    };
    Ok(Arc::new(model))
}
