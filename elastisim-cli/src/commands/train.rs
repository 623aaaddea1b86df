// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `elastisim train` command - Fit and persist the demand model.
//!
//! Training data is a CSV file with a header row and the columns
//! `length,category,demand`.

use std::path::Path;

use elastisim_core::{Category, FeatureRecord, LinearDemandModel, TrainingOptions};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingDataError {
    #[error("Failed to read training data: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: {reason}")]
    InvalidCategory { row: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct TrainingRow {
    length: usize,
    category: String,
    demand: f64,
}

/// Read feature vectors and demand targets from a CSV file.
pub fn read_training_data(
    path: impl AsRef<Path>,
) -> Result<(Vec<Vec<f64>>, Vec<f64>), TrainingDataError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (index, row) in reader.deserialize::<TrainingRow>().enumerate() {
        let row = row?;
        // header is line 1
        let category: Category = row
            .category
            .parse()
            .map_err(|reason| TrainingDataError::InvalidCategory {
                row: index + 2,
                reason,
            })?;
        x.push(FeatureRecord::new(row.length, category).to_vector(0));
        y.push(row.demand);
    }

    Ok((x, y))
}

pub async fn execute(
    data: &str,
    out: &str,
    epochs: usize,
    learning_rate: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(data = %data, out = %out, epochs, learning_rate, "Training demand model");

    let (x, y) = read_training_data(data)?;
    let mut model = LinearDemandModel::untrained(elastisim_core::predictor::DEFAULT_DEMAND);
    let report = model.train(
        &x,
        &y,
        TrainingOptions {
            epochs,
            learning_rate,
        },
    )?;
    model.save(out)?;

    println!("✓ Model trained on {} samples", report.samples);
    println!("  Epochs:      {}", report.epochs);
    println!("  Final MSE:   {:.6}", report.final_mse);
    println!("  Saved to:    {}", out);

    Ok(())
}
