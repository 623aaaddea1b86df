// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `elastisim predict` command - Predict demand for one prompt.

use elastisim_core::{Prediction, RequestAnalyzer};

use super::{build_predictor, load_config};

pub async fn execute(config_path: &str, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let predictor = build_predictor(&config.predictor)?;

    let features = RequestAnalyzer::new().analyze(text);
    let prediction = predictor.predict(&features);

    println!("Length:    {}", features.length);
    println!("Category:  {}", features.category);
    match prediction {
        Prediction::Model(demand) => println!("Demand:    {:.4}", demand),
        Prediction::Fallback { demand, reason } => {
            println!("Demand:    {:.4} (fallback: {})", demand, reason)
        }
    }

    Ok(())
}
