// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `elastisim validate` command - Validate configuration file.

use elastisim_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let allocator = &config.allocator;
            let server = &config.server;

            println!("✓ Configuration is valid");
            println!();
            println!("Allocator Settings:");
            println!(
                "  Servers:            {} initial, {} max",
                allocator.initial_servers, allocator.max_servers
            );
            println!(
                "  Scale Thresholds:   down < {} | up > {}",
                allocator.scale_down_threshold, allocator.scale_up_threshold
            );
            println!(
                "  Status Interval:    {}s",
                allocator.status_interval.as_secs()
            );
            println!("  Response Window:    {}", allocator.response_window);
            println!("  Max Requeues:       {}", allocator.max_requeues);
            if let Some(path) = &allocator.status_file {
                println!("  Status File:        {}", path.display());
            }
            println!();
            println!("Server Settings:");
            println!(
                "  Startup Delay:      {}ms",
                server.startup_delay.as_millis()
            );
            println!(
                "  Cost Factors:       length {} | complex {} | code {} | demand {} | jitter ±{}",
                server.cost.length_factor,
                server.cost.complex_factor,
                server.cost.code_factor,
                server.cost.demand_factor,
                server.cost.jitter
            );
            println!();
            println!("Predictor:");
            match &config.predictor.model_path {
                Some(path) => println!("  Model:              {}", path.display()),
                None => println!("  Model:              (untrained)"),
            }
            println!(
                "  Default Demand:     {}",
                config.predictor.default_demand
            );
            if let Some(port) = config.metrics.port {
                println!();
                println!("Metrics:              http://0.0.0.0:{}/metrics", port);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
