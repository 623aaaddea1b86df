// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `elastisim stats` command - Show allocator statistics.
//!
//! Reads the status file a running `elastisim run` refreshes on every
//! status report.

use std::path::PathBuf;

use elastisim_core::{AllocatorStats, ServerState};

use super::load_config;

pub async fn execute(
    config_path: &str,
    file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = match file {
        Some(file) => PathBuf::from(file),
        None => match load_config(config_path)?.allocator.status_file {
            Some(path) => path,
            None => {
                println!("No status file configured.");
                println!();
                println!("Set `allocator.status_file` in the configuration, then run:");
                println!("  elastisim -c {} run", config_path);
                return Ok(());
            }
        },
    };

    let stats = AllocatorStats::read_from(&path)?;
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &AllocatorStats) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    ELASTISIM STATISTICS                      ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║ Servers: {:<4} Queue: {:<6} Load: {:<8.2} Arrivals: {:<6.2}/s ║",
        stats.server_count(),
        stats.queue_length,
        stats.total_load,
        stats.arrival_rate
    );
    println!("╠══════════════════════════════════════════════════════════════╣");

    for server in &stats.servers {
        let icon = if server.state == ServerState::Ready {
            "●"
        } else {
            "○"
        };
        println!(
            "║ {} server {:<4} {:<9} load {:<8.2} in-flight {:<4} rate {:<6.2}║",
            icon,
            server.id.index(),
            server.state.name(),
            server.load,
            server.in_flight,
            server.service_rate
        );
    }

    let counters = &stats.counters;
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║ assigned {:<6} completed {:<6} dropped {:<6} requeued {:<6}   ║",
        counters.assigned, counters.completed, counters.dropped, counters.requeued
    );
    println!(
        "║ degraded {:<6} scale-ups {:<6} scale-downs {:<6}             ║",
        counters.degraded_predictions, counters.scale_ups, counters.scale_downs
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
}
