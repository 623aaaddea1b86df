// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `elastisim run` command - Drive the allocator with a synthetic workload.
//!
//! Requests arrive as a Poisson process at the requested rate, each carrying
//! one of a fixed set of prompts. The command waits until every request has
//! completed (or was dropped), or until Ctrl+C.

use std::time::Duration;

use elastisim_core::{
    scheduler, AllocatorHandle, AllocatorStats, RequestAnalyzer, RequesterId,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{build_predictor, load_config};
use crate::metrics;

/// How often progress is sampled while waiting for completions.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How often exported metrics are refreshed during the run.
const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const PROMPTS: &[&str] = &[
    "What are your opening hours?",
    "Summarize this paragraph in one sentence.",
    "Give me a detailed analysis of last quarter's sales by region.",
    "Explain the prediction of demand peaks for the holiday season.",
    "Write a Python script that deduplicates a list while keeping order.",
    "Execute this code snippet and report the output.",
    "Análisis de sentimiento de las reseñas de clientes.",
    "Hola, ¿cómo estás?",
];

/// Number of distinct simulated requesters.
const REQUESTERS: usize = 10;

pub async fn execute(
    config_path: &str,
    requests: usize,
    rate: f64,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("arrival rate must be positive, got {}", rate).into());
    }

    let mut config = load_config(config_path)?;
    if seed.is_some() {
        config.server.seed = seed;
    }

    tracing::info!(
        config = %config_path,
        requests,
        rate,
        max_servers = config.allocator.max_servers,
        "Starting simulation"
    );

    let predictor = build_predictor(&config.predictor)?;
    let (handle, task) = scheduler::spawn(&config, predictor);

    let sampler = config.metrics.port.map(|port| {
        metrics::start_metrics_server(port);
        metrics::spawn_sampler(handle.clone(), METRICS_SAMPLE_INTERVAL, metrics::record_snapshot)
    });

    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 ELASTISIM LOAD SIMULATION                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Submitting {} requests at ~{:.2} req/s", requests, rate);
    println!("Press Ctrl+C to stop.");
    println!();

    let finished = tokio::select! {
        result = simulate(&handle, &mut rng, requests, rate) => {
            result?;
            true
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Interrupted, shutting down...");
            false
        }
    };

    let stats = handle.shutdown().await?;
    if let Some(sampler) = sampler {
        sampler.abort();
        metrics::record_snapshot(&stats);
    }
    if let Err(e) = task.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }

    print_summary(&stats, finished);
    Ok(())
}

async fn simulate(
    handle: &AllocatorHandle,
    rng: &mut SmallRng,
    requests: usize,
    rate: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let analyzer = RequestAnalyzer::new();

    for n in 0..requests {
        let prompt = PROMPTS[rng.gen_range(0..PROMPTS.len())];
        let requester_id = RequesterId::new(format!("user-{}", n % REQUESTERS))?;
        let token = handle.assign(requester_id, analyzer.analyze(prompt)).await?;

        tracing::debug!(
            request_id = %token.request_id,
            predicted_demand = token.predicted_demand,
            degraded = token.prediction_degraded,
            "Request submitted"
        );

        tokio::time::sleep(next_arrival(rng, rate)).await;
    }

    loop {
        let stats = handle.snapshot().await?;
        let settled = stats.counters.completed + stats.counters.dropped;
        if settled >= requests as u64 {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Exponential inter-arrival gap for a Poisson process of the given rate.
fn next_arrival<R: Rng>(rng: &mut R, rate: f64) -> Duration {
    // gen::<f64>() is in [0, 1); 1 - u keeps ln away from zero
    let u: f64 = rng.gen();
    let gap = -(1.0 - u).ln() / rate;
    Duration::try_from_secs_f64(gap).unwrap_or(Duration::ZERO)
}

fn print_summary(stats: &AllocatorStats, finished: bool) {
    let counters = &stats.counters;
    let mean_response = if stats.recent_response_times.is_empty() {
        0.0
    } else {
        stats.recent_response_times.iter().sum::<f64>() / stats.recent_response_times.len() as f64
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!(
        "║ Simulation {:<50}║",
        if finished { "complete" } else { "interrupted" }
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║ Requests assigned:     {:<38}║", counters.assigned);
    println!("║ Requests completed:    {:<38}║", counters.completed);
    println!("║ Requests dropped:      {:<38}║", counters.dropped);
    println!("║ Degraded predictions:  {:<38}║", counters.degraded_predictions);
    println!(
        "║ Scale ups / downs:     {:<38}║",
        format!("{} / {}", counters.scale_ups, counters.scale_downs)
    );
    println!("║ Final pool size:       {:<38}║", stats.server_count());
    println!(
        "║ Arrival rate:          {:<38}║",
        format!("{:.3} req/s", stats.arrival_rate)
    );
    println!(
        "║ Mean response (recent):{:<38}║",
        format!(" {:.3}s", mean_response)
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
}
