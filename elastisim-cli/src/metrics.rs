use std::time::Duration;

use elastisim_core::{AllocatorHandle, AllocatorStats};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter_vec, register_int_gauge, Encoder,
    Gauge, GaugeVec, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

lazy_static! {
    pub static ref POOL_SIZE: IntGauge = register_int_gauge!(
        "elastisim_pool_size",
        "Number of servers in the pool, starting or ready"
    )
    .unwrap();
    pub static ref QUEUE_LENGTH: IntGauge = register_int_gauge!(
        "elastisim_queue_length",
        "Requests waiting for dispatch"
    )
    .unwrap();
    pub static ref TOTAL_LOAD: Gauge = register_gauge!(
        "elastisim_total_load_seconds",
        "Simulated work outstanding on ready servers"
    )
    .unwrap();
    pub static ref ARRIVAL_RATE: Gauge = register_gauge!(
        "elastisim_arrival_rate",
        "Observed request arrivals per second"
    )
    .unwrap();
    pub static ref SERVER_LOAD: GaugeVec = register_gauge_vec!(
        "elastisim_server_load_seconds",
        "Simulated work outstanding per server",
        &["server_id"]
    )
    .unwrap();
    pub static ref ALLOCATOR_EVENTS: IntCounterVec = register_int_counter_vec!(
        "elastisim_events_total",
        "Allocator events since start",
        &["event"]
    )
    .unwrap();
}

/// Copy an allocator snapshot into the exported metrics.
pub fn record_snapshot(stats: &AllocatorStats) {
    POOL_SIZE.set(stats.server_count() as i64);
    QUEUE_LENGTH.set(stats.queue_length as i64);
    TOTAL_LOAD.set(stats.total_load);
    ARRIVAL_RATE.set(stats.arrival_rate);

    // Removed servers must not linger with their last load
    SERVER_LOAD.reset();
    for server in &stats.servers {
        SERVER_LOAD
            .with_label_values(&[server.id.to_string().as_str()])
            .set(server.load);
    }

    let counters = &stats.counters;
    for (event, total) in [
        ("assigned", counters.assigned),
        ("dispatched", counters.dispatched),
        ("completed", counters.completed),
        ("dropped", counters.dropped),
        ("requeued", counters.requeued),
        ("degraded_prediction", counters.degraded_predictions),
        ("scale_up", counters.scale_ups),
        ("scale_down", counters.scale_downs),
    ] {
        let counter = ALLOCATOR_EVENTS.with_label_values(&[event]);
        let seen = counter.get();
        if total > seen {
            counter.inc_by(total - seen);
        }
    }
}

/// Periodically snapshot the allocator and hand each snapshot to `record`.
///
/// Runs for as long as the scheduler answers; the task ends on its own once
/// the scheduler has shut down.
pub fn spawn_sampler<F>(handle: AllocatorHandle, period: Duration, mut record: F) -> JoinHandle<()>
where
    F: FnMut(&AllocatorStats) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match handle.snapshot().await {
                Ok(stats) => record(&stats),
                Err(e) => {
                    tracing::debug!(reason = %e, "Metrics sampler stopped");
                    break;
                }
            }
        }
    })
}

/// Serve the elastisim metrics over plain HTTP in a background task.
pub fn start_metrics_server(port: u16) {
    lazy_static::initialize(&POOL_SIZE);
    lazy_static::initialize(&QUEUE_LENGTH);
    lazy_static::initialize(&TOTAL_LOAD);
    lazy_static::initialize(&ARRIVAL_RATE);
    lazy_static::initialize(&SERVER_LOAD);
    lazy_static::initialize(&ALLOCATOR_EVENTS);

    tokio::spawn(async move {
        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(port, error = %e, "Allocator metrics endpoint unavailable");
                return;
            }
        };
        tracing::info!(port, "Allocator metrics endpoint listening");

        loop {
            let (mut socket, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics scrape connection failed");
                    continue;
                }
            };
            tokio::spawn(async move {
                tracing::trace!(peer = %peer, "Serving allocator metrics");
                let response = scrape_response(&render_metrics());
                if socket.write_all(response.as_bytes()).await.is_ok() {
                    let _ = socket.flush().await;
                }
            });
        }
    });
}

fn scrape_response(body: &str) -> String {
    format!(
        "HTTP/1.0 200 OK\r\nConnection: close\r\nContent-Length: {}\r\nContent-Type: {}\r\n\r\n{}",
        body.len(),
        TextEncoder::new().format_type(),
        body
    )
}

/// Text exposition of every registered elastisim metric.
fn render_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode allocator metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
