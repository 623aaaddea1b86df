// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Simulated worker servers.
//!
//! Each [`SimulatedServer`] is split in two halves:
//! - the bookkeeping half, owned by the allocator, which tracks load,
//!   lifecycle state and the response time history;
//! - a worker task, which warms up for the startup delay, reports `Ready`,
//!   then runs jobs strictly one at a time and reports each completion.
//!
//! Load is charged when a job is handed to the worker and released when its
//! completion event is applied, so it always covers the simulated work.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{CostFactors, ServerConfig};
use crate::error::{DispatchError, StateTransitionError};
use crate::features::Category;
use crate::request::Request;
use crate::state::{ServerState, ServerStateMachine};
use crate::types::{RequestId, RequesterId, ServerId};

impl CostFactors {
    /// Synthetic processing time in seconds, clamped at zero.
    pub fn processing_time(
        &self,
        length: usize,
        category: Category,
        predicted_demand: f64,
        jitter: f64,
    ) -> f64 {
        let category_cost = match category {
            Category::Simple => 0.0,
            Category::Complex => self.complex_factor,
            Category::Code => self.code_factor,
        };

        let raw = length as f64 * self.length_factor
            + category_cost
            + predicted_demand * self.demand_factor
            + jitter;

        if raw.is_finite() {
            raw.max(0.0)
        } else {
            0.0
        }
    }

    /// Draw a jitter sample uniformly from `[-jitter, jitter]`.
    pub fn sample_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        }
    }
}

/// Work item handed to a server's worker task.
#[derive(Debug)]
struct Job {
    request_id: RequestId,
    requester_id: RequesterId,
    processing_time: Duration,
    arrival_time: Instant,
}

/// A finished request as reported by a worker.
#[derive(Debug, Clone)]
pub struct Completion {
    pub server_id: ServerId,
    pub instance: u64,
    pub request_id: RequestId,
    pub requester_id: RequesterId,
    pub processing_time: Duration,
    pub response_time: Duration,
}

/// Events flowing from worker tasks back to the allocator.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Ready { server_id: ServerId, instance: u64 },
    Completed(Completion),
}

/// Bookkeeping half of a simulated server.
#[derive(Debug)]
pub struct SimulatedServer {
    id: ServerId,
    /// Distinguishes this instance from earlier servers that held the same id.
    instance: u64,
    lifecycle: ServerStateMachine,
    load: f64,
    in_flight: usize,
    history: VecDeque<f64>,
    history_window: usize,
    inbox: mpsc::UnboundedSender<Job>,
}

impl SimulatedServer {
    /// Create a server and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime. The server stays
    /// `Starting` until its `Ready` event is applied with [`Self::mark_ready`].
    pub fn spawn(
        id: ServerId,
        instance: u64,
        config: &ServerConfig,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let (inbox, jobs) = mpsc::unbounded_channel();
        let history_window = config.history_window.max(1);

        tracing::info!(server_id = %id, instance, "Server starting");
        tokio::spawn(run_worker(id, instance, config.startup_delay, jobs, events));

        Self {
            id,
            instance,
            lifecycle: ServerStateMachine::new(id),
            load: 0.0,
            in_flight: 0,
            history: VecDeque::with_capacity(history_window),
            history_window,
            inbox,
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    pub fn is_starting(&self) -> bool {
        self.lifecycle.is_starting()
    }

    /// Seconds of simulated work currently charged to this server.
    pub fn load(&self) -> f64 {
        self.load
    }

    /// Jobs handed to the worker and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Recent response times in seconds, oldest first.
    pub fn processing_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Apply the worker's `Ready` event.
    pub fn mark_ready(&mut self) -> Result<(), StateTransitionError> {
        self.lifecycle.transition_to(ServerState::Ready)?;
        tracing::info!(server_id = %self.id, "Server ready to process requests");
        Ok(())
    }

    /// Hand a request to this server.
    ///
    /// Returns the processing time charged to the server's load. A starting
    /// server rejects the request without side effects.
    pub fn process<R: Rng + ?Sized>(
        &mut self,
        request: &Request,
        cost: &CostFactors,
        rng: &mut R,
    ) -> Result<Duration, DispatchError> {
        if self.is_starting() {
            tracing::warn!(
                server_id = %self.id,
                request_id = %request.id(),
                "Cannot process request, server is starting"
            );
            return Err(DispatchError::ServerStarting { server_id: self.id });
        }

        let wait_time = request.arrival_time().elapsed();
        let features = request.features();
        let seconds = cost.processing_time(
            features.length,
            features.category,
            request.predicted_demand(),
            cost.sample_jitter(rng),
        );

        let processing_time = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        let job = Job {
            request_id: request.id(),
            requester_id: request.requester_id().clone(),
            processing_time,
            arrival_time: request.arrival_time(),
        };

        if self.inbox.send(job).is_err() {
            return Err(DispatchError::WorkerUnavailable { server_id: self.id });
        }

        self.load += seconds;
        self.in_flight += 1;

        tracing::debug!(
            server_id = %self.id,
            request_id = %request.id(),
            requester_id = %request.requester_id(),
            length = features.length,
            category = %features.category,
            predicted_demand = request.predicted_demand(),
            wait_ms = wait_time.as_millis() as u64,
            processing_time = seconds,
            load = self.load,
            "Processing request"
        );

        Ok(processing_time)
    }

    /// Apply a completion event for a job this instance accepted.
    pub fn complete(&mut self, completion: &Completion) {
        let seconds = completion.processing_time.as_secs_f64();
        self.load = (self.load - seconds).max(0.0);
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            // Clear float residue once nothing is outstanding
            self.load = 0.0;
        }

        while self.history.len() >= self.history_window {
            self.history.pop_front();
        }
        self.history.push_back(completion.response_time.as_secs_f64());

        tracing::debug!(
            server_id = %self.id,
            request_id = %completion.request_id,
            response_ms = completion.response_time.as_millis() as u64,
            load = self.load,
            "Request completed"
        );
    }

    /// Requests per second, from the mean of the recorded response times.
    pub fn service_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }

        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        if mean > 0.0 {
            1.0 / mean
        } else {
            0.0
        }
    }
}

async fn run_worker(
    server_id: ServerId,
    instance: u64,
    startup_delay: Duration,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    tokio::time::sleep(startup_delay).await;
    if events
        .send(ServerEvent::Ready {
            server_id,
            instance,
        })
        .is_err()
    {
        return;
    }

    // Runs until the allocator drops the server and the inbox drains, or
    // until a completion can no longer be reported. Jobs still queued at
    // that point are discarded.
    while let Some(job) = jobs.recv().await {
        tokio::time::sleep(job.processing_time).await;

        let completion = Completion {
            server_id,
            instance,
            request_id: job.request_id,
            requester_id: job.requester_id,
            processing_time: job.processing_time,
            response_time: job.arrival_time.elapsed(),
        };

        if events.send(ServerEvent::Completed(completion)).is_err() {
            break;
        }
    }

    tracing::debug!(server_id = %server_id, instance, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRecord;
    use crate::predictor::Prediction;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn no_jitter() -> CostFactors {
        CostFactors {
            jitter: 0.0,
            ..CostFactors::default()
        }
    }

    fn request(length: usize, category: Category, demand: f64) -> Request {
        Request::admit(
            RequesterId::new("u1").unwrap(),
            FeatureRecord::new(length, category),
            &Prediction::Model(demand),
        )
    }

    async fn ready_server(
        config: &ServerConfig,
    ) -> (SimulatedServer, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut server = SimulatedServer::spawn(ServerId::new(0), 0, config, tx);
        match rx.recv().await {
            Some(ServerEvent::Ready { server_id, .. }) => assert_eq!(server_id, server.id()),
            other => panic!("expected ready event, got {:?}", other),
        }
        server.mark_ready().unwrap();
        (server, rx)
    }

    #[test]
    fn test_processing_time_formula() {
        let cost = no_jitter();
        let simple = cost.processing_time(10, Category::Simple, 2.0, 0.0);
        assert!((simple - (0.1 + 0.4)).abs() < 1e-12);

        let complex = cost.processing_time(100, Category::Complex, 1.0, 0.0);
        assert!((complex - (1.0 + 0.5 + 0.2)).abs() < 1e-12);

        let code = cost.processing_time(0, Category::Code, 0.0, 0.05);
        assert!((code - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_processing_time_clamped() {
        let cost = no_jitter();
        assert_eq!(cost.processing_time(0, Category::Simple, -10.0, -0.1), 0.0);
        assert_eq!(cost.processing_time(0, Category::Simple, f64::NAN, 0.0), 0.0);
    }

    #[test]
    fn test_jitter_bounds() {
        let cost = CostFactors::default();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let sample = cost.sample_jitter(&mut rng);
            assert!((-0.1..=0.1).contains(&sample));
        }
        assert_eq!(no_jitter().sample_jitter(&mut rng), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_server_rejects_work() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut server = SimulatedServer::spawn(ServerId::new(0), 0, &ServerConfig::default(), tx);
        let mut rng = SmallRng::seed_from_u64(1);

        let result = server.process(&request(10, Category::Simple, 1.0), &no_jitter(), &mut rng);
        assert_eq!(
            result,
            Err(DispatchError::ServerStarting {
                server_id: ServerId::new(0)
            })
        );
        assert_eq!(server.load(), 0.0);
        assert_eq!(server.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_startup_delay() {
        let config = ServerConfig::default();
        let started = Instant::now();
        let (server, _rx) = ready_server(&config).await;
        assert_eq!(server.state(), ServerState::Ready);
        assert!(started.elapsed() >= config.startup_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_brackets_processing() {
        let (mut server, mut rx) = ready_server(&ServerConfig::default()).await;
        let mut rng = SmallRng::seed_from_u64(1);
        let req = request(100, Category::Code, 2.0);

        let charged = server.process(&req, &no_jitter(), &mut rng).unwrap();
        assert!((charged.as_secs_f64() - 2.4).abs() < 1e-9);
        assert!((server.load() - 2.4).abs() < 1e-9);
        assert_eq!(server.in_flight(), 1);

        let completion = match rx.recv().await {
            Some(ServerEvent::Completed(c)) => c,
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(completion.request_id, req.id());
        assert!(completion.response_time >= charged);

        server.complete(&completion);
        assert_eq!(server.load(), 0.0);
        assert_eq!(server.in_flight(), 0);
        assert_eq!(server.processing_history().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_job_at_a_time() {
        let (mut server, mut rx) = ready_server(&ServerConfig::default()).await;
        let mut rng = SmallRng::seed_from_u64(1);
        let first = request(100, Category::Simple, 0.0);
        let second = request(100, Category::Simple, 0.0);

        server.process(&first, &no_jitter(), &mut rng).unwrap();
        server.process(&second, &no_jitter(), &mut rng).unwrap();
        assert!((server.load() - 2.0).abs() < 1e-9);

        let start = Instant::now();
        let mut order = Vec::new();
        while order.len() < 2 {
            if let Some(ServerEvent::Completed(c)) = rx.recv().await {
                server.complete(&c);
                order.push(c.request_id);
            }
        }
        assert_eq!(order, vec![first.id(), second.id()]);
        // sequential execution: two 1s jobs take 2s
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(server.load(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_rate() {
        let (mut server, _rx) = ready_server(&ServerConfig::default()).await;
        assert_eq!(server.service_rate(), 0.0);

        for secs in [0.5, 1.5] {
            server.complete(&Completion {
                server_id: server.id(),
                instance: 0,
                request_id: RequestId::new_v4(),
                requester_id: RequesterId::new("u1").unwrap(),
                processing_time: Duration::ZERO,
                response_time: Duration::from_secs_f64(secs),
            });
        }
        assert!((server.service_rate() - 1.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let config = ServerConfig {
            history_window: 3,
            ..ServerConfig::default()
        };
        let (mut server, _rx) = ready_server(&config).await;

        for i in 1..=5u64 {
            server.complete(&Completion {
                server_id: server.id(),
                instance: 0,
                request_id: RequestId::new_v4(),
                requester_id: RequesterId::new("u1").unwrap(),
                processing_time: Duration::ZERO,
                response_time: Duration::from_secs(i),
            });
        }
        let history: Vec<f64> = server.processing_history().collect();
        assert_eq!(history, vec![3.0, 4.0, 5.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_history_window_keeps_latest() {
        let config = ServerConfig {
            history_window: 0,
            ..ServerConfig::default()
        };
        let (mut server, _rx) = ready_server(&config).await;

        for i in 1..=25u64 {
            server.complete(&Completion {
                server_id: server.id(),
                instance: 0,
                request_id: RequestId::new_v4(),
                requester_id: RequesterId::new("u1").unwrap(),
                processing_time: Duration::ZERO,
                response_time: Duration::from_secs(i),
            });
        }
        let history: Vec<f64> = server.processing_history().collect();
        assert_eq!(history, vec![25.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_when_events_are_closed() {
        let (mut server, rx) = ready_server(&ServerConfig::default()).await;
        let mut rng = SmallRng::seed_from_u64(1);

        server
            .process(&request(10, Category::Simple, 1.0), &no_jitter(), &mut rng)
            .unwrap();
        server
            .process(&request(10, Category::Simple, 1.0), &no_jitter(), &mut rng)
            .unwrap();
        drop(rx);

        // the first completion fails to send; the second job is discarded
        tokio::time::sleep(Duration::from_secs(10)).await;
        let result = server.process(&request(10, Category::Simple, 1.0), &no_jitter(), &mut rng);
        assert_eq!(
            result,
            Err(DispatchError::WorkerUnavailable {
                server_id: ServerId::new(0)
            })
        );
        assert_eq!(server.in_flight(), 2);
    }
}
