// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Resource allocator: admission, dispatch and elastic scaling.
//!
//! [`ResourceAllocator`] owns the server pool and the pending queue. It is a
//! plain state machine; the scheduler task in [`crate::scheduler`] drives it
//! from commands and server events so that every mutation is serialized.
//!
//! Dispatch always targets the least-loaded server (ties go to the lowest
//! pool index) and stops as soon as that server is still starting. Scaling is
//! a threshold controller over the summed load of ready servers, evaluated
//! after every admission, with exactly one outcome per evaluation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{AllocatorConfig, ServerConfig};
use crate::error::{AllocError, AllocResult, DispatchError, ScalingError};
use crate::features::FeatureRecord;
use crate::predictor::DemandPredictor;
use crate::request::{AssignmentToken, Request};
use crate::server::{ServerEvent, SimulatedServer};
use crate::stats::{AllocatorCounters, AllocatorStats, ServerStatus};
use crate::types::{RequesterId, ServerId};

/// Outcome of one scaling evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    Grew(ServerId),
    Shrank(ServerId),
    Held,
}

/// Receiving end of the events emitted by server workers.
#[derive(Debug)]
pub struct ServerEvents(mpsc::UnboundedReceiver<ServerEvent>);

impl ServerEvents {
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.0.recv().await
    }
}

/// What happened to the request at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchStep {
    Dispatched,
    Requeued,
    Dropped,
    Empty,
}

pub struct ResourceAllocator {
    config: AllocatorConfig,
    server_config: ServerConfig,
    predictor: Arc<dyn DemandPredictor>,
    servers: Vec<SimulatedServer>,
    queue: VecDeque<Request>,
    arrivals: Vec<Instant>,
    response_times: VecDeque<f64>,
    events: mpsc::UnboundedSender<ServerEvent>,
    next_instance: u64,
    rng: SmallRng,
    last_status: Instant,
    counters: AllocatorCounters,
}

impl ResourceAllocator {
    /// Build the allocator and spawn the initial servers.
    ///
    /// Must be called from within a tokio runtime. Initial servers start in
    /// `Starting` and become ready once their events are applied through
    /// [`Self::handle_event`].
    pub fn new(
        config: AllocatorConfig,
        server_config: ServerConfig,
        predictor: Arc<dyn DemandPredictor>,
    ) -> (Self, ServerEvents) {
        let (events, receiver) = mpsc::unbounded_channel();
        let rng = match server_config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let max_servers = config.max_servers.max(1);
        let initial = config.initial_servers.clamp(1, max_servers);

        let mut allocator = Self {
            config: AllocatorConfig {
                max_servers,
                response_window: config.response_window.max(1),
                ..config
            },
            server_config,
            predictor,
            servers: Vec::with_capacity(max_servers),
            queue: VecDeque::new(),
            arrivals: Vec::new(),
            response_times: VecDeque::new(),
            events,
            next_instance: 0,
            rng,
            last_status: Instant::now(),
            counters: AllocatorCounters::default(),
        };

        for _ in 0..initial {
            allocator.spawn_server();
        }

        tracing::info!(
            initial_servers = initial,
            max_servers,
            scale_up_threshold = allocator.config.scale_up_threshold,
            scale_down_threshold = allocator.config.scale_down_threshold,
            "Resource allocator created"
        );

        (allocator, ServerEvents(receiver))
    }

    /// Admit a request, drain what can be dispatched, then rescale.
    pub fn assign(&mut self, requester_id: RequesterId, features: FeatureRecord) -> AssignmentToken {
        let token = self.admit(requester_id, features);
        self.dispatch();
        self.evaluate_scaling();
        self.maybe_report_status();
        token
    }

    /// Predict demand and append the request to the pending queue.
    pub fn admit(&mut self, requester_id: RequesterId, features: FeatureRecord) -> AssignmentToken {
        let prediction = self.predictor.predict(&features);
        if prediction.is_degraded() {
            self.counters.degraded_predictions += 1;
        }

        let request = Request::admit(requester_id, features, &prediction);
        let token = AssignmentToken::from(&request);

        tracing::info!(
            request_id = %request.id(),
            requester_id = %request.requester_id(),
            predicted_demand = request.predicted_demand(),
            degraded = request.prediction_degraded(),
            "Request queued"
        );

        self.arrivals.push(request.arrival_time());
        self.queue.push_back(request);
        self.counters.assigned += 1;
        token
    }

    /// Hand queued requests to the least-loaded server while it is ready.
    ///
    /// Returns the number of requests dispatched in this round.
    pub fn dispatch(&mut self) -> usize {
        let mut dispatched = 0;

        while !self.queue.is_empty() {
            let Some(index) = self.least_loaded() else {
                break;
            };

            if self.servers[index].is_starting() {
                tracing::debug!(
                    server_id = %self.servers[index].id(),
                    queue_length = self.queue.len(),
                    "Least-loaded server is starting, dispatch deferred"
                );
                break;
            }

            match self.dispatch_to(index) {
                DispatchStep::Dispatched => dispatched += 1,
                DispatchStep::Dropped => continue,
                DispatchStep::Requeued | DispatchStep::Empty => break,
            }
        }

        dispatched
    }

    fn dispatch_to(&mut self, index: usize) -> DispatchStep {
        let Some(mut request) = self.queue.pop_front() else {
            return DispatchStep::Empty;
        };

        let outcome =
            self.servers[index].process(&request, &self.server_config.cost, &mut self.rng);

        match outcome {
            Ok(_) => {
                self.counters.dispatched += 1;
                DispatchStep::Dispatched
            }
            Err(DispatchError::ServerStarting { server_id }) => {
                if request.requeues >= self.config.max_requeues {
                    let err = DispatchError::RequeueLimit {
                        requeues: request.requeues,
                        limit: self.config.max_requeues,
                    };
                    tracing::error!(
                        request_id = %request.id(),
                        error = %err,
                        "Request dropped"
                    );
                    self.counters.dropped += 1;
                    return DispatchStep::Dropped;
                }

                request.requeues += 1;
                self.counters.requeued += 1;
                tracing::warn!(
                    server_id = %server_id,
                    request_id = %request.id(),
                    requeues = request.requeues,
                    "Selected server is starting, request returned to queue front"
                );
                self.queue.push_front(request);
                DispatchStep::Requeued
            }
            Err(err) => {
                tracing::error!(
                    request_id = %request.id(),
                    requester_id = %request.requester_id(),
                    error = %err,
                    "Request dropped"
                );
                self.counters.dropped += 1;
                DispatchStep::Dropped
            }
        }
    }

    fn least_loaded(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, server) in self.servers.iter().enumerate() {
            match best {
                Some((_, load)) if server.load() >= load => {}
                _ => best = Some((index, server.load())),
            }
        }
        best.map(|(index, _)| index)
    }

    fn spawn_server(&mut self) -> ServerId {
        let id = ServerId::new(self.servers.len());
        let server = SimulatedServer::spawn(
            id,
            self.next_instance,
            &self.server_config,
            self.events.clone(),
        );
        self.next_instance += 1;
        self.servers.push(server);
        id
    }

    /// Append a server whose id is the current pool size.
    pub fn grow(&mut self) -> Result<ServerId, ScalingError> {
        if self.servers.len() >= self.config.max_servers {
            let err = ScalingError::CapacityExhausted {
                max: self.config.max_servers,
            };
            tracing::info!(error = %err, "Cannot add server");
            return Err(err);
        }

        let id = self.spawn_server();
        self.counters.scale_ups += 1;
        tracing::info!(
            server_id = %id,
            pool_size = self.servers.len(),
            "Server added"
        );
        Ok(id)
    }

    /// Remove the most recently added server.
    ///
    /// Work already handed to it keeps running and still reports completion.
    pub fn shrink(&mut self) -> Result<ServerId, ScalingError> {
        if self.servers.len() <= 1 {
            let err = ScalingError::FloorReached;
            tracing::info!(error = %err, "Cannot remove server");
            return Err(err);
        }

        let Some(server) = self.servers.pop() else {
            return Err(ScalingError::FloorReached);
        };

        self.counters.scale_downs += 1;
        tracing::info!(
            server_id = %server.id(),
            draining = server.in_flight(),
            pool_size = self.servers.len(),
            "Server removed"
        );
        Ok(server.id())
    }

    /// Grow above the upper threshold, shrink below the lower one.
    pub fn evaluate_scaling(&mut self) -> ScalingDecision {
        let total_load = self.total_load();

        tracing::debug!(
            total_load,
            active_servers = self.servers.iter().filter(|s| !s.is_starting()).count(),
            pool_size = self.servers.len(),
            "Evaluating scaling"
        );

        if total_load > self.config.scale_up_threshold {
            match self.grow() {
                Ok(id) => ScalingDecision::Grew(id),
                Err(_) => ScalingDecision::Held,
            }
        } else if total_load < self.config.scale_down_threshold && self.servers.len() > 1 {
            match self.shrink() {
                Ok(id) => ScalingDecision::Shrank(id),
                Err(_) => ScalingDecision::Held,
            }
        } else {
            ScalingDecision::Held
        }
    }

    /// Apply an event from a server worker and redispatch.
    ///
    /// Events from servers that were removed since are still counted as
    /// completions but no longer touch the pool.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Ready {
                server_id,
                instance,
            } => match self.servers.iter_mut().find(|s| s.instance() == instance) {
                Some(server) => {
                    if let Err(e) = server.mark_ready() {
                        tracing::warn!(error = %e, "Ignoring ready event");
                    }
                }
                None => {
                    tracing::debug!(server_id = %server_id, instance, "Ready event from removed server");
                }
            },
            ServerEvent::Completed(completion) => {
                match self
                    .servers
                    .iter_mut()
                    .find(|s| s.instance() == completion.instance)
                {
                    Some(server) => server.complete(&completion),
                    None => {
                        tracing::debug!(
                            server_id = %completion.server_id,
                            request_id = %completion.request_id,
                            "Completion from removed server"
                        );
                    }
                }

                while self.response_times.len() >= self.config.response_window {
                    self.response_times.pop_front();
                }
                self.response_times
                    .push_back(completion.response_time.as_secs_f64());
                self.counters.completed += 1;
            }
        }

        self.dispatch();
    }

    /// Emit the status report if the reporting interval has elapsed.
    pub fn maybe_report_status(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_status) < self.config.status_interval {
            return false;
        }
        self.last_status = now;
        self.report_status();
        true
    }

    /// Log pool and queue state and refresh the status file.
    pub fn report_status(&self) {
        for server in &self.servers {
            tracing::info!(
                server_id = %server.id(),
                state = %server.state(),
                load = server.load(),
                in_flight = server.in_flight(),
                "Server status"
            );
        }
        tracing::info!(
            pool_size = self.servers.len(),
            queue_length = self.queue.len(),
            total_load = self.total_load(),
            arrival_rate = self.arrival_rate(),
            "Allocator status"
        );

        if let Some(path) = &self.config.status_file {
            if let Err(e) = self.stats().write_to(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write status file");
            }
        }
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    pub fn max_servers(&self) -> usize {
        self.config.max_servers
    }

    pub fn status_interval(&self) -> Duration {
        self.config.status_interval
    }

    pub fn servers(&self) -> &[SimulatedServer] {
        &self.servers
    }

    /// Pending requests, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.queue.iter()
    }

    pub fn counters(&self) -> AllocatorCounters {
        self.counters
    }

    /// Summed load of servers that are not starting.
    pub fn total_load(&self) -> f64 {
        self.servers
            .iter()
            .filter(|s| !s.is_starting())
            .map(SimulatedServer::load)
            .sum()
    }

    /// Up to `n` most recent response times in seconds, oldest first.
    pub fn recent_response_times(&self, n: usize) -> Vec<f64> {
        let skip = self.response_times.len().saturating_sub(n);
        self.response_times.iter().skip(skip).copied().collect()
    }

    /// Requests per second over the whole arrival log.
    pub fn arrival_rate(&self) -> f64 {
        if self.arrivals.len() < 2 {
            return 0.0;
        }

        // The mean of consecutive gaps telescopes to the overall span.
        let (Some(first), Some(last)) = (self.arrivals.first(), self.arrivals.last()) else {
            return 0.0;
        };
        let mean_gap =
            last.duration_since(*first).as_secs_f64() / (self.arrivals.len() - 1) as f64;

        if mean_gap > 0.0 {
            1.0 / mean_gap
        } else {
            0.0
        }
    }

    pub fn service_rate(&self, server_id: ServerId) -> AllocResult<f64> {
        self.servers
            .iter()
            .find(|s| s.id() == server_id)
            .map(SimulatedServer::service_rate)
            .ok_or(AllocError::ServerNotFound(server_id))
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            servers: self
                .servers
                .iter()
                .map(|s| ServerStatus {
                    id: s.id(),
                    state: s.state(),
                    load: s.load(),
                    in_flight: s.in_flight(),
                    service_rate: s.service_rate(),
                })
                .collect(),
            queue_length: self.queue.len(),
            total_load: self.total_load(),
            arrival_rate: self.arrival_rate(),
            recent_response_times: self.response_times.iter().copied().collect(),
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostFactors;
    use crate::features::Category;
    use crate::predictor::{FixedDemand, LinearDemandModel};
    use crate::state::ServerState;
    use rand::Rng;

    fn configs(initial: usize, max: usize) -> (AllocatorConfig, ServerConfig) {
        (
            AllocatorConfig {
                initial_servers: initial,
                max_servers: max,
                ..AllocatorConfig::default()
            },
            ServerConfig {
                seed: Some(7),
                cost: CostFactors {
                    jitter: 0.0,
                    ..CostFactors::default()
                },
                ..ServerConfig::default()
            },
        )
    }

    fn allocator(initial: usize, max: usize, demand: f64) -> (ResourceAllocator, ServerEvents) {
        let (config, server) = configs(initial, max);
        ResourceAllocator::new(config, server, Arc::new(FixedDemand(demand)))
    }

    fn user(name: &str) -> RequesterId {
        RequesterId::new(name).unwrap()
    }

    fn assert_invariants(alloc: &ResourceAllocator) {
        assert!(alloc.server_count() >= 1);
        assert!(alloc.server_count() <= alloc.max_servers());
        for server in alloc.servers() {
            assert!(server.load() >= 0.0, "server {} load negative", server.id());
        }
    }

    async fn wait_ready(alloc: &mut ResourceAllocator, events: &mut ServerEvents) {
        while alloc.servers().iter().any(SimulatedServer::is_starting) {
            let event = events.recv().await.expect("event channel open");
            alloc.handle_event(event);
            assert_invariants(alloc);
        }
    }

    async fn drain(alloc: &mut ResourceAllocator, events: &mut ServerEvents, completions: u64) {
        while alloc.counters().completed < completions {
            let event = events.recv().await.expect("event channel open");
            alloc.handle_event(event);
            assert_invariants(alloc);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_waits_for_starting_server() {
        let (mut alloc, _events) = allocator(1, 5, 1.0);
        assert_eq!(alloc.servers()[0].state(), ServerState::Starting);

        let token = alloc.assign(user("u1"), FeatureRecord::new(10, Category::Simple));
        assert_eq!(token.predicted_demand, 1.0);
        assert_eq!(alloc.queue_length(), 1);
        assert_eq!(alloc.dispatch(), 0);
        assert_eq!(alloc.queue_length(), 1);
        assert_eq!(alloc.servers()[0].load(), 0.0);
        assert_eq!(alloc.counters().dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_carries_prediction() {
        let (mut alloc, mut events) = allocator(1, 5, 2.0);
        wait_ready(&mut alloc, &mut events).await;

        let token = alloc.admit(user("u1"), FeatureRecord::new(10, Category::Simple));
        let queued = alloc.pending().next().expect("request queued");
        assert_eq!(queued.predicted_demand(), 2.0);
        assert_eq!(queued.id(), token.request_id);
        assert!(!queued.prediction_degraded());

        assert_eq!(alloc.dispatch(), 1);
        assert_eq!(alloc.queue_length(), 0);
        drain(&mut alloc, &mut events, 1).await;

        let recent = alloc.recent_response_times(1);
        assert_eq!(recent.len(), 1);
        assert!(recent[0] > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untrained_predictor_marks_degraded() {
        let (config, server) = configs(1, 5);
        let (mut alloc, _events) = ResourceAllocator::new(
            config,
            server,
            Arc::new(LinearDemandModel::untrained(1.0)),
        );

        let token = alloc.assign(user("u1"), FeatureRecord::new(10, Category::Code));
        assert!(token.prediction_degraded);
        assert_eq!(token.predicted_demand, 1.0);
        assert_eq!(alloc.counters().degraded_predictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grows_when_load_exceeds_threshold() {
        let (mut alloc, mut events) = allocator(1, 5, 2.0);
        wait_ready(&mut alloc, &mut events).await;

        // 100 * 0.01 + 1.0 + 2.0 * 0.2 = 2.4s per request
        alloc.assign(user("u1"), FeatureRecord::new(100, Category::Code));
        alloc.assign(user("u2"), FeatureRecord::new(100, Category::Code));
        assert_eq!(alloc.server_count(), 1);
        assert!((alloc.total_load() - 4.8).abs() < 1e-9);

        alloc.assign(user("u3"), FeatureRecord::new(100, Category::Code));
        assert_eq!(alloc.server_count(), 2);
        assert_eq!(alloc.servers()[1].id(), ServerId::new(1));
        assert!(alloc.servers()[1].is_starting());
        assert_eq!(alloc.counters().scale_ups, 1);
        assert_invariants(&alloc);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinks_idle_pool_from_the_tail() {
        let (mut alloc, mut events) = allocator(2, 5, 1.0);
        wait_ready(&mut alloc, &mut events).await;
        assert_eq!(alloc.total_load(), 0.0);

        assert_eq!(
            alloc.evaluate_scaling(),
            ScalingDecision::Shrank(ServerId::new(1))
        );
        assert_eq!(alloc.server_count(), 1);
        assert_eq!(alloc.servers()[0].id(), ServerId::new(0));

        // floor reached
        assert_eq!(alloc.evaluate_scaling(), ScalingDecision::Held);
        assert_eq!(alloc.server_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_holds_between_thresholds() {
        let (mut alloc, mut events) = allocator(2, 5, 0.0);
        wait_ready(&mut alloc, &mut events).await;

        // 300 * 0.01 = 3s, between 1 and 5
        alloc.admit(user("u1"), FeatureRecord::new(300, Category::Simple));
        alloc.dispatch();
        assert_eq!(alloc.evaluate_scaling(), ScalingDecision::Held);
        assert_eq!(alloc.server_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_dispatch_order() {
        let (mut alloc, mut events) = allocator(1, 5, 1.0);
        let first = alloc.assign(user("a"), FeatureRecord::new(50, Category::Simple));
        let second = alloc.assign(user("b"), FeatureRecord::new(10, Category::Simple));
        assert_eq!(alloc.queue_length(), 2);

        let mut completed = Vec::new();
        while completed.len() < 2 {
            let event = events.recv().await.expect("event channel open");
            if let ServerEvent::Completed(c) = &event {
                completed.push(c.request_id);
            }
            alloc.handle_event(event);
        }
        assert_eq!(completed, vec![first.request_id, second.request_id]);
        assert_eq!(alloc.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_least_loaded_tie_breaks_on_pool_order() {
        let (mut alloc, mut events) = allocator(3, 5, 0.0);
        wait_ready(&mut alloc, &mut events).await;

        alloc.admit(user("a"), FeatureRecord::new(200, Category::Simple));
        alloc.admit(user("b"), FeatureRecord::new(100, Category::Simple));
        alloc.admit(user("c"), FeatureRecord::new(100, Category::Simple));
        assert_eq!(alloc.dispatch(), 3);

        let loads: Vec<f64> = alloc.servers().iter().map(SimulatedServer::load).collect();
        assert!((loads[0] - 2.0).abs() < 1e-9);
        assert!((loads[1] - 1.0).abs() < 1e-9);
        assert!((loads[2] - 1.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_on_starting_server_is_bounded() {
        let (mut alloc, _events) = allocator(1, 5, 1.0);
        let first = alloc.admit(user("a"), FeatureRecord::new(10, Category::Simple));
        let second = alloc.admit(user("b"), FeatureRecord::new(10, Category::Simple));

        for attempt in 1..=3 {
            assert_eq!(alloc.dispatch_to(0), DispatchStep::Requeued);
            let head = alloc.pending().next().unwrap();
            assert_eq!(head.id(), first.request_id);
            assert_eq!(head.requeues(), attempt);
            assert_eq!(alloc.queue_length(), 2);
        }

        assert_eq!(alloc.dispatch_to(0), DispatchStep::Dropped);
        assert_eq!(alloc.queue_length(), 1);
        assert_eq!(alloc.pending().next().unwrap().id(), second.request_id);
        assert_eq!(alloc.counters().dropped, 1);
        assert_eq!(alloc.counters().requeued, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_size_stays_within_bounds() {
        let (mut alloc, _events) = allocator(1, 3, 1.0);
        let mut rng = SmallRng::seed_from_u64(11);

        for _ in 0..100 {
            let before = alloc.server_count();
            if rng.gen_bool(0.5) {
                match alloc.grow() {
                    Ok(id) => {
                        assert_eq!(id, ServerId::new(before));
                        assert_eq!(alloc.server_count(), before + 1);
                    }
                    Err(e) => {
                        assert_eq!(e, ScalingError::CapacityExhausted { max: 3 });
                        assert_eq!(before, 3);
                    }
                }
            } else {
                match alloc.shrink() {
                    Ok(id) => {
                        assert_eq!(id, ServerId::new(before - 1));
                        assert_eq!(alloc.server_count(), before - 1);
                    }
                    Err(e) => {
                        assert_eq!(e, ScalingError::FloorReached);
                        assert_eq!(before, 1);
                    }
                }
            }
            assert_invariants(&alloc);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_rate() {
        let (mut alloc, _events) = allocator(1, 5, 1.0);
        assert_eq!(alloc.arrival_rate(), 0.0);

        alloc.admit(user("a"), FeatureRecord::default());
        assert_eq!(alloc.arrival_rate(), 0.0);

        tokio::time::advance(Duration::from_secs(1)).await;
        alloc.admit(user("b"), FeatureRecord::default());
        assert!((alloc.arrival_rate() - 1.0).abs() < 1e-6);

        tokio::time::advance(Duration::from_secs(3)).await;
        alloc.admit(user("c"), FeatureRecord::default());
        assert!((alloc.arrival_rate() - 0.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_arrivals_rate_is_zero() {
        let (mut alloc, _events) = allocator(1, 5, 1.0);
        alloc.admit(user("a"), FeatureRecord::default());
        alloc.admit(user("b"), FeatureRecord::default());
        assert_eq!(alloc.arrival_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_window_is_bounded() {
        let (mut alloc, mut events) = allocator(1, 5, 0.0);
        wait_ready(&mut alloc, &mut events).await;

        for i in 0..12 {
            alloc.assign(user(&format!("u{}", i)), FeatureRecord::new(5, Category::Simple));
        }
        drain(&mut alloc, &mut events, 12).await;

        assert_eq!(alloc.recent_response_times(20).len(), 10);
        assert_eq!(alloc.recent_response_times(3).len(), 3);
        assert_eq!(alloc.counters().completed, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_windows_keep_latest_entry() {
        let (mut config, mut server) = configs(1, 1);
        config.response_window = 0;
        server.history_window = 0;
        let (mut alloc, mut events) =
            ResourceAllocator::new(config, server, Arc::new(FixedDemand(0.0)));
        wait_ready(&mut alloc, &mut events).await;

        for i in 0..25 {
            alloc.assign(user(&format!("u{}", i)), FeatureRecord::new(5, Category::Simple));
        }
        drain(&mut alloc, &mut events, 25).await;

        assert_eq!(alloc.recent_response_times(100).len(), 1);
        assert_eq!(alloc.servers()[0].processing_history().count(), 1);
        assert_eq!(alloc.stats().recent_response_times.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_worker_drops_request() {
        let (mut alloc, mut events) = allocator(1, 1, 1.0);
        wait_ready(&mut alloc, &mut events).await;

        alloc.assign(user("a"), FeatureRecord::new(10, Category::Simple));
        assert_eq!(alloc.counters().dispatched, 1);

        // the worker exits once its completion has nowhere to go
        drop(events);
        tokio::time::sleep(Duration::from_secs(10)).await;

        alloc.assign(user("b"), FeatureRecord::new(10, Category::Simple));
        let counters = alloc.counters();
        assert_eq!(counters.assigned, 2);
        assert_eq!(counters.dispatched, 1);
        assert_eq!(counters.dropped, 1);
        assert_eq!(counters.completed, 0);
        assert_eq!(alloc.queue_length(), 0);
        assert!(alloc.recent_response_times(10).is_empty());
        assert_eq!(alloc.servers()[0].in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_server_finishes_its_work() {
        let (mut alloc, mut events) = allocator(2, 5, 2.0);
        wait_ready(&mut alloc, &mut events).await;

        alloc.assign(user("a"), FeatureRecord::new(100, Category::Code));
        alloc.assign(user("b"), FeatureRecord::new(100, Category::Code));
        assert_eq!(alloc.servers()[1].in_flight(), 1);

        assert_eq!(alloc.shrink(), Ok(ServerId::new(1)));
        drain(&mut alloc, &mut events, 2).await;

        assert_eq!(alloc.server_count(), 1);
        assert_eq!(alloc.recent_response_times(10).len(), 2);
        assert_eq!(alloc.servers()[0].load(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regrown_server_ignores_stale_events() {
        let (mut alloc, mut events) = allocator(2, 5, 1.0);
        // remove server 1 before it reports ready, then add a fresh one
        assert_eq!(alloc.shrink(), Ok(ServerId::new(1)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(alloc.grow(), Ok(ServerId::new(1)));

        // both initial workers report ready; the stale one must not flip
        // the new instance early
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        alloc.handle_event(first);
        alloc.handle_event(second);

        assert_eq!(alloc.servers()[0].state(), ServerState::Ready);
        assert!(alloc.servers()[1].is_starting());

        wait_ready(&mut alloc, &mut events).await;
        assert_eq!(alloc.servers()[1].state(), ServerState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_rate_lookup() {
        let (mut alloc, mut events) = allocator(1, 5, 0.0);
        wait_ready(&mut alloc, &mut events).await;
        assert_eq!(alloc.service_rate(ServerId::new(0)).unwrap(), 0.0);

        alloc.assign(user("a"), FeatureRecord::new(100, Category::Simple));
        drain(&mut alloc, &mut events, 1).await;
        let rate = alloc.service_rate(ServerId::new(0)).unwrap();
        assert!(rate > 0.0 && rate <= 1.0);

        assert!(matches!(
            alloc.service_rate(ServerId::new(4)),
            Err(AllocError::ServerNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_report_is_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let status_file = dir.path().join("status.json");
        let (mut config, server) = configs(1, 5);
        config.status_file = Some(status_file.clone());
        let (mut alloc, _events) =
            ResourceAllocator::new(config, server, Arc::new(FixedDemand(1.0)));

        assert!(!alloc.maybe_report_status());
        assert!(!status_file.exists());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(alloc.maybe_report_status());
        assert!(!alloc.maybe_report_status());

        let written = AllocatorStats::read_from(&status_file).unwrap();
        assert_eq!(written.server_count(), 1);
    }
}
