// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Scheduler task owning the allocator.
//!
//! All allocator mutations happen on one task. Callers talk to it through a
//! cloneable [`AllocatorHandle`]; server workers report through the event
//! channel created with the allocator. The task also emits the periodic
//! status report when the allocator sits idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::allocator::{ResourceAllocator, ServerEvents};
use crate::config::Config;
use crate::error::{AllocError, AllocResult};
use crate::features::FeatureRecord;
use crate::predictor::DemandPredictor;
use crate::request::AssignmentToken;
use crate::stats::AllocatorStats;
use crate::types::{RequesterId, ServerId};

const COMMAND_BUFFER: usize = 256;

enum Command {
    Assign {
        requester_id: RequesterId,
        features: FeatureRecord,
        reply: oneshot::Sender<AssignmentToken>,
    },
    ServerCount(oneshot::Sender<usize>),
    QueueLength(oneshot::Sender<usize>),
    RecentResponseTimes {
        n: usize,
        reply: oneshot::Sender<Vec<f64>>,
    },
    ArrivalRate(oneshot::Sender<f64>),
    ServiceRate {
        server_id: ServerId,
        reply: oneshot::Sender<AllocResult<f64>>,
    },
    Snapshot(oneshot::Sender<AllocatorStats>),
    Shutdown(oneshot::Sender<AllocatorStats>),
}

/// Cloneable front door to a running scheduler.
#[derive(Debug, Clone)]
pub struct AllocatorHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Assign { .. } => "Assign",
            Self::ServerCount(_) => "ServerCount",
            Self::QueueLength(_) => "QueueLength",
            Self::RecentResponseTimes { .. } => "RecentResponseTimes",
            Self::ArrivalRate(_) => "ArrivalRate",
            Self::ServiceRate { .. } => "ServiceRate",
            Self::Snapshot(_) => "Snapshot",
            Self::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}

impl AllocatorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> AllocResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| AllocError::SchedulerClosed)?;
        response.await.map_err(|_| AllocError::SchedulerClosed)
    }

    /// Submit a request. Returns once it has been admitted to the queue.
    pub async fn assign(
        &self,
        requester_id: RequesterId,
        features: FeatureRecord,
    ) -> AllocResult<AssignmentToken> {
        self.request(|reply| Command::Assign {
            requester_id,
            features,
            reply,
        })
        .await
    }

    pub async fn server_count(&self) -> AllocResult<usize> {
        self.request(Command::ServerCount).await
    }

    pub async fn queue_length(&self) -> AllocResult<usize> {
        self.request(Command::QueueLength).await
    }

    pub async fn recent_response_times(&self, n: usize) -> AllocResult<Vec<f64>> {
        self.request(|reply| Command::RecentResponseTimes { n, reply })
            .await
    }

    pub async fn arrival_rate(&self) -> AllocResult<f64> {
        self.request(Command::ArrivalRate).await
    }

    pub async fn service_rate(&self, server_id: ServerId) -> AllocResult<f64> {
        self.request(|reply| Command::ServiceRate { server_id, reply })
            .await?
    }

    pub async fn snapshot(&self) -> AllocResult<AllocatorStats> {
        self.request(Command::Snapshot).await
    }

    /// Stop the scheduler and return the final snapshot.
    ///
    /// Server workers stop at their next completion, which is no longer
    /// reported; jobs still in their inboxes are discarded.
    pub async fn shutdown(&self) -> AllocResult<AllocatorStats> {
        self.request(Command::Shutdown).await
    }
}

/// Build an allocator from configuration and start its scheduler task.
pub fn spawn(
    config: &Config,
    predictor: Arc<dyn DemandPredictor>,
) -> (AllocatorHandle, JoinHandle<()>) {
    let (allocator, events) =
        ResourceAllocator::new(config.allocator.clone(), config.server.clone(), predictor);
    let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);

    let task = tokio::spawn(run(allocator, events, inbox));
    (AllocatorHandle { commands }, task)
}

async fn run(
    mut allocator: ResourceAllocator,
    mut events: ServerEvents,
    mut commands: mpsc::Receiver<Command>,
) {
    let period = allocator.status_interval().max(Duration::from_millis(1));
    let mut status = tokio::time::interval(period);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    status.tick().await;

    tracing::info!("Scheduler started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::info!("All allocator handles dropped");
                    break;
                };
                if !apply(&mut allocator, command) {
                    break;
                }
            }
            Some(event) = events.recv() => {
                allocator.handle_event(event);
            }
            _ = status.tick() => {
                allocator.maybe_report_status();
            }
        }
    }

    allocator.report_status();
    tracing::info!("Scheduler stopped");
}

/// Apply one command. Returns false when the scheduler should stop.
fn apply(allocator: &mut ResourceAllocator, command: Command) -> bool {
    tracing::trace!(command = ?command, "Applying command");

    // Replies are dropped silently when the caller went away.
    match command {
        Command::Assign {
            requester_id,
            features,
            reply,
        } => {
            let _ = reply.send(allocator.assign(requester_id, features));
        }
        Command::ServerCount(reply) => {
            let _ = reply.send(allocator.server_count());
        }
        Command::QueueLength(reply) => {
            let _ = reply.send(allocator.queue_length());
        }
        Command::RecentResponseTimes { n, reply } => {
            let _ = reply.send(allocator.recent_response_times(n));
        }
        Command::ArrivalRate(reply) => {
            let _ = reply.send(allocator.arrival_rate());
        }
        Command::ServiceRate { server_id, reply } => {
            let _ = reply.send(allocator.service_rate(server_id));
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(allocator.stats());
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(allocator.stats());
            return false;
        }
    }

    true
}
