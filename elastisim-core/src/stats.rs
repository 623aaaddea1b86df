// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};
use crate::state::ServerState;
use crate::types::ServerId;

/// Point-in-time view of the allocator, shared with the CLI and metrics.
/// Optionally written as JSON to the configured status file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub servers: Vec<ServerStatus>,
    pub queue_length: usize,
    pub total_load: f64,
    pub arrival_rate: f64,
    pub recent_response_times: Vec<f64>,
    pub counters: AllocatorCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub id: ServerId,
    pub state: ServerState,
    pub load: f64,
    pub in_flight: usize,
    pub service_rate: f64,
}

/// Monotonic counters since the allocator started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorCounters {
    pub assigned: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub dropped: u64,
    pub requeued: u64,
    pub degraded_predictions: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
}

impl AllocatorStats {
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Write the snapshot as pretty JSON, replacing any previous file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> AllocResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| AllocError::StatusSnapshot {
            message: format!("serialization failed: {}", e),
        })?;
        std::fs::write(path.as_ref(), content).map_err(|e| AllocError::Io {
            context: "writing status file",
            source: e,
        })
    }

    pub fn read_from(path: impl AsRef<Path>) -> AllocResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| AllocError::Io {
            context: "reading status file",
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| AllocError::StatusSnapshot {
            message: format!("status file is not valid JSON: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_file_round_trip() {
        let stats = AllocatorStats {
            servers: vec![ServerStatus {
                id: ServerId::new(0),
                state: ServerState::Ready,
                load: 1.25,
                in_flight: 1,
                service_rate: 0.5,
            }],
            queue_length: 2,
            total_load: 1.25,
            arrival_rate: 3.0,
            recent_response_times: vec![0.4, 0.6],
            counters: AllocatorCounters {
                assigned: 3,
                ..AllocatorCounters::default()
            },
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        stats.write_to(&path).unwrap();

        let loaded = AllocatorStats::read_from(&path).unwrap();
        assert_eq!(loaded, stats);
        assert_eq!(loaded.server_count(), 1);
    }

    #[test]
    fn test_read_missing_status_file() {
        let result = AllocatorStats::read_from("/nonexistent/status.json");
        assert!(matches!(result, Err(AllocError::Io { .. })));
    }
}
