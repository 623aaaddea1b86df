// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Admitted requests and the acknowledgement handed back to callers.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::features::FeatureRecord;
use crate::predictor::Prediction;
use crate::types::{RequestId, RequesterId};

/// A request waiting in, or just taken from, the pending queue.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    requester_id: RequesterId,
    features: FeatureRecord,
    predicted_demand: f64,
    prediction_degraded: bool,
    arrival_time: Instant,
    pub(crate) requeues: u32,
}

impl Request {
    pub(crate) fn admit(
        requester_id: RequesterId,
        features: FeatureRecord,
        prediction: &Prediction,
    ) -> Self {
        Self {
            id: RequestId::new_v4(),
            requester_id,
            features,
            predicted_demand: prediction.demand(),
            prediction_degraded: prediction.is_degraded(),
            arrival_time: Instant::now(),
            requeues: 0,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn requester_id(&self) -> &RequesterId {
        &self.requester_id
    }

    pub fn features(&self) -> &FeatureRecord {
        &self.features
    }

    pub fn predicted_demand(&self) -> f64 {
        self.predicted_demand
    }

    pub fn prediction_degraded(&self) -> bool {
        self.prediction_degraded
    }

    pub fn arrival_time(&self) -> Instant {
        self.arrival_time
    }

    /// Times this request went back to the queue front.
    pub fn requeues(&self) -> u32 {
        self.requeues
    }
}

/// Assignment progress reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Queued,
}

/// Acknowledgement returned by `assign`.
///
/// Completion is asynchronous; the token only confirms admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentToken {
    pub request_id: RequestId,
    pub status: AssignmentStatus,
    pub predicted_demand: f64,
    pub prediction_degraded: bool,
}

impl From<&Request> for AssignmentToken {
    fn from(request: &Request) -> Self {
        Self {
            request_id: request.id,
            status: AssignmentStatus::Queued,
            predicted_demand: request.predicted_demand,
            prediction_degraded: request.prediction_degraded,
        }
    }
}
