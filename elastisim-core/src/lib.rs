//! Elastisim Core Library
//!
//! Adaptive resource allocation over a pool of simulated servers.
//! Provides demand prediction, FIFO admission, least-loaded dispatch,
//! threshold-based elastic scaling and the scheduler task that drives them.

pub mod allocator;
pub mod config;
pub mod error;
pub mod features;
pub mod predictor;
pub mod request;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use allocator::{ResourceAllocator, ScalingDecision, ServerEvents};
pub use config::{
    AllocatorConfig, Config, ConfigLoader, CostFactors, MetricsConfig, PredictorConfig,
    ServerConfig,
};
pub use error::{
    AllocError, AllocResult, DispatchError, HardValidationError, ModelError, PredictionError,
    ScalingError,
};
pub use features::{Category, FeatureRecord, RequestAnalyzer};
pub use predictor::{
    DemandPredictor, FixedDemand, LinearDemandModel, Prediction, TrainingOptions, TrainingReport,
};
pub use request::{AssignmentStatus, AssignmentToken, Request};
pub use scheduler::AllocatorHandle;
pub use server::{ServerEvent, SimulatedServer};
pub use state::{ServerState, ServerStateMachine};
pub use stats::{AllocatorCounters, AllocatorStats, ServerStatus};
pub use types::{RequestId, RequesterId, ServerId};
