//! Fraud Shield Library
//!
//! Real-time transaction fraud scoring: an access gate in front of the
//! ingestion endpoint, interchangeable score providers, ranked risk
//! explanations, and fan-out of scored events to live subscribers.

pub mod bus;
pub mod config;
pub mod error;
pub mod explainer;
pub mod feature_extractor;
pub mod gate;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod types;

pub use bus::{AlertBus, Interest};
pub use config::AppConfig;
pub use error::{GateDenial, PipelineError};
pub use explainer::RiskExplainer;
pub use gate::{AccessGate, GateDecision};
pub use models::{ScoreBackend, ScoreProvider};
pub use pipeline::IngestionPipeline;
pub use types::{alert::AlertEvent, score::ScoreResult, transaction::Transaction};
