//! Pitchbot backend library.
//!
//! Exposes the pipeline modules for the binary and integration tests.

pub mod alerts;
pub mod analysis;
pub mod brain;
pub mod config;
pub mod engine;
pub mod enrichment;
pub mod models;
pub mod providers;
pub mod storage;
pub mod util;

pub use config::Config;
pub use models::{AnalysisResult, Match, Verdict, VerificationStatus};
