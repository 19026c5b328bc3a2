//! n2r-diff - differential testing harness for N2R conversion routines.
//!
//! Runs the same randomly generated inputs through a trusted reference
//! conversion and a target conversion (typically an on-chain style
//! fixed-point implementation), compares each pair of outputs under a
//! tolerance policy, and reports every divergence.
//!
//! # Architecture
//!
//! - [`generator`] - seeded input distributions ([`SampleGenerator`])
//! - [`adapter`] - conversion engines and the fault-containing
//!   [`ConversionAdapter`] wrapper
//! - [`compare`] - tolerance policy and per-sample [`ComparisonResult`]
//! - [`orchestrator`] - the run state machine and [`RunSummary`]
//! - [`report`] - the [`Logger`] seam, per-case lines and mismatch reports
//! - [`config`] - TOML configuration
//! - [`input`] - sample-count input
//! - [`error`] - fatal harness errors
//!
//! # Example
//!
//! ```
//! use n2r_diff::{infallible, AdapterPair, FixedSamples, MemoryLogger};
//!
//! let adapters = AdapterPair::mirrored(infallible("identity", |x| x));
//! let samples = FixedSamples::new(vec![1.0, 2.0, 3.0]);
//! let summary = n2r_diff::run(3, &MemoryLogger::new(), &adapters, &samples).unwrap();
//! assert!(summary.is_clean());
//! ```

// Harness code must report faults, never abort on them.
// Tests are checked separately with `cargo test`.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod adapter;
pub mod compare;
pub mod config;
pub mod error;
pub mod generator;
pub mod input;
pub mod orchestrator;
pub mod report;

// Re-export commonly used types
pub use adapter::{
    conversion_handler, infallible, AdapterPair, ConversionAdapter, ConversionEngine,
    ConversionFailure, ConversionOutcome, EngineAdapter, EngineFault, EngineSpec, FnEngine,
};
pub use compare::{compare, ComparisonResult, MismatchKind, RoundingRule, Side, TolerancePolicy};
pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use generator::{
    distribution_function, FixedSamples, RandomDistribution, Sample, SampleGenerator,
};
pub use orchestrator::{run, Orchestrator, RunOptions, RunState, RunSummary};
pub use report::{Logger, MemoryLogger, Reporter, RunReport, TracingLogger};
