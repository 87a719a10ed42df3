//! TokSlides Common Utilities
//!
//! Pieces every TokSlides crate leans on:
//! - [`TokslidesError`] and the [`TokslidesResult`] alias
//! - [`RecordingClock`] and [`RateController`] for paced capture work
//! - `tracing` subscriber setup ([`logging`])
//! - [`AppConfig`] loading and defaults

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
