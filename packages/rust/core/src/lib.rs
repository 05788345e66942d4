//! Pipeline orchestration and scheduling for enquete.
//!
//! This crate ties the fetcher, rewriter, dispatcher, and repository into
//! the weekly news-to-question run, and fires that run on a timezone-aware
//! weekly cadence.

pub mod pipeline;
pub mod scheduler;
pub mod single_flight;

pub use pipeline::{JOB_ID, Pipeline, RunObserver, RunState, RunSummary, SilentObserver};
pub use scheduler::{ScheduledJob, Scheduler, WeeklySchedule};
pub use single_flight::{FlightGuard, SingleFlight};
