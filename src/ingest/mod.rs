//! The ingestion core: one feed per tick, driven on an interval.
//!
//! [`IngestionCycle`] selects the stalest feed, marks it fetched, fetches and
//! parses it, then stores every titled item whose URL is new.
//! [`Scheduler`] runs the cycle periodically until a shutdown signal.

mod cycle;
#[cfg(test)]
pub(crate) mod fakes;
mod scheduler;

pub use cycle::{
    normalize_item, parse_pub_date, CycleError, IngestionCycle, IngestionReport, TickFeed,
};
pub use scheduler::{Scheduler, SchedulerSummary};
