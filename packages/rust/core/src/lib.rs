//! Core pipeline of the ads.txt crawler.
//!
//! This crate provides:
//! - [`parser`] — turns raw ads.txt lines into records and variables
//! - [`reconcile`] — applies a fetch outcome to persisted state
//! - [`Orchestrator`] — runs crawl cycles end to end

pub mod orchestrator;
pub mod parser;
pub mod reconcile;

pub use orchestrator::{Orchestrator, crawl_single};
pub use reconcile::reconcile;
