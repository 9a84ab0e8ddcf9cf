//! HTTP fetch engine for ads.txt files.
//!
//! This crate provides:
//! - [`Fetcher`] — semaphore-limited, retrying HTTP fetch of
//!   `http://<domain>/ads.txt`
//! - [`engine`] — the attempt loop, error classification, and content gates
//! - redirect-chain validation against registrable root domains

pub mod engine;
mod redirects;

pub use engine::Fetcher;
