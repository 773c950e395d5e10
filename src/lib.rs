//! urlwatch - concurrent URL availability monitor
//!
//! Polls every configured URL on its own schedule, keeps the latency and
//! status history in memory and serves it to dashboards over HTTP.
//!
//! The [`scheduler::Scheduler`] owns one watcher task per target; results
//! land in the shared [`store::Store`], which readers copy through
//! [`store::Store::snapshot`].

pub mod config;
pub mod export;
pub mod probe;
pub mod scheduler;
pub mod store;
pub mod web;
