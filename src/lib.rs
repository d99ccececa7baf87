//! # taskline
//!
//! Point-to-point task dispatch pipeline.
//!
//! A [`generator::TaskGenerator`] creates tasks on a fixed cadence, bounded
//! by an [`admission::AdmissionController`], persists each one through a
//! [`store::StateStore`] and hands it to a worker over a
//! [`dispatch::DispatchChannel`]. The worker's [`worker::TaskProcessor`]
//! paces itself with a [`limiter::RateLimiter`] and moves every task
//! `received -> processing -> done`.

pub mod admission;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod generator;
pub mod limiter;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod worker;
