//! Back office for a network of vocational schools: enrollment, billing, grading,
//! certification and revenue reporting behind a role-based capability gate.

pub mod catalog;
pub mod config;
pub mod error;
pub mod storage;
pub mod telemetry;
pub mod workflows;

pub use error::AppError;
