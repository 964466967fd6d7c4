//! HTTP route modules, one per record category plus the operational
//! endpoints.

pub mod activity;
pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod nutrition;
pub mod records;
pub mod sleep;
pub mod wellbeing;
