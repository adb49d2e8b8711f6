//! HTTP handlers for the operational endpoints

pub mod health;

pub use health::health_check;
