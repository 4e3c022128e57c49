//! HTTP inbound adapter exposing REST endpoints.

pub mod error;
pub mod fleet;
pub mod gps;
pub mod health;
pub mod monitoring;
pub mod notifications;
pub mod route_plans;
pub mod schemas;
pub mod session;
pub mod session_config;
pub mod state;
pub mod stream;
#[cfg(test)]
pub mod test_utils;
pub mod validation;

pub use error::ApiResult;
