//! Actix middleware shared by every HTTP route.
//!
//! [`Trace`] stamps each request with a trace id that error bodies and logs
//! carry.

pub mod trace;

pub use trace::Trace;
