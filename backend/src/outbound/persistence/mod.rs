//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! This module provides concrete implementations of domain repository ports
//! backed by PostgreSQL via the Diesel ORM with async support through
//! `diesel-async` and `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: Repository implementations only translate between
//!   Diesel rows and domain types. No business logic resides here.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) never leave this module.
//! - **Strongly typed errors**: Pool and Diesel failures are mapped to the
//!   port's own error enum via [`diesel_basic_error_mapping`].
//!
//! # Example
//!
//! ```ignore
//! use busfleet::outbound::persistence::{DbPool, DieselPositionRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/fleet")).await?;
//! let positions = DieselPositionRepository::new(pool);
//! ```

pub(crate) mod diesel_basic_error_mapping;
mod diesel_deviation_repository;
mod diesel_fleet_repository;
mod diesel_inbox_repository;
mod diesel_notification_repository;
mod diesel_position_repository;
mod diesel_preferences_repository;
mod diesel_recipient_directory;
mod diesel_route_plan_repository;
mod diesel_system_settings_repository;
mod models;
mod pool;
mod schema;

pub use diesel_deviation_repository::DieselDeviationRepository;
pub use diesel_fleet_repository::DieselFleetRepository;
pub use diesel_inbox_repository::DieselInboxRepository;
pub use diesel_notification_repository::DieselNotificationRepository;
pub use diesel_position_repository::DieselPositionRepository;
pub use diesel_preferences_repository::DieselPreferencesRepository;
pub use diesel_recipient_directory::DieselRecipientDirectory;
pub use diesel_route_plan_repository::DieselRoutePlanRepository;
pub use diesel_system_settings_repository::DieselSystemSettingsRepository;
pub use pool::{DbPool, PoolConfig, PoolError, run_migrations};
