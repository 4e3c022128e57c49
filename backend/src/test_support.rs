//! Test utilities for the backend crate.
//!
//! Shared by unit tests in `src/` and by the integration tests in `tests/`
//! through the `test-support` feature.

pub mod channels;
pub mod clock;
pub mod memory;

pub use channels::{RecordingChannelSender, RecordingDeviationAlerts};
pub use clock::MutableClock;
pub use memory::{
    InMemoryDeviationRepository, InMemoryFleetRepository, InMemoryInboxRepository,
    InMemoryNotificationRepository, InMemoryPositionRepository, InMemoryPreferencesRepository,
    InMemoryRecipientDirectory, InMemoryRoutePlanRepository, InMemorySystemSettingsRepository,
};
