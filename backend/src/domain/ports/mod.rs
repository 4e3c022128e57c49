//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod channel_sender;
mod deviation_repository;
mod fleet_repository;
mod inbox_repository;
mod notification_repository;
mod position_repository;
mod preferences_repository;
mod recipient_directory;
mod route_plan_repository;
mod system_settings_repository;

#[cfg(test)]
pub use channel_sender::MockChannelSender;
pub use channel_sender::{ChannelError, ChannelSender, FixtureChannelSender};
#[cfg(test)]
pub use deviation_repository::MockDeviationRepository;
pub use deviation_repository::{
    DeviationRepository, DeviationRepositoryError, FixtureDeviationRepository,
};
#[cfg(test)]
pub use fleet_repository::MockFleetRepository;
pub use fleet_repository::{FixtureFleetRepository, FleetRepository, FleetRepositoryError};
#[cfg(test)]
pub use inbox_repository::MockInboxRepository;
pub use inbox_repository::{FixtureInboxRepository, InboxRepository, InboxRepositoryError};
#[cfg(test)]
pub use notification_repository::MockNotificationRepository;
pub use notification_repository::{
    FixtureNotificationRepository, NotificationRepository, NotificationRepositoryError,
};
#[cfg(test)]
pub use position_repository::MockPositionRepository;
pub use position_repository::{
    FixturePositionRepository, PositionRepository, PositionRepositoryError,
};
#[cfg(test)]
pub use preferences_repository::MockPreferencesRepository;
pub use preferences_repository::{
    FixturePreferencesRepository, PreferencesRepository, PreferencesRepositoryError,
};
#[cfg(test)]
pub use recipient_directory::MockRecipientDirectory;
pub use recipient_directory::{
    FixtureRecipientDirectory, RecipientDirectory, RecipientDirectoryError,
};
#[cfg(test)]
pub use route_plan_repository::MockRoutePlanRepository;
pub use route_plan_repository::{
    FixtureRoutePlanRepository, RoutePlanRepository, RoutePlanRepositoryError,
};
#[cfg(test)]
pub use system_settings_repository::MockSystemSettingsRepository;
pub use system_settings_repository::{
    FixtureSystemSettingsRepository, GPS_ENABLED_KEY, SystemSettingsRepository,
    SystemSettingsRepositoryError,
};
