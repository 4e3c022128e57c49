//! Port for delivering a notification to one recipient over one channel.

use async_trait::async_trait;

use crate::domain::notifications::{Channel, Notification, Recipient};

use super::define_port_error;

define_port_error! {
    /// Errors raised by channel adapters.
    pub enum ChannelError {
        /// The attempt exceeded the channel deadline.
        Timeout { seconds: u64 } =>
            "delivery timed out after {seconds}s",
        /// The provider could not be reached.
        Transport { message: String } =>
            "delivery transport failed: {message}",
        /// The provider answered but refused the message.
        Rejected { message: String } =>
            "delivery rejected: {message}",
        /// The channel has no usable credentials.
        Configuration { message: String } =>
            "channel not configured: {message}",
    }
}

/// Driven port implemented by the email, SMS, push and in-app adapters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> Channel;

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError>;
}

/// Fixture sender that accepts every message.
#[derive(Debug, Clone, Copy)]
pub struct FixtureChannelSender {
    channel: Channel,
}

impl FixtureChannelSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for FixtureChannelSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        _notification: &Notification,
        _recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}
