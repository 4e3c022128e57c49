//! Stand-in for a channel whose credentials were not configured.

use async_trait::async_trait;

use crate::domain::notifications::{Channel, Notification, Recipient};
use crate::domain::ports::{ChannelError, ChannelSender};

/// Fails every send with [`ChannelError::Configuration`], so deliveries are
/// recorded as failed instead of silently dropped.
#[derive(Debug, Clone)]
pub struct DisabledChannel {
    channel: Channel,
    reason: String,
}

impl DisabledChannel {
    pub fn new(channel: Channel, reason: impl Into<String>) -> Self {
        Self {
            channel,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ChannelSender for DisabledChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        _notification: &Notification,
        _recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        Err(ChannelError::configuration(self.reason.clone()))
    }
}
