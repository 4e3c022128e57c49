//! In-app delivery: inbox entry plus a live push to the user's streams.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;

use super::model::{Channel, Notification, NotificationPayload, Recipient};
use crate::domain::fanout::{BusEvent, FanoutBus};
use crate::domain::ports::{ChannelError, ChannelSender, InboxRepository};

/// [`ChannelSender`] for [`Channel::InApp`].
pub struct InAppChannel {
    inbox: Arc<dyn InboxRepository>,
    bus: Arc<FanoutBus>,
    clock: Arc<dyn Clock>,
}

impl InAppChannel {
    pub fn new(inbox: Arc<dyn InboxRepository>, bus: Arc<FanoutBus>, clock: Arc<dyn Clock>) -> Self {
        Self { inbox, bus, clock }
    }
}

#[async_trait]
impl ChannelSender for InAppChannel {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        self.inbox
            .add(&notification.id, &recipient.user_id, self.clock.utc())
            .await
            .map_err(|error| ChannelError::transport(error.to_string()))?;
        self.bus.publish(&BusEvent::Notification {
            user_id: recipient.user_id.clone(),
            notification: Box::new(NotificationPayload::from(notification)),
        });
        Ok(())
    }
}
