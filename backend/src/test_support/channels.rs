//! Recording doubles for delivery channels and deviation alerts.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::notifications::{Channel, Notification, Recipient};
use crate::domain::ports::{ChannelError, ChannelSender};
use crate::domain::route_monitor::DeviationAlerts;
use crate::domain::{Deviation, NotificationId, UserId};

/// Channel sender that records every dispatch and optionally fails them.
pub struct RecordingChannelSender {
    channel: Channel,
    failure: Option<ChannelError>,
    sent: Mutex<Vec<(NotificationId, UserId)>>,
}

impl RecordingChannelSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            failure: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sender that records the attempt and then returns `error`.
    pub fn failing(channel: Channel, error: ChannelError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(channel)
        }
    }

    pub fn sent(&self) -> Vec<(NotificationId, UserId)> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingChannelSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((notification.id.clone(), recipient.user_id.clone()));
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Alert sink that keeps every deviation it receives.
#[derive(Default)]
pub struct RecordingDeviationAlerts {
    alerts: Mutex<Vec<Deviation>>,
}

impl RecordingDeviationAlerts {
    pub fn alerts(&self) -> Vec<Deviation> {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeviationAlerts for RecordingDeviationAlerts {
    async fn deviation_alert(&self, deviation: &Deviation) {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(deviation.clone());
    }
}
