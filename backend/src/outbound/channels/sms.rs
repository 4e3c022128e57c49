//! SMS channel speaking a Twilio-style form API over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::notifications::{Channel, Notification, Recipient};
use crate::domain::ports::{ChannelError, ChannelSender};

/// Longest body sent in one message.
pub const SMS_MAX_CHARS: usize = 160;
const ELLIPSIS: &str = "...";

/// Provider credentials and sender number.
pub struct SmsConfig {
    pub endpoint: Url,
    pub account: String,
    pub token: Zeroizing<String>,
    pub from: String,
}

/// Posts `From`/`To`/`Body` forms authenticated with the account credentials.
pub struct HttpSmsChannel {
    client: Client,
    config: SmsConfig,
}

impl HttpSmsChannel {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: SmsConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Reduce a phone number to E.164 digits; ten-digit numbers gain the `1`
/// country code.
///
/// # Examples
/// ```
/// use busfleet::outbound::channels::normalize_phone;
///
/// assert_eq!(normalize_phone("(555) 010-2000"), "+15550102000");
/// assert_eq!(normalize_phone("+44 20 7946 0000"), "+442079460000");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        format!("+1{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Clip `message` to [`SMS_MAX_CHARS`] characters, ending clipped text with
/// an ellipsis.
pub fn truncate_sms(message: &str) -> String {
    if message.chars().count() <= SMS_MAX_CHARS {
        return message.to_owned();
    }
    let keep = SMS_MAX_CHARS - ELLIPSIS.len();
    let mut clipped: String = message.chars().take(keep).collect();
    clipped.push_str(ELLIPSIS);
    clipped
}

fn map_status_error(status: StatusCode, body: &str) -> ChannelError {
    let detail = format!("provider returned {status}: {}", body.trim());
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        ChannelError::rejected(detail)
    } else {
        ChannelError::transport(detail)
    }
}

#[async_trait]
impl ChannelSender for HttpSmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        let phone = recipient
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|phone| phone.len() > 1)
            .ok_or_else(|| ChannelError::rejected("recipient has no phone number"))?;
        let body = truncate_sms(&notification.message);

        let response = self
            .client
            .post(self.config.endpoint.clone())
            .basic_auth(&self.config.account, Some(self.config.token.as_str()))
            .form(&[
                ("From", self.config.from.as_str()),
                ("To", phone.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ChannelError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }
        debug!(notification_id = %notification.id, "sms accepted by provider");
        Ok(())
    }
}
