//! Mobile push channel: FCM for Android tokens, APNs for `ios:` tokens.
//!
//! Each device token is attempted independently. The send succeeds when at
//! least one device accepted the message; otherwise the last failure is
//! returned.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Identity, StatusCode, Url};
use serde_json::{Value, json};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::domain::notifications::{Channel, Notification, Priority, Recipient};
use crate::domain::ports::{ChannelError, ChannelSender};

/// Prefix marking an APNs device token.
pub const IOS_TOKEN_PREFIX: &str = "ios:";

/// Legacy FCM HTTP endpoint and server key.
#[cfg_attr(test, derive(Debug))]
pub struct FcmConfig {
    pub endpoint: Url,
    pub server_key: Zeroizing<String>,
}

/// APNs client certificate and topic.
pub struct ApnsConfig {
    pub endpoint: Url,
    pub cert_path: String,
    pub key_path: String,
    /// App bundle id sent as `apns-topic`.
    pub topic: String,
}

struct ApnsTarget {
    client: Client,
    endpoint: Url,
    topic: String,
}

/// Push sender. Either provider may be absent; tokens for a missing provider
/// fail with a configuration error.
pub struct PushChannel {
    client: Client,
    fcm: Option<FcmConfig>,
    apns: Option<ApnsTarget>,
}

/// Device token routed to its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceToken<'a> {
    Fcm(&'a str),
    Apns(&'a str),
}

impl<'a> DeviceToken<'a> {
    /// Classify a stored token. Blank tokens yield `None`.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix(IOS_TOKEN_PREFIX) {
            Some(token) if !token.is_empty() => Some(Self::Apns(token)),
            Some(_) => None,
            None => Some(Self::Fcm(raw)),
        }
    }
}

fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, ChannelError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|err| {
            ChannelError::configuration(format!("read {}: {err}", path.display()))
        })
    };
    let mut pem = read(cert_path)?;
    pem.push(b'\n');
    pem.extend(read(key_path)?);
    Identity::from_pem(&pem)
        .map_err(|err| ChannelError::configuration(format!("apns identity: {err}")))
}

impl PushChannel {
    /// # Errors
    ///
    /// Returns `ChannelError::Configuration` when the APNs certificate cannot
    /// be loaded or an HTTP client cannot be built.
    pub fn new(
        fcm: Option<FcmConfig>,
        apns: Option<ApnsConfig>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let build_error = |err: reqwest::Error| ChannelError::configuration(err.to_string());
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(build_error)?;
        let apns = match apns {
            Some(config) => {
                let identity =
                    load_identity(Path::new(&config.cert_path), Path::new(&config.key_path))?;
                let client = Client::builder()
                    .timeout(timeout)
                    .identity(identity)
                    .build()
                    .map_err(build_error)?;
                Some(ApnsTarget {
                    client,
                    endpoint: config.endpoint,
                    topic: config.topic,
                })
            }
            None => None,
        };
        Ok(Self { client, fcm, apns })
    }

    async fn send_fcm(&self, token: &str, payload: &Value) -> Result<(), ChannelError> {
        let fcm = self
            .fcm
            .as_ref()
            .ok_or_else(|| ChannelError::configuration("FCM server key missing"))?;
        let response = self
            .client
            .post(fcm.endpoint.clone())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", fcm.server_key.as_str()),
            )
            .json(&json!({ "to": token, "data": payload }))
            .send()
            .await
            .map_err(|err| ChannelError::transport(err.to_string()))?;
        check_status(response.status())
    }

    async fn send_apns(
        &self,
        token: &str,
        notification: &Notification,
    ) -> Result<(), ChannelError> {
        let apns = self
            .apns
            .as_ref()
            .ok_or_else(|| ChannelError::configuration("APNs certificate missing"))?;
        let url = apns
            .endpoint
            .join(&format!("/3/device/{token}"))
            .map_err(|err| ChannelError::rejected(format!("bad device token: {err}")))?;
        let response = apns
            .client
            .post(url)
            .header("apns-topic", apns.topic.as_str())
            .header("apns-priority", apns_priority(notification.priority))
            .json(&apns_payload(notification))
            .send()
            .await
            .map_err(|err| ChannelError::transport(err.to_string()))?;
        check_status(response.status())
    }
}

fn check_status(status: StatusCode) -> Result<(), ChannelError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        Err(ChannelError::rejected(format!("provider returned {status}")))
    } else {
        Err(ChannelError::transport(format!("provider returned {status}")))
    }
}

/// Payload shared by every FCM token.
pub fn fcm_payload(notification: &Notification) -> Value {
    json!({
        "notification": {
            "title": notification.subject,
            "body": notification.message,
            "sound": "default",
            "badge": 1,
        },
        "data": notification.data,
        "priority": notification.priority.as_str(),
    })
}

fn apns_payload(notification: &Notification) -> Value {
    json!({
        "aps": {
            "alert": {
                "title": notification.subject,
                "body": notification.message,
            },
            "sound": "default",
            "badge": 1,
        },
        "data": notification.data,
    })
}

fn apns_priority(priority: Priority) -> &'static str {
    if priority.bypasses_quiet_hours() { "10" } else { "5" }
}

#[async_trait]
impl ChannelSender for PushChannel {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        let tokens: Vec<DeviceToken<'_>> = recipient
            .device_tokens
            .iter()
            .filter_map(|raw| DeviceToken::parse(raw))
            .collect();
        if tokens.is_empty() {
            return Err(ChannelError::rejected("recipient has no device tokens"));
        }

        let payload = fcm_payload(notification);
        let mut delivered = 0_usize;
        let mut last_error = None;
        for token in tokens {
            let outcome = match token {
                DeviceToken::Fcm(token) => self.send_fcm(token, &payload).await,
                DeviceToken::Apns(token) => self.send_apns(token, notification).await,
            };
            match outcome {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        notification_id = %notification.id,
                        user_id = %recipient.user_id,
                        error = %err,
                        "push to device failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        match (delivered, last_error) {
            (0, Some(err)) => Err(err),
            (count, _) => {
                debug!(notification_id = %notification.id, devices = count, "push delivered");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::domain::notifications::{NotificationDraft, NotificationType};
    use chrono::Utc;
    use rstest::rstest;

    fn notification() -> Notification {
        let recipient = Recipient::new(UserId::new("driver1").expect("valid id"));
        NotificationDraft::new(NotificationType::RouteChange, "Route Assignment", "Route R1")
            .priority(Priority::High)
            .data("route_id", "R1")
            .recipients(vec![recipient])
            .into_notification(Utc::now())
            .expect("valid draft")
    }

    #[rstest]
    #[case("abc123", Some(DeviceToken::Fcm("abc123")))]
    #[case("ios:f00d", Some(DeviceToken::Apns("f00d")))]
    #[case("ios:", None)]
    #[case("  ", None)]
    fn tokens_route_to_their_provider(#[case] raw: &str, #[case] expected: Option<DeviceToken>) {
        assert_eq!(DeviceToken::parse(raw), expected);
    }

    #[rstest]
    fn fcm_payload_carries_title_and_data() {
        let payload = fcm_payload(&notification());
        assert_eq!(payload["notification"]["title"], "Route Assignment");
        assert_eq!(payload["data"]["route_id"], "R1");
        assert_eq!(payload["priority"], "high");
    }

    #[rstest]
    #[case(Priority::Critical, "10")]
    #[case(Priority::Low, "5")]
    fn apns_priority_follows_urgency(#[case] priority: Priority, #[case] expected: &str) {
        assert_eq!(apns_priority(priority), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_providers_fail_with_configuration_errors() {
        let channel = PushChannel::new(None, None, Duration::from_secs(1)).expect("client");
        let mut recipient = Recipient::new(UserId::new("driver1").expect("valid id"));
        recipient.device_tokens = vec!["abc".into(), "ios:def".into()];

        let err = channel
            .send(&notification(), &recipient)
            .await
            .expect_err("no provider configured");
        assert!(matches!(err, ChannelError::Configuration { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn recipients_without_tokens_are_rejected() {
        let channel = PushChannel::new(None, None, Duration::from_secs(1)).expect("client");
        let recipient = Recipient::new(UserId::new("driver1").expect("valid id"));
        let err = channel
            .send(&notification(), &recipient)
            .await
            .expect_err("no tokens");
        assert!(matches!(err, ChannelError::Rejected { .. }));
    }
}
