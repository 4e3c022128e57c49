//! SMTP email channel built on `lettre`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::notifications::{Channel, Notification, Recipient, render_email};
use crate::domain::ports::{ChannelError, ChannelSender};

/// Port used for implicit TLS; every other port negotiates STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP relay settings.
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    /// Sender mailbox, e.g. `Fleet Alerts <alerts@example.org>`.
    pub from: String,
}

/// Sends the HTML rendering of a notification to the recipient's address.
pub struct SmtpEmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailChannel {
    /// # Errors
    ///
    /// Returns `ChannelError::Configuration` when the relay host or sender
    /// address is unusable.
    pub fn new(config: SmtpConfig) -> Result<Self, ChannelError> {
        let from: Mailbox = config.from.parse().map_err(|err| {
            ChannelError::configuration(format!("invalid sender {}: {err}", config.from))
        })?;
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|err| ChannelError::configuration(format!("smtp relay {}: {err}", config.host)))?
        .port(config.port);
        let builder = match (config.username, config.password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user, password.as_str().to_owned()))
            }
            _ => builder,
        };
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Build the MIME message for one recipient.
fn build_message(
    from: &Mailbox,
    notification: &Notification,
    recipient: &Recipient,
) -> Result<Message, ChannelError> {
    let address = recipient
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| ChannelError::rejected("recipient has no email address"))?;
    let to: Mailbox = address
        .parse()
        .map_err(|err| ChannelError::rejected(format!("invalid address {address}: {err}")))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(notification.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(render_email(notification, recipient))
        .map_err(|err| ChannelError::rejected(format!("message could not be built: {err}")))
}

#[async_trait]
impl ChannelSender for SmtpEmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> Result<(), ChannelError> {
        let message = build_message(&self.from, notification, recipient)?;
        match self.transport.send(message).await {
            Ok(response) => {
                debug!(
                    notification_id = %notification.id,
                    code = %response.code(),
                    "email accepted by relay"
                );
                Ok(())
            }
            Err(err) if err.is_permanent() => Err(ChannelError::rejected(err.to_string())),
            Err(err) => Err(ChannelError::transport(err.to_string())),
        }
    }
}
