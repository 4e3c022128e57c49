//! Delivery adapters implementing [`ChannelSender`](crate::domain::ports::ChannelSender)
//! for external providers.
//!
//! The in-app channel lives in the domain because it only touches the inbox
//! and the fanout bus.

mod disabled;
mod email;
mod push;
mod sms;

pub use disabled::DisabledChannel;
pub use email::{SmtpConfig, SmtpEmailChannel};
pub use push::{ApnsConfig, DeviceToken, FcmConfig, IOS_TOKEN_PREFIX, PushChannel, fcm_payload};
pub use sms::{HttpSmsChannel, SMS_MAX_CHARS, SmsConfig, normalize_phone, truncate_sms};
