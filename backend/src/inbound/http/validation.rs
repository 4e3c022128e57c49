//! Shared validation helpers for inbound HTTP adapters.
//!
//! Failures become `invalid_request` errors whose details name the offending
//! field, so clients can highlight it.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::{Error, IdValidationError, RouteId, UserId, VehicleId};

/// Validation error codes carried in `details.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingField,
    InvalidId,
    InvalidTimestamp,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidId => "invalid_id",
            ErrorCode::InvalidTimestamp => "invalid_timestamp",
        }
    }
}

/// Newtype wrapper for HTTP field names to provide type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(&self) -> &'static str {
        self.0
    }
}

fn field_error(field: FieldName, code: ErrorCode, message: String) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.as_str(),
        "code": code.as_str(),
    }))
}

fn field_value_error(field: FieldName, code: ErrorCode, message: String, value: &str) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.as_str(),
        "value": value,
        "code": code.as_str(),
    }))
}

pub(crate) fn missing_field_error(field: FieldName) -> Error {
    let name = field.as_str();
    field_error(
        field,
        ErrorCode::MissingField,
        format!("missing required field: {name}"),
    )
}

fn invalid_id_error(field: FieldName, error: &IdValidationError) -> Error {
    field_error(field, ErrorCode::InvalidId, error.to_string())
}

/// Require a non-blank string field.
pub(crate) fn require_text(value: Option<String>, field: FieldName) -> Result<String, Error> {
    value
        .filter(|raw| !raw.trim().is_empty())
        .ok_or_else(|| missing_field_error(field))
}

pub(crate) fn parse_vehicle_id(value: String, field: FieldName) -> Result<VehicleId, Error> {
    VehicleId::new(value).map_err(|error| invalid_id_error(field, &error))
}

pub(crate) fn parse_route_id(value: String, field: FieldName) -> Result<RouteId, Error> {
    RouteId::new(value).map_err(|error| invalid_id_error(field, &error))
}

pub(crate) fn parse_user_id(value: String, field: FieldName) -> Result<UserId, Error> {
    UserId::new(value).map_err(|error| invalid_id_error(field, &error))
}

pub(crate) fn parse_rfc3339_timestamp(
    value: String,
    field: FieldName,
) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| {
            let name = field.as_str();
            field_value_error(
                field,
                ErrorCode::InvalidTimestamp,
                format!("{name} must be an RFC 3339 timestamp"),
                &value,
            )
        })
}

pub(crate) fn parse_optional_rfc3339_timestamp(
    value: Option<String>,
    field: FieldName,
) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|raw| parse_rfc3339_timestamp(raw, field))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode as DomainCode;
    use rstest::rstest;

    const FIELD: FieldName = FieldName::new("vehicle_id");

    #[rstest]
    #[case(None)]
    #[case(Some("   ".to_owned()))]
    fn blank_text_is_missing(#[case] value: Option<String>) {
        let err = require_text(value, FIELD).expect_err("missing");
        assert_eq!(err.code(), DomainCode::InvalidRequest);
        let details = err.details().expect("details");
        assert_eq!(details["field"], "vehicle_id");
        assert_eq!(details["code"], "missing_field");
    }

    #[rstest]
    fn invalid_ids_name_the_field() {
        let err = parse_vehicle_id(" BUS-1".into(), FIELD).expect_err("whitespace");
        assert_eq!(err.details().expect("details")["code"], "invalid_id");
    }

    #[rstest]
    fn timestamps_parse_with_offsets() {
        let parsed = parse_rfc3339_timestamp(
            "2025-03-01T08:00:00+01:00".into(),
            FieldName::new("start"),
        )
        .expect("valid");
        assert_eq!(parsed.to_rfc3339(), "2025-03-01T07:00:00+00:00");
        assert!(parse_optional_rfc3339_timestamp(Some("yesterday".into()), FieldName::new("start")).is_err());
    }
}
