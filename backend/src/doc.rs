//! OpenAPI documentation configuration.
//!
//! This module defines the [`ApiDoc`] struct which generates the OpenAPI
//! document for the REST API. It registers:
//!
//! - **Paths**: every `/api/v1` endpoint plus the health probes
//! - **Schemas**: wrappers from [`crate::inbound::http::schemas`] that describe
//!   domain types without coupling them to utoipa
//! - **Security**: Session cookie authentication scheme
//!
//! The generated document is used by Swagger UI (debug builds) and
//! exported via `cargo run --bin openapi-dump` for external tooling.

use crate::inbound::http::schemas::{
    DeviationSchema, DeviationStatsSchema, ErrorCodeSchema, ErrorSchema, GeoPointSchema,
    PositionSchema, SessionSummarySchema, StopSchema,
};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Enrich the generated document with the session cookie security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Private session cookie carrying the caller's user id and role.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
/// Swagger UI is enabled in debug builds only and used by tooling.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Busfleet API",
        description = "Fleet telemetry, route deviation monitoring and notification delivery.",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0.html"
        )
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = [])),
    paths(
        crate::inbound::http::monitoring::start_monitoring,
        crate::inbound::http::monitoring::stop_monitoring,
        crate::inbound::http::monitoring::active_monitoring,
        crate::inbound::http::monitoring::monitoring_stats,
        crate::inbound::http::monitoring::get_monitor_settings,
        crate::inbound::http::monitoring::update_monitor_settings,
        crate::inbound::http::monitoring::resolve_deviation,
        crate::inbound::http::monitoring::deviation_history,
        crate::inbound::http::route_plans::get_route_plan,
        crate::inbound::http::route_plans::replace_route_plan,
        crate::inbound::http::stream::gps_stream,
        crate::inbound::http::gps::update_gps,
        crate::inbound::http::gps::gps_status,
        crate::inbound::http::gps::toggle_gps,
        crate::inbound::http::gps::fleet_locations,
        crate::inbound::http::gps::vehicle_location,
        crate::inbound::http::gps::vehicle_locations,
        crate::inbound::http::notifications::list_inbox,
        crate::inbound::http::notifications::notification_history,
        crate::inbound::http::notifications::unread_count,
        crate::inbound::http::notifications::mark_read,
        crate::inbound::http::notifications::mark_all_read,
        crate::inbound::http::notifications::get_preferences,
        crate::inbound::http::notifications::update_preferences,
        crate::inbound::http::notifications::send_test,
        crate::inbound::http::fleet::raise_emergency,
        crate::inbound::http::fleet::change_vehicle_status,
        crate::inbound::http::fleet::assign_route,
        crate::inbound::http::fleet::report_ready,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        ErrorSchema,
        ErrorCodeSchema,
        GeoPointSchema,
        PositionSchema,
        DeviationSchema,
        StopSchema,
        SessionSummarySchema,
        DeviationStatsSchema,
    )),
    tags(
        (name = "route-monitoring", description = "Live route sessions and deviations"),
        (name = "route-plans", description = "Ordered stop lists per route"),
        (name = "gps", description = "Position ingest, lookups and the live stream"),
        (name = "notifications", description = "Inbox, history and delivery preferences"),
        (name = "fleet", description = "Event triggers raised by drivers and managers"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    //! Tests verifying OpenAPI schema field structure.

    use super::*;
    use rstest::rstest;
    use utoipa::OpenApi;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::schema::Schema;

    // Note: utoipa replaces :: with . in schema names
    const ERROR_SCHEMA_NAME: &str = "crate.domain.Error";
    const POSITION_SCHEMA_NAME: &str = "crate.domain.Position";

    /// Assert that an Object schema contains a field with the given name.
    fn assert_object_schema_has_field(schema: &RefOr<Schema>, field: &str) {
        match schema {
            RefOr::T(Schema::Object(obj)) => {
                assert!(
                    obj.properties.contains_key(field),
                    "schema should have field '{field}'"
                );
            }
            _ => panic!("expected Object schema"),
        }
    }

    #[rstest]
    #[case(ERROR_SCHEMA_NAME, "code")]
    #[case(ERROR_SCHEMA_NAME, "message")]
    #[case(POSITION_SCHEMA_NAME, "vehicle_id")]
    #[case(POSITION_SCHEMA_NAME, "driver_id")]
    fn registered_schemas_expose_fields(#[case] schema: &str, #[case] field: &str) {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let found = schemas.get(schema).expect("schema registered");
        assert_object_schema_has_field(found, field);
    }

    #[rstest]
    #[case("/api/v1/route-monitoring/start")]
    #[case("/api/v1/gps/stream")]
    #[case("/api/v1/notifications/preferences")]
    #[case("/api/v1/emergency")]
    #[case("/health/ready")]
    fn document_lists_paths(#[case] path: &str) {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key(path), "missing {path}");
    }

    #[rstest]
    fn document_declares_session_cookie_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("SessionCookie"));
    }
}
