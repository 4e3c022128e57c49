//! Prometheus request metrics behind the `metrics` feature.
//!
//! The middleware is optional at runtime too: when the exporter cannot be
//! built the server keeps serving without it.

use actix_service::{
    Service, ServiceExt as _, Transform,
    boxed::{self, BoxService},
};
use actix_web::body::BoxBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Compat;
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use futures_util::future::LocalBoxFuture;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;

/// Metric namespace shared by every exported series.
pub(crate) const METRICS_NAMESPACE: &str = "busfleet";
/// Path of the scrape endpoint.
pub(crate) const METRICS_ENDPOINT: &str = "/metrics";

/// Build the exporter, logging and discarding construction failures.
pub(crate) fn initialize_metrics<E, F>(build: F) -> Option<PrometheusMetrics>
where
    E: Display,
    F: FnOnce() -> Result<PrometheusMetrics, E>,
{
    match build() {
        Ok(metrics) => Some(metrics),
        Err(error) => {
            warn!(error = %error, "prometheus metrics disabled");
            None
        }
    }
}

/// Exporter labelled with the service name, scraped at [`METRICS_ENDPOINT`].
pub(crate) fn fleet_metrics() -> Option<PrometheusMetrics> {
    initialize_metrics(|| {
        PrometheusMetricsBuilder::new(METRICS_NAMESPACE)
            .endpoint(METRICS_ENDPOINT)
            .const_labels(HashMap::from([(
                "service".to_owned(),
                METRICS_NAMESPACE.to_owned(),
            )]))
            .build()
    })
}

/// Wraps the app in the Prometheus middleware when an exporter exists.
#[derive(Clone)]
pub(crate) enum MetricsLayer {
    Enabled(Arc<PrometheusMetrics>),
    Disabled,
}

impl MetricsLayer {
    #[must_use]
    pub(crate) fn from_option(metrics: Option<PrometheusMetrics>) -> Self {
        metrics.map_or(Self::Disabled, |metrics| Self::Enabled(Arc::new(metrics)))
    }
}

impl<S, B> Transform<S, ServiceRequest> for MetricsLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = BoxService<ServiceRequest, ServiceResponse<BoxBody>, actix_web::Error>;
    type Future = LocalBoxFuture<'static, Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        match self {
            Self::Enabled(metrics) => {
                let pending = Compat::new(metrics.as_ref().clone()).new_transform(service);
                Box::pin(async move { Ok(boxed::service(pending.await?)) })
            }
            Self::Disabled => {
                let boxed_body =
                    service.map(|res: ServiceResponse<B>| res.map_into_boxed_body());
                Box::pin(async move { Ok(boxed::service(boxed_body)) })
            }
        }
    }
}
