//! HTTP surface
//!
//! `/health` and `/metrics` are answered locally; everything under
//! `/api/v1/` is resolved against the route table and proxied.

use actix_middleware::{GatewayError, RequestContext};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{error, warn};

use crate::GatewayState;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn metrics(state: web::Data<GatewayState>) -> HttpResponse {
    match state.metrics.render() {
        Ok(body) => HttpResponse::Ok().content_type(prometheus::TEXT_FORMAT).body(body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Terminal stage: resolve the backend and forward the request
///
/// The payload is read raw, so a compressed body reaches the backend
/// byte-for-byte together with its `Content-Encoding`.
pub async fn forward_to_service(
    ctx: web::ReqData<RequestContext>,
    payload: web::Payload,
    state: web::Data<GatewayState>,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = ctx.into_inner();

    let route = state.routes.resolve(&ctx.path).map_err(|e| {
        warn!(path = %ctx.path, "Service not found");
        GatewayError::from(e)
    })?;

    ctx.body = match payload.to_bytes_limited(state.max_body_bytes).await {
        Ok(body) => body?,
        Err(_) => {
            warn!(path = %ctx.path, limit = state.max_body_bytes, "Request body too large");
            return Err(GatewayError::PayloadTooLarge.into());
        }
    };

    Ok(state.proxy.forward(&ctx, &route).await?)
}

pub async fn not_found() -> Result<HttpResponse, GatewayError> {
    Err(GatewayError::NotFound)
}

pub fn configure(state: web::Data<GatewayState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(state)
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics))
            .service(
                web::resource("/api/v1/{tail:.*}")
                    .route(web::get().to(forward_to_service))
                    .route(web::post().to(forward_to_service))
                    .route(web::put().to(forward_to_service))
                    .route(web::patch().to(forward_to_service))
                    .route(web::delete().to(forward_to_service)),
            )
            .default_service(web::to(not_found));
    }
}
