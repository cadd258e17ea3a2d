//! Route handlers for the ArbiterLock HTTP façade (spec §4.3, §6), grounded
//! in the host codebase's actix-web handler conventions (see
//! `console::v3::config::search` for the `web::Data<AppState>` /
//! `HttpResponse::Ok().json(...)` shape this mirrors).
//!
//! Engine-level errors always ride back with transport 200 and a
//! `{status: "error", code, message}` body (spec §4.3) — the façade only
//! reaches for a non-2xx status on transport-level failures: malformed
//! JSON (actix's extractor rejection, 400) or the store being unreachable
//! (`EngineError::Internal`, surfaced as 503).

use std::str::FromStr;

use actix_web::{get, post, web, HttpResponse, Responder};
use arbiterlock_api::{
    AcquireRequest, AcquireResponse, CancelRequest, CancelResponse, CleanupResponse,
    ErrorResponse, ExtendRequest, ExtendResponse, HealthResponse, ReleaseRequest, ReleaseResponse,
    StatusResponse,
};
use arbiterlock_common::{EngineError, LockId};

use crate::state::AppState;

fn error_response(err: &EngineError) -> HttpResponse {
    let body = ErrorResponse::from_engine_error(err);
    match err {
        EngineError::Internal(_) => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::Ok().json(body),
    }
}

#[post("/v1/locks/acquire")]
async fn acquire(data: web::Data<AppState>, body: web::Json<AcquireRequest>) -> impl Responder {
    let req = body.into_inner();
    let resource = req.resource();
    match data
        .engine
        .acquire(resource, req.agent_id, req.priority, req.ttl, req.reentrant)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(AcquireResponse::from(result)),
        Err(err) => error_response(&err),
    }
}

#[post("/v1/locks/release")]
async fn release(data: web::Data<AppState>, body: web::Json<ReleaseRequest>) -> impl Responder {
    let req = body.into_inner();
    match data
        .engine
        .release(req.lock_id, req.agent_id, req.idempotent)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(ReleaseResponse::from(result)),
        Err(err) => error_response(&err),
    }
}

#[post("/v1/locks/extend")]
async fn extend(data: web::Data<AppState>, body: web::Json<ExtendRequest>) -> impl Responder {
    let req = body.into_inner();
    match data
        .engine
        .extend(req.lock_id, req.agent_id, req.additional_ttl)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(ExtendResponse::from(result)),
        Err(err) => error_response(&err),
    }
}

#[post("/v1/locks/cancel")]
async fn cancel(data: web::Data<AppState>, body: web::Json<CancelRequest>) -> impl Responder {
    let req = body.into_inner();
    let resource = req.resource();
    match data.engine.cancel(resource, req.agent_id).await {
        Ok(result) => HttpResponse::Ok().json(CancelResponse::from(result)),
        Err(err) => error_response(&err),
    }
}

#[get("/v1/locks/{lock_id}/status")]
async fn status(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let lock_id = match LockId::from_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest().json(arbiterlock_api::ErrorResponse {
                status: arbiterlock_api::ErrorStatus::Error,
                code: "bad_request".to_string(),
                message: "lock_id is not a valid uuid".to_string(),
            })
        }
    };

    match data.engine.status(lock_id).await {
        Ok(result) => HttpResponse::Ok().json(StatusResponse::from(result)),
        Err(err) => error_response(&err),
    }
}

#[post("/v1/locks/cleanup")]
async fn cleanup(data: web::Data<AppState>) -> impl Responder {
    match data.engine.cleanup().await {
        Ok(cleared) => HttpResponse::Ok().json(CleanupResponse { cleared }),
        Err(err) => error_response(&err),
    }
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse::default())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(acquire)
        .service(release)
        .service(extend)
        .service(cancel)
        .service(status)
        .service(cleanup)
        .service(health);
}
