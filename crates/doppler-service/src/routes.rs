//! HTTP surface of the scheduling service
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/` | job view |
//! | `GET` | `/{request_id}` | job view, 404 if unknown |
//! | `DELETE` | `/{request_id}` | `{"was_cancelled": bool}` |

use crate::service::SchedulingService;
use crate::validation::Submission;
use doppler_core::{Cancellation, JobView};
use doppler_http::{delete, get, post, ApiError, Json, Request, Result, Router};
use doppler_jobs::JobError;
use std::sync::Arc;

/// Build the service router
pub fn router(service: Arc<SchedulingService>) -> Router {
    let create = {
        let service = service.clone();
        move |req: Request| create_job(service.clone(), req)
    };
    let show = {
        let service = service.clone();
        move |req: Request| get_job(service.clone(), req)
    };
    let cancel = move |req: Request| delete_job(service.clone(), req);

    Router::new()
        .route("/", post(create))
        .route("/{request_id}", get(show))
        .route("/{request_id}", delete(cancel))
}

async fn create_job(service: Arc<SchedulingService>, req: Request) -> Result<Json<JobView>> {
    let submission = Submission::from_json(req.body())?;
    let view = service.create(submission).await.map_err(queue_error)?;
    Ok(Json(view))
}

async fn get_job(service: Arc<SchedulingService>, req: Request) -> Result<Json<JobView>> {
    let request_id = request_id(&req)?;
    match service.get(request_id).await.map_err(queue_error)? {
        Some(view) => Ok(Json(view)),
        None => Err(ApiError::not_found(format!("Job {} not found", request_id))),
    }
}

async fn delete_job(service: Arc<SchedulingService>, req: Request) -> Result<Json<Cancellation>> {
    let request_id = request_id(&req)?;
    let cancellation = service.cancel(request_id).await.map_err(queue_error)?;
    Ok(Json(cancellation))
}

fn request_id(req: &Request) -> Result<&str> {
    req.path_param("request_id")
        .ok_or_else(|| ApiError::bad_request("Missing request id"))
}

fn queue_error(err: JobError) -> ApiError {
    ApiError::service_unavailable("Delay queue unavailable").with_internal(err.to_string())
}
