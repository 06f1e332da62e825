//! Target CRUD handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::{CreateTargetRequest, TargetResponse, UpdateTargetRequest, ALLOWED_METHODS};
use crate::server::AppState;
use crate::store::{NewTarget, TargetPatch};

use super::problem::{ApiError, ApiResult};

/// POST /targets
pub async fn create_target(
    State(state): State<AppState>,
    payload: Result<Json<CreateTargetRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate_url(&req.url)?;
    let method = normalize_method(&req.method)?;

    let target = state
        .store
        .create_target(
            NewTarget {
                name: req.name,
                url: req.url,
                method,
                headers: req.headers,
                body_template: req.body_template,
            },
            state.clock.now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(TargetResponse::from(target))))
}

/// GET /targets
pub async fn list_targets(State(state): State<AppState>) -> ApiResult<Json<Vec<TargetResponse>>> {
    let targets = state.store.list_targets().await?;
    Ok(Json(targets.into_iter().map(TargetResponse::from).collect()))
}

/// GET /targets/{target_id}
pub async fn get_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> ApiResult<Json<TargetResponse>> {
    let target = state
        .store
        .get_target(&target_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?;
    Ok(Json(TargetResponse::from(target)))
}

/// PUT /targets/{target_id}
pub async fn update_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    payload: Result<Json<UpdateTargetRequest>, JsonRejection>,
) -> ApiResult<Json<TargetResponse>> {
    let Json(req) = payload?;
    if let Some(url) = &req.url {
        validate_url(url)?;
    }
    let method = req.method.as_deref().map(normalize_method).transpose()?;

    let target = state
        .store
        .update_target(
            &target_id,
            TargetPatch {
                name: req.name,
                url: req.url,
                method,
                headers: req.headers,
                body_template: req.body_template,
            },
            state.clock.now(),
        )
        .await?;

    Ok(Json(TargetResponse::from(target)))
}

/// DELETE /targets/{target_id}
pub async fn delete_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_target(&target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_url(url: &str) -> ApiResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "URL must start with http:// or https://".to_string(),
        ))
    }
}

fn normalize_method(method: &str) -> ApiResult<String> {
    let upper = method.to_ascii_uppercase();
    if ALLOWED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ApiError::Validation(format!(
            "Method must be one of {}",
            ALLOWED_METHODS.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_requires_http_scheme() {
        assert!(validate_url("https://example.test/").is_ok());
        assert!(validate_url("http://example.test/").is_ok());
        assert!(validate_url("ftp://example.test/").is_err());
        assert!(validate_url("example.test").is_err());
    }

    #[test]
    fn methods_are_uppercased_and_allowlisted() {
        assert_eq!(normalize_method("get").unwrap(), "GET");
        assert_eq!(normalize_method("Patch").unwrap(), "PATCH");
        assert!(normalize_method("TRACE").is_err());
        assert!(normalize_method("").is_err());
    }
}
