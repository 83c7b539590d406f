use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderName};
use axum::response::AppendHeaders;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::{
    override_hints, AppliedOverride, OverrideHints, OverrideRequest, OVERRIDE_COOKIES,
};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthnUser;
use crate::utils::validate_uid;

/// Requested effective-user state. Every field is optional; omitted fields
/// leave the matching cookie untouched on the client. Values are validated
/// here so a typo fails the call instead of poisoning every later request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EffectiveUserRequest {
    #[schema(example = "ta@example.edu")]
    pub uid: Option<String>,
    #[schema(example = "Viewer")]
    pub course_role: Option<String>,
    #[schema(example = "StudentDataViewer")]
    pub course_instance_role: Option<String>,
    #[schema(example = "Exam")]
    pub mode: Option<String>,
    #[schema(example = "2026-03-15T12:00:00Z")]
    pub date: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectiveUserResponse {
    pub message: String,
    pub overrides: Vec<AppliedOverride>,
}

type CookieHeaders = AppendHeaders<Vec<(HeaderName, String)>>;

#[utoipa::path(
    get,
    path = "/effective-user",
    tag = "Effective user",
    responses(
        (status = 200, description = "Overrides currently carried by the client", body = EffectiveUserResponse),
        (status = 400, description = "Malformed override cookie")
    )
)]
pub async fn current_overrides(
    _authn: AuthnUser,
    headers: HeaderMap,
) -> AppResult<Json<EffectiveUserResponse>> {
    let hints = override_hints(&headers);
    let request = OverrideRequest::from_hints(&hints)?;
    let overrides = request.applied();

    let message = if overrides.is_empty() {
        "No effective user overrides".to_string()
    } else {
        "Effective user overrides present".to_string()
    };

    Ok(Json(EffectiveUserResponse { message, overrides }))
}

#[utoipa::path(
    post,
    path = "/effective-user",
    tag = "Effective user",
    request_body = EffectiveUserRequest,
    responses(
        (status = 200, description = "Override cookies set", body = EffectiveUserResponse),
        (status = 400, description = "Invalid override value")
    )
)]
pub async fn set_overrides(
    _authn: AuthnUser,
    Json(payload): Json<EffectiveUserRequest>,
) -> AppResult<(CookieHeaders, Json<EffectiveUserResponse>)> {
    if let Some(uid) = payload.uid.as_deref() {
        validate_uid(uid)?;
    }

    let hints = OverrideHints {
        uid: payload.uid,
        course_role: payload.course_role,
        course_instance_role: payload.course_instance_role,
        mode: payload.mode,
        date: payload.date,
    };

    // Values are only checked for shape here. Whether the caller is allowed
    // to act as the requested user is decided when a course page is next
    // loaded, against that page's scope.
    let request = OverrideRequest::from_hints(&hints)?;
    if request.is_empty() {
        return Err(AppError::bad_request("at least one override value is required"));
    }

    let overrides = request.applied();
    let cookies = overrides
        .iter()
        .map(|o| {
            (
                SET_COOKIE,
                format!("{}={}; Path=/; SameSite=Lax", o.cookie, o.value),
            )
        })
        .collect::<Vec<_>>();

    Ok((
        AppendHeaders(cookies),
        Json(EffectiveUserResponse {
            message: "Effective user updated".to_string(),
            overrides,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/effective-user",
    tag = "Effective user",
    responses((status = 200, description = "Override cookies cleared", body = EffectiveUserResponse))
)]
pub async fn clear_overrides(
    _authn: AuthnUser,
) -> AppResult<(CookieHeaders, Json<EffectiveUserResponse>)> {
    let cookies = OVERRIDE_COOKIES
        .iter()
        .map(|cookie| (SET_COOKIE, format!("{cookie}=; Path=/; Max-Age=0")))
        .collect::<Vec<_>>();

    Ok((
        AppendHeaders(cookies),
        Json(EffectiveUserResponse {
            message: "Effective user reset".to_string(),
            overrides: Vec::new(),
        }),
    ))
}
