use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::events::{log_activity_with_context, Loggable, RequestContext, Severity};
use crate::jwt::AuthnUser;
use crate::models::user::User;

use super::context::AccessContext;
use super::data::{AppliedOverride, AuthzData};
use super::error::AuthzError;
use super::override_request::{
    OverrideHints, OverrideRequest, COOKIE_REQUESTED_COURSE_INSTANCE_ROLE,
    COOKIE_REQUESTED_COURSE_ROLE, COOKIE_REQUESTED_DATE, COOKIE_REQUESTED_MODE,
    COOKIE_REQUESTED_UID,
};

/// The resolved authorization context, pulled out of request extensions.
/// Present on every request that passed [`resolve_course_context`].
#[derive(Debug, Clone)]
pub struct Authz(pub Arc<AuthzData>);

#[async_trait]
impl<S> FromRequestParts<S> for Authz
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authz>()
            .cloned()
            .ok_or_else(|| AppError::internal("authorization context missing from request"))
    }
}

/// Route middleware for everything under a course or course-instance path.
/// Runs the resolution engine once per request and stores the immutable
/// result in request extensions for handlers to read.
pub async fn resolve_course_context(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    authn: AuthnUser,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let course_id = path_uuid(&params, "course_id")?;
    let course_instance_id = path_uuid(&params, "course_instance_id")?;

    let request_context = RequestContext::from_headers(request.headers());
    let hints = override_hints(request.headers());

    let mut context = AccessContext::now();
    context.ip = request_context.ip.clone();

    let result = state
        .authz
        .resolve(
            &authn.user,
            course_id,
            course_instance_id,
            &context,
            &hints,
        )
        .await;

    match result {
        Ok(data) => {
            // The access-level ceiling sets override_active on its own; only
            // an explicitly requested override is worth an audit row.
            if !data.overrides.is_empty() {
                audit_override(
                    &state,
                    "granted",
                    &authn.user,
                    Some(data.user.uid.clone()),
                    course_id,
                    course_instance_id,
                    data.overrides.clone(),
                    None,
                    request_context,
                );
            }
            request.extensions_mut().insert(Authz(Arc::new(data)));
            Ok(next.run(request).await)
        }
        Err(err) => {
            if is_override_denial(&err) && !hints.is_empty() {
                let effective_uid = err
                    .denied_data()
                    .map(|d| d.user.uid.clone())
                    .or_else(|| hints.uid.clone());
                let overrides = err
                    .denied_data()
                    .map(|d| d.overrides.clone())
                    .or_else(|| {
                        OverrideRequest::from_hints(&hints)
                            .ok()
                            .map(|r| r.applied())
                    })
                    .unwrap_or_default();
                audit_override(
                    &state,
                    "denied",
                    &authn.user,
                    effective_uid,
                    course_id,
                    course_instance_id,
                    overrides,
                    Some(err.kind()),
                    request_context,
                );
            }
            Err(err.into())
        }
    }
}

fn path_uuid(params: &HashMap<String, String>, name: &str) -> Result<Option<Uuid>, AppError> {
    match params.get(name) {
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("{name} is not a valid id"))),
        None => Ok(None),
    }
}

/// Collects the override hint cookies into the engine's transport-neutral
/// hint map.
pub fn override_hints(headers: &HeaderMap) -> OverrideHints {
    OverrideHints {
        uid: cookie_value(headers, COOKIE_REQUESTED_UID),
        course_role: cookie_value(headers, COOKIE_REQUESTED_COURSE_ROLE),
        course_instance_role: cookie_value(headers, COOKIE_REQUESTED_COURSE_INSTANCE_ROLE),
        mode: cookie_value(headers, COOKIE_REQUESTED_MODE),
        date: cookie_value(headers, COOKIE_REQUESTED_DATE),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Audit payload for effective-user changes. Always logged at critical
/// severity, grant or denial alike.
#[derive(Debug, Clone, Serialize)]
struct EffectiveUserAudit {
    authn_user_id: Uuid,
    authn_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    course_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    course_instance_id: Option<Uuid>,
    overrides: Vec<AppliedOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denial: Option<&'static str>,
}

impl Loggable for EffectiveUserAudit {
    fn entity_type() -> &'static str {
        "effective_user"
    }

    fn subject_id(&self) -> Uuid {
        self.authn_user_id
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn severity_for_action(&self, _action: &str) -> Severity {
        Severity::Critical
    }
}

#[allow(clippy::too_many_arguments)]
fn audit_override(
    state: &AppState,
    action: &str,
    authn_user: &User,
    effective_uid: Option<String>,
    course_id: Option<Uuid>,
    course_instance_id: Option<Uuid>,
    overrides: Vec<AppliedOverride>,
    denial: Option<&'static str>,
    context: RequestContext,
) {
    let audit = EffectiveUserAudit {
        authn_user_id: authn_user.id,
        authn_uid: authn_user.uid.clone(),
        effective_uid,
        course_id,
        course_instance_id,
        overrides,
        denial,
    };
    log_activity_with_context(
        &state.event_bus,
        action,
        Some(authn_user.id),
        &audit,
        None,
        Some(context),
    );
}

fn is_override_denial(err: &AuthzError) -> bool {
    matches!(
        err,
        AuthzError::OverrideForbidden
            | AuthzError::UserNotFound { .. }
            | AuthzError::OverrideEscalationDenied { .. }
            | AuthzError::OverrideAccessDenied { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    #[test]
    fn cookies_map_onto_hints() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            "lt_requested_uid=ta@example.edu; lt_requested_course_role=Viewer; other=1"
                .parse()
                .unwrap(),
        );

        let hints = override_hints(&headers);
        assert_eq!(hints.uid.as_deref(), Some("ta@example.edu"));
        assert_eq!(hints.course_role.as_deref(), Some("Viewer"));
        assert_eq!(hints.course_instance_role, None);
        assert_eq!(hints.mode, None);
        assert_eq!(hints.date, None);
    }

    #[test]
    fn absent_cookie_header_means_no_hints() {
        let headers = HeaderMap::new();
        assert!(override_hints(&headers).is_empty());
    }

    #[test]
    fn cookie_values_keep_embedded_equals_signs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            "lt_requested_date=2026-03-02T10:00:00Z; lt_requested_uid=a=b"
                .parse()
                .unwrap(),
        );
        let hints = override_hints(&headers);
        assert_eq!(hints.date.as_deref(), Some("2026-03-02T10:00:00Z"));
        assert_eq!(hints.uid.as_deref(), Some("a=b"));
    }
}
