use std::sync::Arc;

use uuid::Uuid;

use crate::config::DeploymentConfig;
use crate::models::roles::MaxAccessLevel;
use crate::models::user::User;

use super::clamp;
use super::context::AccessContext;
use super::data::{AppliedOverride, AuthzData};
use super::error::AuthzError;
use super::override_request::{OverrideHints, OverrideRequest};
use super::scope::ScopeKey;
use super::store::{IdentityStore, PermissionStore, ResolveParams, ResolvedAccess};

const RESET_HINT: &str =
    "To reset the effective user, clear the effective-user overrides with DELETE /effective-user.";

/// Resolves the authorization context for one request.
///
/// The pipeline is a straight sequence of fallible steps: validate the
/// scope, resolve the authenticated identity's access, parse the override
/// hints, and either take the fast path or clamp, re-resolve and validate
/// the candidate effective identity. Each step only sees the previous
/// step's output; nothing is mutated in place and nothing escapes half
/// built. The stores and the deployment config are fixed at construction.
pub struct AuthzEngine {
    permissions: Arc<dyn PermissionStore>,
    identities: Arc<dyn IdentityStore>,
    config: DeploymentConfig,
}

impl AuthzEngine {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        identities: Arc<dyn IdentityStore>,
        config: DeploymentConfig,
    ) -> Self {
        Self {
            permissions,
            identities,
            config,
        }
    }

    pub async fn resolve(
        &self,
        authn_user: &User,
        course_id: Option<Uuid>,
        course_instance_id: Option<Uuid>,
        context: &AccessContext,
        hints: &OverrideHints,
    ) -> Result<AuthzData, AuthzError> {
        let scope = ScopeKey::from_params(course_id, course_instance_id)?;
        tracing::debug!(
            user_id = %authn_user.id,
            scope = ?scope,
            "resolving authorization context"
        );

        let authn_params = ResolveParams {
            user_id: authn_user.id,
            is_administrator: authn_user.is_administrator,
            requested_course_role: None,
            requested_course_instance_role: None,
            scope,
            req_date: context.req_date,
            ip: context.ip.clone(),
            forced_mode: context.forced_mode,
        };
        let authn = self
            .permissions
            .resolve(&authn_params)
            .await?
            .ok_or(AuthzError::BaseAccessDenied)?;

        let request = OverrideRequest::from_hints(hints)?;
        let level = self.config.max_access_level;

        if request.is_empty() && !level.is_restrictive() {
            tracing::debug!(user_id = %authn_user.id, "no overrides requested, fast path");
            return Ok(AuthzData::base(authn_user.clone(), authn));
        }

        // An explicit hint is an attempt to change the effective user and
        // needs course edit permission. A restrictive clamp alone is not an
        // attempt, so it skips this gate.
        if !request.is_empty() && !authn.permissions.has_course_permission_edit() {
            tracing::debug!(
                user_id = %authn_user.id,
                "override requested without course edit permission"
            );
            return Err(AuthzError::OverrideForbidden);
        }

        let overrides = request.applied();

        let user = match &request.uid {
            Some(uid) => match self.identities.lookup_by_uid(uid).await? {
                Some(user) => user,
                None => {
                    tracing::debug!(uid = %uid, "requested effective user does not exist");
                    return Err(AuthzError::UserNotFound {
                        uid: uid.clone(),
                        info: user_not_found_info(uid, &overrides),
                    });
                }
            },
            None => authn_user.clone(),
        };

        // A non-admin may never act as an admin, whatever the clamp would
        // strip afterwards.
        if user.is_administrator && !authn_user.is_administrator {
            tracing::debug!(
                authn_user_id = %authn_user.id,
                effective_user_id = %user.id,
                "override names an administrator"
            );
            let info = escalation_info(
                "an administrator, while you are not an administrator",
                &overrides,
            );
            return Err(AuthzError::OverrideEscalationDenied {
                info,
                denied: Box::new(AuthzData::denied(authn_user.clone(), &authn, user, overrides)),
            });
        }

        let clamped = clamp::apply(level, user.is_administrator, &request);
        if level.is_restrictive() {
            tracing::debug!(level = %level, "max access level clamp applied");
        }

        let force = self.config.auth_type.permits_mode_forcing();
        let candidate_params = ResolveParams {
            user_id: user.id,
            is_administrator: clamped.is_administrator,
            requested_course_role: clamped.course_role,
            requested_course_instance_role: clamped.course_instance_role,
            scope,
            req_date: match request.date {
                Some(date) if force => date,
                _ => context.req_date,
            },
            ip: context.ip.clone(),
            forced_mode: match request.mode {
                Some(mode) if force => Some(mode),
                _ => context.forced_mode,
            },
        };

        let Some(candidate) = self.permissions.resolve(&candidate_params).await? else {
            tracing::debug!(
                effective_user_id = %user.id,
                "effective user has no access to the scope"
            );
            let info = if overrides.is_empty() {
                clamp_denied_info(level, &authn)
            } else {
                access_denied_info(&user, &authn, &overrides)
            };
            return Err(AuthzError::OverrideAccessDenied {
                info,
                denied: Box::new(AuthzData::denied(authn_user.clone(), &authn, user, overrides)),
            });
        };

        let violation = if candidate.permissions.has_course_permission_own()
            && !authn.permissions.has_course_permission_own()
        {
            Some("an owner of this course, while you are not an owner")
        } else if candidate.permissions.has_course_instance_permission_view()
            && !authn.permissions.has_course_instance_permission_view()
        {
            Some("one who can view student data in this course instance, while you cannot")
        } else if candidate.permissions.has_course_instance_permission_edit()
            && !authn.permissions.has_course_instance_permission_edit()
        {
            Some("one who can edit student data in this course instance, while you cannot")
        } else {
            None
        };

        if let Some(change) = violation {
            tracing::debug!(
                authn_user_id = %authn_user.id,
                effective_user_id = %user.id,
                change,
                "override would escalate privileges"
            );
            let info = escalation_info(change, &overrides);
            return Err(AuthzError::OverrideEscalationDenied {
                info,
                denied: Box::new(AuthzData::denied(authn_user.clone(), &authn, user, overrides)),
            });
        }

        tracing::debug!(
            authn_user_id = %authn_user.id,
            effective_user_id = %user.id,
            "override granted"
        );
        Ok(AuthzData::overridden(
            authn_user.clone(),
            &authn,
            user,
            candidate,
            overrides,
        ))
    }
}

fn overrides_block(overrides: &[AppliedOverride]) -> String {
    overrides
        .iter()
        .map(|o| format!("{} = {}", o.name, o.value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn scope_display(authn: &ResolvedAccess) -> String {
    match &authn.course_instance {
        Some(instance) => format!(
            "course instance {} ({})",
            instance.short_name, instance.long_name
        ),
        None => format!("course {} ({})", authn.course.short_name, authn.course.title),
    }
}

fn escalation_info(change: &str, overrides: &[AppliedOverride]) -> String {
    format!(
        "You have tried to change the effective user to {change}. \
         The following overrides were requested:\n\n{}\n\n{RESET_HINT}",
        overrides_block(overrides)
    )
}

fn user_not_found_info(uid: &str, overrides: &[AppliedOverride]) -> String {
    format!(
        "No user with UID {uid} exists. \
         The following overrides were requested:\n\n{}\n\n{RESET_HINT}",
        overrides_block(overrides)
    )
}

fn access_denied_info(
    user: &User,
    authn: &ResolvedAccess,
    overrides: &[AppliedOverride],
) -> String {
    format!(
        "The effective user {} ({}) does not have access to {}. \
         The following overrides were requested:\n\n{}\n\n{RESET_HINT}",
        user.uid,
        user.name,
        scope_display(authn),
        overrides_block(overrides)
    )
}

fn clamp_denied_info(level: MaxAccessLevel, authn: &ResolvedAccess) -> String {
    format!(
        "You are restricted to the {level} access level, which does not have access to {}.",
        scope_display(authn)
    )
}
