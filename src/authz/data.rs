use serde::Serialize;
use utoipa::ToSchema;

use crate::models::course::{CourseInstanceSummary, CourseSummary};
use crate::models::roles::{AccessMode, CourseInstanceRole, CourseRole};
use crate::models::user::User;

use super::store::ResolvedAccess;

/// Roles a single identity holds at one scope, plus enrollment standing.
/// The permission flags are derived from the role ranks, so a higher role
/// implies every lower flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    pub course_role: CourseRole,
    pub course_instance_role: CourseInstanceRole,
    pub is_enrolled_with_access: bool,
}

impl PermissionSet {
    /// The all-None, no-access set used when zeroing denied effective state.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_course_permission_preview(&self) -> bool {
        self.course_role >= CourseRole::Previewer
    }

    pub fn has_course_permission_view(&self) -> bool {
        self.course_role >= CourseRole::Viewer
    }

    pub fn has_course_permission_edit(&self) -> bool {
        self.course_role >= CourseRole::Editor
    }

    pub fn has_course_permission_own(&self) -> bool {
        self.course_role >= CourseRole::Owner
    }

    pub fn has_course_instance_permission_view(&self) -> bool {
        self.course_instance_role >= CourseInstanceRole::StudentDataViewer
    }

    pub fn has_course_instance_permission_edit(&self) -> bool {
        self.course_instance_role >= CourseInstanceRole::StudentDataEditor
    }

    /// True when `self` grants nothing `other` does not also grant.
    pub fn is_subset_of(&self, other: &PermissionSet) -> bool {
        self.course_role <= other.course_role
            && self.course_instance_role <= other.course_instance_role
            && (!self.is_enrolled_with_access || other.is_enrolled_with_access)
    }
}

/// Flattened, serializable view of a [`PermissionSet`] for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PermissionFlags {
    pub course_role: CourseRole,
    pub has_course_permission_preview: bool,
    pub has_course_permission_view: bool,
    pub has_course_permission_edit: bool,
    pub has_course_permission_own: bool,
    pub course_instance_role: CourseInstanceRole,
    pub has_course_instance_permission_view: bool,
    pub has_course_instance_permission_edit: bool,
    pub is_enrolled_with_access: bool,
}

impl From<&PermissionSet> for PermissionFlags {
    fn from(set: &PermissionSet) -> Self {
        PermissionFlags {
            course_role: set.course_role,
            has_course_permission_preview: set.has_course_permission_preview(),
            has_course_permission_view: set.has_course_permission_view(),
            has_course_permission_edit: set.has_course_permission_edit(),
            has_course_permission_own: set.has_course_permission_own(),
            course_instance_role: set.course_instance_role,
            has_course_instance_permission_view: set.has_course_instance_permission_view(),
            has_course_instance_permission_edit: set.has_course_instance_permission_edit(),
            is_enrolled_with_access: set.is_enrolled_with_access,
        }
    }
}

/// One override hint that was present on the request, kept in the order the
/// hints are defined so denial diagnostics list them deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AppliedOverride {
    /// Display name used in diagnostics, e.g. "UID" or "Course role".
    #[schema(value_type = String, example = "UID")]
    pub name: &'static str,
    #[schema(example = "ta@example.edu")]
    pub value: String,
    /// Cookie the hint arrived in.
    #[schema(value_type = String, example = "lt_requested_uid")]
    pub cookie: &'static str,
}

/// The immutable authorization result for one request.
///
/// The authn side is computed once from the real login and never mutated.
/// The effective side defaults to the authn side and may be replaced, as a
/// whole, by a validated override. Constructed exactly once per request and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthzData {
    pub authn_user: User,
    pub authn_mode: AccessMode,
    pub authn_permissions: PermissionSet,
    pub user: User,
    pub mode: AccessMode,
    pub permissions: PermissionSet,
    pub override_active: bool,
    pub overrides: Vec<AppliedOverride>,
    pub course: CourseSummary,
    pub course_instance: Option<CourseInstanceSummary>,
}

impl AuthzData {
    /// Fast-path result: no override requested, effective mirrors authn.
    pub fn base(authn_user: User, authn: ResolvedAccess) -> Self {
        AuthzData {
            user: authn_user.clone(),
            authn_user,
            authn_mode: authn.mode,
            mode: authn.mode,
            authn_permissions: authn.permissions,
            permissions: authn.permissions,
            override_active: false,
            overrides: Vec::new(),
            course: authn.course,
            course_instance: authn.course_instance,
        }
    }

    /// Result of a granted override: the candidate side becomes effective.
    pub fn overridden(
        authn_user: User,
        authn: &ResolvedAccess,
        user: User,
        candidate: ResolvedAccess,
        overrides: Vec<AppliedOverride>,
    ) -> Self {
        AuthzData {
            authn_user,
            authn_mode: authn.mode,
            authn_permissions: authn.permissions,
            user,
            mode: candidate.mode,
            permissions: candidate.permissions,
            override_active: true,
            overrides,
            course: candidate.course,
            course_instance: candidate.course_instance,
        }
    }

    /// Terminal denial state: the effective side is explicitly zeroed so no
    /// stale authn-derived privilege survives in the reported result.
    pub fn denied(
        authn_user: User,
        authn: &ResolvedAccess,
        user: User,
        overrides: Vec<AppliedOverride>,
    ) -> Self {
        AuthzData {
            authn_user,
            authn_mode: authn.mode,
            authn_permissions: authn.permissions,
            user,
            mode: authn.mode,
            permissions: PermissionSet::none(),
            override_active: true,
            overrides,
            course: authn.course.clone(),
            course_instance: authn.course_instance.clone(),
        }
    }

    pub fn view(&self) -> AuthzView {
        AuthzView {
            authn_user: self.authn_user.clone(),
            user: self.user.clone(),
            authn_mode: self.authn_mode,
            mode: self.mode,
            override_active: self.override_active,
            overrides: self.overrides.clone(),
            authn_permissions: PermissionFlags::from(&self.authn_permissions),
            permissions: PermissionFlags::from(&self.permissions),
        }
    }
}

/// API-facing projection of [`AuthzData`].
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuthzView {
    pub authn_user: User,
    pub user: User,
    pub authn_mode: AccessMode,
    pub mode: AccessMode,
    pub override_active: bool,
    pub overrides: Vec<AppliedOverride>,
    pub authn_permissions: PermissionFlags,
    pub permissions: PermissionFlags,
}
