//! Authorization-context resolution.
//!
//! Given the authenticated user, a course or course-instance scope and an
//! optional set of effective-user override hints, the engine computes the
//! permission set governing the request:
//! - ordered course and course-instance roles with derived permission flags
//! - an override path that lets privileged staff act as another user, a
//!   lower role, a different mode or a different date, but never gain
//!   privilege the real login does not hold
//! - a deployment-wide access ceiling (unrestricted/instructor/student)
//! - denial diagnostics that enumerate every requested override
//!
//! The engine is pure with respect to process state: it reads the stores,
//! writes nothing, and returns one immutable [`AuthzData`] per request.

mod clamp;
mod context;
mod data;
mod engine;
mod error;
mod middleware;
mod override_request;
mod scope;
mod store;

pub use context::AccessContext;
pub use data::{AppliedOverride, AuthzData, AuthzView, PermissionFlags, PermissionSet};
pub use engine::AuthzEngine;
pub use error::AuthzError;
pub use middleware::{override_hints, resolve_course_context, Authz};
pub use override_request::{
    OverrideHints, OverrideRequest, COOKIE_REQUESTED_COURSE_INSTANCE_ROLE,
    COOKIE_REQUESTED_COURSE_ROLE, COOKIE_REQUESTED_DATE, COOKIE_REQUESTED_MODE,
    COOKIE_REQUESTED_UID, OVERRIDE_COOKIES,
};
pub use scope::ScopeKey;
pub use store::{IdentityStore, PermissionStore, ResolveParams, ResolvedAccess, SqlAuthzStore};
