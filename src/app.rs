use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{resolve_course_context, AuthzEngine, SqlAuthzStore};
use crate::config::DeploymentConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, courses, effective_user, health};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub authz: Arc<AuthzEngine>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus, authz: AuthzEngine) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
            authz: Arc::new(authz),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let deployment = DeploymentConfig::from_env()?;

    let store = Arc::new(SqlAuthzStore::new(pool.clone()));
    let engine = AuthzEngine::new(store.clone(), store, deployment);

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus, engine);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    // Everything under a course or course instance resolves the full
    // authorization context before the handler runs.
    let course_routes = Router::new()
        .route("/", get(courses::course_overview))
        .route("/settings", get(courses::course_settings))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_course_context,
        ));

    let course_instance_routes = Router::new()
        .route("/", get(courses::course_instance_overview))
        .route("/gradebook", get(courses::course_instance_gradebook))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_course_context,
        ));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/effective-user", get(effective_user::current_overrides))
        .route("/effective-user", post(effective_user::set_overrides))
        .route("/effective-user", delete(effective_user::clear_overrides))
        .nest("/auth", auth_routes)
        .nest("/courses/:course_id", course_routes)
        .nest("/course_instances/:course_instance_id", course_instance_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
