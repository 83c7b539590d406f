use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use lectern::create_app;

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");

    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

/// Registers over HTTP and returns (token, user id).
async fn register(app: &Router, uid: &str, name: &str) -> Result<(String, String)> {
    let payload = json!({"uid": uid, "name": name, "password": "password123"});
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?;

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    if status != StatusCode::CREATED {
        panic!("register failed: {} - {}", status, String::from_utf8_lossy(&bytes));
    }

    let v: Value = serde_json::from_slice(&bytes)?;
    let token = v["token"].as_str().context("missing token")?.to_string();
    let user_id = v["user"]["id"].as_str().context("missing user id")?.to_string();
    Ok((token, user_id))
}

async fn seed_course(pool: &SqlitePool) -> Result<(String, String)> {
    let course_id = Uuid::new_v4().to_string();
    let instance_id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO courses (id, short_name, title) VALUES (?, ?, ?)")
        .bind(&course_id)
        .bind("TAM 212")
        .bind("Introductory Dynamics")
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO course_instances (id, course_id, short_name, long_name) VALUES (?, ?, ?, ?)",
    )
    .bind(&instance_id)
    .bind(&course_id)
    .bind("Sp26")
    .bind("Spring 2026")
    .execute(pool)
    .await?;

    Ok((course_id, instance_id))
}

async fn grant_course_role(
    pool: &SqlitePool,
    user_id: &str,
    course_id: &str,
    role: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_permissions (id, user_id, course_id, course_role) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(course_id)
    .bind(role)
    .execute(pool)
    .await?;
    Ok(())
}

async fn grant_instance_role(
    pool: &SqlitePool,
    user_id: &str,
    instance_id: &str,
    role: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_instance_permissions (id, user_id, course_instance_id, course_instance_role) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(instance_id)
    .bind(role)
    .execute(pool)
    .await?;
    Ok(())
}

async fn enroll(pool: &SqlitePool, user_id: &str, instance_id: &str) -> Result<()> {
    sqlx::query("INSERT INTO enrollments (id, user_id, course_instance_id) VALUES (?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(instance_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn add_access_rule(
    pool: &SqlitePool,
    instance_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_instance_access_rules (id, course_instance_id, start_date, end_date) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(instance_id)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_authed(
    app: &Router,
    uri: &str,
    token: &str,
    cookie: Option<&str>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }

    let resp = app.clone().oneshot(builder.body(Body::empty())?).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, v))
}

#[tokio::test]
async fn editor_reaches_course_overview() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "editor@example.edu", "Course Editor").await?;
    grant_course_role(&pool, &user_id, &course_id, "Editor").await?;

    let (status, v) = get_authed(&app, &format!("/courses/{}", course_id), &token, None).await?;
    assert_eq!(status, StatusCode::OK, "got: {}", v);

    assert_eq!(v["course"]["short_name"].as_str(), Some("TAM 212"));
    let authz = &v["authz"];
    assert_eq!(authz["override_active"].as_bool(), Some(false));
    assert_eq!(authz["user"]["uid"].as_str(), Some("editor@example.edu"));
    assert_eq!(
        authz["permissions"]["has_course_permission_edit"].as_bool(),
        Some(true)
    );
    assert_eq!(
        authz["permissions"]["has_course_permission_own"].as_bool(),
        Some(false)
    );

    Ok(())
}

#[tokio::test]
async fn outsider_is_denied_without_detail() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, _) = register(&app, "outsider@example.edu", "No Role").await?;

    let (status, v) = get_authed(&app, &format!("/courses/{}", course_id), &token, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["message"].as_str(), Some("Access denied"));
    assert!(v.get("info").is_none(), "base denial carries no info: {}", v);

    Ok(())
}

#[tokio::test]
async fn unknown_course_is_denied() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "editor@example.edu", "Course Editor").await?;
    grant_course_role(&pool, &user_id, &course_id, "Editor").await?;

    let missing = Uuid::new_v4();
    let (status, v) = get_authed(&app, &format!("/courses/{}", missing), &token, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "got: {}", v);

    Ok(())
}

#[tokio::test]
async fn malformed_course_id_is_rejected() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (token, _) = register(&app, "editor@example.edu", "Course Editor").await?;

    let (status, v) = get_authed(&app, "/courses/not-a-uuid", &token, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = v["message"].as_str().unwrap_or("");
    assert!(message.contains("course_id is not a valid id"), "got: {}", message);

    Ok(())
}

#[tokio::test]
async fn viewer_cannot_use_override_cookies() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "viewer@example.edu", "Course Viewer").await?;
    grant_course_role(&pool, &user_id, &course_id, "Viewer").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/courses/{}", course_id),
        &token,
        Some("lt_requested_uid=someone@example.edu"),
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let message = v["message"].as_str().unwrap_or("");
    assert!(
        message.contains("insufficient permissions to change the effective user"),
        "got: {}",
        message
    );

    Ok(())
}

#[tokio::test]
async fn editor_cannot_escalate_to_owner() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "editor@example.edu", "Course Editor").await?;
    grant_course_role(&pool, &user_id, &course_id, "Editor").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/courses/{}", course_id),
        &token,
        Some("lt_requested_course_role=Owner"),
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let info = v["info"].as_str().unwrap_or("");
    assert!(info.contains("an owner of this course"), "got: {}", info);
    assert!(info.contains("Course role = Owner"), "got: {}", info);
    assert!(info.contains("/effective-user"), "got: {}", info);

    Ok(())
}

#[tokio::test]
async fn editor_cannot_act_as_a_student_data_viewer() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, instance_id) = seed_course(&pool).await?;
    let (token, editor_id) = register(&app, "editor@example.edu", "Course Editor").await?;
    grant_course_role(&pool, &editor_id, &course_id, "Editor").await?;

    let (_ta_token, ta_id) = register(&app, "ta@example.edu", "Teaching Assistant").await?;
    grant_instance_role(&pool, &ta_id, &instance_id, "StudentDataViewer").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        Some("lt_requested_uid=ta@example.edu"),
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN, "got: {}", v);
    let info = v["info"].as_str().unwrap_or("");
    assert!(
        info.contains("view student data in this course instance"),
        "got: {}",
        info
    );
    assert!(info.contains("UID = ta@example.edu"), "got: {}", info);

    Ok(())
}

#[tokio::test]
async fn student_data_viewer_cannot_request_the_editor_role() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, instance_id) = seed_course(&pool).await?;
    let (token, staff_id) = register(&app, "staff@example.edu", "Course Staff").await?;
    grant_course_role(&pool, &staff_id, &course_id, "Editor").await?;
    grant_instance_role(&pool, &staff_id, &instance_id, "StudentDataViewer").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        Some("lt_requested_course_instance_role=StudentDataEditor"),
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN, "got: {}", v);
    let info = v["info"].as_str().unwrap_or("");
    assert!(
        info.contains("edit student data in this course instance"),
        "got: {}",
        info
    );
    assert!(
        info.contains("Course instance role = StudentDataEditor"),
        "got: {}",
        info
    );

    Ok(())
}

#[tokio::test]
async fn editor_can_demote_to_viewer() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, _) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "editor@example.edu", "Course Editor").await?;
    grant_course_role(&pool, &user_id, &course_id, "Editor").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/courses/{}", course_id),
        &token,
        Some("lt_requested_course_role=Viewer"),
    )
    .await?;

    assert_eq!(status, StatusCode::OK, "got: {}", v);
    let authz = &v["authz"];
    assert_eq!(authz["override_active"].as_bool(), Some(true));
    assert_eq!(authz["permissions"]["course_role"].as_str(), Some("Viewer"));
    assert_eq!(
        authz["permissions"]["has_course_permission_edit"].as_bool(),
        Some(false)
    );
    // the real login keeps its own rank on the authn side
    assert_eq!(
        authz["authn_permissions"]["has_course_permission_edit"].as_bool(),
        Some(true)
    );
    assert_eq!(authz["overrides"][0]["name"].as_str(), Some("Course role"));

    Ok(())
}

#[tokio::test]
async fn enrolled_student_is_admitted_inside_the_window() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (_, instance_id) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "student@example.edu", "Enrolled Student").await?;
    enroll(&pool, &user_id, &instance_id).await?;

    let now = Utc::now();
    add_access_rule(
        &pool,
        &instance_id,
        Some(now - Duration::days(1)),
        Some(now + Duration::days(1)),
    )
    .await?;

    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK, "got: {}", v);
    assert_eq!(v["course_instance"]["short_name"].as_str(), Some("Sp26"));
    let authz = &v["authz"];
    assert_eq!(
        authz["permissions"]["is_enrolled_with_access"].as_bool(),
        Some(true)
    );
    assert_eq!(authz["permissions"]["course_role"].as_str(), Some("None"));

    Ok(())
}

#[tokio::test]
async fn enrolled_student_is_denied_outside_the_window() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (_, instance_id) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "student@example.edu", "Enrolled Student").await?;
    enroll(&pool, &user_id, &instance_id).await?;

    let now = Utc::now();
    add_access_rule(
        &pool,
        &instance_id,
        Some(now - Duration::days(30)),
        Some(now - Duration::days(1)),
    )
    .await?;

    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN, "got: {}", v);
    assert_eq!(v["message"].as_str(), Some("Access denied"));

    Ok(())
}

#[tokio::test]
async fn enrollment_without_any_rule_grants_nothing() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (_, instance_id) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "student@example.edu", "Enrolled Student").await?;
    enroll(&pool, &user_id, &instance_id).await?;

    let (status, _) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn course_staff_see_the_instance_but_not_the_gradebook() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (course_id, instance_id) = seed_course(&pool).await?;
    let (token, user_id) = register(&app, "viewer@example.edu", "Course Viewer").await?;
    grant_course_role(&pool, &user_id, &course_id, "Viewer").await?;

    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}", instance_id),
        &token,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "got: {}", v);

    let (status, _) = get_authed(
        &app,
        &format!("/course_instances/{}/gradebook", instance_id),
        &token,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a student-data role unlocks the gradebook
    grant_instance_role(&pool, &user_id, &instance_id, "StudentDataViewer").await?;
    let (status, v) = get_authed(
        &app,
        &format!("/course_instances/{}/gradebook", instance_id),
        &token,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        v["authz"]["permissions"]["has_course_instance_permission_view"].as_bool(),
        Some(true)
    );

    Ok(())
}
