//! Integration tests for the clp-server HTTP API
//!
//! Drives the full router with `oneshot` over the local backends:
//! - Auth: login, signup validation and duplicates, logout
//! - Role guards on teacher, dean and admin routes
//! - Teacher drafting, submission and dean review with notifications
//! - Admin user approval, template, departments and prompts

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use clp_common::config::TEMPLATE_KEY;
use clp_common::models::{ClpStatus, Role};
use clp_server::backend::{BackendError, BackendResult, LocalObjectStore, ObjectStore};
use clp_server::docx;
use common::*;
use serde_json::json;
use tower::util::ServiceExt;

// =============================================================================
// Health and auth
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new().await;
    let (status, body) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "clp-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_index_reports_session_state() {
    let app = TestApp::new().await;
    let (_, body) = app.send(get("/", None)).await;
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["home"], "/login");

    let (_, cookie) = app.user_session("anacruz", Role::Teacher).await;
    let (_, body) = app.send(get("/", Some(&cookie))).await;
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_login_outcomes() {
    let app = TestApp::new().await;
    app.create_user("pending1", Role::Teacher, false).await;
    app.create_user("active1", Role::Dean, true).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "active1@school.edu", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid email or password.");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "pending1@school.edu", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Your account is pending approval.");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "active1@school.edu", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful!");
    assert_eq!(body["role"], "dean");
    assert_eq!(body["home"], "/dean/courses");
}

#[tokio::test]
async fn test_signup_creates_pending_teacher() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(json_request(
            "POST",
            "/signup",
            None,
            json!({
                "first_name": "Ben",
                "last_name": "Reyes",
                "username": "benreyes",
                "email": "ben@school.edu",
                "title": "LPT",
                "password": "longenough",
                "confirm_password": "longenough",
                "department": IT_DEPARTMENT,
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["message"],
        "Registration successful! Your account is pending administrator approval."
    );

    // Unapproved accounts cannot log in yet
    let (status, _) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "ben@school.edu", "password": "longenough" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/signup",
            None,
            json!({
                "first_name": "Ben",
                "last_name": "Other",
                "username": "benreyes",
                "email": "other@school.edu",
                "password": "longenough",
                "confirm_password": "longenough",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Username or email already exists."));
}

#[tokio::test]
async fn test_signup_validation_collects_every_error() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(json_request(
            "POST",
            "/signup",
            None,
            json!({
                "first_name": "",
                "last_name": "Reyes",
                "username": "1ab",
                "email": "not-an-email",
                "password": "short",
                "confirm_password": "different",
                "department": "Department of Astrology",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let details: Vec<String> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_str().unwrap().to_string())
        .collect();
    assert!(details.contains(&"Error in First Name: This field is required.".to_string()));
    assert!(details.contains(&"Error in Email: Invalid email address.".to_string()));
    assert!(details.contains(&"Error in Confirm Password: Passwords must match.".to_string()));
    assert!(details.contains(&"Error in Department: Not a valid choice.".to_string()));
    assert!(details.iter().any(|d| d.starts_with("Error in Username:")));
    assert!(details.iter().any(|d| d.starts_with("Error in Password:")));
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;
    for (uri, cookie) in [("/login", None), ("/admin/departments", Some(admin.as_str()))] {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder.body(axum::body::Body::from("{not json")).unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "BAD_REQUEST", "{}", uri);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON body:"));
    }
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new().await;
    let (_, cookie) = app.user_session("anacruz", Role::Teacher).await;
    let response = app
        .router
        .clone()
        .oneshot(post_empty("/logout", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));
}

// =============================================================================
// Role guards and dashboard
// =============================================================================

#[tokio::test]
async fn test_login_required_and_role_guards() {
    let app = TestApp::new().await;
    let (status, body) = app.send(get("/teacher/my_clps", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "You must be logged in to view this page.");

    let (_, teacher) = app.user_session("anacruz", Role::Teacher).await;
    let (status, _) = app.send(get("/admin/dashboard", Some(&teacher))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(get("/dean/courses", Some(&teacher))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, dean) = app.user_session("deanlee", Role::Dean).await;
    let (status, _) = app.send(get("/teacher/my_clps", Some(&dean))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(get("/teacher/all_clps", Some(&dean))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_home_per_role() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;
    let (status, body) = app.send(get("/dashboard", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["home"], "/admin/dashboard");
    assert_eq!(body["unread_count"], 0);
}

// =============================================================================
// Teacher and dean workflow
// =============================================================================

#[tokio::test]
async fn test_upload_submit_review_cycle() {
    let app = TestApp::new().await;
    let (teacher_id, teacher) = app.user_session("anacruz", Role::Teacher).await;
    let (dean_id, dean) = app.user_session("deanlee", Role::Dean).await;

    // Text draft
    let (status, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[
                ("department", IT_DEPARTMENT),
                ("subject", "Human Computer Interaction"),
                ("content", "Week 1: Introduction"),
            ],
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Your CLP content has been saved as a draft!");
    assert_eq!(body["plan"]["upload_type"], "manual_text");
    assert_eq!(body["plan"]["status"], "draft");
    let plan_id = body["plan"]["id"].as_i64().unwrap();

    let (_, body) = app.send(get("/teacher/my_clps", Some(&teacher))).await;
    assert_eq!(body["plans"].as_array().unwrap().len(), 1);

    // Submit: every approved dean is notified
    let uri = format!("/teacher/submit_to_dean/{}", plan_id);
    let (status, body) = app.send(post_empty(&uri, Some(&teacher))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "CLP for \"Human Computer Interaction\" submitted to Dean for review."
    );
    let dean_notes = app.backends().store.list_notifications(&dean_id).await.unwrap();
    assert_eq!(dean_notes.len(), 1);
    assert_eq!(
        dean_notes[0].message,
        "New CLP for \"Human Computer Interaction\" from anacruz needs review."
    );

    // Pending plans are locked
    let (status, body) = app.send(post_empty(&uri, Some(&teacher))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "This plan is already pending or has been approved."
    );
    let (status, _) = app
        .send(get(&format!("/teacher/clp/{}/edit", plan_id), Some(&teacher)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, body) = app
        .send(post_empty(&format!("/teacher/clp/{}/delete", plan_id), Some(&teacher)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "Cannot delete a plan that is currently \"pending\"."
    );

    // Dean returns it with comments
    let review_uri = format!("/dean/review_clp/{}", plan_id);
    let (status, body) = app.send(get(&review_uri, Some(&dean))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["program_outcomes"].as_array().unwrap().len(), 13);
    assert_eq!(body["institutional_headers"].as_array().unwrap().len(), 7);

    let (status, _) = app
        .send(json_request(
            "POST",
            &review_uri,
            Some(&dean),
            json!({ "action": "return", "comments": "Add references" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let plan = app.backends().store.get_plan(plan_id).await.unwrap().unwrap();
    assert_eq!(plan.status, ClpStatus::ReturnedForRevision);
    assert_eq!(plan.dean_comments.as_deref(), Some("Add references"));

    let notes = app.backends().store.list_notifications(&teacher_id).await.unwrap();
    assert_eq!(
        notes[0].message,
        "Your CLP for \"Human Computer Interaction\" has been RETURNED. Comments: Add references"
    );

    // Not pending anymore
    let (status, body) = app.send(get(&review_uri, Some(&dean))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "This plan is not pending review.");

    // Resubmission clears the comments, approval notifies the author
    app.send(post_empty(&uri, Some(&teacher))).await;
    let plan = app.backends().store.get_plan(plan_id).await.unwrap().unwrap();
    assert_eq!(plan.status, ClpStatus::Pending);
    assert_eq!(plan.dean_comments, None);

    let (status, _) = app
        .send(json_request("POST", &review_uri, Some(&dean), json!({ "action": "approve" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let notes = app.backends().store.list_notifications(&teacher_id).await.unwrap();
    assert_eq!(
        notes[0].message,
        "Your CLP for \"Human Computer Interaction\" has been APPROVED by the Dean."
    );

    let (_, body) = app.send(get("/teacher/all_clps", Some(&teacher))).await;
    assert_eq!(body["plans"].as_array().unwrap().len(), 1);
    assert_eq!(body["plans"][0]["author"]["username"], "anacruz");
}

#[tokio::test]
async fn test_file_upload_download_and_edit() {
    let app = TestApp::new().await;
    let (teacher_id, teacher) = app.user_session("anacruz", Role::Teacher).await;

    let (status, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[("department", IT_DEPARTMENT), ("subject", "Networking")],
            Some(("file", "My Plan.docx", b"first version".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Your CLP file has been uploaded as a draft!");
    let plan_id = body["plan"]["id"].as_i64().unwrap();
    let stored = body["plan"]["filename"].as_str().unwrap().to_string();
    assert!(stored.starts_with(&format!("{}/", teacher_id)));
    assert!(stored.ends_with("_My_Plan.docx"));

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/teacher/clp/{}/download", plan_id), Some(&teacher)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"My_Plan.docx\""
    );

    // Replacing the content with text drops the file
    let (status, body) = app
        .send(multipart_request(
            &format!("/teacher/clp/{}/edit", plan_id),
            &teacher,
            &[
                ("department", IT_DEPARTMENT),
                ("subject", "Networking 2"),
                ("content", "Rewritten outline"),
            ],
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Plan updated successfully!");
    let plan = app.backends().store.get_plan(plan_id).await.unwrap().unwrap();
    assert_eq!(plan.subject, "Networking 2");
    assert_eq!(plan.filename, None);
    assert_eq!(plan.content.as_deref(), Some("Rewritten outline"));
    assert!(app.backends().objects.download(&stored).await.is_err());

    let (status, body) = app
        .send(get(&format!("/teacher/clp/{}/download", plan_id), Some(&teacher)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"]["message"],
        "This plan does not have a downloadable file."
    );

    let (status, body) = app
        .send(post_empty(&format!("/teacher/clp/{}/delete", plan_id), Some(&teacher)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Your Course Learning Plan has been deleted.");
    assert!(app.backends().store.get_plan(plan_id).await.unwrap().is_none());
}

/// Object store refusing uploads of files named `broken.docx`
struct RejectingStore(LocalObjectStore);

#[async_trait]
impl ObjectStore for RejectingStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> BackendResult<()> {
        if path.ends_with("broken.docx") {
            return Err(BackendError::Service {
                status: 503,
                message: "storage unavailable".to_string(),
            });
        }
        self.0.upload(path, bytes, content_type, upsert).await
    }

    async fn download(&self, path: &str) -> BackendResult<Vec<u8>> {
        self.0.download(path).await
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        self.0.remove(paths).await
    }
}

#[tokio::test]
async fn test_replacement_file_swaps_only_after_upload() {
    let app = TestApp::with_object_store(|objects| Arc::new(RejectingStore(objects))).await;
    let (_, teacher) = app.user_session("anacruz", Role::Teacher).await;
    let (status, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[("department", IT_DEPARTMENT), ("subject", "Networking")],
            Some(("file", "plan.docx", b"first version".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan_id = body["plan"]["id"].as_i64().unwrap();
    let first = body["plan"]["filename"].as_str().unwrap().to_string();
    let edit_uri = format!("/teacher/clp/{}/edit", plan_id);
    let fields = [("department", IT_DEPARTMENT), ("subject", "Networking")];

    let (status, _) = app
        .send(multipart_request(
            &edit_uri,
            &teacher,
            &fields,
            Some(("file", "broken.docx", b"second version".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let plan = app.backends().store.get_plan(plan_id).await.unwrap().unwrap();
    assert_eq!(plan.filename.as_deref(), Some(first.as_str()));
    assert_eq!(app.backends().objects.download(&first).await.unwrap(), b"first version");

    let (status, _) = app
        .send(multipart_request(
            &edit_uri,
            &teacher,
            &fields,
            Some(("file", "fixed.docx", b"third version".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let plan = app.backends().store.get_plan(plan_id).await.unwrap().unwrap();
    let current = plan.filename.unwrap();
    assert!(current.ends_with("_fixed.docx"));
    assert_eq!(app.backends().objects.download(&current).await.unwrap(), b"third version");
    assert!(app.backends().objects.download(&first).await.is_err());
}

#[tokio::test]
async fn test_upload_rejections() {
    let app = TestApp::new().await;
    let (_, teacher) = app.user_session("anacruz", Role::Teacher).await;

    let (status, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[("department", IT_DEPARTMENT), ("subject", "Networking")],
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Please provide either content or upload a file."
    );

    let (status, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[("department", IT_DEPARTMENT), ("subject", "Networking")],
            Some(("file", "plan.exe", b"MZ".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"][0],
        "Error in File: Only .docx and .pdf files are allowed!"
    );
}

#[tokio::test]
async fn test_plans_are_private_to_their_author() {
    let app = TestApp::new().await;
    let (_, owner) = app.user_session("anacruz", Role::Teacher).await;
    let (_, other) = app.user_session("benreyes", Role::Teacher).await;

    let (_, body) = app
        .send(multipart_request(
            "/teacher/courses/upload",
            &owner,
            &[("department", IT_DEPARTMENT), ("subject", "Databases"), ("content", "x")],
            None,
        ))
        .await;
    let plan_id = body["plan"]["id"].as_i64().unwrap();

    let (status, _) = app
        .send(get(&format!("/teacher/clp/{}", plan_id), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .send(post_empty(
            &format!("/teacher/clp/{}/delete_approved", plan_id),
            Some(&other),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "You do not have permission to delete this plan.");

    let (status, _) = app.send(get("/teacher/clp/9999", Some(&owner))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notifications_lifecycle() {
    let app = TestApp::new().await;
    let (teacher_id, teacher) = app.user_session("anacruz", Role::Teacher).await;
    let store = &app.backends().store;
    store.insert_notification(&teacher_id, "first").await.unwrap();
    store.insert_notification(&teacher_id, "second").await.unwrap();

    let (_, body) = app.send(get("/check_notifications", Some(&teacher))).await;
    assert_eq!(body["unread_count"], 2);

    let (_, body) = app.send(get("/notifications", Some(&teacher))).await;
    let notes = body["notifications"].as_array().unwrap();
    assert_eq!(notes[0]["message"], "second");
    let first_id = notes[1]["id"].as_i64().unwrap();

    app.send(post_empty(
        &format!("/notifications/mark_read/{}", first_id),
        Some(&teacher),
    ))
    .await;
    let (_, body) = app.send(post_empty("/notifications/delete_read", Some(&teacher))).await;
    assert_eq!(body["deleted"], 1);

    app.send(post_empty("/notifications/mark_all_read", Some(&teacher))).await;
    let (_, body) = app.send(get("/check_notifications", Some(&teacher))).await;
    assert_eq!(body["unread_count"], 0);
    let (_, body) = app.send(get("/notifications", Some(&teacher))).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new().await;
    let (_, teacher) = app.user_session("anacruz", Role::Teacher).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/teacher/profile",
            Some(&teacher),
            json!({ "new_password": "short", "confirm_new_password": "other" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/teacher/profile",
            Some(&teacher),
            json!({ "new_password": "brand-new-pass", "confirm_new_password": "brand-new-pass" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Your password has been changed successfully.");

    let (status, _) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "anacruz@school.edu", "password": "brand-new-pass" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Admin
// =============================================================================

#[tokio::test]
async fn test_admin_user_approval() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;
    let pending_id = app.create_user("newdean", Role::Teacher, false).await;
    let doomed_id = app.create_user("spammer", Role::Teacher, false).await;

    let (_, body) = app.send(get("/admin/dashboard", Some(&admin))).await;
    assert_eq!(body["pending_users"].as_array().unwrap().len(), 2);
    assert_eq!(body["approved_users"].as_array().unwrap().len(), 0);

    let (status, _) = app
        .send(json_request(
            "POST",
            "/admin/approve_user",
            Some(&admin),
            json!({ "user_id": pending_id, "role": "admin" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/admin/approve_user",
            Some(&admin),
            json!({ "user_id": pending_id, "role": "dean", "assigned_department": "" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User newdean has been approved and assigned.");
    let user = app.backends().store.get_user(&pending_id).await.unwrap().unwrap();
    assert!(user.approved);
    assert_eq!(user.role, "dean");
    assert_eq!(user.assigned_department, None);

    let uri = format!("/admin/disapprove/{}", doomed_id);
    let (status, body) = app.send(post_empty(&uri, Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "User profile for spammer has been disapproved and removed."
    );
    let (status, body) = app.send(post_empty(&uri, Some(&admin))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "User profile not found or already removed.");
}

#[tokio::test]
async fn test_admin_template_management() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;

    let (status, body) = app.send(get("/admin/template", Some(&admin))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Template file not found in storage.");

    let template = docx::build_document("Prepared by {{NAME}}\n\nSubject: {{subject}} {{NAME}}").unwrap();
    let (status, body) = app
        .send(multipart_request(
            "/admin/template/upload",
            &admin,
            &[],
            Some(("file", "template.docx", template.as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "New template uploaded successfully!");

    let (status, body) = app.send(get("/admin/template", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], TEMPLATE_KEY);
    assert_eq!(body["placeholders"], json!(["NAME", "subject"]));
    assert!(body["preview_html"].as_str().unwrap().contains("Prepared by"));

    let (status, _) = app
        .send(multipart_request(
            "/admin/template/upload",
            &admin,
            &[],
            Some(("file", "template.pdf", b"%PDF".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request("PUT", "/admin/template", Some(&admin), json!({ "content": "  short  " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/admin/template",
            Some(&admin),
            json!({ "content": "Course: {{course_title}}\n\nUnits: {{units}}" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = app.backends().objects.download(TEMPLATE_KEY).await.unwrap();
    let names = docx::extract_placeholders(&stored).unwrap();
    assert!(names.contains("course_title"));
    assert!(names.contains("units"));

    let response = app
        .router
        .clone()
        .oneshot(get("/admin/template/download", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"CLP_Template.docx\""
    );

    let (status, body) = app.send(get("/admin/template/editor", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["editorConfig"]["mode"], "edit");
    assert_eq!(body["config"]["document"]["title"], "CLP_Template.docx");
}

#[tokio::test]
async fn test_corrupt_template_uploads_and_storage() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;

    // A broken upload is the client's fault
    let (status, body) = app
        .send(multipart_request(
            "/admin/template/upload",
            &admin,
            &[],
            Some(("file", "template.docx", b"not a zip archive".as_slice())),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Could not process document:"));

    // A broken stored template is the server's
    app.backends()
        .objects
        .upload(TEMPLATE_KEY, b"garbage".to_vec(), "application/octet-stream", true)
        .await
        .unwrap();
    let (status, body) = app.send(get("/admin/template", Some(&admin))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_admin_departments() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;

    let (_, body) = app.send(get("/admin/departments", Some(&admin))).await;
    assert_eq!(body["departments"].as_array().unwrap().len(), 4);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/admin/departments",
            Some(&admin),
            json!({ "name": "Department of Nursing" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["department"]["id"].as_i64().unwrap();

    let (status, _) = app
        .send(json_request(
            "POST",
            "/admin/departments",
            Some(&admin),
            json!({ "name": "Department of Nursing" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let delete = |id: i64| {
        axum::http::Request::builder()
            .method("DELETE")
            .uri(format!("/admin/departments/{}", id))
            .header(header::COOKIE, admin.as_str())
            .body(axum::body::Body::empty())
            .unwrap()
    };
    let (status, _) = app.send(delete(id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(delete(id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_prompts() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_session("rootadmin", Role::Admin).await;

    let (_, body) = app.send(get("/admin/prompts", Some(&admin))).await;
    let prompts = body["prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts.iter().all(|p| p["customized"] == false));

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/admin/prompts/weekly_breakdown",
            Some(&admin),
            json!({ "template": "No subject token here" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/admin/prompts/weekly_breakdown",
            Some(&admin),
            json!({ "template": "Plan 18 weeks of {{subject_name}}." }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(get("/admin/prompts", Some(&admin))).await;
    let weekly = body["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["kind"] == "weekly_breakdown")
        .unwrap()
        .clone();
    assert_eq!(weekly["customized"], true);
    assert_eq!(weekly["template"], "Plan 18 weeks of {{subject_name}}.");

    let reset = axum::http::Request::builder()
        .method("DELETE")
        .uri("/admin/prompts/weekly_breakdown")
        .header(header::COOKIE, admin.as_str())
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = app.send(reset).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/admin/prompts/summary",
            Some(&admin),
            json!({ "template": "{{subject_name}}" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
