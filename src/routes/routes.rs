//! Defines routes for the bug tracker REST API and its live channel.
//!
//! ## Structure
//! - **Accounts**: `POST /register`, `POST /login/`
//! - **Projects**: `/projects/`, `/projects/{id}/`, plus the
//!   `add_member/` and `remove_member/` actions
//! - **Bugs**: `/bugs/`, `/bugs/my_bugs/`, `/bugs/{id}/`
//! - **Comments**: `/comments/`, `/comments/{id}/`
//! - **Activity**: `/activities/`, `/activities/{id}/` (read-only)
//! - **Live updates**: `GET /ws/project/{project_id}/` (websocket)
//!
//! Collection and detail paths keep their trailing slash.

use crate::{
    handlers::{
        account_handlers::{login, register},
        activity_handlers::{get_activity, list_activities},
        bug_handlers::{create_bug, delete_bug, get_bug, list_bugs, my_bugs, patch_bug, update_bug},
        comment_handlers::{
            create_comment, delete_comment, get_comment, list_comments, patch_comment,
            update_comment,
        },
        health_handlers::{healthz, readyz},
        project_handlers::{
            add_member, create_project, delete_project, get_project, list_projects, patch_project,
            remove_member, update_project,
        },
        ws_handlers::project_socket,
    },
    services::tracker_service::TrackerService,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`TrackerService`) to all handlers.
pub fn routes() -> Router<TrackerService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // accounts
        .route("/register", post(register))
        .route("/login/", post(login))
        // projects
        .route("/projects/", get(list_projects).post(create_project))
        .route(
            "/projects/{id}/",
            get(get_project)
                .put(update_project)
                .patch(patch_project)
                .delete(delete_project),
        )
        .route("/projects/{id}/add_member/", post(add_member))
        .route("/projects/{id}/remove_member/", delete(remove_member))
        // bugs
        .route("/bugs/", get(list_bugs).post(create_bug))
        .route("/bugs/my_bugs/", get(my_bugs))
        .route(
            "/bugs/{id}/",
            get(get_bug).put(update_bug).patch(patch_bug).delete(delete_bug),
        )
        // comments
        .route("/comments/", get(list_comments).post(create_comment))
        .route(
            "/comments/{id}/",
            get(get_comment)
                .put(update_comment)
                .patch(patch_comment)
                .delete(delete_comment),
        )
        // activity feed
        .route("/activities/", get(list_activities))
        .route("/activities/{id}/", get(get_activity))
        // live updates
        .route("/ws/project/{project_id}/", get(project_socket))
}
