//! Read-only access to the activity log.

use crate::models::{
    activity::ActivityLog,
    choices::ActivityAction,
    inputs::ActivityQuery,
    representations::ActivityRepr,
    user::User,
};
use crate::services::{
    tracker_service::{
        TrackerError, TrackerResult, TrackerService, ensure_valid, push_visible_project_ids,
    },
    validation::{FieldErrors, parse_id_filter},
};
use sqlx::{QueryBuilder, sqlite::Sqlite};

impl TrackerService {
    /// Entries for projects the user owns or belongs to, newest first.
    pub async fn list_activities(
        &self,
        user: &User,
        query: &ActivityQuery,
    ) -> TrackerResult<Vec<ActivityRepr>> {
        let mut errors = FieldErrors::new();
        let project = parse_id_filter(&mut errors, "project", query.project.as_deref());
        let action = match query.action.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<ActivityAction>() {
                Ok(action) => Some(action),
                Err(err) => {
                    errors.add("action", err.to_string());
                    None
                }
            },
            None => None,
        };
        ensure_valid(errors)?;

        let mut builder = visible_activity_query(user.id);
        if let Some(project) = project {
            builder.push(" AND a.project_id = ");
            builder.push_bind(project);
        }
        if let Some(action) = action {
            builder.push(" AND a.action = ");
            builder.push_bind(action.as_str());
        }
        builder.push(" ORDER BY a.created_at DESC, a.id DESC");

        let rows: Vec<ActivityLog> = builder.build_query_as().fetch_all(&*self.db).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for entry in &rows {
            entries.push(self.activity_repr(entry).await?);
        }
        Ok(entries)
    }

    pub async fn get_activity(&self, user: &User, id: i64) -> TrackerResult<ActivityRepr> {
        let mut builder = visible_activity_query(user.id);
        builder.push(" AND a.id = ");
        builder.push_bind(id);
        let entry = builder
            .build_query_as::<ActivityLog>()
            .fetch_optional(&*self.db)
            .await?
            .ok_or(TrackerError::NotFound("Activity"))?;
        self.activity_repr(&entry).await
    }
}

fn visible_activity_query(user_id: i64) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT a.id, a.project_id, a.bug_id, a.user_id, a.action, a.description, a.created_at \
         FROM activity_logs a WHERE a.project_id IN (",
    );
    push_visible_project_ids(&mut builder, user_id);
    builder.push(")");
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inputs::{BugInput, CommentInput, ProjectInput};
    use crate::services::testing::{memory_service, seed_user};

    async fn project_with_bug(service: &TrackerService, owner: &User, name: &str) -> (i64, i64) {
        let project = service
            .create_project(
                owner,
                ProjectInput {
                    name: Some(name.into()),
                    description: None,
                },
            )
            .await
            .unwrap()
            .id;
        let bug = service
            .create_bug(
                owner,
                BugInput {
                    title: Some(format!("{} bug", name)),
                    description: Some("d".into()),
                    project: Some(project.into()),
                    ..BugInput::default()
                },
            )
            .await
            .unwrap()
            .id;
        (project, bug)
    }

    #[tokio::test]
    async fn newest_first_with_filters() {
        let service = memory_service().await;
        let alice = seed_user(&service, "alice").await;
        let (web, bug) = project_with_bug(&service, &alice, "Web").await;
        project_with_bug(&service, &alice, "Api").await;
        service
            .create_comment(
                &alice,
                CommentInput {
                    message: Some("seen it".into()),
                    bug_id: Some(bug.into()),
                },
            )
            .await
            .unwrap();

        let all = service
            .list_activities(&alice, &ActivityQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, ActivityAction::Commented);
        assert_eq!(all[0].user.username, "alice");

        let web_only = service
            .list_activities(
                &alice,
                &ActivityQuery {
                    project: Some(web.to_string()),
                    action: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(web_only.len(), 2);

        let created = service
            .list_activities(
                &alice,
                &ActivityQuery {
                    project: None,
                    action: Some("created".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|a| a.action == ActivityAction::Created));

        let fetched = service.get_activity(&alice, all[0].id).await.unwrap();
        assert_eq!(fetched.description, all[0].description);
    }

    #[tokio::test]
    async fn outsiders_see_nothing() {
        let service = memory_service().await;
        let alice = seed_user(&service, "alice").await;
        let eve = seed_user(&service, "eve").await;
        project_with_bug(&service, &alice, "Web").await;

        let seen = service
            .list_activities(&eve, &ActivityQuery::default())
            .await
            .unwrap();
        assert!(seen.is_empty());

        let id: i64 = sqlx::query_scalar("SELECT id FROM activity_logs LIMIT 1")
            .fetch_one(&*service.db)
            .await
            .unwrap();
        assert!(matches!(
            service.get_activity(&eve, id).await,
            Err(TrackerError::NotFound("Activity"))
        ));
    }

    #[tokio::test]
    async fn unknown_action_filter_is_rejected() {
        let service = memory_service().await;
        let alice = seed_user(&service, "alice").await;
        let err = service
            .list_activities(
                &alice,
                &ActivityQuery {
                    project: None,
                    action: Some("exploded".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }
}
