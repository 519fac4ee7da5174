//! Bug operations.
//!
//! Creation and status/assignee changes each write one activity row in the
//! same transaction as the bug itself, then publish to the project group
//! after commit. The pre-update row is read outside the transaction, so two
//! concurrent updates of one bug are last-writer-wins.

use crate::models::{
    bug::Bug,
    choices::{ActivityAction, BugPriority, BugStatus},
    inputs::{BugInput, BugQuery},
    representations::BugRepr,
    user::User,
};
use crate::services::{
    notifier::{BugEvent, OutboundMessage},
    tracker_service::{
        TrackerError, TrackerResult, TrackerService, append_activity, ensure_valid, order_clause,
        push_search, push_visible_project_ids,
    },
    validation::{
        FieldErrors, NOT_NULL, REQUIRED, TextRule, check_text, parse_id_filter, parse_pk,
    },
};
use chrono::Utc;
use serde_json::Value;
use sqlx::{QueryBuilder, sqlite::Sqlite};
use tracing::info;

const TITLE_RULE: TextRule = TextRule::required(Some(200));
const DESCRIPTION_RULE: TextRule = TextRule::required(None);

const BUG_COLUMNS: &str = "b.id, b.title, b.description, b.status, b.priority, \
     b.assigned_to_id, b.project_id, b.created_by_id, b.created_at, b.updated_at";

const ORDERING: &[(&str, &str)] = &[
    ("created_at", "b.created_at"),
    ("updated_at", "b.updated_at"),
    ("priority", BugPriority::RANK_SQL),
];

/// Validated values for an insert or update.
#[derive(Debug, Clone)]
struct BugFields {
    title: String,
    description: String,
    status: BugStatus,
    priority: BugPriority,
    project_id: i64,
    assigned_to_id: Option<i64>,
}

impl TrackerService {
    /// Bugs visible to `user`, filtered, searched and ordered per `query`.
    pub async fn list_bugs(&self, user: &User, query: &BugQuery) -> TrackerResult<Vec<BugRepr>> {
        let mut errors = FieldErrors::new();
        let status = parse_choice::<BugStatus>(&mut errors, "status", query.status.as_deref());
        let priority =
            parse_choice::<BugPriority>(&mut errors, "priority", query.priority.as_deref());
        let project = parse_id_filter(&mut errors, "project", query.project.as_deref());
        let assigned_to = parse_id_filter(&mut errors, "assigned_to", query.assigned_to.as_deref());
        ensure_valid(errors)?;

        let mut builder = visible_bugs_query(user.id);
        if let Some(status) = status {
            builder.push(" AND b.status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(priority) = priority {
            builder.push(" AND b.priority = ");
            builder.push_bind(priority.as_str());
        }
        if let Some(project) = project {
            builder.push(" AND b.project_id = ");
            builder.push_bind(project);
        }
        if let Some(assigned_to) = assigned_to {
            builder.push(" AND b.assigned_to_id = ");
            builder.push_bind(assigned_to);
        }
        push_search(
            &mut builder,
            &["b.title", "b.description"],
            query.search.as_deref(),
        );
        builder.push(" ORDER BY ");
        builder.push(order_clause(
            query.ordering.as_deref(),
            ORDERING,
            "b.created_at DESC",
            "b.id DESC",
        ));

        let rows: Vec<Bug> = builder.build_query_as().fetch_all(&*self.db).await?;
        self.bug_reprs(&rows).await
    }

    /// Visible bugs assigned to `user`.
    pub async fn my_bugs(&self, user: &User) -> TrackerResult<Vec<BugRepr>> {
        let mut builder = visible_bugs_query(user.id);
        builder.push(" AND b.assigned_to_id = ");
        builder.push_bind(user.id);
        builder.push(" ORDER BY b.created_at DESC, b.id DESC");

        let rows: Vec<Bug> = builder.build_query_as().fetch_all(&*self.db).await?;
        self.bug_reprs(&rows).await
    }

    pub async fn get_bug(&self, user: &User, id: i64) -> TrackerResult<BugRepr> {
        let bug = self.fetch_visible_bug(user.id, id).await?;
        self.bug_repr(&bug).await
    }

    /// File a bug, log `created` and announce `bug_created`.
    pub async fn create_bug(&self, user: &User, input: BugInput) -> TrackerResult<BugRepr> {
        let fields = self.validate_bug(user, input, None, false).await?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let bug = sqlx::query_as::<_, Bug>(
            "INSERT INTO bugs (title, description, status, priority, assigned_to_id,
                               project_id, created_by_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id, title, description, status, priority, assigned_to_id,
                       project_id, created_by_id, created_at, updated_at",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.status.as_str())
        .bind(fields.priority.as_str())
        .bind(fields.assigned_to_id)
        .bind(fields.project_id)
        .bind(user.id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let entry = append_activity(
            &mut *tx,
            bug.project_id,
            Some(bug.id),
            user.id,
            ActivityAction::Created,
            &format!("Bug \"{}\" was created", bug.title),
        )
        .await?;
        tx.commit().await?;

        info!(
            "user {} created bug {} in project {}",
            user.username, bug.id, bug.project_id
        );

        let repr = self.bug_repr(&bug).await?;
        self.publish_bug_event(&repr, BugEvent::BugCreated);
        self.publish_activity(&entry).await?;
        Ok(repr)
    }

    /// Save new values. Only status and assignee changes are logged and
    /// announced; other edits are silent.
    pub async fn update_bug(
        &self,
        user: &User,
        id: i64,
        input: BugInput,
        partial: bool,
    ) -> TrackerResult<BugRepr> {
        let old = self.fetch_visible_bug(user.id, id).await?;
        let fields = self.validate_bug(user, input, Some(&old), partial).await?;

        let old_assignee = self.assignee_name(old.assigned_to_id).await?;
        let new_assignee = self.assignee_name(fields.assigned_to_id).await?;
        let changes = describe_changes(
            (old.status, fields.status),
            (old.assigned_to_id, fields.assigned_to_id),
            (old_assignee.as_str(), new_assignee.as_str()),
        );

        let mut tx = self.db.begin().await?;
        let bug = sqlx::query_as::<_, Bug>(
            "UPDATE bugs SET title = ?, description = ?, status = ?, priority = ?,
                             assigned_to_id = ?, project_id = ?, updated_at = ?
             WHERE id = ?
             RETURNING id, title, description, status, priority, assigned_to_id,
                       project_id, created_by_id, created_at, updated_at",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.status.as_str())
        .bind(fields.priority.as_str())
        .bind(fields.assigned_to_id)
        .bind(fields.project_id)
        .bind(Utc::now())
        .bind(old.id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = if changes.is_empty() {
            None
        } else {
            let description = format!("Bug \"{}\" - {}", bug.title, changes.join(", "));
            Some(
                append_activity(
                    &mut *tx,
                    bug.project_id,
                    Some(bug.id),
                    user.id,
                    ActivityAction::Updated,
                    &description,
                )
                .await?,
            )
        };
        tx.commit().await?;

        let repr = self.bug_repr(&bug).await?;
        if let Some(entry) = entry {
            info!("user {} updated bug {}: {}", user.username, bug.id, entry.description);
            self.publish_bug_event(&repr, BugEvent::BugUpdated);
            self.publish_activity(&entry).await?;
        }
        Ok(repr)
    }

    /// Delete a visible bug; its comments and activity rows cascade.
    pub async fn delete_bug(&self, user: &User, id: i64) -> TrackerResult<()> {
        let bug = self.fetch_visible_bug(user.id, id).await?;
        sqlx::query("DELETE FROM bugs WHERE id = ?")
            .bind(bug.id)
            .execute(&*self.db)
            .await?;
        info!("user {} deleted bug {}", user.username, bug.id);
        Ok(())
    }

    pub(crate) async fn fetch_visible_bug(&self, user_id: i64, id: i64) -> TrackerResult<Bug> {
        let mut builder = visible_bugs_query(user_id);
        builder.push(" AND b.id = ");
        builder.push_bind(id);
        builder
            .build_query_as::<Bug>()
            .fetch_optional(&*self.db)
            .await?
            .ok_or(TrackerError::NotFound("Bug"))
    }

    pub(crate) async fn bug_repr(&self, bug: &Bug) -> TrackerResult<BugRepr> {
        let assigned_to = match bug.assigned_to_id {
            Some(id) => Some(self.user_repr(id).await?),
            None => None,
        };
        let created_by = self.user_repr(bug.created_by_id).await?;
        let project_name =
            sqlx::query_scalar::<_, String>("SELECT name FROM projects WHERE id = ?")
                .bind(bug.project_id)
                .fetch_one(&*self.db)
                .await?;
        let comments = self.comments_for_bug(bug.id).await?;

        Ok(BugRepr {
            id: bug.id,
            title: bug.title.clone(),
            description: bug.description.clone(),
            status: bug.status,
            priority: bug.priority,
            assigned_to,
            project: bug.project_id,
            project_name,
            created_by,
            comment_count: comments.len() as i64,
            comments,
            created_at: bug.created_at,
            updated_at: bug.updated_at,
        })
    }

    async fn bug_reprs(&self, rows: &[Bug]) -> TrackerResult<Vec<BugRepr>> {
        let mut bugs = Vec::with_capacity(rows.len());
        for bug in rows {
            bugs.push(self.bug_repr(bug).await?);
        }
        Ok(bugs)
    }

    fn publish_bug_event(&self, bug: &BugRepr, event_type: BugEvent) {
        let bug_id = bug.id;
        self.publish(bug.project, bug, |data| OutboundMessage::BugUpdate {
            event_type,
            bug_id,
            data,
        });
    }

    async fn assignee_name(&self, id: Option<i64>) -> TrackerResult<String> {
        match id {
            Some(id) => Ok(self.fetch_user(id).await?.username),
            None => Ok("Unassigned".to_string()),
        }
    }

    /// Check `input` and merge it over `current` (updates) or defaults.
    async fn validate_bug(
        &self,
        user: &User,
        input: BugInput,
        current: Option<&Bug>,
        partial: bool,
    ) -> TrackerResult<BugFields> {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "title", input.title.as_deref(), TITLE_RULE, partial);
        check_text(
            &mut errors,
            "description",
            input.description.as_deref(),
            DESCRIPTION_RULE,
            partial,
        );
        let status = parse_choice::<BugStatus>(&mut errors, "status", input.status.as_deref());
        let priority =
            parse_choice::<BugPriority>(&mut errors, "priority", input.priority.as_deref());

        let project = match input.project.as_ref() {
            Some(Value::Null) => {
                errors.add("project", NOT_NULL);
                None
            }
            Some(raw) => parse_pk(&mut errors, "project", raw),
            None => {
                if !partial {
                    errors.add("project", REQUIRED);
                }
                None
            }
        };
        if let Some(project_id) = project {
            if !self.can_access_project(user.id, project_id).await? {
                errors.add("project", invalid_pk(project_id));
            }
        }

        let assigned_to = match input.assigned_to.as_ref() {
            Some(Some(raw)) => parse_pk(&mut errors, "assigned_to", raw).map(Some),
            Some(None) => Some(None),
            None => None,
        };
        if let Some(Some(assignee)) = assigned_to {
            if !self.user_exists(assignee).await? {
                errors.add("assigned_to", invalid_pk(assignee));
            }
        }
        ensure_valid(errors)?;

        Ok(BugFields {
            title: input
                .title
                .or_else(|| current.map(|b| b.title.clone()))
                .unwrap_or_default(),
            description: input
                .description
                .or_else(|| current.map(|b| b.description.clone()))
                .unwrap_or_default(),
            status: status
                .or(current.map(|b| b.status))
                .unwrap_or_default(),
            priority: priority
                .or(current.map(|b| b.priority))
                .unwrap_or_default(),
            project_id: project
                .or(current.map(|b| b.project_id))
                .unwrap_or_default(),
            assigned_to_id: match assigned_to {
                Some(assignee) => assignee,
                None => current.and_then(|b| b.assigned_to_id),
            },
        })
    }
}

/// `SELECT ... FROM bugs b WHERE <visible to user_id>`, ready for more `AND`s.
///
/// A bug is visible when its project is owned by or has as member the user,
/// or when the user filed it.
fn visible_bugs_query(user_id: i64) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
    builder.push(BUG_COLUMNS);
    builder.push(" FROM bugs b WHERE (b.created_by_id = ");
    builder.push_bind(user_id);
    builder.push(" OR b.project_id IN (");
    push_visible_project_ids(&mut builder, user_id);
    builder.push("))");
    builder
}

/// Human-readable summary of the tracked fields that changed.
fn describe_changes(
    status: (BugStatus, BugStatus),
    assignee_id: (Option<i64>, Option<i64>),
    assignee_name: (&str, &str),
) -> Vec<String> {
    let mut changes = Vec::new();
    if status.0 != status.1 {
        changes.push(format!("status changed from {} to {}", status.0, status.1));
    }
    if assignee_id.0 != assignee_id.1 {
        changes.push(format!(
            "assigned from {} to {}",
            assignee_name.0, assignee_name.1
        ));
    }
    changes
}

fn parse_choice<T>(errors: &mut FieldErrors, field: &str, raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr<Err = crate::models::choices::InvalidChoice>,
{
    let raw = raw.filter(|s| !s.is_empty())?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            errors.add(field, err.to_string());
            None
        }
    }
}

fn invalid_pk(id: i64) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}
