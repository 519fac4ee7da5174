//! Comment operations.

use crate::models::{
    choices::ActivityAction,
    comment::Comment,
    inputs::{CommentInput, CommentQuery},
    representations::{CommentRepr, UserRepr},
    user::User,
};
use crate::services::{
    notifier::OutboundMessage,
    tracker_service::{
        TrackerError, TrackerResult, TrackerService, append_activity, ensure_valid,
        push_visible_project_ids,
    },
    validation::{FieldErrors, TextRule, check_text, parse_id_filter},
};
use chrono::Utc;
use serde_json::Value;
use sqlx::{QueryBuilder, sqlite::Sqlite};
use tracing::info;

const MESSAGE_RULE: TextRule = TextRule::required(None);

impl TrackerService {
    /// Comments on bugs in projects the user owns or belongs to, oldest
    /// first, optionally narrowed to one bug.
    pub async fn list_comments(
        &self,
        user: &User,
        query: &CommentQuery,
    ) -> TrackerResult<Vec<CommentRepr>> {
        let mut errors = FieldErrors::new();
        let bug_id = parse_id_filter(&mut errors, "bug_id", query.bug_id.as_deref());
        ensure_valid(errors)?;

        let mut builder = visible_comments_query(user.id);
        if let Some(bug_id) = bug_id {
            builder.push(" AND c.bug_id = ");
            builder.push_bind(bug_id);
        }
        builder.push(" ORDER BY c.created_at ASC, c.id ASC");

        let rows: Vec<Comment> = builder.build_query_as().fetch_all(&*self.db).await?;
        self.comment_reprs(&rows).await
    }

    pub async fn get_comment(&self, user: &User, id: i64) -> TrackerResult<CommentRepr> {
        let comment = self.fetch_visible_comment(user.id, id).await?;
        Ok(CommentRepr::new(
            &comment,
            self.user_repr(comment.commenter_id).await?,
        ))
    }

    /// Attach a comment to the bug named by `bug_id`, log `commented` and
    /// announce `comment_added`. Nothing is written if the bug cannot be
    /// resolved.
    pub async fn create_comment(
        &self,
        user: &User,
        input: CommentInput,
    ) -> TrackerResult<CommentRepr> {
        let mut errors = FieldErrors::new();
        check_text(
            &mut errors,
            "message",
            input.message.as_deref(),
            MESSAGE_RULE,
            false,
        );
        ensure_valid(errors)?;

        let bug_id = parse_bug_reference(input.bug_id.as_ref())?;
        let bug = self.fetch_visible_bug(user.id, bug_id).await?;
        // Comments are scoped to project members, so a creator who left the
        // project can no longer post on the bug.
        if !self.can_access_project(user.id, bug.project_id).await? {
            return Err(TrackerError::NotFound("Bug"));
        }
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let comment = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (bug_id, commenter_id, message, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, bug_id, commenter_id, message, created_at, updated_at",
        )
        .bind(bug.id)
        .bind(user.id)
        .bind(input.message.unwrap_or_default())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let entry = append_activity(
            &mut *tx,
            bug.project_id,
            Some(bug.id),
            user.id,
            ActivityAction::Commented,
            &format!("Comment added to bug \"{}\"", bug.title),
        )
        .await?;
        tx.commit().await?;

        info!("user {} commented on bug {}", user.username, bug.id);

        let repr = CommentRepr::new(&comment, UserRepr::from(user));
        self.publish(bug.project_id, &repr, |data| OutboundMessage::CommentAdded {
            bug_id: comment.bug_id,
            data,
        });
        self.publish_activity(&entry).await?;
        Ok(repr)
    }

    pub async fn update_comment(
        &self,
        user: &User,
        id: i64,
        input: CommentInput,
        partial: bool,
    ) -> TrackerResult<CommentRepr> {
        let current = self.fetch_visible_comment(user.id, id).await?;
        let mut errors = FieldErrors::new();
        check_text(
            &mut errors,
            "message",
            input.message.as_deref(),
            MESSAGE_RULE,
            partial,
        );
        ensure_valid(errors)?;

        let comment = sqlx::query_as::<_, Comment>(
            "UPDATE comments SET message = ?, updated_at = ? WHERE id = ?
             RETURNING id, bug_id, commenter_id, message, created_at, updated_at",
        )
        .bind(input.message.unwrap_or(current.message))
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&*self.db)
        .await?;

        Ok(CommentRepr::new(
            &comment,
            self.user_repr(comment.commenter_id).await?,
        ))
    }

    pub async fn delete_comment(&self, user: &User, id: i64) -> TrackerResult<()> {
        let comment = self.fetch_visible_comment(user.id, id).await?;
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(comment.id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Full thread of one bug, oldest first.
    pub(crate) async fn comments_for_bug(&self, bug_id: i64) -> TrackerResult<Vec<CommentRepr>> {
        let rows = sqlx::query_as::<_, Comment>(
            "SELECT id, bug_id, commenter_id, message, created_at, updated_at
             FROM comments WHERE bug_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(bug_id)
        .fetch_all(&*self.db)
        .await?;
        self.comment_reprs(&rows).await
    }

    async fn comment_reprs(&self, rows: &[Comment]) -> TrackerResult<Vec<CommentRepr>> {
        let mut comments = Vec::with_capacity(rows.len());
        for comment in rows {
            comments.push(CommentRepr::new(
                comment,
                self.user_repr(comment.commenter_id).await?,
            ));
        }
        Ok(comments)
    }

    async fn fetch_visible_comment(&self, user_id: i64, id: i64) -> TrackerResult<Comment> {
        let mut builder = visible_comments_query(user_id);
        builder.push(" AND c.id = ");
        builder.push_bind(id);
        builder
            .build_query_as::<Comment>()
            .fetch_optional(&*self.db)
            .await?
            .ok_or(TrackerError::NotFound("Comment"))
    }
}

fn visible_comments_query(user_id: i64) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT c.id, c.bug_id, c.commenter_id, c.message, c.created_at, c.updated_at \
         FROM comments c JOIN bugs cb ON cb.id = c.bug_id WHERE cb.project_id IN (",
    );
    push_visible_project_ids(&mut builder, user_id);
    builder.push(")");
    builder
}

/// `bug_id` may arrive as a number or a numeric string.
fn parse_bug_reference(raw: Option<&Value>) -> TrackerResult<i64> {
    let missing = || TrackerError::BadRequest("bug_id is required".into());
    match raw {
        None | Some(Value::Null) => Err(missing()),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| TrackerError::BadRequest("bug_id must be an integer".into())),
        Some(Value::String(s)) if s.trim().is_empty() => Err(missing()),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| TrackerError::BadRequest("bug_id must be an integer".into())),
        Some(_) => Err(TrackerError::BadRequest("bug_id must be an integer".into())),
    }
}
