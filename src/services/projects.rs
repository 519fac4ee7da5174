//! Project operations: visibility-scoped CRUD plus membership management.

use crate::models::{
    inputs::{ProjectInput, ProjectQuery},
    project::Project,
    representations::{ProjectRepr, UserRepr},
    user::User,
};
use crate::services::{
    tracker_service::{
        TrackerError, TrackerResult, TrackerService, VISIBLE_PROJECT_IDS, ensure_valid,
        order_clause, push_search, push_visible_project_ids,
    },
    validation::{FieldErrors, TextRule, check_text},
};
use chrono::Utc;
use sqlx::{QueryBuilder, sqlite::Sqlite};
use tracing::info;

const NAME_RULE: TextRule = TextRule::required(Some(200));

const ORDERING: &[(&str, &str)] = &[("name", "p.name"), ("created_at", "p.created_at")];

const PROJECT_COLUMNS: &str = "p.id, p.name, p.description, p.owner_id, p.created_at, p.updated_at";

impl TrackerService {
    /// Projects the user owns or belongs to.
    pub async fn list_projects(
        &self,
        user: &User,
        query: &ProjectQuery,
    ) -> TrackerResult<Vec<ProjectRepr>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(PROJECT_COLUMNS);
        builder.push(" FROM projects p WHERE p.id IN (");
        push_visible_project_ids(&mut builder, user.id);
        builder.push(")");
        push_search(
            &mut builder,
            &["p.name", "p.description"],
            query.search.as_deref(),
        );
        builder.push(" ORDER BY ");
        builder.push(order_clause(
            query.ordering.as_deref(),
            ORDERING,
            "p.created_at DESC",
            "p.id DESC",
        ));

        let rows: Vec<Project> = builder.build_query_as().fetch_all(&*self.db).await?;
        let mut projects = Vec::with_capacity(rows.len());
        for project in &rows {
            projects.push(self.project_repr(project).await?);
        }
        Ok(projects)
    }

    pub async fn get_project(&self, user: &User, id: i64) -> TrackerResult<ProjectRepr> {
        let project = self.fetch_visible_project(user.id, id).await?;
        self.project_repr(&project).await
    }

    /// Create a project owned by `user`. The owner is not added to members.
    pub async fn create_project(
        &self,
        user: &User,
        input: ProjectInput,
    ) -> TrackerResult<ProjectRepr> {
        validate_project(&input, false)?;
        let now = Utc::now();
        let project = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name, description, owner_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, name, description, owner_id, created_at, updated_at",
        )
        .bind(input.name.unwrap_or_default())
        .bind(input.description.unwrap_or_default())
        .bind(user.id)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        info!("user {} created project {}", user.username, project.id);
        self.project_repr(&project).await
    }

    /// Full (`partial == false`) or partial update of name/description.
    pub async fn update_project(
        &self,
        user: &User,
        id: i64,
        input: ProjectInput,
        partial: bool,
    ) -> TrackerResult<ProjectRepr> {
        let current = self.fetch_visible_project(user.id, id).await?;
        validate_project(&input, partial)?;

        let project = sqlx::query_as::<_, Project>(
            "UPDATE projects SET name = ?, description = ?, updated_at = ?
             WHERE id = ?
             RETURNING id, name, description, owner_id, created_at, updated_at",
        )
        .bind(input.name.unwrap_or(current.name))
        .bind(input.description.unwrap_or(current.description))
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&*self.db)
        .await?;

        self.project_repr(&project).await
    }

    /// Delete a project; bugs, comments and activity cascade.
    pub async fn delete_project(&self, user: &User, id: i64) -> TrackerResult<()> {
        let project = self.fetch_visible_project(user.id, id).await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project.id)
            .execute(&*self.db)
            .await?;
        info!("user {} deleted project {}", user.username, project.id);
        Ok(())
    }

    /// Add the account named `username` to the member set.
    pub async fn add_member(
        &self,
        user: &User,
        id: i64,
        username: Option<&str>,
    ) -> TrackerResult<String> {
        let project = self.fetch_visible_project(user.id, id).await?;
        let member = self.resolve_member(username).await?;

        sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)")
            .bind(project.id)
            .bind(member.id)
            .execute(&*self.db)
            .await?;

        info!("added {} to project {}", member.username, project.id);
        Ok(format!("Added {} to project", member.username))
    }

    /// Remove the account named `username` from the member set. Ownership is
    /// untouched, so an owner removing themselves keeps access.
    pub async fn remove_member(
        &self,
        user: &User,
        id: i64,
        username: Option<&str>,
    ) -> TrackerResult<String> {
        let project = self.fetch_visible_project(user.id, id).await?;
        let member = self.resolve_member(username).await?;

        sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
            .bind(project.id)
            .bind(member.id)
            .execute(&*self.db)
            .await?;

        info!("removed {} from project {}", member.username, project.id);
        Ok(format!("Removed {} from project", member.username))
    }

    /// Whether `user_id` owns or belongs to `project_id`. Unknown projects
    /// are simply inaccessible.
    pub async fn can_access_project(&self, user_id: i64, project_id: i64) -> TrackerResult<bool> {
        let sql = format!("SELECT COUNT(*) FROM ({}) WHERE id = ?", VISIBLE_PROJECT_IDS);
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(project_id)
            .fetch_one(&*self.db)
            .await?;
        Ok(count > 0)
    }

    pub(crate) async fn fetch_visible_project(
        &self,
        user_id: i64,
        id: i64,
    ) -> TrackerResult<Project> {
        let sql = format!(
            "SELECT {} FROM projects p WHERE p.id = ? AND p.id IN ({})",
            PROJECT_COLUMNS, VISIBLE_PROJECT_IDS
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(user_id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(TrackerError::NotFound("Project"))
    }

    async fn resolve_member(&self, username: Option<&str>) -> TrackerResult<User> {
        let Some(username) = username else {
            return Err(TrackerError::NotFound("User"));
        };
        self.find_user_by_username(username)
            .await?
            .ok_or(TrackerError::NotFound("User"))
    }

    async fn project_repr(&self, project: &Project) -> TrackerResult<ProjectRepr> {
        let owner = self.user_repr(project.owner_id).await?;
        let members = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.email, u.first_name, u.last_name,
                    u.password_hash, u.date_joined
             FROM users u JOIN project_members m ON m.user_id = u.id
             WHERE m.project_id = ? ORDER BY u.id",
        )
        .bind(project.id)
        .fetch_all(&*self.db)
        .await?;
        let bug_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bugs WHERE project_id = ?")
            .bind(project.id)
            .fetch_one(&*self.db)
            .await?;

        Ok(ProjectRepr {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            owner,
            members: members.iter().map(UserRepr::from).collect(),
            bug_count,
            created_at: project.created_at,
            updated_at: project.updated_at,
        })
    }
}

fn validate_project(input: &ProjectInput, partial: bool) -> TrackerResult<()> {
    let mut errors = FieldErrors::new();
    check_text(&mut errors, "name", input.name.as_deref(), NAME_RULE, partial);
    ensure_valid(errors)
}
