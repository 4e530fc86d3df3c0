use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    stored_object,
    utils::constant_time::constant_time_eq,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

stored_object!(Project, "project", {
    owner_id: String,
    name: String,
    slug: String,
    description: Option<String>,
    repository_url: Option<String>,
    credential: String,
    active: bool,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    credential_rotated_at: DateTime<Utc>
});

/// Fields an operator supplies when registering a new project. `credential`
/// is generated by the registry, never supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDraft {
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
}

fn generate_credential() -> String {
    format!("lf_{}", uuid::Uuid::new_v4().simple())
}

impl Project {
    pub fn new(draft: ProjectDraft) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner_id: draft.owner_id,
            name: draft.name,
            slug: draft.slug,
            description: draft.description,
            repository_url: draft.repository_url,
            credential: generate_credential(),
            active: true,
            credential_rotated_at: now,
        }
    }

    /// Creates the project after verifying the slug is unique within the
    /// owner's namespace. Fails with `AppError::Validation` on collision.
    pub async fn create(db: &SurrealDbClient, draft: ProjectDraft) -> Result<Self, AppError> {
        let existing: Option<Self> = db
            .client
            .query("SELECT * FROM project WHERE owner_id = $owner_id AND slug = $slug LIMIT 1")
            .bind(("owner_id", draft.owner_id.clone()))
            .bind(("slug", draft.slug.clone()))
            .await?
            .take(0)?;

        if existing.is_some() {
            return Err(AppError::Validation(format!(
                "slug '{}' already used by another project for this owner",
                draft.slug
            )));
        }

        let project = Self::new(draft);
        db.store_item(project.clone())
            .await?
            .ok_or_else(|| AppError::InternalError("failed to persist project".to_string()))
    }

    pub async fn get_by_id(
        db: &SurrealDbClient,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let project: Option<Self> = db.get_item(id).await?;
        Ok(project.filter(|p| p.owner_id == owner_id))
    }

    /// Cross-owner lookup used by the ingestion path's operator-facing query
    /// surface; returns only active projects.
    pub async fn get_by_slug_global(
        db: &SurrealDbClient,
        slug: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM project WHERE slug = $slug AND active = true LIMIT 1")
            .bind(("slug", slug.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Indexed O(1) lookup by credential; only active projects authenticate.
    /// The DB index performs the real match; `constant_time_eq` guards the
    /// in-process confirmation against timing side channels.
    pub async fn find_by_token(
        db: &SurrealDbClient,
        credential: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM project WHERE credential = $credential AND active = true LIMIT 1")
            .bind(("credential", credential.to_string()))
            .await?;
        let candidate: Option<Self> = response.take(0)?;
        Ok(candidate.filter(|p| constant_time_eq(&p.credential, credential)))
    }

    pub async fn list_by_owner(
        db: &SurrealDbClient,
        owner_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM project WHERE owner_id = $owner_id ORDER BY created_at DESC")
            .bind(("owner_id", owner_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Mutates name/description/repository URL/active flag and stamps
    /// `updated_at`. Slug and credential are not touched here.
    pub async fn update(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.updated_at = Utc::now();
        let _: Option<Self> = db
            .client
            .update((Self::table_name(), self.id.as_str()))
            .content(self.clone())
            .await?;
        Ok(())
    }

    /// Atomic swap of the credential; there is no grace period, the old
    /// value stops authenticating the instant this commits.
    pub async fn rotate_token(
        db: &SurrealDbClient,
        project_id: &str,
        new_credential: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE project SET credential = $credential, credential_rotated_at = $now, \
                 updated_at = $now WHERE id = $id",
            )
            .bind(("id", surrealdb::sql::Thing::from((Self::table_name(), project_id))))
            .bind(("credential", new_credential.to_string()))
            .bind(("now", now))
            .await?
            .take(0)?;

        updated
            .map(|_: Self| ())
            .ok_or_else(|| AppError::NotFound(format!("project {project_id}")))
    }

    /// Soft-deactivation: sets `active = false`. There is no reactivation
    /// path -- once inactive, the credential is permanently invalid.
    pub async fn deactivate(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let updated: Option<Self> = db
            .client
            .query("UPDATE project SET active = false, updated_at = $now WHERE id = $id")
            .bind(("id", surrealdb::sql::Thing::from((Self::table_name(), id))))
            .bind(("now", now))
            .await?
            .take(0)?;

        updated
            .map(|_: Self| ())
            .ok_or_else(|| AppError::NotFound(format!("project {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("project_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    fn draft(owner: &str, slug: &str) -> ProjectDraft {
        ProjectDraft {
            owner_id: owner.to_string(),
            name: "Checkout Service".to_string(),
            slug: slug.to_string(),
            description: None,
            repository_url: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_slug_for_same_owner() {
        let db = test_db().await;
        Project::create(&db, draft("owner-1", "checkout"))
            .await
            .expect("first create succeeds");

        let err = Project::create(&db, draft("owner-1", "checkout"))
            .await
            .expect_err("duplicate slug should fail");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn same_slug_allowed_across_different_owners() {
        let db = test_db().await;
        Project::create(&db, draft("owner-1", "checkout"))
            .await
            .expect("owner-1 create succeeds");
        Project::create(&db, draft("owner-2", "checkout"))
            .await
            .expect("owner-2 create succeeds");
    }

    #[tokio::test]
    async fn find_by_token_ignores_deactivated_projects() {
        let db = test_db().await;
        let project = Project::create(&db, draft("owner-1", "checkout"))
            .await
            .expect("create succeeds");
        let credential = project.credential.clone();

        assert!(Project::find_by_token(&db, &credential)
            .await
            .expect("lookup ok")
            .is_some());

        Project::deactivate(&db, &project.id)
            .await
            .expect("deactivate succeeds");

        assert!(Project::find_by_token(&db, &credential)
            .await
            .expect("lookup ok")
            .is_none());
    }

    #[tokio::test]
    async fn rotate_token_invalidates_old_credential_immediately() {
        let db = test_db().await;
        let project = Project::create(&db, draft("owner-1", "checkout"))
            .await
            .expect("create succeeds");
        let old_credential = project.credential.clone();

        Project::rotate_token(&db, &project.id, "new-credential-value")
            .await
            .expect("rotate succeeds");

        assert!(Project::find_by_token(&db, &old_credential)
            .await
            .expect("lookup ok")
            .is_none());
        assert!(Project::find_by_token(&db, "new-credential-value")
            .await
            .expect("lookup ok")
            .is_some());
    }
}
