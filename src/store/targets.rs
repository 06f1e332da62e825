//! Target repository.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::types::Json;
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::models::Target;
use super::Store;

/// Fields for creating a target. The URL and method are validated at the
/// API boundary before they reach the store.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub body_template: Option<serde_json::Value>,
}

/// Partial update for a target; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TargetPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub body_template: Option<serde_json::Value>,
}

impl Store {
    /// Persist a new target.
    pub async fn create_target(&self, input: NewTarget, now: NaiveDateTime) -> Result<Target> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO targets (id, name, url, method, headers, body_template, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.url)
        .bind(&input.method)
        .bind(input.headers.map(Json))
        .bind(input.body_template.map(Json))
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.require_target(&id).await
    }

    /// Fetch a target by ID.
    pub async fn get_target(&self, id: &str) -> Result<Option<Target>> {
        let target = sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(target)
    }

    /// List all targets, newest first.
    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let targets =
            sqlx::query_as::<_, Target>("SELECT * FROM targets ORDER BY created_at DESC, id")
                .fetch_all(self.pool())
                .await?;
        Ok(targets)
    }

    /// Apply a partial update to a target and bump `updated_at`.
    pub async fn update_target(
        &self,
        id: &str,
        patch: TargetPatch,
        now: NaiveDateTime,
    ) -> Result<Target> {
        let existing = self.require_target(id).await?;

        let name = patch.name.unwrap_or(existing.name);
        let url = patch.url.unwrap_or(existing.url);
        let method = patch.method.unwrap_or(existing.method);
        let headers = patch.headers.map(Json).or(existing.headers);
        let body_template = patch.body_template.map(Json).or(existing.body_template);

        sqlx::query(
            "UPDATE targets SET name = ?, url = ?, method = ?, headers = ?, \
             body_template = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&url)
        .bind(&method)
        .bind(headers)
        .bind(body_template)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        self.require_target(id).await
    }

    /// Delete a target; schedules, runs, and attempts cascade.
    pub async fn delete_target(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::TargetNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn require_target(&self, id: &str) -> Result<Target> {
        self.get_target(id)
            .await?
            .ok_or_else(|| StoreError::TargetNotFound(id.to_string()))
    }
}
