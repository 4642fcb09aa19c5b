use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use shared::types::{
    Assignment, AssignmentOrigin, AssignmentStatus, Justification, JustificationEntry,
};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::assignment::{AssignmentRepository, NewAssignment};
use crate::error::GuardServiceError;

const COLUMNS: &str = "id, tenant_id, member_id, guard_type_id, date, start_time, end_time, \
                       is_external, status, origin, justification, justification_history, \
                       replaces_assignment_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    tenant_id: Uuid,
    member_id: Uuid,
    guard_type_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    is_external: bool,
    status: AssignmentStatus,
    origin: AssignmentOrigin,
    justification: Json<Justification>,
    justification_history: Json<Vec<JustificationEntry>>,
    replaces_assignment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            member_id: row.member_id,
            guard_type_id: row.guard_type_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            is_external: row.is_external,
            status: row.status,
            origin: row.origin,
            justification: row.justification.0,
            justification_history: row.justification_history.0,
            replaces_assignment_id: row.replaces_assignment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgAssignmentRepository {
    pool: PgPool,
}

impl PgAssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(super) async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    new: NewAssignment,
) -> Result<Assignment, GuardServiceError> {
    let a = new.into_assignment(Uuid::new_v4(), Utc::now());
    let row = sqlx::query_as::<_, AssignmentRow>(&format!(
        r#"
        INSERT INTO assignments
            (id, tenant_id, member_id, guard_type_id, date, start_time, end_time, is_external,
             status, origin, justification, justification_history, replaces_assignment_id,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(a.id)
    .bind(a.tenant_id)
    .bind(a.member_id)
    .bind(a.guard_type_id)
    .bind(a.date)
    .bind(a.start_time)
    .bind(a.end_time)
    .bind(a.is_external)
    .bind(a.status)
    .bind(a.origin)
    .bind(Json(&a.justification))
    .bind(Json(&a.justification_history))
    .bind(a.replaces_assignment_id)
    .bind(a.created_at)
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

/// Marks a held assignment as waiting for a replacement. Returns `false` when
/// no held assignment with that id exists.
pub(super) async fn hand_over<'e>(
    executor: impl PgExecutor<'e>,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<bool, GuardServiceError> {
    let updated = sqlx::query(
        r#"
        UPDATE assignments
        SET status = $3, updated_at = now()
        WHERE tenant_id = $1 AND id = $2 AND status <> $3
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(AssignmentStatus::ReplacementRequested)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() == 1)
}

#[async_trait]
impl AssignmentRepository for PgAssignmentRepository {
    #[tracing::instrument(skip(self))]
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Assignment>, GuardServiceError> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {COLUMNS} FROM assignments WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Assignment::from))
    }

    #[tracing::instrument(skip(self))]
    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM assignments
            WHERE tenant_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date, start_time
            "#
        ))
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Assignment::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM assignments
            WHERE tenant_id = $1 AND member_id = $2 AND date BETWEEN $3 AND $4
            ORDER BY date, start_time
            "#
        ))
        .bind(tenant_id)
        .bind(member_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Assignment::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn create(&self, assignment: NewAssignment) -> Result<Assignment, GuardServiceError> {
        insert(&self.pool, assignment).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), GuardServiceError> {
        let output = sqlx::query("DELETE FROM assignments WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if output.rows_affected() == 0 {
            return Err(GuardServiceError::NotFound(format!("Assignment {id} not found")));
        }

        Ok(())
    }

    #[tracing::instrument(
        skip(self, remove, create),
        fields(remove = remove.len(), create = create.len())
    )]
    async fn apply_attribution(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAssignment>,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let mut tx = self.pool.begin().await?;

        if !remove.is_empty() {
            sqlx::query("DELETE FROM assignments WHERE tenant_id = $1 AND id = ANY($2)")
                .bind(tenant_id)
                .bind(&remove)
                .execute(&mut *tx)
                .await?;
        }

        let mut created = Vec::with_capacity(create.len());
        for new in create {
            created.push(insert(&mut *tx, new).await?);
        }

        tx.commit().await?;
        Ok(created)
    }
}
