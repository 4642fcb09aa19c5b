use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::types::{ReplacementAttempt, ReplacementRequest, ReplacementStatus, Urgency};
use sqlx::{PgExecutor, PgPool};
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::assignment::NewAssignment;
use crate::domain::replacement::{
    NewReplacementRequest, ReplacementRepository, already_handed_over, stale_version,
};
use crate::error::GuardServiceError;
use crate::infrastructure::postgres::assignment;

const COLUMNS: &str = "id, tenant_id, requester_id, guard_type_id, date, shift_starts_at, reason, \
                       status, urgency, original_assignment_id, replacement_member_id, \
                       replacement_assignment_id, attempt_history, contacted_member_ids, \
                       next_attempt_at, attempt_count, wave_count, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ReplacementRow {
    id: Uuid,
    tenant_id: Uuid,
    requester_id: Option<Uuid>,
    guard_type_id: Uuid,
    date: NaiveDate,
    shift_starts_at: DateTime<Utc>,
    reason: String,
    status: ReplacementStatus,
    urgency: Urgency,
    original_assignment_id: Option<Uuid>,
    replacement_member_id: Option<Uuid>,
    replacement_assignment_id: Option<Uuid>,
    attempt_history: Json<Vec<ReplacementAttempt>>,
    contacted_member_ids: Vec<Uuid>,
    next_attempt_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    wave_count: i32,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReplacementRow> for ReplacementRequest {
    fn from(row: ReplacementRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            requester_id: row.requester_id,
            guard_type_id: row.guard_type_id,
            date: row.date,
            shift_starts_at: row.shift_starts_at,
            reason: row.reason,
            status: row.status,
            urgency: row.urgency,
            original_assignment_id: row.original_assignment_id,
            replacement_member_id: row.replacement_member_id,
            replacement_assignment_id: row.replacement_assignment_id,
            attempt_history: row.attempt_history.0,
            contacted_member_ids: row.contacted_member_ids,
            next_attempt_at: row.next_attempt_at,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or_default(),
            wave_count: u32::try_from(row.wave_count).unwrap_or_default(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

pub struct PgReplacementRepository {
    pool: PgPool,
}

impl PgReplacementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PgReplacementRepository {
    /// Why a versioned update matched no row.
    async fn rejected(&self, request: &ReplacementRequest) -> GuardServiceError {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM replacement_requests WHERE tenant_id = $1 AND id = $2)",
        )
        .bind(request.tenant_id)
        .bind(request.id)
        .fetch_one(&self.pool)
        .await;

        match exists {
            Ok(true) => stale_version(request),
            Ok(false) => GuardServiceError::NotFound(format!(
                "Replacement request {} not found",
                request.id
            )),
            Err(e) => e.into(),
        }
    }
}

/// Writes the mutable columns of `request` if its version is still current.
async fn update_versioned<'e>(
    executor: impl PgExecutor<'e>,
    request: &ReplacementRequest,
) -> Result<Option<ReplacementRow>, GuardServiceError> {
    let row = sqlx::query_as::<_, ReplacementRow>(&format!(
        r#"
        UPDATE replacement_requests
        SET status = $4,
            replacement_member_id = $5,
            replacement_assignment_id = $6,
            attempt_history = $7,
            contacted_member_ids = $8,
            next_attempt_at = $9,
            attempt_count = $10,
            wave_count = $11,
            version = version + 1,
            updated_at = now()
        WHERE tenant_id = $1 AND id = $2 AND version = $3
        RETURNING {COLUMNS}
        "#
    ))
    .bind(request.tenant_id)
    .bind(request.id)
    .bind(request.version)
    .bind(request.status)
    .bind(request.replacement_member_id)
    .bind(request.replacement_assignment_id)
    .bind(Json(&request.attempt_history))
    .bind(&request.contacted_member_ids)
    .bind(request.next_attempt_at)
    .bind(to_db_count(request.attempt_count))
    .bind(to_db_count(request.wave_count))
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

#[async_trait]
impl ReplacementRepository for PgReplacementRepository {
    #[tracing::instrument(skip(self))]
    async fn create(
        &self,
        request: NewReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let r = request.into_request(Uuid::new_v4(), Utc::now());
        let mut tx = self.pool.begin().await?;

        if let Some(original_id) = r.original_assignment_id
            && !assignment::hand_over(&mut *tx, r.tenant_id, original_id).await?
        {
            return Err(already_handed_over(original_id));
        }

        let row = sqlx::query_as::<_, ReplacementRow>(&format!(
            r#"
            INSERT INTO replacement_requests
                (id, tenant_id, requester_id, guard_type_id, date, shift_starts_at, reason, status,
                 urgency, original_assignment_id, next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(r.id)
        .bind(r.tenant_id)
        .bind(r.requester_id)
        .bind(r.guard_type_id)
        .bind(r.date)
        .bind(r.shift_starts_at)
        .bind(&r.reason)
        .bind(r.status)
        .bind(r.urgency)
        .bind(r.original_assignment_id)
        .bind(r.next_attempt_at)
        .bind(r.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ReplacementRequest>, GuardServiceError> {
        let row = sqlx::query_as::<_, ReplacementRow>(&format!(
            "SELECT {COLUMNS} FROM replacement_requests WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ReplacementRequest::from))
    }

    #[tracing::instrument(skip(self))]
    async fn find_listed(
        &self,
        tenant_id: Uuid,
        status: Option<ReplacementStatus>,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError> {
        let rows = sqlx::query_as::<_, ReplacementRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM replacement_requests
            WHERE tenant_id = $1
              AND CASE
                    WHEN $2::replacement_status IS NULL THEN status IN ('pending', 'in_progress')
                    ELSE status = $2
                  END
            ORDER BY created_at ASC
            "#
        ))
        .bind(tenant_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReplacementRequest::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError> {
        let rows = sqlx::query_as::<_, ReplacementRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM replacement_requests
            WHERE status = 'pending'
               OR (status = 'in_progress' AND next_attempt_at <= $1)
            ORDER BY next_attempt_at ASC NULLS FIRST, created_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReplacementRequest::from).collect())
    }

    #[tracing::instrument(
        skip(self, request),
        fields(request_id = %request.id, version = request.version)
    )]
    async fn save(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        match update_versioned(&self.pool, request).await? {
            Some(row) => Ok(row.into()),
            None => Err(self.rejected(request).await),
        }
    }

    #[tracing::instrument(
        skip(self, request, booking),
        fields(request_id = %request.id, version = request.version)
    )]
    async fn accept_with_assignment(
        &self,
        request: &ReplacementRequest,
        booking: NewAssignment,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let mut tx = self.pool.begin().await?;
        let booked = assignment::insert(&mut *tx, booking).await?;

        let mut accepted = request.clone();
        accepted.replacement_assignment_id = Some(booked.id);
        let Some(row) = update_versioned(&mut *tx, &accepted).await? else {
            tx.rollback().await?;
            return Err(self.rejected(request).await);
        };

        tx.commit().await?;
        Ok(row.into())
    }
}
