use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use shared::types::Availability;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::availability::{AvailabilityRepository, NewAvailability, ResetFilter};
use crate::error::GuardServiceError;

const COLUMNS: &str = "id, tenant_id, member_id, date, status, start_time, end_time, reason, \
                       priority, source, created_at, updated_at";

pub struct PgAvailabilityRepository {
    pool: PgPool,
}

impl PgAvailabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    new: NewAvailability,
) -> Result<Availability, GuardServiceError> {
    let a = new.into_availability(Uuid::new_v4(), Utc::now());
    let output = sqlx::query_as::<_, Availability>(&format!(
        r#"
        INSERT INTO availabilities
            (id, tenant_id, member_id, date, status, start_time, end_time, reason, priority, source,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(a.id)
    .bind(a.tenant_id)
    .bind(a.member_id)
    .bind(a.date)
    .bind(a.status)
    .bind(a.start_time)
    .bind(a.end_time)
    .bind(&a.reason)
    .bind(a.priority)
    .bind(a.source)
    .bind(a.created_at)
    .fetch_one(executor)
    .await?;

    Ok(output)
}

#[async_trait]
impl AvailabilityRepository for PgAvailabilityRepository {
    #[tracing::instrument(skip(self))]
    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let output = sqlx::query_as::<_, Availability>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM availabilities
            WHERE tenant_id = $1 AND member_id = $2 AND date BETWEEN $3 AND $4
            ORDER BY date, start_time NULLS FIRST
            "#
        ))
        .bind(tenant_id)
        .bind(member_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(output)
    }

    #[tracing::instrument(skip(self))]
    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let output = sqlx::query_as::<_, Availability>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM availabilities
            WHERE tenant_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY member_id, date, start_time NULLS FIRST
            "#
        ))
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(output)
    }

    #[tracing::instrument(skip(self))]
    async fn create(
        &self,
        availability: NewAvailability,
    ) -> Result<Availability, GuardServiceError> {
        insert(&self.pool, availability).await
    }

    #[tracing::instrument(
        skip(self, remove, create),
        fields(remove = remove.len(), create = create.len())
    )]
    async fn apply_batch(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAvailability>,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let mut tx = self.pool.begin().await?;

        if !remove.is_empty() {
            sqlx::query("DELETE FROM availabilities WHERE tenant_id = $1 AND id = ANY($2)")
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

    #[tracing::instrument(skip(self))]
    async fn delete_matching(&self, filter: ResetFilter) -> Result<u64, GuardServiceError> {
        let output = sqlx::query(
            r#"
            DELETE FROM availabilities
            WHERE tenant_id = $1
              AND member_id = $2
              AND date BETWEEN $3 AND $4
              AND ($5::availability_source IS NULL OR source = $5)
              AND ($6::availability_status IS NULL OR status = $6)
            "#,
        )
        .bind(filter.tenant_id)
        .bind(filter.member_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.source)
        .bind(filter.status)
        .execute(&self.pool)
        .await?;

        Ok(output.rows_affected())
    }
}
