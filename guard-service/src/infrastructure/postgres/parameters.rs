use async_trait::async_trait;
use shared::types::AttributionParameters;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::parameters::ParametersRepository;
use crate::error::GuardServiceError;

/// Parameters are stored as one JSON document per tenant; fields added later
/// fall back to their defaults when older rows are read.
pub struct PgParametersRepository {
    pool: PgPool,
}

impl PgParametersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParametersRepository for PgParametersRepository {
    #[tracing::instrument(skip(self))]
    async fn find(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<AttributionParameters>, GuardServiceError> {
        let output: Option<Json<AttributionParameters>> = sqlx::query_scalar(
            "SELECT parameters FROM attribution_parameters WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(output.map(|json| json.0))
    }

    #[tracing::instrument(skip(self))]
    async fn upsert(
        &self,
        tenant_id: Uuid,
        params: AttributionParameters,
    ) -> Result<AttributionParameters, GuardServiceError> {
        let output: Json<AttributionParameters> = sqlx::query_scalar(
            r#"
            INSERT INTO attribution_parameters (tenant_id, parameters)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id) DO UPDATE
            SET parameters = EXCLUDED.parameters, updated_at = now()
            RETURNING parameters
            "#,
        )
        .bind(tenant_id)
        .bind(Json(&params))
        .fetch_one(&self.pool)
        .await?;

        Ok(output.0)
    }
}
