//! Buyer and farmer account lookups.

use sqlx::PgPool;
use tracing::instrument;

use farmlink_core::billing::ClosingDay;
use farmlink_core::order::BuyerRef;
use farmlink_core::{BuyerKind, FarmerId};

use super::{BuyerProfile, Directory, FarmerProfile, RepositoryError};

#[derive(Debug, sqlx::FromRow)]
struct BuyerRow {
    name: String,
    line_user_id: Option<String>,
    address: Option<String>,
    closing_day: i16,
}

impl BuyerRow {
    fn into_profile(self, buyer: BuyerRef) -> Result<BuyerProfile, RepositoryError> {
        let closing_day = ClosingDay::new(i32::from(self.closing_day))
            .map_err(|e| RepositoryError::DataCorruption(format!("{buyer}: {e}")))?;

        Ok(BuyerProfile {
            buyer,
            name: self.name,
            line_user_id: self.line_user_id,
            address: self.address,
            closing_day,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FarmerRow {
    id: i32,
    name: String,
    line_user_id: Option<String>,
}

/// `PostgreSQL` account directory.
#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Directory for PgDirectory {
    #[instrument(skip(self), fields(buyer = %buyer))]
    async fn buyer(&self, buyer: BuyerRef) -> Result<Option<BuyerProfile>, RepositoryError> {
        let query = match buyer.kind {
            BuyerKind::Restaurant => {
                r"
                SELECT name, line_user_id, address, closing_day
                FROM restaurants
                WHERE id = $1
                "
            }
            // Consumers are billed by calendar month.
            BuyerKind::Consumer => {
                r"
                SELECT name, line_user_id, address, 99::smallint AS closing_day
                FROM consumers
                WHERE id = $1
                "
            }
        };

        let row = sqlx::query_as::<_, BuyerRow>(query)
            .bind(buyer.id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_profile(buyer)).transpose()
    }

    #[instrument(skip(self))]
    async fn farmer(&self, id: FarmerId) -> Result<Option<FarmerProfile>, RepositoryError> {
        let row = sqlx::query_as::<_, FarmerRow>(
            "SELECT id, name, line_user_id FROM farmers WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| FarmerProfile {
            id: FarmerId::new(r.id),
            name: r.name,
            line_user_id: r.line_user_id,
        }))
    }
}
