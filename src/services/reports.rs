use crate::{
    db::DbPool,
    entities::inventory_transaction::{self, Entity as TransactionEntity, TransactionStatus},
    errors::ServiceError,
};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;

/// Read-only advisory queries. Shares no mutable state with the request
/// path; the sweep job in `jobs` runs these on a schedule.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Transactions sitting in `pending` for longer than `max_age_mins`,
    /// oldest first.
    #[instrument(skip(self))]
    pub async fn stale_pending_transactions(
        &self,
        max_age_mins: i64,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        let cutoff = Utc::now() - Duration::minutes(max_age_mins);

        TransactionEntity::find()
            .filter(inventory_transaction::Column::Status.eq(TransactionStatus::Pending.as_str()))
            .filter(inventory_transaction::Column::CreatedAt.lt(cutoff))
            .order_by_asc(inventory_transaction::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}
