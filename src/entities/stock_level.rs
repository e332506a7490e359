use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived availability status of a stock level.
///
/// The derivation is a total order over `(current, minimum, maximum)`:
/// out-of-stock wins over low, low wins over overstocked, overstocked
/// wins over available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    Available,
    Low,
    OutOfStock,
    Overstocked,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Available => "available",
            StockStatus::Low => "low",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Overstocked => "overstocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(StockStatus::Available),
            "low" => Some(StockStatus::Low),
            "out_of_stock" => Some(StockStatus::OutOfStock),
            "overstocked" => Some(StockStatus::Overstocked),
            _ => None,
        }
    }

    /// Derives the status from the current quantity and thresholds.
    pub fn derive(current: i32, minimum: i32, maximum: Option<i32>) -> Self {
        if current <= 0 {
            StockStatus::OutOfStock
        } else if current <= minimum {
            StockStatus::Low
        } else if maximum.map_or(false, |max| current > max) {
            StockStatus::Overstocked
        } else {
            StockStatus::Available
        }
    }

    /// Statuses that should raise an alert when alerting is enabled.
    pub fn is_alertable(&self) -> bool {
        matches!(self, StockStatus::Low | StockStatus::OutOfStock)
    }
}

/// Per-product, per-location quantity state. Mutated only through ledger
/// movements; `current_quantity` is never persisted negative.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_levels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub current_quantity: i32,
    pub minimum_threshold: i32,
    pub maximum_threshold: Option<i32>,
    pub status: String,
    pub alert_enabled: bool,
    pub reorder_quantity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::from_str(&self.status).unwrap_or(StockStatus::Available)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::stock_history::Entity")]
    History,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::stock_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::StockStatus;

    #[test]
    fn zero_quantity_is_out_of_stock_regardless_of_thresholds() {
        assert_eq!(StockStatus::derive(0, 10, Some(100)), StockStatus::OutOfStock);
        assert_eq!(StockStatus::derive(-3, 0, None), StockStatus::OutOfStock);
    }

    #[test]
    fn quantity_at_or_below_minimum_is_low() {
        assert_eq!(StockStatus::derive(5, 10, None), StockStatus::Low);
        assert_eq!(StockStatus::derive(10, 10, Some(100)), StockStatus::Low);
    }

    #[test]
    fn quantity_above_maximum_is_overstocked() {
        assert_eq!(StockStatus::derive(150, 10, Some(100)), StockStatus::Overstocked);
    }

    #[test]
    fn quantity_within_band_is_available() {
        assert_eq!(StockStatus::derive(50, 10, Some(100)), StockStatus::Available);
        assert_eq!(StockStatus::derive(50, 10, None), StockStatus::Available);
    }
}
