use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of quantity-changing movements recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Addition,
    Reduction,
    Adjustment,
    InventoryCount,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Addition => "addition",
            MovementType::Reduction => "reduction",
            MovementType::Adjustment => "adjustment",
            MovementType::InventoryCount => "inventory_count",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "addition" => Some(MovementType::Addition),
            "reduction" => Some(MovementType::Reduction),
            "adjustment" => Some(MovementType::Adjustment),
            "inventory_count" => Some(MovementType::InventoryCount),
            _ => None,
        }
    }
}

/// Append-only record of one stock movement. Created in the same unit of
/// work as the stock level mutation it describes; never updated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_level_id: Uuid,
    pub r#type: String,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub quantity_changed: i32,
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_level::Entity",
        from = "Column::StockLevelId",
        to = "super::stock_level::Column::Id"
    )]
    StockLevel,
}

impl Related<super::stock_level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockLevel.def()
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
