use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of warehouse inventory transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Receipt,
    Shipment,
    Transfer,
    Adjustment,
    CycleCount,
    Damage,
    Return,
    Allocation,
    Deallocation,
    Reservation,
    Release,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Receipt => "receipt",
            TransactionType::Shipment => "shipment",
            TransactionType::Transfer => "transfer",
            TransactionType::Adjustment => "adjustment",
            TransactionType::CycleCount => "cycle_count",
            TransactionType::Damage => "damage",
            TransactionType::Return => "return",
            TransactionType::Allocation => "allocation",
            TransactionType::Deallocation => "deallocation",
            TransactionType::Reservation => "reservation",
            TransactionType::Release => "release",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(TransactionType::Receipt),
            "shipment" => Some(TransactionType::Shipment),
            "transfer" => Some(TransactionType::Transfer),
            "adjustment" => Some(TransactionType::Adjustment),
            "cycle_count" => Some(TransactionType::CycleCount),
            "damage" => Some(TransactionType::Damage),
            "return" => Some(TransactionType::Return),
            "allocation" => Some(TransactionType::Allocation),
            "deallocation" => Some(TransactionType::Deallocation),
            "reservation" => Some(TransactionType::Reservation),
            "release" => Some(TransactionType::Release),
            _ => None,
        }
    }

    /// Prefix used in human-readable transaction numbers.
    pub fn prefix(&self) -> &'static str {
        match self {
            TransactionType::Receipt => "RCP",
            TransactionType::Shipment => "SHP",
            TransactionType::Transfer => "TRF",
            TransactionType::Adjustment => "ADJ",
            TransactionType::CycleCount => "CNT",
            TransactionType::Damage => "DMG",
            TransactionType::Return => "RTN",
            TransactionType::Allocation => "ALC",
            TransactionType::Deallocation => "DAL",
            TransactionType::Reservation => "RSV",
            TransactionType::Release => "REL",
        }
    }

    /// Transaction type that undoes the warehouse-level effects of this one.
    pub fn reversal_type(&self) -> Self {
        match self {
            TransactionType::Receipt => TransactionType::Shipment,
            TransactionType::Shipment => TransactionType::Receipt,
            TransactionType::Allocation => TransactionType::Deallocation,
            TransactionType::Deallocation => TransactionType::Allocation,
            TransactionType::Reservation => TransactionType::Release,
            TransactionType::Release => TransactionType::Reservation,
            _ => TransactionType::Adjustment,
        }
    }
}

/// Lifecycle status of an inventory transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Draft,
    Pending,
    Approved,
    Processing,
    Completed,
    Cancelled,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Draft => "draft",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Reversed => "reversed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TransactionStatus::Draft),
            "pending" => Some(TransactionStatus::Pending),
            "approved" => Some(TransactionStatus::Approved),
            "processing" => Some(TransactionStatus::Processing),
            "completed" => Some(TransactionStatus::Completed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            "reversed" => Some(TransactionStatus::Reversed),
            _ => None,
        }
    }

    /// Fixed status transition table. Cancelled and reversed are terminal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Cancelled)
                | (Pending, Approved)
                | (Pending, Cancelled)
                | (Approved, Processing)
                | (Approved, Cancelled)
                | (Processing, Completed)
                | (Processing, Cancelled)
                | (Completed, Reversed)
        )
    }
}

/// One unit of warehouse work: a receipt, shipment, transfer, adjustment or
/// allocation-family transaction, with its items and audit trail.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_number: String,
    pub r#type: String,
    pub status: String,
    pub priority: String,
    pub warehouse_id: Uuid,
    pub destination_warehouse_id: Option<Uuid>,
    pub parent_transaction_id: Option<Uuid>,
    pub reversal_transaction_id: Option<Uuid>,
    pub is_reversed: bool,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn transaction_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.r#type)
    }

    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        TransactionStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::transaction_audit::Entity")]
    AuditEntries,
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::transaction_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditEntries.def()
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
