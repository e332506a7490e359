use crate::entities::order::OrderStatus;

/// Named condition that must hold before a transition fires. Conditions are
/// evaluated against live order/stock state before any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCondition {
    PaymentVerified,
    StockAvailable,
    StockAllocated,
    AllItemsPicked,
    ShippingLabelCreated,
}

impl TransitionCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCondition::PaymentVerified => "payment_verified",
            TransitionCondition::StockAvailable => "stock_available",
            TransitionCondition::StockAllocated => "stock_allocated",
            TransitionCondition::AllItemsPicked => "all_items_picked",
            TransitionCondition::ShippingLabelCreated => "shipping_label_created",
        }
    }
}

/// Ledger-affecting side effect executed while a transition fires, inside the
/// same unit of work as the status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    AllocateStock,
    ReleaseStock,
}

/// One edge of the order status graph.
#[derive(Debug, Clone, Copy)]
pub struct OrderTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub conditions: &'static [TransitionCondition],
    pub actions: &'static [TransitionAction],
}

use OrderStatus::*;
use TransitionAction::*;
use TransitionCondition::*;

/// The full order workflow. Edges not listed here are invalid.
pub const TRANSITIONS: &[OrderTransition] = &[
    OrderTransition {
        from: Draft,
        to: Pending,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Draft,
        to: Cancelled,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Pending,
        to: Confirmed,
        conditions: &[PaymentVerified, StockAvailable],
        actions: &[],
    },
    OrderTransition {
        from: Pending,
        to: Cancelled,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Confirmed,
        to: Processing,
        conditions: &[],
        actions: &[AllocateStock],
    },
    OrderTransition {
        from: Confirmed,
        to: Cancelled,
        conditions: &[],
        actions: &[ReleaseStock],
    },
    OrderTransition {
        from: Processing,
        to: Picking,
        conditions: &[StockAllocated],
        actions: &[],
    },
    OrderTransition {
        from: Processing,
        to: Cancelled,
        conditions: &[],
        actions: &[ReleaseStock],
    },
    OrderTransition {
        from: Picking,
        to: Packed,
        conditions: &[AllItemsPicked],
        actions: &[],
    },
    OrderTransition {
        from: Picking,
        to: Processing,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Packed,
        to: Shipped,
        conditions: &[ShippingLabelCreated],
        actions: &[],
    },
    OrderTransition {
        from: Packed,
        to: Picking,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Shipped,
        to: OutForDelivery,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Shipped,
        to: Delivered,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: OutForDelivery,
        to: Delivered,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: OutForDelivery,
        to: Shipped,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Delivered,
        to: Returned,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Returned,
        to: Refunded,
        conditions: &[],
        actions: &[],
    },
    OrderTransition {
        from: Cancelled,
        to: Refunded,
        conditions: &[],
        actions: &[],
    },
];

/// Looks up the transition edge for a (from, to) pair.
pub fn find_transition(from: OrderStatus, to: OrderStatus) -> Option<&'static OrderTransition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    find_transition(from, to).is_some()
}

/// All statuses reachable from `from` in one step, in table order.
pub fn valid_transitions(from: OrderStatus) -> Vec<OrderStatus> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == from)
        .map(|t| t.to)
        .collect()
}

/// Statuses with no meaningful continuation of fulfillment. Refunded is
/// reachable from cancelled, but an order there is already settled.
pub fn is_final_status(status: OrderStatus) -> bool {
    matches!(status, Delivered | Cancelled | Refunded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_cannot_jump_to_shipped() {
        assert!(!is_valid_transition(Draft, Shipped));
    }

    #[test]
    fn confirmed_reaches_exactly_processing_and_cancelled() {
        assert_eq!(valid_transitions(Confirmed), vec![Processing, Cancelled]);
    }

    #[test]
    fn pending_to_confirmed_requires_payment_and_stock() {
        let t = find_transition(Pending, Confirmed).unwrap();
        assert_eq!(t.conditions, &[PaymentVerified, StockAvailable]);
        assert!(t.actions.is_empty());
    }

    #[test]
    fn confirmed_to_processing_allocates_stock() {
        let t = find_transition(Confirmed, Processing).unwrap();
        assert_eq!(t.actions, &[AllocateStock]);
    }

    #[test]
    fn cancellation_from_processing_releases_stock() {
        let t = find_transition(Processing, Cancelled).unwrap();
        assert_eq!(t.actions, &[ReleaseStock]);
    }

    #[test]
    fn picking_and_packing_are_reversible() {
        assert!(is_valid_transition(Picking, Processing));
        assert!(is_valid_transition(Packed, Picking));
        assert!(is_valid_transition(OutForDelivery, Shipped));
    }

    #[test]
    fn final_statuses() {
        assert!(is_final_status(Delivered));
        assert!(is_final_status(Cancelled));
        assert!(is_final_status(Refunded));
        assert!(!is_final_status(Shipped));
        assert!(!is_final_status(Returned));
    }

    #[test]
    fn every_condition_has_a_name() {
        for t in TRANSITIONS {
            for c in t.conditions {
                assert!(!c.as_str().is_empty());
            }
        }
    }
}
