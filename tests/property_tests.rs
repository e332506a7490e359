use proptest::prelude::*;
use stockflow_api::{
    entities::{stock_history::MovementType, stock_level::StockStatus},
    services::stock::compute_movement,
};

proptest! {
    #[test]
    fn status_derivation_is_total_and_ordered(
        current in -1000i32..10_000,
        minimum in 0i32..1000,
        maximum in proptest::option::of(0i32..10_000),
    ) {
        let status = StockStatus::derive(current, minimum, maximum);

        if current <= 0 {
            prop_assert_eq!(status, StockStatus::OutOfStock);
        } else if current <= minimum {
            prop_assert_eq!(status, StockStatus::Low);
        } else if maximum.map_or(false, |max| current > max) {
            prop_assert_eq!(status, StockStatus::Overstocked);
        } else {
            prop_assert_eq!(status, StockStatus::Available);
        }
    }

    #[test]
    fn successful_movements_never_go_negative(
        before in 0i32..100_000,
        quantity in 0i32..100_000,
        movement in prop_oneof![
            Just(MovementType::Addition),
            Just(MovementType::Reduction),
            Just(MovementType::Adjustment),
            Just(MovementType::InventoryCount),
        ],
    ) {
        if let Ok((after, changed)) = compute_movement(before, quantity, movement) {
            prop_assert!(after >= 0);
            prop_assert_eq!(after, before + changed);
        }
    }

    #[test]
    fn reduction_only_succeeds_within_available_stock(
        before in 0i32..100_000,
        quantity in 0i32..100_000,
    ) {
        let result = compute_movement(before, quantity, MovementType::Reduction);
        if quantity <= before {
            let (after, changed) = result.unwrap();
            prop_assert_eq!(after, before - quantity);
            prop_assert_eq!(changed, -quantity);
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn absolute_movements_land_exactly_on_the_counted_value(
        before in 0i32..100_000,
        counted in 0i32..100_000,
    ) {
        let (after, changed) = compute_movement(before, counted, MovementType::Adjustment).unwrap();
        prop_assert_eq!(after, counted);
        prop_assert_eq!(changed, counted - before);
    }
}
