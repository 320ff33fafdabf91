use ringbook::orderbook::types::{OrderInfo, Side, TimeInForce};
use ringbook::{BookConfig, EngineConfig, OrderBook, OrderBookError};

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(&BookConfig::new(3, 5, 1_000, 1_095)).unwrap_or_else(|e| panic!("{e}"))
    }

    fn order(price: i64, qty: u64) -> OrderInfo {
        OrderInfo::limit(3, 1, 1, Side::Bid, TimeInForce::Gtc, price, qty, 0)
    }

    #[test]
    fn test_preconditions_refuse_before_mutation() {
        let mut book = book();
        assert!(matches!(
            book.submit(&order(1_000, 0)),
            Err(OrderBookError::InvalidQuantity { order_id: 1, quantity: 0 })
        ));
        assert!(matches!(
            book.submit(&order(1_002, 5)),
            Err(OrderBookError::MisalignedPrice { price: 1_002, tick: 5 })
        ));
        let mut foreign = order(1_000, 5);
        foreign.symbol = 4;
        assert!(matches!(
            book.submit(&foreign),
            Err(OrderBookError::UnknownSymbol { expected: 3, actual: 4 })
        ));
        assert!(book.is_empty());
    }

    #[test]
    fn test_grid_extends_beyond_window() {
        let mut book = book();
        // Aligned with the grid, far below the window: rests cold.
        assert!(book.submit(&order(500, 5)).is_ok());
        assert!(book.submit(&order(-7, 5)).is_err());
        let mut other = order(-10, 5);
        other.order_id = 2;
        assert!(book.submit(&other).is_ok());
        assert_eq!(book.cold().len_bids(), 2);
        assert_eq!(book.best_bid(), Some(500));
    }

    #[test]
    fn test_config_errors_are_reported() {
        let err = OrderBook::new(&BookConfig::new(1, 3, 100, 110)).err();
        assert!(matches!(err, Some(OrderBookError::InvalidConfig { .. })));
        let err = EngineConfig::from_json("{\"book\": 5}").err();
        assert!(matches!(err, Some(OrderBookError::InvalidConfig { .. })));
        assert!(
            err.map(|e| e.to_string())
                .is_some_and(|msg| msg.starts_with("invalid book configuration"))
        );
    }
}
