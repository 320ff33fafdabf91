use ringbook::orderbook::snapshot::{SnapReader, SnapWriter, SnapshotError};
use ringbook::orderbook::types::{OrderInfo, Side, TimeInForce};
use ringbook::orderbook::wal::Lsn;
use ringbook::{BookConfig, OrderBook};
use std::fs;

#[cfg(test)]
mod tests_snapshot {
    use super::*;

    fn populated() -> OrderBook {
        let mut book = OrderBook::new(&BookConfig::new(9, 1, 100, 109).without_recentering())
            .unwrap_or_else(|e| panic!("{e}"));
        let orders = [
            (1, Side::Bid, 104, 5),
            (2, Side::Bid, 104, 3),
            (3, Side::Bid, 90, 7),
            (4, Side::Ask, 106, 2),
            (5, Side::Ask, 130, 4),
        ];
        for (id, side, price, qty) in orders {
            let order = OrderInfo::limit(9, 100 + id, id, side, TimeInForce::Gtc, price, qty, id);
            book.submit(&order).unwrap_or_else(|e| panic!("{e}"));
        }
        book
    }

    #[test]
    fn test_book_survives_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let original = populated();
        let view = original.snapshot();
        assert_eq!(view.bid_prices, vec![104, 104, 90]);
        assert_eq!(view.bid_order_ids, vec![1, 2, 3]);
        assert_eq!(view.ask_prices, vec![106, 130]);

        SnapWriter::new(dir.path(), "book9")
            .write(&view, Some(Lsn::new(2, 5)))
            .unwrap_or_else(|e| panic!("{e}"));
        let loaded = SnapReader::new(dir.path(), "book9")
            .read_latest()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(loaded.view, view);
        assert_eq!(loaded.last_applied_lsn, Some(Lsn::new(2, 5)));

        let mut restored = OrderBook::new(&BookConfig::new(9, 1, 100, 109))
            .unwrap_or_else(|e| panic!("{e}"));
        restored
            .restore(&loaded.view)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(restored.snapshot(), view);
        assert_eq!(restored.cold().len_bids(), 1);
        assert_eq!(restored.cold().len_asks(), 1);

        // FIFO survives: a sell at 104 hits order 1 before order 2.
        let sell = OrderInfo::limit(9, 1, 50, Side::Ask, TimeInForce::Ioc, 104, 6, 0);
        assert!(restored.submit(&sell).is_ok());
        assert_eq!(restored.order_qty(104, 1), None);
        assert_eq!(restored.order_qty(104, 2), Some(2));
    }

    #[test]
    fn test_any_flipped_byte_rejects_the_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = SnapWriter::new(dir.path(), "book9")
            .write_at(&populated().snapshot(), None, 1_000)
            .unwrap_or_else(|e| panic!("{e}"));
        let pristine = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));

        for at in (0..pristine.len()).step_by(7) {
            let mut bytes = pristine.clone();
            bytes[at] ^= 0x10;
            fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
            assert!(
                SnapReader::read_file(&path).is_err(),
                "flipping byte {at} went unnoticed"
            );
        }

        fs::write(&path, &pristine[..pristine.len() / 2]).unwrap_or_else(|e| panic!("{e}"));
        assert!(SnapReader::read_file(&path).is_err());
    }

    #[test]
    fn test_restore_requires_empty_book() {
        let view = populated().snapshot();
        let mut busy = populated();
        assert!(busy.restore(&view).is_err());
        assert!(matches!(
            SnapReader::new("/nonexistent/ringbook", "x").read_latest(),
            Err(SnapshotError::NotFound { .. })
        ));
    }
}
