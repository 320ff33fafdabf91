use ringbook::orderbook::snapshot::SnapReader;
use ringbook::orderbook::types::{OrderEventType, OrderInfo, OrderStatus, Side, TimeInForce};
use ringbook::{BookConfig, DurableEngine, EngineConfig, EngineError};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
mod tests_recovery {
    use super::*;

    fn config(root: &Path) -> EngineConfig {
        let mut config = EngineConfig::new(BookConfig::new(1, 1, 100, 109), root);
        config.wal_segment_bytes = 512;
        config
    }

    fn gtc(id: u64, side: Side, price: i64, qty: u64) -> OrderInfo {
        OrderInfo::limit(1, 70 + id, id, side, TimeInForce::Gtc, price, qty, id)
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    fn open(root: &Path) -> DurableEngine {
        init_logging();
        DurableEngine::open(config(root)).unwrap_or_else(|e| panic!("open: {e}"))
    }

    #[test]
    fn test_snapshot_plus_log_tail() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let expected = {
            let mut engine = open(dir.path());
            for id in 1..=4 {
                let side = if id % 2 == 0 { Side::Ask } else { Side::Bid };
                let price = if side == Side::Bid { 103 - id as i64 } else { 104 + id as i64 };
                assert_eq!(
                    engine.submit(&gtc(id, side, price, 10)).ok(),
                    Some(OrderStatus::Pending)
                );
            }
            engine.snapshot_now().unwrap_or_else(|e| panic!("{e}"));

            assert_eq!(
                engine.submit(&gtc(5, Side::Ask, 102, 4)).ok(),
                Some(OrderStatus::Filled)
            );
            assert_eq!(engine.cancel(1, 108, 4).ok(), Some(true));
            assert!(engine.submit(&gtc(6, Side::Bid, 95, 1)).is_ok());
            engine.book().snapshot()
        };

        let engine = open(dir.path());
        let report = engine.report();
        assert_eq!(report.snapshot_orders, 4);
        assert!(report.snapshot_lsn.is_some());
        assert_eq!(report.replayed_txs, 3);
        assert_eq!(report.skipped_uncommitted, 0);
        assert!(!report.snapshot_rejected);
        assert_eq!(engine.book().snapshot(), expected);
        assert_eq!(engine.book().order_qty(102, 1), Some(6));
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_full_replay() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let expected = {
            let mut engine = open(dir.path());
            assert!(engine.submit(&gtc(1, Side::Bid, 101, 5)).is_ok());
            assert!(engine.submit(&gtc(2, Side::Ask, 105, 5)).is_ok());
            let path = engine.snapshot_now().unwrap_or_else(|e| panic!("{e}"));
            assert!(engine.submit(&gtc(3, Side::Ask, 101, 2)).is_ok());

            let mut bytes = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));
            let last = bytes.len() - 1;
            bytes[last] ^= 0xff;
            fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
            engine.book().snapshot()
        };

        let engine = open(dir.path());
        assert!(engine.report().snapshot_rejected);
        assert_eq!(engine.report().snapshot_orders, 0);
        assert_eq!(engine.report().replayed_txs, 3);
        assert_eq!(engine.book().snapshot(), expected);
    }

    #[test]
    fn test_uncommitted_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        {
            let mut engine = open(dir.path());
            assert!(engine.submit(&gtc(1, Side::Bid, 101, 5)).is_ok());
            assert!(engine.submit(&gtc(2, Side::Bid, 102, 5)).is_ok());
        }
        // Tear the last COMMIT.
        let wal = config(dir.path()).wal_dir;
        let mut segments: Vec<_> = fs::read_dir(&wal)
            .unwrap_or_else(|e| panic!("{e}"))
            .flatten()
            .map(|entry| entry.path())
            .collect();
        segments.sort();
        let last = segments.last().cloned().unwrap_or_else(|| panic!("no segment"));
        let bytes = fs::read(&last).unwrap_or_else(|e| panic!("{e}"));
        fs::write(&last, &bytes[..bytes.len() - 1]).unwrap_or_else(|e| panic!("{e}"));

        let mut engine = open(dir.path());
        assert_eq!(engine.report().replayed_txs, 1);
        assert_eq!(engine.report().skipped_uncommitted, 1);
        assert_eq!(engine.book().best_bid(), Some(101));

        // The torn record was cut off; new work lands after it and survives.
        assert!(engine.submit(&gtc(3, Side::Bid, 103, 1)).is_ok());
        drop(engine);
        let engine = open(dir.path());
        assert_eq!(engine.report().replayed_txs, 2);
        assert_eq!(engine.book().best_bid(), Some(103));
    }

    #[test]
    fn test_wal_failure_halts_engine() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        init_logging();
        let mut cfg = config(dir.path());
        // BEGIN and ORDER fill the first segment, so COMMIT has to rotate.
        cfg.wal_segment_bytes = 130;
        {
            let mut engine =
                DurableEngine::open(cfg.clone()).unwrap_or_else(|e| panic!("{e}"));
            fs::remove_dir_all(&cfg.wal_dir).unwrap_or_else(|e| panic!("{e}"));
            assert!(matches!(
                engine.submit(&gtc(1, Side::Bid, 101, 5)),
                Err(EngineError::Wal(_))
            ));
            assert!(engine.is_halted());
            // Matched in memory, never committed.
            assert_eq!(engine.book().order_qty(101, 1), Some(5));

            fs::create_dir_all(&cfg.wal_dir).unwrap_or_else(|e| panic!("{e}"));
            assert!(matches!(
                engine.submit(&gtc(2, Side::Bid, 102, 5)),
                Err(EngineError::Halted)
            ));
            assert!(matches!(engine.cancel(1, 101, 1), Err(EngineError::Halted)));
            assert!(matches!(
                engine.apply(OrderEventType::NewOrder, &gtc(3, Side::Ask, 108, 1)),
                Err(EngineError::Halted)
            ));
            assert!(matches!(engine.snapshot_now(), Err(EngineError::Halted)));
            assert!(matches!(engine.poll_snapshot(), Err(EngineError::Halted)));
            assert_eq!(engine.book().order_qty(102, 2), None);
        }

        let engine = DurableEngine::open(cfg).unwrap_or_else(|e| panic!("{e}"));
        assert!(engine.report().snapshot_path.is_none());
        assert_eq!(engine.report().replayed_txs, 0);
        assert_eq!(engine.book().order_qty(101, 1), None);
        assert_eq!(engine.book().best_bid(), None);
    }

    #[test]
    fn test_commits_after_damage_in_older_segment_survive() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        init_logging();
        let mut cfg = config(dir.path());
        // Segments: [B1 O1] [C1 B2] [O2 C2] [B3 O3] [C3].
        cfg.wal_segment_bytes = 130;
        {
            let mut engine =
                DurableEngine::open(cfg.clone()).unwrap_or_else(|e| panic!("{e}"));
            for id in 1..=3 {
                assert!(engine.submit(&gtc(id, Side::Bid, 100 + id as i64, 1)).is_ok());
            }
        }
        let damaged = cfg.wal_dir.join("wal-000001.bin");
        let mut bytes = fs::read(&damaged).unwrap_or_else(|e| panic!("{e}"));
        bytes[35] ^= 0xff;
        fs::write(&damaged, &bytes).unwrap_or_else(|e| panic!("{e}"));

        {
            let mut engine =
                DurableEngine::open(cfg.clone()).unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(engine.report().replayed_txs, 0);
            assert_eq!(engine.report().skipped_uncommitted, 1);
            assert_eq!(engine.book().best_bid(), None);
            assert_eq!(
                engine.submit(&gtc(4, Side::Bid, 104, 2)).ok(),
                Some(OrderStatus::Pending)
            );
        }

        let engine = DurableEngine::open(cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(engine.report().replayed_txs, 1);
        assert_eq!(engine.book().order_qty(104, 4), Some(2));
        assert_eq!(engine.book().order_qty(102, 2), None);
        assert!(engine.last_commit_lsn().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduled_snapshot_is_taken_between_orders() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        init_logging();
        let mut cfg = config(dir.path());
        cfg.snapshot_interval_ms = 20;
        let mut engine = DurableEngine::open(cfg.clone()).unwrap_or_else(|e| panic!("{e}"));
        let scheduler = engine.spawn_scheduler();

        assert!(engine.submit(&gtc(1, Side::Bid, 101, 5)).is_ok());
        let mut handed_off = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if engine.poll_snapshot().unwrap_or_else(|e| panic!("{e}")) {
                handed_off = true;
                break;
            }
        }
        assert!(handed_off);
        drop(engine);
        scheduler.join().await;

        let loaded = SnapReader::new(&cfg.snapshot_dir, &cfg.snapshot_base_name)
            .read_latest()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(loaded.view.bid_order_ids, vec![1]);
        assert!(loaded.last_applied_lsn.is_some());
    }
}
