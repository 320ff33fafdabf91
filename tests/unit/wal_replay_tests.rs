use ringbook::orderbook::types::{OrderInfo, Side, TimeInForce};
use ringbook::orderbook::wal::{
    CancelRequest, Lsn, RecordBody, TxIntent, WalAppender, WalReader, WalWriter,
};
use std::fs;
use std::path::Path;

#[cfg(test)]
mod tests {
    use super::*;

    const BEGIN_LEN: u64 = 40;
    const ORDER_LEN: u64 = 87;

    fn order(id: u64) -> OrderInfo {
        OrderInfo::limit(1, 42, id, Side::Bid, TimeInForce::Gtc, 100 + id as i64, 10, id)
    }

    fn segment(dir: &Path, id: u32) -> std::path::PathBuf {
        dir.join(format!("wal-{id:06}.bin"))
    }

    #[test]
    fn test_torn_commit_is_never_committed() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        {
            let mut wal = WalWriter::open(dir.path(), 1 << 20).unwrap_or_else(|e| panic!("{e}"));
            let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
            wal.log_order(&tx, &order(1)).unwrap_or_else(|e| panic!("{e}"));
            wal.commit_tx(tx).unwrap_or_else(|e| panic!("{e}"));
        }
        // Simulate a crash in the middle of writing COMMIT.
        let path = segment(dir.path(), 0);
        let bytes = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap_or_else(|e| panic!("{e}"));

        let scan = WalReader::new(dir.path())
            .scan_transactions()
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(scan.committed.is_empty());
        assert_eq!(scan.uncommitted, vec![1]);
        assert_eq!(scan.last_lsn, Some(Lsn::new(0, 1)));

        // Reopening cuts the partial record and keeps the tx id space moving.
        let wal = WalWriter::open(dir.path(), 1 << 20).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(wal.next_tx_id(), 2);
        assert_eq!(wal.last_commit_lsn(), None);
        assert_eq!(
            fs::metadata(&path).map(|m| m.len()).ok(),
            Some(BEGIN_LEN + ORDER_LEN)
        );
    }

    #[test]
    fn test_replay_reproduces_appended_records() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let cancel = CancelRequest {
            symbol: 1,
            order_id: 2,
            price: 102,
        };
        let bodies = vec![
            RecordBody::Begin { tx_id: 1 },
            RecordBody::Order { tx_id: 1, order: order(1) },
            RecordBody::Commit { tx_id: 1 },
            RecordBody::Begin { tx_id: 2 },
            RecordBody::Order { tx_id: 2, order: order(2) },
            RecordBody::Commit { tx_id: 2 },
            RecordBody::Begin { tx_id: 3 },
            RecordBody::Cancel { tx_id: 3, cancel },
            RecordBody::Commit { tx_id: 3 },
        ];
        let mut lsns = Vec::new();
        {
            let mut wal = WalAppender::open(dir.path(), 1 << 20).unwrap_or_else(|e| panic!("{e}"));
            for body in &bodies {
                lsns.push(wal.append(body).unwrap_or_else(|e| panic!("{e}")));
            }
            wal.force().unwrap_or_else(|e| panic!("{e}"));
        }

        let records = WalReader::read_dir(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        let read: Vec<_> = records.iter().map(|r| r.body.clone()).collect();
        assert_eq!(read, bodies);
        let read_lsns: Vec<_> = records.iter().map(|r| r.lsn).collect();
        assert_eq!(read_lsns, lsns);

        // Flip one payload byte of the fifth record (tx 2's ORDER).
        let offset = (3 * BEGIN_LEN + ORDER_LEN + 40) as usize;
        let path = segment(dir.path(), 0);
        let mut bytes = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));
        bytes[offset] ^= 0x5a;
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));

        let records = WalReader::read_dir(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(records.len(), 4);
        let committed = WalReader::new(dir.path())
            .committed_txs()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].intents, vec![TxIntent::Order(order(1))]);
    }

    #[test]
    fn test_transactions_straddle_segments() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        // Room for BEGIN + ORDER, not for the COMMIT after them.
        let budget = BEGIN_LEN + ORDER_LEN + 10;
        {
            let mut wal = WalWriter::open(dir.path(), budget).unwrap_or_else(|e| panic!("{e}"));
            for id in 1..=3 {
                let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
                wal.log_order(&tx, &order(id)).unwrap_or_else(|e| panic!("{e}"));
                wal.commit_tx(tx).unwrap_or_else(|e| panic!("{e}"));
            }
            assert!(wal.appender().segment_id() >= 3);
        }

        let committed = WalReader::new(dir.path())
            .committed_txs()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(committed.len(), 3);
        for (tx, id) in committed.iter().zip(1..) {
            assert_eq!(tx.tx_id, id);
            assert_ne!(tx.begin_lsn.segment_id, tx.commit_lsn.segment_id);
            assert_eq!(tx.intents, vec![TxIntent::Order(order(id))]);
        }
        let after = WalReader::new(dir.path())
            .committed_after(Some(committed[1].commit_lsn))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].tx_id, 3);
    }
}
