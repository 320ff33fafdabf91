use criterion::{BenchmarkId, Criterion};
use ringbook::prelude::*;
use std::hint::black_box;

const SYMBOL: Symbol = 1;

/// Register benchmarks for cancels in the hot and cold zones.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("OrderBook - Cancel");

    for &(name, base) in &[("hot", 1_000i64), ("cold", 5_000i64)] {
        for &count in &[100u64, 1_000, 10_000] {
            group.bench_with_input(BenchmarkId::new(name, count), &count, |b, &count| {
                b.iter_with_setup(
                    || {
                        let config = BookConfig::new(SYMBOL, 1, 1_000, 1_255).without_recentering();
                        let mut book = match OrderBook::new(&config) {
                            Ok(book) => book,
                            Err(e) => panic!("bench config: {e}"),
                        };
                        for id in 0..count {
                            let price = base + (id % 100) as Price;
                            let order = OrderInfo::limit(
                                SYMBOL, 1, id, Side::Bid, TimeInForce::Gtc, price, 10, 0,
                            );
                            let _ = book.submit(&order);
                        }
                        book
                    },
                    |mut book| {
                        for id in 0..count {
                            let price = base + (id % 100) as Price;
                            black_box(book.cancel(SYMBOL, price, id).ok());
                        }
                        assert!(book.is_empty());
                    },
                );
            });
        }
    }

    group.finish();
}
