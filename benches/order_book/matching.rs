use criterion::{BenchmarkId, Criterion};
use ringbook::prelude::*;
use std::hint::black_box;

const SYMBOL: Symbol = 1;

fn seeded_book(levels: i64, per_level: u64) -> OrderBook {
    let config = BookConfig::new(SYMBOL, 1, 1_000, 1_255);
    let mut book = match OrderBook::new(&config) {
        Ok(book) => book,
        Err(e) => panic!("bench config: {e}"),
    };
    let mut id = 0;
    for offset in 0..levels {
        for _ in 0..per_level {
            id += 1;
            let ask = OrderInfo::limit(
                SYMBOL, 1, id, Side::Ask, TimeInForce::Gtc, 1_130 + offset, 10, 0,
            );
            let _ = book.submit(&ask);
        }
    }
    book
}

/// Register benchmarks for resting and crossing orders.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("OrderBook - Matching");

    group.bench_function("rest_gtc_bids", |b| {
        b.iter_with_setup(
            || seeded_book(0, 0),
            |mut book| {
                for id in 1..=1_000u64 {
                    let price = 1_000 + (id % 120) as Price;
                    let order = OrderInfo::limit(
                        SYMBOL, 2, id, Side::Bid, TimeInForce::Gtc, price, 5, id,
                    );
                    black_box(book.submit(&order).ok());
                }
            },
        );
    });

    // A single aggressive IOC walking an increasing number of levels.
    for &levels in &[1i64, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("ioc_sweep_levels", levels),
            &levels,
            |b, &levels| {
                b.iter_with_setup(
                    || seeded_book(levels, 4),
                    |mut book| {
                        let taker = OrderInfo::limit(
                            SYMBOL,
                            3,
                            u64::MAX,
                            Side::Bid,
                            TimeInForce::Ioc,
                            1_130 + levels,
                            levels as Quantity * 40,
                            0,
                        );
                        black_box(book.submit(&taker).ok());
                    },
                );
            },
        );
    }

    group.bench_function("fok_rejected", |b| {
        let mut book = seeded_book(16, 2);
        let taker = OrderInfo::limit(
            SYMBOL, 3, u64::MAX, Side::Bid, TimeInForce::Fok, 1_145, 1_000, 0,
        );
        b.iter(|| black_box(book.submit(&taker).ok()));
    });

    group.bench_function("market_one_lot", |b| {
        b.iter_with_setup(
            || seeded_book(4, 64),
            |mut book| {
                for id in 0..64u64 {
                    let taker = OrderInfo::market(SYMBOL, 3, 1_000_000 + id, Side::Bid, 1, 0);
                    black_box(book.submit(&taker).ok());
                }
            },
        );
    });

    group.finish();
}
