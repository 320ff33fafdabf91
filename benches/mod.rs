use criterion::{criterion_group, criterion_main};

mod order_book;

use order_book::register_benchmarks as register_order_book_benchmarks;
use wal::register_benchmarks as register_wal_benchmarks;

criterion_group!(
    benches,
    register_order_book_benchmarks,
    register_wal_benchmarks,
);

criterion_main!(benches);
