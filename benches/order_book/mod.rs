use criterion::Criterion;

mod cancel;
mod matching;

pub fn register_benchmarks(c: &mut Criterion) {
    matching::register_benchmarks(c);
    cancel::register_benchmarks(c);
}
