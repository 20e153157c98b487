//! Flush and scan benchmarks for column chunks
//!
//! Measures how fast each codec turns an in-memory chunk into pages and how
//! fast a full-chunk scan decodes them again, using in-memory file handles
//! so the numbers reflect codec cost rather than disk latency.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use turdb_colstore::chunk::ColumnChunkData;
use turdb_colstore::column::Column;
use turdb_colstore::config::{StorageConfig, DEFAULT_VECTOR_CAPACITY};
use turdb_colstore::storage::FileHandle;
use turdb_colstore::types::{LogicalType, Value};
use turdb_colstore::vector::{SelectionVector, ValueVector};

const NUM_VALUES: u64 = 64 * 1024;

fn chunk_of(data_type: LogicalType, values: &[Value]) -> ColumnChunkData {
    let mut chunk = ColumnChunkData::new(data_type.clone(), values.len() as u64, true);
    for batch in values.chunks(DEFAULT_VECTOR_CAPACITY as usize) {
        let vector = ValueVector::from_values(data_type.clone(), batch).unwrap();
        chunk
            .append(&vector, &SelectionVector::unfiltered(batch.len()))
            .unwrap();
    }
    chunk
}

fn datasets() -> Vec<(&'static str, LogicalType, Vec<Value>)> {
    let n = NUM_VALUES as i64;
    vec![
        (
            "int64_bitpacked",
            LogicalType::Int64,
            (0..n).map(|i| Value::Int64(1_000 + i % 4096)).collect(),
        ),
        (
            "int64_uncompressed",
            LogicalType::Int64,
            (0..n)
                .map(|i| Value::Int64(i.wrapping_mul(0x9E37_79B9_7F4A_7C15u64 as i64)))
                .collect(),
        ),
        (
            "bool",
            LogicalType::Bool,
            (0..n).map(|i| Value::Bool(i % 3 == 0)).collect(),
        ),
        (
            "double_alp",
            LogicalType::Double,
            (0..n).map(|i| Value::Double((i % 10_000) as f64 / 100.0)).collect(),
        ),
        (
            "double_alp_exceptions",
            LogicalType::Double,
            (0..n)
                .map(|i| {
                    if i % 64 == 0 {
                        Value::Double(std::f64::consts::PI * i as f64)
                    } else {
                        Value::Double((i % 10_000) as f64 / 100.0)
                    }
                })
                .collect(),
        ),
    ]
}

fn column(data_type: LogicalType) -> Column {
    Column::new(
        "bench",
        data_type,
        Arc::new(FileHandle::in_memory()),
        StorageConfig::default(),
    )
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.throughput(Throughput::Elements(NUM_VALUES));

    for (name, data_type, values) in datasets() {
        let chunk = chunk_of(data_type.clone(), &values);
        group.bench_with_input(BenchmarkId::new("codec", name), &chunk, |b, chunk| {
            b.iter(|| {
                let column = column(data_type.clone());
                let flushed = column.flush(black_box(chunk)).unwrap();
                black_box(flushed)
            });
        });
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(NUM_VALUES));

    for (name, data_type, values) in datasets() {
        let column = column(data_type.clone());
        let flushed = column.flush(&chunk_of(data_type.clone(), &values)).unwrap();
        let mut out = ValueVector::new(data_type, NUM_VALUES);
        group.bench_function(BenchmarkId::new("codec", name), |b| {
            b.iter(|| {
                let state = column.init_chunk_state(&flushed).unwrap();
                column
                    .scan(&state, 0, NUM_VALUES, &mut out, 0)
                    .unwrap();
                black_box(out.get_value(NUM_VALUES - 1))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_flush, bench_scan);
criterion_main!(benches);
