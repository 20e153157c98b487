//! # Chunk and Codec Examples
//!
//! End-to-end checks of the documented chunk behaviours through the public
//! API only: codec selection on flush, exception bookkeeping for ALP,
//! automatic growth on append, and dictionary de-duplication.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test chunk_examples
//! ```

use std::sync::Arc;

use turdb_colstore::chunk::ColumnChunkData;
use turdb_colstore::column::Column;
use turdb_colstore::compression::CompressionType;
use turdb_colstore::config::StorageConfig;
use turdb_colstore::storage::FileHandle;
use turdb_colstore::types::{LogicalType, Value};
use turdb_colstore::vector::{SelectionVector, ValueVector};

fn chunk_of(data_type: LogicalType, values: &[Value], capacity: u64) -> ColumnChunkData {
    let vector = ValueVector::from_values(data_type.clone(), values).unwrap();
    let mut chunk = ColumnChunkData::new(data_type, capacity, true);
    chunk
        .append(&vector, &SelectionVector::unfiltered(values.len()))
        .unwrap();
    chunk
}

fn read_back(column: &Column, chunk: &ColumnChunkData) -> Vec<Value> {
    let state = column.init_chunk_state(chunk).unwrap();
    let n = chunk.num_values();
    let mut out = ValueVector::new(column.data_type().clone(), n);
    column.scan(&state, 0, n, &mut out, 0).unwrap();
    (0..n).map(|i| out.get_value(i)).collect()
}

fn in_memory_column(name: &str, data_type: LogicalType) -> Column {
    Column::new(
        name,
        data_type,
        Arc::new(FileHandle::in_memory()),
        StorageConfig::default(),
    )
}

#[test]
fn alp_keeps_a_single_outlier_as_exception() {
    let mut doubles = vec![5.6f64; 256];
    doubles[2] = 54387589437957.834;
    let values: Vec<Value> = doubles.iter().copied().map(Value::Double).collect();

    let column = in_memory_column("price", LogicalType::Double);
    let disk = column
        .flush(&chunk_of(LogicalType::Double, &values, 256))
        .unwrap();

    let compression = &disk.metadata().compression;
    assert_eq!(compression.compression, CompressionType::Alp);
    let alp = compression.alp.unwrap();
    assert_eq!(alp.exception_count, 1);
    assert!(alp.exception_capacity >= 1);

    let read = read_back(&column, &disk);
    for (got, want) in read.iter().zip(&doubles) {
        match got {
            Value::Double(v) => assert_eq!(v.to_bits(), want.to_bits()),
            other => panic!("expected a double, got {:?}", other),
        }
    }
}

#[test]
fn append_past_capacity_grows_the_chunk() {
    let values: Vec<Value> = (0..300).map(Value::Int64).collect();
    let chunk = chunk_of(LogicalType::Int64, &values, 256);
    assert_eq!(chunk.num_values(), 300);
    assert!(chunk.capacity() >= 300);
    assert_eq!(chunk.get_value(299).unwrap(), Value::Int64(299));
}

#[test]
fn dictionary_stores_each_string_once() {
    let values: Vec<Value> = ["red", "green", "red", "blue", "green", "red"]
        .into_iter()
        .map(Value::from)
        .collect();
    let chunk = chunk_of(LogicalType::String, &values, 8);
    let dict = chunk.dictionary().unwrap();
    assert_eq!(dict.num_strings(), 3);
    for (pos, value) in values.iter().enumerate() {
        assert_eq!(&chunk.get_value(pos as u64).unwrap(), value);
    }
}

#[test]
fn codec_follows_chunk_contents() {
    let cases = [
        (LogicalType::Int64, (0..1000).map(|_| Value::Int64(7)).collect::<Vec<_>>(), CompressionType::Constant),
        (LogicalType::Int64, (0..1000).map(|i| Value::Int64(i % 100)).collect(), CompressionType::IntegerBitpacking),
        (LogicalType::Bool, (0..1000).map(|i| Value::Bool(i % 3 == 0)).collect(), CompressionType::BooleanBitpacking),
        (LogicalType::Int8, (0..1000).map(|i| Value::Int8(if i % 2 == 0 { i8::MIN } else { i8::MAX })).collect(), CompressionType::Uncompressed),
    ];
    for (data_type, values, expected) in cases {
        let column = in_memory_column("c", data_type.clone());
        let disk = column
            .flush(&chunk_of(data_type.clone(), &values, values.len() as u64))
            .unwrap();
        assert_eq!(disk.metadata().compression.compression, expected, "{}", data_type);
        assert_eq!(read_back(&column, &disk), values, "{}", data_type);
    }
}

#[test]
fn all_null_chunk_needs_no_pages() {
    let values = vec![Value::Null; 500];
    let column = in_memory_column("maybe", LogicalType::Int32);
    let disk = column
        .flush(&chunk_of(LogicalType::Int32, &values, 500))
        .unwrap();
    assert_eq!(disk.metadata().page_range.num_pages, 0);
    assert!(read_back(&column, &disk).iter().all(|v| *v == Value::Null));
}
