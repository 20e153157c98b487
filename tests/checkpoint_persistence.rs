//! # Checkpoint Persistence Tests
//!
//! File-backed node groups: appends are flushed by the first checkpoint,
//! later checkpoints fold committed updates either into the existing pages
//! or into freshly written segments, and the serialized descriptor alone is
//! enough to reopen the group from the file.
//!
//! ```text
//! append ──> checkpoint (flush) ──> update ──> checkpoint ──> serialize
//!                                                               │
//!                              reopen file + deserialize  <─────┘
//! ```
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test checkpoint_persistence
//! ```

use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use turdb_colstore::column::Column;
use turdb_colstore::config::StorageConfig;
use turdb_colstore::encoding::{Deserializer, Serializer};
use turdb_colstore::mvcc::{ReadContext, TransactionManager};
use turdb_colstore::node_group::ChunkedNodeGroup;
use turdb_colstore::storage::FileHandle;
use turdb_colstore::types::{LogicalType, Value};
use turdb_colstore::vector::ValueVector;

const ROWS: u64 = 3000;

fn schema(file: &Arc<FileHandle>) -> Vec<Arc<Column>> {
    let config = StorageConfig::default();
    vec![
        Arc::new(Column::new("id", LogicalType::Int64, Arc::clone(file), config)),
        Arc::new(Column::new("name", LogicalType::String, Arc::clone(file), config)),
        Arc::new(Column::new("price", LogicalType::Double, Arc::clone(file), config)),
    ]
}

fn rows() -> Vec<ValueVector> {
    let ids: Vec<Value> = (0..ROWS as i64).map(Value::Int64).collect();
    let names: Vec<Value> = (0..ROWS)
        .map(|i| {
            if i % 11 == 0 {
                Value::Null
            } else {
                Value::String(format!("item-{}", i % 40))
            }
        })
        .collect();
    let prices: Vec<Value> = (0..ROWS).map(|i| Value::Double(i as f64 * 0.25)).collect();
    vec![
        ValueVector::from_values(LogicalType::Int64, &ids).unwrap(),
        ValueVector::from_values(LogicalType::String, &names).unwrap(),
        ValueVector::from_values(LogicalType::Double, &prices).unwrap(),
    ]
}

fn column_values(group: &ChunkedNodeGroup, column_id: usize, data_type: LogicalType) -> Vec<Value> {
    let n = group.num_rows();
    let mut out = [ValueVector::new(data_type, n)];
    let sel = group
        .scan(ReadContext::Direct, 0, n, &[column_id], &mut out)
        .unwrap();
    sel.iter().map(|pos| out[0].get_value(pos)).collect()
}

fn update_committed(
    manager: &TransactionManager,
    group: &ChunkedNodeGroup,
    row: u64,
    column_id: usize,
    value: Value,
    data_type: LogicalType,
) {
    let txn = manager.begin_txn().unwrap();
    let src = ValueVector::from_values(data_type, &[value]).unwrap();
    group.update(txn.read_context(), row, column_id, &src, 0).unwrap();
    let id = txn.id();
    txn.commit_with_finalize(|ts| {
        group.commit(id, ts);
        Ok(())
    })
    .unwrap();
}

fn descriptor(group: &ChunkedNodeGroup) -> Vec<u8> {
    let mut ser = Serializer::new();
    group.serialize(&mut ser).unwrap();
    ser.finish()
}

fn reopen(path: &Path, bytes: &[u8]) -> ChunkedNodeGroup {
    let file = Arc::new(FileHandle::open(path).unwrap());
    let columns = schema(&file);
    let mut de = Deserializer::new(bytes);
    ChunkedNodeGroup::deserialize(&columns, &mut de, true).unwrap()
}

#[test]
fn first_checkpoint_flushes_appended_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("items.col");
    let file = Arc::new(FileHandle::create(&path).unwrap());
    let group = ChunkedNodeGroup::new(&schema(&file), 0, 1 << 17, true);
    group.append(ReadContext::Direct, &rows(), 0, ROWS).unwrap();

    let summary = group.checkpoint().unwrap();
    assert_eq!(summary.flushed, 3);
    assert!((0..3).all(|c| !group.chunk(c).unwrap().is_in_memory()));
    assert!(file.num_allocated_pages() > 0);

    let expected = rows();
    let names = column_values(&group, 1, LogicalType::String);
    for (row, value) in names.iter().enumerate() {
        assert_eq!(value, &expected[1].get_value(row as u64));
    }
}

#[test]
fn in_range_updates_stay_in_place() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("items.col");
    let file = Arc::new(FileHandle::create(&path).unwrap());
    let manager = TransactionManager::new();
    let group = ChunkedNodeGroup::new(&schema(&file), 0, 1 << 17, true);
    group.append(ReadContext::Direct, &rows(), 0, ROWS).unwrap();
    group.checkpoint().unwrap();
    let before = group.chunk(0).unwrap().segments()[0].metadata().page_range;

    update_committed(&manager, &group, 5, 0, Value::Int64(7), LogicalType::Int64);
    let summary = group.checkpoint().unwrap();
    assert_eq!(summary.in_place, 1);
    assert_eq!(summary.rewritten, 0);
    assert!(!group.has_updates());

    let segments = group.chunk(0).unwrap().segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].metadata().page_range, before);
    assert_eq!(column_values(&group, 0, LogicalType::Int64)[5], Value::Int64(7));
}

#[test]
fn out_of_range_update_rewrites_and_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("items.col");
    let bytes = {
        let file = Arc::new(FileHandle::create(&path).unwrap());
        let manager = TransactionManager::new();
        let group = ChunkedNodeGroup::new(&schema(&file), 0, 1 << 17, true);
        group.append(ReadContext::Direct, &rows(), 0, ROWS).unwrap();
        group.checkpoint().unwrap();

        update_committed(&manager, &group, 6, 0, Value::Int64(1 << 40), LogicalType::Int64);
        update_committed(&manager, &group, 9, 2, Value::Double(-0.0), LogicalType::Double);
        let summary = group.checkpoint().unwrap();
        assert!(summary.rewritten >= 1);

        let bytes = descriptor(&group);
        file.sync().unwrap();
        bytes
    };

    let reopened = reopen(&path, &bytes);
    assert_eq!(reopened.num_rows(), ROWS);
    assert_eq!(reopened.num_columns(), 3);

    let ids = column_values(&reopened, 0, LogicalType::Int64);
    assert_eq!(ids.len(), ROWS as usize);
    assert_eq!(ids[6], Value::Int64(1 << 40));
    assert_eq!(ids[7], Value::Int64(7));
    assert_eq!(ids[ROWS as usize - 1], Value::Int64(ROWS as i64 - 1));

    let prices = column_values(&reopened, 2, LogicalType::Double);
    match prices[9] {
        Value::Double(v) => assert!(v == 0.0 && v.is_sign_negative()),
        ref other => panic!("expected a double, got {:?}", other),
    }
    assert_eq!(prices[10], Value::Double(2.5));

    let expected = rows();
    let names = column_values(&reopened, 1, LogicalType::String);
    assert_eq!(names[0], Value::Null);
    assert_eq!(names[1], expected[1].get_value(1));
    assert_eq!(names[2999], expected[1].get_value(2999));
}

#[test]
fn deletes_survive_checkpoint_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("items.col");
    let bytes = {
        let file = Arc::new(FileHandle::create(&path).unwrap());
        let manager = TransactionManager::new();
        let group = ChunkedNodeGroup::new(&schema(&file), 0, 1 << 17, true);
        group.append(ReadContext::Direct, &rows(), 0, ROWS).unwrap();

        let txn = manager.begin_txn().unwrap();
        for row in [1, 2, 3] {
            assert!(group.delete(txn.read_context(), row).unwrap());
        }
        let id = txn.id();
        txn.commit_with_finalize(|ts| {
            group.commit(id, ts);
            Ok(())
        })
        .unwrap();

        group.checkpoint().unwrap();
        let bytes = descriptor(&group);
        file.sync().unwrap();
        bytes
    };

    let reopened = reopen(&path, &bytes);
    assert_eq!(reopened.num_rows(), ROWS);
    assert_eq!(reopened.num_deletions(ReadContext::Direct), 3);
    let ids = column_values(&reopened, 0, LogicalType::Int64);
    assert_eq!(ids.len(), ROWS as usize - 3);
    assert_eq!(&ids[..2], &[Value::Int64(0), Value::Int64(4)]);
}

#[test]
fn descriptor_requires_flushed_data() {
    let file = Arc::new(FileHandle::in_memory());
    let group = ChunkedNodeGroup::new(&schema(&file), 0, 1 << 17, true);
    group.append(ReadContext::Direct, &rows(), 0, 10).unwrap();
    let mut ser = Serializer::new();
    assert!(group.serialize(&mut ser).is_err());

    let flushed = group.flush_as_new().unwrap();
    let mut ser = Serializer::new();
    flushed.serialize(&mut ser).unwrap();
    assert!(!ser.is_empty());
}
