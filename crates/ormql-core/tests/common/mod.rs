//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use ormql_core::{Column, ColumnType, IndexInfo, MemoryIndexStore, OrderItem, Value};
use rand::rngs::StdRng;
use rand::Rng;

static TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `Users(id: Int32, name: String?, age: Int32?, tag: String?)` keyed by id.
pub fn users() -> IndexInfo {
    IndexInfo::primary(
        1,
        "Users.PK",
        vec![
            Column::new("id", ColumnType::Int32),
            Column::nullable("name", ColumnType::String),
            Column::nullable("age", ColumnType::Int32),
            Column::nullable("tag", ColumnType::String),
        ],
        vec![OrderItem::asc(0)],
    )
    .with_row_count(1000)
}

pub fn users_by_age() -> IndexInfo {
    IndexInfo::secondary(2, "Users.Age", &users(), vec![OrderItem::asc(2)])
}

pub fn users_by_name() -> IndexInfo {
    IndexInfo::secondary(3, "Users.Name", &users(), vec![OrderItem::asc(1)])
}

pub fn users_by_tag_desc() -> IndexInfo {
    IndexInfo::secondary(4, "Users.Tag", &users(), vec![OrderItem::desc(3)])
}

const WORDS: &[&str] = &["a", "ab", "abc", "b", "ba", "bb", "c", "\u{10FFFF}", ""];

pub fn random_word(rng: &mut StdRng) -> Value {
    if rng.gen_bool(0.15) {
        return Value::Null;
    }
    Value::from(WORDS[rng.gen_range(0..WORDS.len())])
}

pub fn random_age(rng: &mut StdRng) -> Value {
    if rng.gen_bool(0.1) {
        return Value::Null;
    }
    Value::Int32(rng.gen_range(0..100))
}

/// Random users with distinct ids, in random id order.
pub fn random_users(rng: &mut StdRng, count: usize) -> Vec<Vec<Value>> {
    let mut ids: Vec<i32> = (0..count as i32).collect();
    for i in (1..ids.len()).rev() {
        let j = rng.gen_range(0..=i);
        ids.swap(i, j);
    }
    ids.into_iter()
        .map(|id| {
            vec![
                Value::Int32(id),
                random_word(rng),
                random_age(rng),
                random_word(rng),
            ]
        })
        .collect()
}

/// Store holding `rows` in Users with every secondary registered.
pub fn users_store(rows: Vec<Vec<Value>>) -> MemoryIndexStore {
    let mut store = MemoryIndexStore::new();
    let primary = users();
    store.insert_table(&primary, rows);
    for secondary in [users_by_age(), users_by_name(), users_by_tag_desc()] {
        store.register_secondary(&secondary, &primary);
    }
    store
}
