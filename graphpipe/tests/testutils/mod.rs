// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Shared fixture for integration tests: a small social graph in the
//! in-memory store.

use graphpipe::exec::context::ExecutionContext;
use graphpipe::storage::memory::MemoryStore;
use graphpipe::storage::{Rid, Value};
use std::sync::Arc;

pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub people: Vec<Rid>,
}

impl TestFixture {
    /// Five people in three cities, with a Knows chain and one employee
    /// subclass record.
    pub fn social_graph() -> Self {
        // RUST_LOG=debug surfaces the executor's step logging per test.
        let _ = env_logger::builder().is_test(true).try_init();

        let store = Arc::new(MemoryStore::new());
        store.declare_subclass("Employee", "Person");

        let ann = person(&store, "Person", "ann", 30, "berlin");
        let bob = person(&store, "Person", "bob", 25, "berlin");
        let carol = person(&store, "Person", "carol", 35, "paris");
        let dan = person(&store, "Employee", "dan", 28, "paris");
        let eve = person(&store, "Person", "eve", 40, "london");

        store.connect("Knows", ann, bob);
        store.connect("Knows", ann, carol);
        store.connect("Knows", bob, carol);
        store.connect("Knows", carol, dan);

        Self {
            store,
            people: vec![ann, bob, carol, dan, eve],
        }
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new().with_store(self.store.clone())
    }
}

fn person(store: &MemoryStore, class: &str, name: &str, age: i64, city: &str) -> Rid {
    store.insert(
        class,
        vec![
            ("name", Value::from(name)),
            ("age", Value::Integer(age)),
            ("city", Value::from(city)),
        ],
    )
}
