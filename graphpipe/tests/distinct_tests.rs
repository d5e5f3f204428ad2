// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! DISTINCT behavior over identity-backed and synthetic rows.

#[path = "testutils/mod.rs"]
mod testutils;

use graphpipe::exec::distinct::DistinctStep;
use graphpipe::exec::stream::ExecutionStream;
use graphpipe::{ExecutionError, RecordStore, Row, Step, Value};
use testutils::TestFixture;

#[test]
fn test_duplicate_records_collapse_by_identity() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();

    // The same person reached twice, as a traversal would produce it.
    let ann = fixture.store.load(fixture.people[0]).unwrap();
    let duplicates = vec![
        Row::from_record(&ann),
        Row::from_record(&ann),
        Row::from_record(&fixture.store.load(fixture.people[1]).unwrap()),
    ];

    let mut step = DistinctStep::new();
    let stream = step
        .start(Some(ExecutionStream::from_rows(duplicates)), &mut ctx)
        .unwrap();
    let rows = stream.drain(&mut ctx).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_projection_rows_collapse_by_value() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();

    let mut a = Row::new();
    a.set_property("city", Value::from("berlin"));
    let b = a.clone();
    let mut c = Row::new();
    c.set_property("city", Value::from("paris"));

    let mut step = DistinctStep::new();
    let stream = step
        .start(Some(ExecutionStream::from_rows(vec![a, b, c])), &mut ctx)
        .unwrap();
    let rows = stream.drain(&mut ctx).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_value_set_overflow_is_an_error() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();

    let input: Vec<Row> = (0..10)
        .map(|i| {
            let mut r = Row::new();
            r.set_property("n", Value::Integer(i));
            r
        })
        .collect();

    let mut step = DistinctStep::new().with_value_set_cap(4);
    let stream = step
        .start(Some(ExecutionStream::from_rows(input)), &mut ctx)
        .unwrap();
    let err = stream.drain(&mut ctx).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::ResourceLimitExceeded {
            operator: "Distinct",
            ..
        }
    ));
}
