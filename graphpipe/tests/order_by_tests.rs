// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! ORDER BY pipeline tests, including the bounded top-K path.

#[path = "testutils/mod.rs"]
mod testutils;

use graphpipe::exec::expr::Expression;
use graphpipe::exec::order_by::{SortItem, SortStep};
use graphpipe::exec::plan::ExecutionPlan;
use graphpipe::exec::steps::{LimitStep, ScanClassStep, SkipStep};
use graphpipe::{ExecutionError, Step, Value};
use testutils::TestFixture;

fn names(rows: &[graphpipe::Row]) -> Vec<String> {
    rows.iter()
        .map(|r| match r.get_property("name") {
            Some(Value::String(s)) => s.clone(),
            other => panic!("unexpected name {:?}", other),
        })
        .collect()
}

fn run(fixture: &TestFixture, steps: Vec<Box<dyn Step>>) -> Vec<graphpipe::Row> {
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(steps);
    plan.execute(&mut ctx)
        .expect("plan start failed")
        .drain(&mut ctx)
        .expect("plan drain failed")
}

#[test]
fn test_order_by_age_ascending() {
    let fixture = TestFixture::social_graph();
    let rows = run(
        &fixture,
        vec![
            Box::new(ScanClassStep::new("Person")),
            Box::new(SortStep::new(vec![SortItem::asc(Expression::property(
                "age",
            ))])),
        ],
    );
    assert_eq!(names(&rows), vec!["bob", "dan", "ann", "carol", "eve"]);
}

#[test]
fn test_order_by_descending_with_limit() {
    let fixture = TestFixture::social_graph();
    let rows = run(
        &fixture,
        vec![
            Box::new(ScanClassStep::new("Person")),
            Box::new(SortStep::new(vec![SortItem::desc(Expression::property(
                "age",
            ))])),
            Box::new(LimitStep::new(2)),
        ],
    );
    assert_eq!(names(&rows), vec!["eve", "carol"]);
}

#[test]
fn test_top_k_equals_full_sort_prefix() {
    let fixture = TestFixture::social_graph();
    let full = run(
        &fixture,
        vec![
            Box::new(ScanClassStep::new("Person")),
            Box::new(SortStep::new(vec![SortItem::asc(Expression::property(
                "age",
            ))])),
        ],
    );
    let topk = run(
        &fixture,
        vec![
            Box::new(ScanClassStep::new("Person")),
            Box::new(
                SortStep::new(vec![SortItem::asc(Expression::property("age"))])
                    .with_max_results(2),
            ),
        ],
    );
    assert_eq!(names(&topk), names(&full)[..2].to_vec());
}

#[test]
fn test_sort_buffer_cap_aborts() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(
            SortStep::new(vec![SortItem::asc(Expression::property("age"))])
                .with_max_buffer_size(3),
        ),
    ]);
    let err = plan.execute(&mut ctx).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::ResourceLimitExceeded { operator: "Sort", .. }
    ));
}

#[test]
fn test_sort_then_skip_pages_results() {
    let fixture = TestFixture::social_graph();
    let rows = run(
        &fixture,
        vec![
            Box::new(ScanClassStep::new("Person")),
            Box::new(SortStep::new(vec![SortItem::asc(Expression::property(
                "age",
            ))])),
            Box::new(SkipStep::new(2)),
            Box::new(LimitStep::new(2)),
        ],
    );
    assert_eq!(names(&rows), vec!["ann", "carol"]);
}
