// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan lifecycle, profiling, cacheability and cancellation tests.

#[path = "testutils/mod.rs"]
mod testutils;

use graphpipe::exec::expr::{BinaryOp, Expression};
use graphpipe::exec::mutation::{CreateRecordsStep, SaveStep};
use graphpipe::exec::pattern::MatchPrefetchStep;
use graphpipe::exec::plan::ExecutionPlan;
use graphpipe::exec::step::{TimeoutStep, TimeoutStrategy};
use graphpipe::exec::steps::{FilterStep, LimitStep, ScanClassStep};
use graphpipe::{ExecutionError, RecordStore, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use testutils::TestFixture;

#[test]
fn test_plan_reset_allows_reexecution() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![Box::new(ScanClassStep::new("Person"))]);

    let first = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    assert!(plan.execute(&mut ctx).is_err());

    plan.reset();
    let second = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    assert_eq!(first.len(), second.len());
}

#[test]
fn test_profiling_reports_cost_per_step() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(LimitStep::new(3)),
    ])
    .with_profiling();

    plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    for step in plan.steps() {
        assert!(step.cost().is_some(), "missing cost for {}", step.name());
    }
    let explain = plan.explain();
    assert!(explain.contains("cost:"));
}

#[test]
fn test_unprofiled_plan_has_no_cost() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![Box::new(ScanClassStep::new("Person"))]);
    plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    assert!(plan.steps()[0].cost().is_none());
}

#[test]
fn test_prefetch_taints_plan_cacheability() {
    let streaming = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(LimitStep::new(1)),
    ]);
    assert!(streaming.can_be_cached());

    let with_prefetch = ExecutionPlan::lazy(vec![
        Box::new(MatchPrefetchStep::new(
            "p",
            ExecutionPlan::lazy(vec![Box::new(ScanClassStep::new("Person"))]),
        )),
        Box::new(LimitStep::new(1)),
    ]);
    assert!(!with_prefetch.can_be_cached());
}

#[test]
fn test_mutation_steps_taint_cacheability() {
    let plan = ExecutionPlan::eager(vec![
        Box::new(CreateRecordsStep::new("Person", 1)),
        Box::new(SaveStep::new()),
    ]);
    assert!(!plan.can_be_cached());
}

#[test]
fn test_timeout_step_fails_slow_pipelines() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(TimeoutStep::new(Duration::ZERO, TimeoutStrategy::Fail)),
    ]);
    let stream = plan.execute(&mut ctx).unwrap();
    let err = stream.drain(&mut ctx).unwrap_err();
    assert!(matches!(err, ExecutionError::Timeout { .. }));
}

#[test]
fn test_timeout_step_partial_truncates_quietly() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let mut plan = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(TimeoutStep::new(
            Duration::ZERO,
            TimeoutStrategy::ReturnPartial,
        )),
    ]);
    let rows = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_interrupt_stops_pulling() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();
    let handle = ctx.interrupt_handle();

    let mut plan = ExecutionPlan::lazy(vec![Box::new(ScanClassStep::new("Person"))]);
    let mut stream = plan.execute(&mut ctx).unwrap().interruptable();

    assert!(stream.has_next(&mut ctx).unwrap());
    stream.next(&mut ctx).unwrap();
    handle.store(true, Ordering::SeqCst);
    assert!(matches!(
        stream.has_next(&mut ctx),
        Err(ExecutionError::Interrupted)
    ));
}

#[test]
fn test_mutation_and_query_compose() {
    let fixture = TestFixture::social_graph();
    let mut ctx = fixture.context();

    let mut insert = ExecutionPlan::eager(vec![
        Box::new(CreateRecordsStep::new("Person", 1)),
        Box::new(graphpipe::exec::mutation::SetPropertiesStep::new(vec![
            ("name".to_string(), Expression::literal("frank")),
            ("age".to_string(), Expression::literal(50i64)),
        ])),
        Box::new(SaveStep::new()),
    ]);
    insert.execute(&mut ctx).unwrap();

    let mut query = ExecutionPlan::lazy(vec![
        Box::new(ScanClassStep::new("Person")),
        Box::new(FilterStep::new(Expression::binary(
            Expression::property("age"),
            BinaryOp::Ge,
            Expression::literal(50i64),
        ))),
    ]);
    let rows = query.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_property("name"), Some(&Value::from("frank")));
    assert_eq!(fixture.store.scan_class("Person").unwrap().len(), 6);
}
