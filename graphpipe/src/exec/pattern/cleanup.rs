// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Final MATCH cleanup
//!
//! Optional aliases that matched nothing travel through the pipeline as
//! row metadata. This last step turns them into explicit null bindings
//! so the caller sees a uniform row shape, then drops the metadata.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::pattern::EMPTY_OPTIONALS_KEY;
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::ExecutionStream;
use crate::storage::Value;

#[derive(Clone)]
pub struct RemoveEmptyOptionalsStep {
    base: StepBase,
    optional_aliases: Vec<String>,
}

impl RemoveEmptyOptionalsStep {
    pub fn new(optional_aliases: Vec<String>) -> Self {
        Self {
            base: StepBase::default(),
            optional_aliases,
        }
    }
}

impl Step for RemoveEmptyOptionalsStep {
    fn name(&self) -> String {
        "RemoveEmptyOptionals".to_string()
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        _ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("RemoveEmptyOptionals")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState(
                "RemoveEmptyOptionals step requires a predecessor".to_string(),
            )
        })?;
        let optional_aliases = self.optional_aliases.clone();
        Ok(upstream.map(move |mut row, _ctx| {
            if let Some(Value::List(empty)) = row.remove_metadata(EMPTY_OPTIONALS_KEY) {
                for alias in empty {
                    if let Value::String(alias) = alias {
                        row.set_property(alias, Value::Null);
                    }
                }
            }
            // Optionals can also be missing entirely when the edge that
            // would bind them never ran; normalize those too.
            for alias in &optional_aliases {
                if row.get_property(alias).is_none() {
                    row.set_property(alias.clone(), Value::Null);
                }
            }
            Ok(row)
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}
