// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression evaluation helpers for the dispatcher.
//!
//! Houses the [`EvalContext`] used for statement operands and fix-ups, and
//! the `eval_*` helpers that report failures through the error collector.

use super::*;

/// Symbol view of one evaluation: the live scope chain plus a module, with
/// `$` and `$cnt` pinned.
pub(crate) struct ScopeEvalContext<'s> {
    pub(crate) scopes: &'s ScopeManager,
    pub(crate) module: ModuleId,
    pub(crate) address: u16,
    pub(crate) loop_counter: Option<i64>,
}

impl EvalContext for ScopeEvalContext<'_> {
    fn resolve_symbol(&self, path: &SymbolPath) -> Option<ExpressionValue> {
        self.scopes
            .resolve_symbol_in(path, self.module)
            .map(|info| info.value.clone())
    }

    fn current_address(&self) -> u16 {
        self.address
    }

    fn loop_counter(&self) -> Option<i64> {
        self.loop_counter
    }
}

impl<'a> Assembler<'a> {
    pub(crate) fn eval_context(&self) -> ScopeEvalContext<'_> {
        ScopeEvalContext {
            scopes: &self.scopes,
            module: self.scopes.modules().current(),
            address: self.emitter.current_address(),
            loop_counter: self.scopes.loop_counter(),
        }
    }

    /// Evaluate, reporting errors. `NonEvaluated` passes through.
    pub(crate) fn eval(&mut self, line: &SourceLine, expr: &Expr) -> Option<ExpressionValue> {
        let result = try_evaluate(expr, &self.eval_context());
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_eval_error(line, err);
                None
            }
        }
    }

    /// Evaluate a value that must be known now. Forward references are
    /// reported as [`ErrorCode::ExpressionNotEvaluated`].
    pub(crate) fn eval_immediate(
        &mut self,
        line: &SourceLine,
        expr: &Expr,
    ) -> Option<ExpressionValue> {
        let value = self.eval(line, expr)?;
        if value.is_non_evaluated() {
            let unresolved = first_unresolved_symbol(expr, &self.eval_context());
            let (message, span) = match unresolved {
                Some((path, span)) => (format!("Symbol '{path}' is not defined yet"), span),
                None => ("Expression cannot be evaluated yet".to_string(), expr.span()),
            };
            self.report_at(line, ErrorCode::ExpressionNotEvaluated, message, span);
            return None;
        }
        Some(value)
    }

    pub(crate) fn eval_integer(&mut self, line: &SourceLine, expr: &Expr) -> Option<i64> {
        let value = self.eval_immediate(line, expr)?;
        match value {
            ExpressionValue::Str(_) => {
                self.report_at(
                    line,
                    ErrorCode::TypeMismatch,
                    "A string value cannot be used here",
                    expr.span(),
                );
                None
            }
            other => other.as_long(),
        }
    }

    pub(crate) fn eval_condition(&mut self, line: &SourceLine, expr: &Expr) -> Option<bool> {
        let value = self.eval_immediate(line, expr)?;
        match value.as_bool() {
            Some(flag) => Some(flag),
            None => {
                self.report_at(
                    line,
                    ErrorCode::TypeMismatch,
                    format!("A {:?} value cannot be used as a condition", value.value_type()),
                    expr.span(),
                );
                None
            }
        }
    }
}
