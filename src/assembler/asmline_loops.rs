// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Loop drivers for `.loop`, `.repeat`, `.while` and `.for`.
//!
//! Every iteration runs in a fresh loop scope whose counter is `$cnt`.
//! `.break` ends the loop immediately. `.continue` abandons the rest of
//! the body but still runs the iteration's trailing work: the `.until`
//! test, the `.while` re-check or the `.for` step.

use super::*;

use super::asmline_statements::BlockFamily;

/// Numeric state of a `.for` loop variable.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ForValue {
    Integer(i64),
    Real(f64),
}

impl ForValue {
    fn to_value(self) -> ExpressionValue {
        match self {
            ForValue::Integer(value) => ExpressionValue::Integer(value),
            ForValue::Real(value) => ExpressionValue::Real(value),
        }
    }
}

/// Operands of a loop opener.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LoopHead<'s> {
    Counted(&'s Expr),
    Repeat,
    While(&'s Expr),
    For {
        variable: &'s str,
        from: &'s Expr,
        to: &'s Expr,
        step: Option<&'s Expr>,
    },
}

impl<'s> LoopHead<'s> {
    pub(crate) fn of(statement: &'s Statement) -> Option<Self> {
        match statement {
            Statement::Loop(count) => Some(LoopHead::Counted(count)),
            Statement::Repeat => Some(LoopHead::Repeat),
            Statement::While(condition) => Some(LoopHead::While(condition)),
            Statement::For {
                variable,
                from,
                to,
                step,
            } => Some(LoopHead::For {
                variable,
                from,
                to,
                step: step.as_ref(),
            }),
            _ => None,
        }
    }

    pub(crate) fn family(self) -> BlockFamily {
        match self {
            LoopHead::Counted(_) => BlockFamily::Loop,
            LoopHead::Repeat => BlockFamily::Repeat,
            LoopHead::While(_) => BlockFamily::While,
            LoopHead::For { .. } => BlockFamily::For,
        }
    }
}

impl<'a> Assembler<'a> {
    /// Run a loop construct spanning `lines[start..=end]`.
    pub(crate) fn execute_loop(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
        head: LoopHead<'_>,
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        self.errors.begin_loop();
        let result = match head {
            LoopHead::Counted(count) => self.run_counted_loop(lines, start, end, line, count),
            LoopHead::Repeat => self.run_repeat_loop(lines, start, end),
            LoopHead::While(condition) => self.run_while_loop(lines, start, end, line, condition),
            LoopHead::For {
                variable,
                from,
                to,
                step,
            } => self.run_for_loop(lines, start, end, line, variable, from, to, step),
        };
        self.errors.end_loop();
        // Loop control signals never escape the loop that consumed them.
        result.map(|()| LoopControlSignal::None)
    }

    /// Push a loop scope for iteration `counter` and return its id.
    fn open_iteration(&mut self, counter: i64) -> ScopeId {
        let id = self.push_scope(ScopeKind::Loop);
        if let Some(scope) = self.scopes.scope_mut(id) {
            scope.loop_counter = counter;
        }
        id
    }

    /// Run the body of one iteration. Returns `true` when `.break` fired.
    fn run_iteration_body(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        id: ScopeId,
    ) -> Result<bool, AssemblyAbort> {
        let signal = self.execute_range(lines, start + 1, end)?;
        // The body may leave short-term label groups open.
        self.close_scopes_to(id + 1);
        let flagged = self.scopes.scope(id).is_some_and(|scope| scope.break_reached);
        Ok(signal == LoopControlSignal::Break || flagged)
    }

    fn check_iteration_limit(&mut self, line: &SourceLine, iteration: i64) -> bool {
        if iteration > MAX_LOOP_ITERATIONS {
            self.report(
                line,
                ErrorCode::TooManyLoopIterations,
                format!("Loop exceeded {MAX_LOOP_ITERATIONS} iterations"),
            );
            return false;
        }
        true
    }

    fn run_counted_loop(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
        count: &Expr,
    ) -> Result<(), AssemblyAbort> {
        let Some(count) = self.eval_integer(line, count) else {
            return Ok(());
        };
        if count > MAX_LOOP_ITERATIONS {
            self.report(
                line,
                ErrorCode::LoopCountTooLarge,
                format!("Loop count {count} exceeds {MAX_LOOP_ITERATIONS}"),
            );
            return Ok(());
        }
        let depth = self.scopes.depth();
        for counter in 1..=count {
            let id = self.open_iteration(counter);
            let stop = self.run_iteration_body(lines, start, end, id)?;
            self.close_scopes_to(depth);
            if stop {
                break;
            }
        }
        Ok(())
    }

    fn run_repeat_loop(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
    ) -> Result<(), AssemblyAbort> {
        let until_line = self.prepare_line(&lines[end]).into_owned();
        let Some(Statement::Until(condition)) = until_line.statement() else {
            return Ok(());
        };
        let depth = self.scopes.depth();
        let mut counter = 1;
        loop {
            if !self.check_iteration_limit(&until_line, counter) {
                break;
            }
            let id = self.open_iteration(counter);
            let stop = self.run_iteration_body(lines, start, end, id)?;
            // The exit test runs in the iteration scope, even after `.continue`.
            let done = stop || self.eval_condition(&until_line, condition).unwrap_or(true);
            self.close_scopes_to(depth);
            if done {
                break;
            }
            counter += 1;
        }
        Ok(())
    }

    fn run_while_loop(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
        condition: &Expr,
    ) -> Result<(), AssemblyAbort> {
        let depth = self.scopes.depth();
        let mut counter = 1;
        loop {
            if !self.check_iteration_limit(line, counter) {
                break;
            }
            let id = self.open_iteration(counter);
            if !self.eval_condition(line, condition).unwrap_or(false) {
                self.close_scopes_to(depth);
                break;
            }
            let stop = self.run_iteration_body(lines, start, end, id)?;
            self.close_scopes_to(depth);
            if stop {
                break;
            }
            counter += 1;
        }
        Ok(())
    }

    fn for_operand(&mut self, line: &SourceLine, expr: &Expr) -> Option<ForValue> {
        match self.eval_immediate(line, expr)? {
            ExpressionValue::Integer(value) => Some(ForValue::Integer(value)),
            ExpressionValue::Bool(flag) => Some(ForValue::Integer(flag as i64)),
            ExpressionValue::Real(value) => Some(ForValue::Real(value)),
            other => {
                self.report_at(
                    line,
                    ErrorCode::TypeMismatch,
                    format!("A {:?} value cannot be used as a loop bound", other.value_type()),
                    expr.span(),
                );
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_for_loop(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
        variable: &str,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
    ) -> Result<(), AssemblyAbort> {
        let existing = self
            .scopes
            .find_symbol_in(&SymbolPath::simple(variable), self.scopes.modules().current())
            .map(|info| info.kind);
        if existing == Some(SymbolKind::Label) {
            self.report(
                line,
                ErrorCode::ForVariableIsLabel,
                format!("Loop variable '{variable}' is already defined as a label"),
            );
            return Ok(());
        }

        let from = self.for_operand(line, from);
        let to = self.for_operand(line, to);
        let step = match step {
            Some(expr) => self.for_operand(line, expr),
            None => Some(ForValue::Integer(1)),
        };
        let (Some(from), Some(to), Some(step)) = (from, to, step) else {
            return Ok(());
        };

        let is_zero = match step {
            ForValue::Integer(value) => value == 0,
            ForValue::Real(value) => value == 0.0,
        };
        if is_zero {
            self.report(line, ErrorCode::ForStepZero, "The .for step cannot be zero");
            return Ok(());
        }

        let use_real = [from, to, step]
            .iter()
            .any(|value| matches!(value, ForValue::Real(_)));
        let as_real = |value: ForValue| match value {
            ForValue::Integer(value) => value as f64,
            ForValue::Real(value) => value,
        };

        let mut current = if use_real {
            ForValue::Real(as_real(from))
        } else {
            from
        };
        let ascending = as_real(step) > 0.0;
        let depth = self.scopes.depth();
        let mut counter = 1;
        loop {
            let beyond = match (current, to) {
                (ForValue::Integer(value), ForValue::Integer(limit)) => {
                    if ascending {
                        value > limit
                    } else {
                        value < limit
                    }
                }
                (value, limit) if ascending => as_real(value) > as_real(limit),
                (value, limit) => as_real(value) < as_real(limit),
            };
            if beyond || !self.check_iteration_limit(line, counter) {
                break;
            }
            let id = self.open_iteration(counter);
            if let Err(code) = self.scopes.define_symbol_at(
                SymbolTarget::Scope(id),
                variable,
                current.to_value(),
                SymbolKind::Var,
            ) {
                self.report(line, code, format!("Cannot define loop variable '{variable}'"));
                self.close_scopes_to(depth);
                break;
            }
            let stop = self.run_iteration_body(lines, start, end, id)?;
            self.close_scopes_to(depth);
            if stop {
                break;
            }
            current = match (current, step) {
                (ForValue::Integer(value), ForValue::Integer(step)) => {
                    match value.checked_add(step) {
                        Some(next) => ForValue::Integer(next),
                        None => break,
                    }
                }
                (value, step) => ForValue::Real(as_real(value) + as_real(step)),
            };
            counter += 1;
        }
        Ok(())
    }
}
