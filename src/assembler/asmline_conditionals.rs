// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

impl<'a> Assembler<'a> {
    /// `.if`/`.ifused`/`.ifnused` with optional `.elif` and `.else`
    /// branches. `end` is the index of the closing `.endif`.
    pub(crate) fn execute_if(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        let separators = self.branch_separators(lines, start, end)?;

        // Branch heads: the opener followed by each separator.
        let mut heads = Vec::with_capacity(separators.len() + 1);
        heads.push(start);
        heads.extend(separators.iter().copied());

        for (branch, head) in heads.iter().copied().enumerate() {
            let body_end = heads.get(branch + 1).copied().unwrap_or(end);
            let head_line = if head == start {
                std::borrow::Cow::Borrowed(line)
            } else {
                self.prepare_line(&lines[head])
            };
            let taken = match head_line.statement() {
                Some(Statement::If(expr)) | Some(Statement::Elif(expr)) => {
                    match self.eval_condition(head_line.as_ref(), expr) {
                        Some(flag) => flag,
                        // A failed condition skips the whole construct.
                        None => return Ok(LoopControlSignal::None),
                    }
                }
                Some(Statement::IfUsed(path)) => self.symbol_is_used(path),
                Some(Statement::IfNUsed(path)) => !self.symbol_is_used(path),
                Some(Statement::Else) => true,
                _ => false,
            };
            if head != start {
                let before = self.emission_mark();
                self.record_listing(head_line.as_ref(), before);
            }
            if taken {
                trace!(line = line.line, branch, "conditional branch taken");
                return self.execute_range(lines, head + 1, body_end);
            }
        }
        Ok(LoopControlSignal::None)
    }

    /// Indices of the `.elif`/`.else` lines that belong to this `.if`.
    fn branch_separators(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
    ) -> Result<Vec<usize>, AssemblyAbort> {
        let mut separators = Vec::new();
        let mut depth = 0usize;
        let mut else_seen = false;
        for ix in start + 1..end {
            let Some(statement) = lines[ix].statement() else {
                continue;
            };
            match statement {
                Statement::If(_) | Statement::IfUsed(_) | Statement::IfNUsed(_) => depth += 1,
                Statement::EndIf => depth = depth.saturating_sub(1),
                Statement::Elif(_) | Statement::Else if depth == 0 => {
                    if else_seen {
                        return Err(self.abort(
                            &lines[ix],
                            ErrorCode::OrphanEndStatement,
                            format!("'{}' cannot follow '.else'", statement.keyword()),
                        ));
                    }
                    else_seen = matches!(statement, Statement::Else);
                    separators.push(ix);
                }
                _ => {}
            }
        }
        Ok(separators)
    }

    /// Whether a symbol has been referenced so far. Undefined symbols count
    /// as unused.
    fn symbol_is_used(&self, path: &SymbolPath) -> bool {
        let module = self.scopes.modules().current();
        self.scopes
            .find_symbol_in(path, module)
            .is_some_and(|info| info.is_used.get())
    }
}
