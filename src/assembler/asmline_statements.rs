// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement-list executor.
//!
//! Loop bodies, conditional branches, proc bodies and macro expansions all
//! run through [`Assembler::execute_range`]. Block statements locate their
//! closing statement by nesting within the range they are executed from.

use super::*;

use super::asmline_loops::LoopHead;

/// Families of block statements, matched opener to closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockFamily {
    Loop,
    Repeat,
    While,
    For,
    If,
    Proc,
    Macro,
    Struct,
    Module,
}

/// A block-opening statement with the operands its driver needs.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Opener<'s> {
    Loop(LoopHead<'s>),
    If,
    Proc,
    Macro,
    Struct,
    Module,
}

impl<'s> Opener<'s> {
    pub(crate) fn of(statement: &'s Statement) -> Option<Self> {
        if let Some(head) = LoopHead::of(statement) {
            return Some(Opener::Loop(head));
        }
        match statement {
            Statement::If(_) | Statement::IfUsed(_) | Statement::IfNUsed(_) => Some(Opener::If),
            Statement::Proc => Some(Opener::Proc),
            Statement::Macro { .. } => Some(Opener::Macro),
            Statement::Struct => Some(Opener::Struct),
            Statement::Module(_) => Some(Opener::Module),
            _ => None,
        }
    }

    pub(crate) fn family(self) -> BlockFamily {
        match self {
            Opener::Loop(head) => head.family(),
            Opener::If => BlockFamily::If,
            Opener::Proc => BlockFamily::Proc,
            Opener::Macro => BlockFamily::Macro,
            Opener::Struct => BlockFamily::Struct,
            Opener::Module => BlockFamily::Module,
        }
    }
}

impl BlockFamily {
    pub(crate) fn of_opener(statement: &Statement) -> Option<Self> {
        Opener::of(statement).map(Opener::family)
    }

    pub(crate) fn closes(self, statement: &Statement) -> bool {
        matches!(
            (self, statement),
            (BlockFamily::Loop, Statement::EndLoop)
                | (BlockFamily::Repeat, Statement::Until(_))
                | (BlockFamily::While, Statement::EndWhile)
                | (BlockFamily::For, Statement::Next)
                | (BlockFamily::If, Statement::EndIf)
                | (BlockFamily::Proc, Statement::EndProc)
                | (BlockFamily::Macro, Statement::EndMacro)
                | (BlockFamily::Struct, Statement::EndStruct)
                | (BlockFamily::Module, Statement::EndModule)
        )
    }

    pub(crate) fn closer_keyword(self) -> &'static str {
        match self {
            BlockFamily::Loop => ".endl",
            BlockFamily::Repeat => ".until",
            BlockFamily::While => ".endw",
            BlockFamily::For => ".next",
            BlockFamily::If => ".endif",
            BlockFamily::Proc => ".endp",
            BlockFamily::Macro => ".endm",
            BlockFamily::Struct => ".ends",
            BlockFamily::Module => ".endmodule",
        }
    }
}

fn is_closing_statement(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::EndLoop
            | Statement::Until(_)
            | Statement::EndWhile
            | Statement::Next
            | Statement::Elif(_)
            | Statement::Else
            | Statement::EndIf
            | Statement::EndProc
            | Statement::EndMacro
            | Statement::EndStruct
            | Statement::EndModule
    )
}

impl<'a> Assembler<'a> {
    /// Execute `lines[first..last]`, stopping early on a loop control signal.
    pub(crate) fn execute_range(
        &mut self,
        lines: &[SourceLine],
        first: usize,
        last: usize,
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        let mut ix = first;
        while ix < last {
            let (next, signal) = self.execute_line(lines, ix, last)?;
            if signal != LoopControlSignal::None {
                return Ok(signal);
            }
            ix = next;
        }
        Ok(LoopControlSignal::None)
    }

    /// Index of the statement closing the block opened at `start`.
    pub(crate) fn find_block_end(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        last: usize,
        family: BlockFamily,
    ) -> Result<usize, AssemblyAbort> {
        let mut depth = 0usize;
        for (ix, line) in lines.iter().enumerate().take(last).skip(start + 1) {
            let Some(statement) = line.statement() else {
                continue;
            };
            if BlockFamily::of_opener(statement) == Some(family) {
                depth += 1;
            } else if family.closes(statement) {
                if depth == 0 {
                    return Ok(ix);
                }
                depth -= 1;
            }
        }
        let keyword = lines[start]
            .statement()
            .map(Statement::keyword)
            .unwrap_or("block");
        Err(self.abort(
            &lines[start],
            ErrorCode::MissingEndStatement,
            format!("'{keyword}' has no matching '{}'", family.closer_keyword()),
        ))
    }

    /// Execute one line. Returns the index of the next line to run and the
    /// loop control signal the line raised.
    pub(crate) fn execute_line(
        &mut self,
        lines: &[SourceLine],
        ix: usize,
        last: usize,
    ) -> Result<(usize, LoopControlSignal), AssemblyAbort> {
        let raw = &lines[ix];
        let line = self.prepare_line(raw);
        let line = line.as_ref();

        if !matches!(line.kind, LineKind::FieldAssignment(_) | LineKind::Empty) {
            self.struct_instance = None;
        }

        if let LineKind::Statement(statement) = &line.kind {
            if let Some(opener) = Opener::of(statement) {
                return self.execute_block(lines, ix, last, opener, line);
            }
            if is_closing_statement(statement) {
                return Err(self.abort(
                    line,
                    ErrorCode::OrphanEndStatement,
                    format!("'{}' without a matching opening statement", statement.keyword()),
                ));
            }
        }

        let before = self.emission_mark();
        let signal = self.execute_simple_line(line)?;
        self.record_listing(line, before);
        Ok((ix + 1, signal))
    }

    fn execute_block(
        &mut self,
        lines: &[SourceLine],
        ix: usize,
        last: usize,
        opener: Opener<'_>,
        line: &SourceLine,
    ) -> Result<(usize, LoopControlSignal), AssemblyAbort> {
        let end = self.find_block_end(lines, ix, last, opener.family())?;
        let names_block = matches!(opener, Opener::Macro | Opener::Struct | Opener::Module);
        if !names_block {
            if let Some(label) = &line.label {
                self.define_address_label(line, label);
            }
        }
        let before = self.emission_mark();
        self.record_listing(line, before);

        let signal = match opener {
            Opener::Loop(head) => self.execute_loop(lines, ix, end, line, head)?,
            Opener::If => self.execute_if(lines, ix, end, line)?,
            Opener::Proc => self.execute_proc(lines, ix, end)?,
            Opener::Macro => {
                self.define_macro(lines, ix, end, line);
                LoopControlSignal::None
            }
            Opener::Struct => {
                self.define_struct(lines, ix, end, line);
                LoopControlSignal::None
            }
            Opener::Module => self.execute_module(lines, ix, end, line)?,
        };

        if !matches!(opener, Opener::Macro) {
            let end_line = &lines[end];
            if let Some(label) = &end_line.label {
                self.define_address_label(end_line, label);
            }
        }
        Ok((end + 1, signal))
    }

    fn execute_simple_line(&mut self, line: &SourceLine) -> Result<LoopControlSignal, AssemblyAbort> {
        let label_after = matches!(
            &line.kind,
            LineKind::Pragma(
                Pragma::Org(_) | Pragma::Bank { .. } | Pragma::Xorg(_) | Pragma::Disp(_)
            )
        );
        let label_is_name = matches!(
            &line.kind,
            LineKind::Pragma(Pragma::Equ(_) | Pragma::Var(_)) | LineKind::FieldAssignment(_)
        );
        if let Some(label) = &line.label {
            if !label_after && !label_is_name {
                self.define_address_label(line, label);
            }
        }

        let signal = match &line.kind {
            LineKind::Empty | LineKind::Directive(_) => LoopControlSignal::None,
            LineKind::Instruction { mnemonic, operands } => {
                self.execute_instruction(line, mnemonic, operands);
                LoopControlSignal::None
            }
            LineKind::Invocation { name, args } => self.execute_invocation(line, name, args)?,
            LineKind::Pragma(pragma) => {
                self.execute_pragma(line, pragma);
                LoopControlSignal::None
            }
            LineKind::FieldAssignment(pragma) => {
                self.execute_field_assignment(line, pragma);
                LoopControlSignal::None
            }
            LineKind::Statement(statement) => self.execute_statement(line, statement),
        };

        if label_after {
            if let Some(label) = &line.label {
                self.define_address_label(line, label);
            }
        }
        Ok(signal)
    }

    /// Non-block statements.
    fn execute_statement(&mut self, line: &SourceLine, statement: &Statement) -> LoopControlSignal {
        match statement {
            Statement::Local(names) => {
                self.execute_local(line, names);
                LoopControlSignal::None
            }
            Statement::Break | Statement::Continue => {
                let signal = if matches!(statement, Statement::Break) {
                    LoopControlSignal::Break
                } else {
                    LoopControlSignal::Continue
                };
                if self.scopes.signal_loop(signal) {
                    signal
                } else {
                    self.report(
                        line,
                        ErrorCode::NotInLoop,
                        format!("'{}' can only be used inside a loop", statement.keyword()),
                    );
                    LoopControlSignal::None
                }
            }
            _ => LoopControlSignal::None,
        }
    }

    /// Define `name` as a label at the current address.
    ///
    /// A short-term label opens a temporary scope; a normal label closes it.
    pub(crate) fn define_address_label(&mut self, line: &SourceLine, name: &str) {
        if self.emitter.is_capturing() {
            return;
        }
        if name.starts_with('`') {
            let on_top = self
                .scopes
                .current()
                .is_some_and(|scope| scope.kind == ScopeKind::Temporary);
            if !on_top {
                self.push_scope(ScopeKind::Temporary);
            }
        } else {
            self.close_temporary_scope();
        }
        let address = ExpressionValue::Integer(self.emitter.current_address() as i64);
        if let Err(code) = self.scopes.define_symbol(name, address, SymbolKind::Label) {
            self.report(line, code, format!("Symbol '{name}' is already defined"));
        }
    }

    pub(crate) fn emission_mark(&self) -> EmissionMark {
        let segments = self.emitter.segments();
        EmissionMark {
            segment_count: segments.len(),
            offset: segments.last().map(|s| s.current_offset()).unwrap_or(0),
            address: self.emitter.physical_address(),
        }
    }

    /// Add a list item and source map entries for what `line` emitted.
    pub(crate) fn record_listing(&mut self, line: &SourceLine, before: EmissionMark) {
        if self.emitter.is_capturing() {
            return;
        }
        let segments = self.emitter.segments();
        let (segment_index, code_start, code_length, address) = match segments.last() {
            None => (0, 0, 0, before.address),
            Some(segment) => {
                // A line that opened a segment starts at its beginning.
                let start = if segments.len() == before.segment_count {
                    before.offset
                } else {
                    0
                };
                (
                    segments.len() - 1,
                    start,
                    segment.current_offset() - start,
                    segment.start_address.wrapping_add(start as u16),
                )
            }
        };
        if code_length > 0 {
            self.source_map
                .record_range(address, code_length, FileLine::new(line.file_index, line.line));
        }
        let equ_value = match (&line.kind, &line.label) {
            (LineKind::Pragma(Pragma::Equ(_)), Some(name)) => {
                let module = self.scopes.modules().current();
                self.scopes
                    .find_symbol_in(&SymbolPath::simple(name), module)
                    .and_then(|info| info.value.as_long())
            }
            _ => None,
        };
        self.list_items.push(ListFileItem {
            file_index: line.file_index,
            address,
            segment_index,
            code_start_index: code_start,
            code_length,
            line_number: line.line,
            source_text: line.source_text.clone(),
            equ_value,
        });
    }
}

/// Emission cursor captured before a line runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmissionMark {
    pub(crate) segment_count: usize,
    pub(crate) offset: usize,
    pub(crate) address: u16,
}
