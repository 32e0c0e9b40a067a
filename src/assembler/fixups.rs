// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Forward-reference resolution.
//!
//! Fix-ups are retried whenever the scope that recorded them closes, and a
//! last time at module level after the pass. Each retry evaluates with the
//! `$` address, `$cnt` and module captured when the fix-up was recorded.

use super::*;

use super::asmline_eval::ScopeEvalContext;
use super::asmline_instruction::resolve_operands;

/// What came of one fix-up attempt.
enum FixupOutcome {
    Applied,
    Pending(Fixup),
    Failed,
}

impl<'a> Assembler<'a> {
    /// Apply what can be applied; return the fix-ups that are still waiting
    /// for symbols. `target` is `None` for the final module-level pass.
    pub(crate) fn resolve_fixups(
        &mut self,
        fixups: Vec<Fixup>,
        target: Option<SymbolTarget>,
    ) -> Vec<Fixup> {
        if fixups.is_empty() {
            return fixups;
        }
        let (mut equs, others): (Vec<Fixup>, Vec<Fixup>) =
            fixups.into_iter().partition(Fixup::is_equ);

        // One `.equ` may unlock another, so retry until nothing changes.
        loop {
            let before = equs.len();
            equs = self.apply_all(equs, target);
            if equs.is_empty() || equs.len() == before {
                break;
            }
        }
        let mut pending = equs;
        pending.extend(self.apply_all(others, target));
        pending
    }

    fn apply_all(&mut self, fixups: Vec<Fixup>, target: Option<SymbolTarget>) -> Vec<Fixup> {
        let mut pending = Vec::new();
        for fixup in fixups {
            match self.apply_fixup(fixup, target) {
                FixupOutcome::Pending(fixup) => pending.push(fixup),
                FixupOutcome::Applied | FixupOutcome::Failed => {}
            }
        }
        pending
    }

    fn fixup_context(&self, fixup: &Fixup) -> ScopeEvalContext<'_> {
        ScopeEvalContext {
            scopes: &self.scopes,
            module: fixup.module,
            address: fixup.address,
            loop_counter: fixup.loop_counter,
        }
    }

    /// Report against the fix-up's recorded location and macro notes.
    fn report_fixup(&mut self, fixup: &Fixup, code: ErrorCode, message: impl Into<String>, span: Span) {
        let mut info = AssemblerErrorInfo::new(code, message, &fixup.location);
        if span.col_start > 0 {
            info = info.with_columns(span.col_start, Some(span.col_end));
        }
        for note in &fixup.notes {
            info = info.with_note(note.clone());
        }
        self.errors.report_in_loops(info, &fixup.loop_runs);
    }

    fn apply_fixup(&mut self, fixup: Fixup, target: Option<SymbolTarget>) -> FixupOutcome {
        match &fixup.kind {
            FixupKind::Instruction { mnemonic, operands } => {
                let resolved = resolve_operands(operands, &self.fixup_context(&fixup));
                let resolved = match resolved {
                    Ok(resolved) if resolved.deferred => return FixupOutcome::Pending(fixup),
                    Ok(resolved) => resolved,
                    Err(err) => {
                        self.report_fixup(&fixup, err.code, err.message, err.span);
                        return FixupOutcome::Failed;
                    }
                };
                let request = InstructionRequest {
                    mnemonic,
                    operands: &resolved.operands,
                    address: fixup.address,
                };
                let bytes = match self.encoder.encode(&request) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        self.report_fixup(&fixup, ErrorCode::EncodingFailed, err.to_string(), Span::default());
                        return FixupOutcome::Failed;
                    }
                };
                if bytes.len() != fixup.length {
                    self.report_fixup(
                        &fixup,
                        ErrorCode::EncodingLengthChanged,
                        format!(
                            "'{mnemonic}' encoded to {} byte(s) after resolution, {} were reserved",
                            bytes.len(),
                            fixup.length
                        ),
                        Span::default(),
                    );
                    return FixupOutcome::Failed;
                }
                self.emitter.patch(fixup.segment_index, fixup.offset, &bytes);
                trace!(mnemonic = mnemonic.as_str(), address = fixup.address, "instruction fix-up applied");
                FixupOutcome::Applied
            }
            FixupKind::Data { width, expr } => {
                let Some(value) = self.fixup_value(&fixup, expr) else {
                    return FixupOutcome::Failed;
                };
                if value.is_non_evaluated() {
                    return FixupOutcome::Pending(fixup);
                }
                let number = match value {
                    ExpressionValue::Str(_) => None,
                    other => other.as_long(),
                };
                let Some(number) = number else {
                    self.report_fixup(
                        &fixup,
                        ErrorCode::TypeMismatch,
                        "A string value cannot be used here",
                        expr.span(),
                    );
                    return FixupOutcome::Failed;
                };
                let fits = match width {
                    DataWidth::Byte => crate::core::expr::value_fits_byte(number),
                    DataWidth::Word => crate::core::expr::value_fits_word(number),
                };
                if !fits {
                    self.report_fixup(
                        &fixup,
                        ErrorCode::ValueOutOfRange,
                        format!("Value {number} does not fit in {} byte(s)", width.size()),
                        expr.span(),
                    );
                }
                let bytes = match width {
                    DataWidth::Byte => vec![number as u8],
                    DataWidth::Word => vec![number as u8, (number >> 8) as u8],
                };
                self.emitter.patch(fixup.segment_index, fixup.offset, &bytes);
                trace!(offset = fixup.offset, value = number, "data fix-up applied");
                FixupOutcome::Applied
            }
            FixupKind::Equ { name, expr } => {
                let Some(value) = self.fixup_value(&fixup, expr) else {
                    return FixupOutcome::Failed;
                };
                if value.is_non_evaluated() {
                    return FixupOutcome::Pending(fixup);
                }
                let at = match target {
                    Some(_) => self.scopes.label_target(name),
                    None => SymbolTarget::Module(fixup.module),
                };
                if let Err(code) = self
                    .scopes
                    .define_symbol_at(at, name, value, SymbolKind::Label)
                {
                    self.report_fixup(
                        &fixup,
                        code,
                        format!("Symbol '{name}' is already defined"),
                        Span::default(),
                    );
                    return FixupOutcome::Failed;
                }
                trace!(name = name.as_str(), "equ fix-up applied");
                FixupOutcome::Applied
            }
            FixupKind::Entry { export, expr } => {
                let Some(value) = self.fixup_value(&fixup, expr) else {
                    return FixupOutcome::Failed;
                };
                if value.is_non_evaluated() {
                    return FixupOutcome::Pending(fixup);
                }
                match value.as_long() {
                    Some(address) if (0..=0xffff).contains(&address) => {
                        self.set_entry(*export, address as u16);
                        FixupOutcome::Applied
                    }
                    _ => {
                        self.report_fixup(
                            &fixup,
                            ErrorCode::ValueOutOfRange,
                            format!("'{value}' is not a valid entry address"),
                            expr.span(),
                        );
                        FixupOutcome::Failed
                    }
                }
            }
        }
    }

    fn fixup_value(&mut self, fixup: &Fixup, expr: &Expr) -> Option<ExpressionValue> {
        let result = try_evaluate(expr, &self.fixup_context(fixup));
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_fixup(fixup, err.code, err.message, err.span);
                None
            }
        }
    }

    /// Resolve the module-level fix-ups once the pass is over and report
    /// whatever is still undefined.
    pub(crate) fn finalize_fixups(&mut self) {
        let pending = std::mem::take(&mut self.module_fixups);
        debug!(count = pending.len(), "resolving module fix-ups");
        let unresolved = self.resolve_fixups(pending, None);
        for fixup in unresolved {
            let missing = {
                let ctx = self.fixup_context(&fixup);
                fixup
                    .expressions()
                    .into_iter()
                    .find_map(|expr| first_unresolved_symbol(expr, &ctx))
            };
            let (message, span) = match missing {
                Some((path, span)) => (format!("Symbol '{path}' is not defined"), span),
                None => ("Expression could not be resolved".to_string(), Span::default()),
            };
            self.report_fixup(&fixup, ErrorCode::UnresolvedSymbol, message, span);
        }
    }
}
