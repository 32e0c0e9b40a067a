// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

/// Render one `.trace` operand.
pub(crate) fn format_trace_value(value: &ExpressionValue, hex: bool) -> String {
    match value {
        ExpressionValue::Integer(number) if hex => {
            if (0..=0xff).contains(number) {
                format!("${number:02X}")
            } else {
                format!("${:04X}", *number as u16)
            }
        }
        ExpressionValue::Bool(flag) if hex => format!("${:02X}", *flag as u8),
        other => other.to_string(),
    }
}

impl<'a> Assembler<'a> {
    /// `.ent`/`.xent`: record the (export) entry address.
    pub(crate) fn execute_entry(&mut self, line: &SourceLine, expr: &Expr, export: bool) {
        let Some(value) = self.eval(line, expr) else {
            return;
        };
        if value.is_non_evaluated() {
            let fixup = self.new_fixup(
                line,
                FixupKind::Entry {
                    export,
                    expr: expr.clone(),
                },
                0,
                0,
                0,
                self.emitter.current_address(),
            );
            self.add_fixup(fixup);
            return;
        }
        match value.as_long() {
            Some(address) if (0..=0xffff).contains(&address) => {
                self.set_entry(export, address as u16);
            }
            _ => self.report_at(
                line,
                ErrorCode::ValueOutOfRange,
                format!("'{value}' is not a valid entry address"),
                expr.span(),
            ),
        }
    }

    pub(crate) fn set_entry(&mut self, export: bool, address: u16) {
        if export {
            self.export_entry_address = Some(address);
        } else {
            self.entry_address = Some(address);
        }
    }

    pub(crate) fn execute_trace(&mut self, line: &SourceLine, hex: bool, values: &[Expr]) {
        let mut text = String::new();
        for expr in values {
            let Some(value) = self.eval_immediate(line, expr) else {
                return;
            };
            text.push_str(&format_trace_value(&value, hex));
        }
        trace!(line = line.line, "{text}");
        self.trace_output.push(text);
    }

    pub(crate) fn execute_error(&mut self, line: &SourceLine, expr: &Expr) {
        let message = match self.eval_immediate(line, expr) {
            Some(value) => value.to_string(),
            None => return,
        };
        self.report(line, ErrorCode::UserError, message);
    }

    /// `.model`: a model configured in [`CompilerOptions`] takes precedence.
    pub(crate) fn execute_model(&mut self, line: &SourceLine, name: &str) {
        let Some(model) = SpectrumModel::from_name(name) else {
            self.report(line, ErrorCode::InvalidModel, format!("Unknown model '{name}'"));
            return;
        };
        if self.model_from_pragma {
            self.report(
                line,
                ErrorCode::ModelAlreadySet,
                "The model can only be set once with '.model'",
            );
            return;
        }
        self.model_from_pragma = true;
        if self.options.current_model.is_none() {
            debug!(model = model.as_str(), "model set by pragma");
            self.model = Some(model);
        }
    }
}
