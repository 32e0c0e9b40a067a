// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

use crate::core::assembler::segment::BANK_SIZE;

impl<'a> Assembler<'a> {
    /// Route a pragma line to its handler.
    pub(crate) fn execute_pragma(&mut self, line: &SourceLine, pragma: &Pragma) {
        if pragma.emits_data() {
            self.emit_data(line, pragma);
            return;
        }
        match pragma {
            Pragma::Org(expr) => {
                if let Some(address) = self.eval_address(line, expr) {
                    self.emitter.set_origin(address);
                }
            }
            Pragma::Bank { bank, offset } => self.execute_bank(line, bank, offset.as_ref()),
            Pragma::Xorg(expr) => {
                if let Some(address) = self.eval_address(line, expr) {
                    self.emitter.set_xorg(address);
                }
            }
            Pragma::Disp(expr) => {
                if let Some(value) = self.eval_integer(line, expr) {
                    self.emitter.set_displacement(value);
                }
            }
            Pragma::Skip { address, fill } => self.execute_skip(line, address, fill.as_ref()),
            Pragma::Align(expr) => self.execute_align(line, expr.as_ref()),
            Pragma::Equ(expr) => self.execute_equ(line, expr),
            Pragma::Var(expr) => self.execute_var(line, expr),
            Pragma::Ent(expr) => self.execute_entry(line, expr, false),
            Pragma::Xent(expr) => self.execute_entry(line, expr, true),
            Pragma::Trace { hex, values } => self.execute_trace(line, *hex, values),
            Pragma::Error(expr) => self.execute_error(line, expr),
            Pragma::Model(name) => self.execute_model(line, name),
            Pragma::InjectOpt(options) => {
                self.inject_options.extend(options.iter().cloned());
            }
            _ => {}
        }
    }

    /// A 16-bit address operand.
    pub(crate) fn eval_address(&mut self, line: &SourceLine, expr: &Expr) -> Option<u16> {
        let value = self.eval_integer(line, expr)?;
        if !(0..=0xffff).contains(&value) {
            self.report_at(
                line,
                ErrorCode::ValueOutOfRange,
                format!("Address {value} is outside $0000-$FFFF"),
                expr.span(),
            );
            return None;
        }
        Some(value as u16)
    }

    fn execute_bank(&mut self, line: &SourceLine, bank: &Expr, offset: Option<&Expr>) {
        let Some(model) = self.effective_model().filter(|model| model.supports_banks()) else {
            let model = self
                .effective_model()
                .map(|model| model.to_string())
                .unwrap_or_else(|| "no model".to_string());
            self.report(
                line,
                ErrorCode::BankNotSupported,
                format!("'.bank' is not available with {model}"),
            );
            return;
        };
        let Some(bank_id) = self.eval_integer(line, bank) else {
            return;
        };
        if !(0..=model.max_bank()).contains(&bank_id) {
            self.report_at(
                line,
                ErrorCode::InvalidBank,
                format!("Bank {bank_id} is outside 0-{} for {model}", model.max_bank()),
                bank.span(),
            );
            return;
        }
        let offset = match offset {
            Some(expr) => match self.eval_integer(line, expr) {
                Some(value) if (0..BANK_SIZE as i64).contains(&value) => value as u16,
                Some(value) => {
                    self.report_at(
                        line,
                        ErrorCode::InvalidBank,
                        format!("Bank offset {value} is outside $0000-$3FFF"),
                        expr.span(),
                    );
                    return;
                }
                None => return,
            },
            None => 0,
        };
        match self.emitter.start_bank(bank_id as u8, offset) {
            Ok(()) => debug!(bank = bank_id, offset, "opened bank segment"),
            Err(code) => self.report(line, code, format!("Bank {bank_id} has already been used")),
        }
    }

    fn execute_skip(&mut self, line: &SourceLine, address: &Expr, fill: Option<&Expr>) {
        let Some(target) = self.eval_integer(line, address) else {
            return;
        };
        let fill = match fill {
            Some(expr) => match self.eval_byte(line, expr) {
                Some(value) => value,
                None => return,
            },
            None => 0xff,
        };
        let current = self.emitter.current_address() as i64;
        if target < current {
            self.report_at(
                line,
                ErrorCode::SkipBackwards,
                format!("Cannot skip backwards from ${current:04X} to ${target:04X}"),
                address.span(),
            );
            return;
        }
        let bytes = vec![fill; (target - current) as usize];
        self.emit_bytes(line, &bytes);
    }

    fn execute_align(&mut self, line: &SourceLine, expr: Option<&Expr>) {
        let alignment = match expr {
            Some(expr) => match self.eval_integer(line, expr) {
                Some(value) => value,
                None => return,
            },
            None => 0x100,
        };
        if !(1..=0x10000).contains(&alignment) {
            self.report(
                line,
                ErrorCode::InvalidAlignment,
                format!("Alignment {alignment} must be between 1 and $10000"),
            );
            return;
        }
        let current = self.emitter.current_address() as i64;
        let padding = (alignment - current % alignment) % alignment;
        let bytes = vec![0u8; padding as usize];
        self.emit_bytes(line, &bytes);
    }

    fn execute_equ(&mut self, line: &SourceLine, expr: &Expr) {
        let Some(name) = line.label.as_deref() else {
            self.report(line, ErrorCode::MissingLabel, "'.equ' requires a label");
            return;
        };
        let Some(value) = self.eval(line, expr) else {
            return;
        };
        if value.is_non_evaluated() {
            let fixup = self.new_fixup(
                line,
                FixupKind::Equ {
                    name: name.to_string(),
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
        if let Err(code) = self.scopes.define_symbol(name, value, SymbolKind::Label) {
            self.report(line, code, format!("Symbol '{name}' is already defined"));
        }
    }

    fn execute_var(&mut self, line: &SourceLine, expr: &Expr) {
        let Some(name) = line.label.as_deref() else {
            self.report(line, ErrorCode::MissingLabel, "A variable assignment requires a name");
            return;
        };
        let Some(value) = self.eval_immediate(line, expr) else {
            return;
        };
        if let Err(code) = self.scopes.assign_variable(name, value) {
            let message = match code {
                ErrorCode::LabelNotVariable => format!("'{name}' is a label, not a variable"),
                _ => format!("Cannot assign to '{name}'"),
            };
            self.report(line, code, message);
        }
    }
}
