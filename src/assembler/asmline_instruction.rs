// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

/// Operands ready for the encoder, plus whether any value is a forward
/// reference.
pub(crate) struct ResolvedOperands {
    pub(crate) operands: Vec<ResolvedOperand>,
    pub(crate) deferred: bool,
}

fn operand_value(expr: &Expr, ctx: &dyn EvalContext) -> Result<OperandValue, EvalError> {
    match try_evaluate(expr, ctx)? {
        ExpressionValue::NonEvaluated => Ok(OperandValue::Deferred),
        ExpressionValue::Str(_) => Err(EvalError::new(
            ErrorCode::TypeMismatch,
            "A string value cannot be used as an instruction operand",
            expr.span(),
        )),
        value => value.as_long().map(OperandValue::Known).ok_or_else(|| {
            EvalError::new(
                ErrorCode::TypeMismatch,
                format!("A {:?} value cannot be used as an instruction operand", value.value_type()),
                expr.span(),
            )
        }),
    }
}

/// Evaluate the expression parts of instruction operands. Omitted operands
/// are dropped.
pub(crate) fn resolve_operands(
    operands: &[Operand],
    ctx: &dyn EvalContext,
) -> Result<ResolvedOperands, EvalError> {
    let mut resolved = Vec::with_capacity(operands.len());
    for operand in operands {
        if let Some(fixed) = ResolvedOperand::from_static(operand) {
            resolved.push(fixed);
            continue;
        }
        let next = match operand {
            Operand::Expr(expr) => ResolvedOperand::Immediate(operand_value(expr, ctx)?),
            Operand::Indirect(expr) => ResolvedOperand::Indirect(operand_value(expr, ctx)?),
            Operand::Indexed {
                register,
                displacement: Some(expr),
            } => ResolvedOperand::Indexed {
                register: register.to_ascii_lowercase(),
                displacement: operand_value(expr, ctx)?,
            },
            _ => continue,
        };
        resolved.push(next);
    }
    let deferred = resolved.iter().any(|operand| {
        matches!(
            operand,
            ResolvedOperand::Immediate(OperandValue::Deferred)
                | ResolvedOperand::Indirect(OperandValue::Deferred)
                | ResolvedOperand::Indexed {
                    displacement: OperandValue::Deferred,
                    ..
                }
        )
    });
    Ok(ResolvedOperands {
        operands: resolved,
        deferred,
    })
}

impl<'a> Assembler<'a> {
    pub(crate) fn execute_instruction(
        &mut self,
        line: &SourceLine,
        mnemonic: &str,
        operands: &[Operand],
    ) {
        let resolved = resolve_operands(operands, &self.eval_context());
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                self.report_eval_error(line, err);
                return;
            }
        };
        self.emitter.mark_instruction_start();
        let address = self.emitter.current_address();
        let request = InstructionRequest {
            mnemonic,
            operands: &resolved.operands,
            address,
        };
        let bytes = match self.encoder.encode(&request) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.report(line, ErrorCode::EncodingFailed, err.to_string());
                return;
            }
        };
        let (segment_index, offset) = self.emit_bytes(line, &bytes);
        if resolved.deferred {
            trace!(mnemonic, address, "instruction deferred");
            let fixup = self.new_fixup(
                line,
                FixupKind::Instruction {
                    mnemonic: mnemonic.to_string(),
                    operands: operands.to_vec(),
                },
                segment_index,
                offset,
                bytes.len(),
                address,
            );
            self.add_fixup(fixup);
        }
    }
}
