// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Seam to the external instruction encoder.
//!
//! The directive core resolves operand expressions and hands the encoder a
//! mnemonic plus fully typed operands. Operands whose value is still a
//! forward reference arrive as [`OperandValue::Deferred`]; the encoder must
//! emit placeholder bytes of the final length for them and skip range checks.
//! The instruction is encoded again once the fix-up resolves.

use thiserror::Error;

use crate::core::ast::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandValue {
    Known(i64),
    Deferred,
}

impl OperandValue {
    /// Value to encode: deferred operands encode as zero.
    pub fn or_placeholder(self) -> i64 {
        match self {
            OperandValue::Known(value) => value,
            OperandValue::Deferred => 0,
        }
    }

    pub fn is_deferred(self) -> bool {
        matches!(self, OperandValue::Deferred)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOperand {
    Register(String),
    RegisterIndirect(String),
    Indirect(OperandValue),
    Indexed {
        register: String,
        displacement: OperandValue,
    },
    Immediate(OperandValue),
}

impl ResolvedOperand {
    /// Register-shaped operands need no evaluation.
    pub fn from_static(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Register(name) => Some(ResolvedOperand::Register(name.to_ascii_lowercase())),
            Operand::RegisterIndirect(name) => {
                Some(ResolvedOperand::RegisterIndirect(name.to_ascii_lowercase()))
            }
            Operand::Indexed {
                register,
                displacement: None,
            } => Some(ResolvedOperand::Indexed {
                register: register.to_ascii_lowercase(),
                displacement: OperandValue::Known(0),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstructionRequest<'a> {
    pub mnemonic: &'a str,
    pub operands: &'a [ResolvedOperand],
    /// Address of the first instruction byte (for relative jumps).
    pub address: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unknown instruction '{0}'")]
    UnknownMnemonic(String),
    #[error("invalid operands for '{0}'")]
    InvalidOperands(String),
    #[error("{what} value {value} is out of range")]
    OutOfRange { what: &'static str, value: i64 },
}

/// Pure function from a decoded instruction to its bytes.
pub trait InstructionEncoder {
    fn encode(&self, request: &InstructionRequest<'_>) -> Result<Vec<u8>, EncodeError>;
}
