// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Deferred forward-reference records.

use crate::core::assembler::error::{ErrorLocation, LoopRunId};
use crate::core::ast::{Expr, Operand};
use crate::core::module_tree::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Byte,
    Word,
}

impl DataWidth {
    pub fn size(self) -> usize {
        match self {
            DataWidth::Byte => 1,
            DataWidth::Word => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixupKind {
    /// Re-encode the whole instruction in place.
    Instruction {
        mnemonic: String,
        operands: Vec<Operand>,
    },
    Data {
        width: DataWidth,
        expr: Expr,
    },
    /// `.equ` whose value referenced an undefined symbol.
    Equ {
        name: String,
        expr: Expr,
    },
    /// `.ent` or `.xent`.
    Entry {
        export: bool,
        expr: Expr,
    },
}

/// A statement result that could not be computed when it executed.
///
/// The `$` address and `$cnt` value are captured at record time.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixup {
    pub kind: FixupKind,
    pub segment_index: usize,
    pub offset: usize,
    pub length: usize,
    pub address: u16,
    pub loop_counter: Option<i64>,
    pub module: ModuleId,
    pub location: ErrorLocation,
    pub notes: Vec<String>,
    /// Loop runs active when recorded; their error ceilings still apply.
    pub loop_runs: Vec<LoopRunId>,
}

impl Fixup {
    pub fn is_equ(&self) -> bool {
        matches!(self.kind, FixupKind::Equ { .. })
    }

    /// The expressions whose symbols must resolve before this fixup applies.
    pub fn expressions(&self) -> Vec<&Expr> {
        match &self.kind {
            FixupKind::Instruction { operands, .. } => operands
                .iter()
                .filter_map(|operand| match operand {
                    Operand::Expr(expr) | Operand::Indirect(expr) => Some(expr),
                    Operand::Indexed {
                        displacement: Some(expr),
                        ..
                    } => Some(expr),
                    _ => None,
                })
                .collect(),
            FixupKind::Data { expr, .. }
            | FixupKind::Equ { expr, .. }
            | FixupKind::Entry { expr, .. } => vec![expr],
        }
    }
}
