// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Z80 directive dispatcher - public entry point.
//!
//! This module ties together the CPU-agnostic core (scopes, modules,
//! segments, diagnostics) with an external instruction encoder and source
//! provider. The dispatcher `impl` is split by statement family across the
//! `asmline_*` files.

mod asmline_conditionals;
mod asmline_directives_data;
mod asmline_directives_layout;
mod asmline_directives_metadata;
mod asmline_directives_scope;
mod asmline_eval;
mod asmline_instruction;
mod asmline_loops;
mod asmline_macros;
mod asmline_statements;
mod engine;
mod fixups;
mod output;
mod passes;
mod preprocess;
#[cfg(test)]
mod tests;

pub use output::CompilerOutput;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::core::assembler::error::{
    AssemblerErrorInfo, ErrorCode, ErrorCollector, ErrorLocation,
};
use crate::core::assembler::fixup::{DataWidth, Fixup, FixupKind};
use crate::core::assembler::listing::ListFileItem;
use crate::core::assembler::scope::{
    LoopControlSignal, ScopeId, ScopeKind, ScopeManager, SymbolTarget,
};
use crate::core::assembler::segment::SegmentEmitter;
use crate::core::ast::{
    Directive, Expr, LineKind, Operand, Pragma, SourceLine, Span, Statement, SymbolPath,
};
use crate::core::encoder::{InstructionEncoder, InstructionRequest, OperandValue, ResolvedOperand};
use crate::core::expr::{first_unresolved_symbol, try_evaluate, EvalContext, EvalError};
use crate::core::module_tree::{ModuleId, SymbolKind};
use crate::core::source::{MemorySourceProvider, SourceFileItem, SourceProvider};
use crate::core::source_map::{FileLine, SourceMap};
use crate::core::value::ExpressionValue;

use engine::{AssemblyAbort, Assembler, MacroFrame, StructInstance};

/// Macro invocations nested deeper than this abort the pass.
pub const MAX_MACRO_DEPTH: usize = 32;
/// Upper bound on loop counts and iterations.
pub const MAX_LOOP_ITERATIONS: i64 = 0xffff;

/// Target ZX Spectrum model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpectrumModel {
    Spectrum48,
    Spectrum128,
    SpectrumP3,
    Next,
}

impl SpectrumModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "48" | "spectrum48" => Some(SpectrumModel::Spectrum48),
            "128" | "spectrum128" => Some(SpectrumModel::Spectrum128),
            "p3" | "+3" | "spectrump3" => Some(SpectrumModel::SpectrumP3),
            "next" => Some(SpectrumModel::Next),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpectrumModel::Spectrum48 => "Spectrum48",
            SpectrumModel::Spectrum128 => "Spectrum128",
            SpectrumModel::SpectrumP3 => "SpectrumP3",
            SpectrumModel::Next => "Next",
        }
    }

    /// Models with paged 16K banks at `0xC000`.
    pub fn supports_banks(self) -> bool {
        !matches!(self, SpectrumModel::Spectrum48)
    }

    pub fn max_bank(self) -> i64 {
        match self {
            SpectrumModel::Next => 111,
            _ => 7,
        }
    }
}

impl fmt::Display for SpectrumModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compilation settings, read once when a [`Compiler`] is created.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    /// Seeded as root-module variables and as `#ifdef` symbols.
    pub predefined_symbols: BTreeMap<String, ExpressionValue>,
    pub default_start_address: u16,
    pub current_model: Option<SpectrumModel>,
    pub max_loop_errors_to_report: usize,
    pub proc_explicit_locals_only: bool,
    pub use_case_sensitive_symbols: bool,
    pub flexible_def_pragmas: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            predefined_symbols: BTreeMap::new(),
            default_start_address: 0x8000,
            current_model: None,
            max_loop_errors_to_report: 16,
            proc_explicit_locals_only: false,
            use_case_sensitive_symbols: false,
            flexible_def_pragmas: false,
        }
    }
}

impl CompilerOptions {
    pub fn with_symbol(mut self, name: &str, value: ExpressionValue) -> Self {
        self.predefined_symbols.insert(name.to_string(), value);
        self
    }

    pub fn with_start_address(mut self, address: u16) -> Self {
        self.default_start_address = address;
        self
    }

    pub fn with_model(mut self, model: SpectrumModel) -> Self {
        self.current_model = Some(model);
        self
    }

    pub fn with_max_loop_errors(mut self, max: usize) -> Self {
        self.max_loop_errors_to_report = max;
        self
    }

    pub fn with_explicit_proc_locals(mut self, enabled: bool) -> Self {
        self.proc_explicit_locals_only = enabled;
        self
    }

    pub fn with_case_sensitive_symbols(mut self, enabled: bool) -> Self {
        self.use_case_sensitive_symbols = enabled;
        self
    }

    pub fn with_flexible_def_pragmas(mut self, enabled: bool) -> Self {
        self.flexible_def_pragmas = enabled;
        self
    }
}

/// One compilation front door. Each call to [`Compiler::compile`] runs on
/// fresh state; nothing is shared between runs.
pub struct Compiler<'a> {
    options: CompilerOptions,
    encoder: &'a dyn InstructionEncoder,
}

impl<'a> Compiler<'a> {
    pub fn new(options: CompilerOptions, encoder: &'a dyn InstructionEncoder) -> Self {
        Self { options, encoder }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile `filename` and everything it includes.
    pub fn compile(&self, provider: &dyn SourceProvider, filename: &str) -> CompilerOutput {
        let mut asm = Assembler::new(&self.options, self.encoder);
        asm.run(provider, filename);
        asm.into_output()
    }

    /// Compile a single in-memory file named `main.asm`.
    pub fn compile_lines(&self, lines: Vec<SourceLine>) -> CompilerOutput {
        let provider = MemorySourceProvider::new().with_file("main.asm", lines);
        self.compile(&provider, "main.asm")
    }
}
