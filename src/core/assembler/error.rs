// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error codes, diagnostics, and the per-loop error collector.

use std::fmt;

use crate::core::ast::LineSpan;

/// Broad diagnostic taxonomy. Structural errors abort the directive pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Structural,
    Semantic,
    Encoding,
    Policy,
}

/// Closed set of diagnostic codes reported by the directive core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    MissingEndStatement,
    OrphanEndStatement,
    MacroRecursionTooDeep,
    IncludeCycle,
    UnbalancedDirective,

    DuplicateSymbol,
    UnresolvedSymbol,
    LabelNotVariable,
    DuplicateModule,
    DuplicateMacro,
    DuplicateStruct,
    UnknownMacroOrStruct,
    LocalOutsideProc,
    InvalidLocalName,
    MissingLabel,
    ModuleInLocalScope,
    DefinitionInLocalScope,

    TypeMismatch,
    DivideByZero,
    ExpressionNotEvaluated,
    InvalidFunctionCall,
    LoopCounterOutsideLoop,

    LoopCountTooLarge,
    TooManyLoopIterations,
    ForStepZero,
    NotInLoop,
    ForVariableIsLabel,

    CodeSegmentOverflow,
    BankNotSupported,
    InvalidBank,
    ValueOutOfRange,
    DuplicateBank,
    InvalidHexString,
    SkipBackwards,
    InvalidAlignment,

    EncodingFailed,
    EncodingLengthChanged,

    TooManyMacroArguments,
    NestedMacroDefinition,
    MacroArgumentMisuse,
    MissingMacroArgument,
    DuplicateMacroParameter,
    StructArguments,
    UnknownStructField,
    FieldAssignmentOutsideStruct,
    InvalidStructStatement,
    StructFieldOverflow,
    DuplicateStructField,

    UserError,
    IncludeNotFound,
    InvalidModel,
    ModelAlreadySet,
    RedundantLocal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingEndStatement => "Z0101",
            ErrorCode::OrphanEndStatement => "Z0102",
            ErrorCode::MacroRecursionTooDeep => "Z0103",
            ErrorCode::IncludeCycle => "Z0104",
            ErrorCode::UnbalancedDirective => "Z0105",
            ErrorCode::DuplicateSymbol => "Z0201",
            ErrorCode::UnresolvedSymbol => "Z0202",
            ErrorCode::LabelNotVariable => "Z0203",
            ErrorCode::DuplicateModule => "Z0204",
            ErrorCode::DuplicateMacro => "Z0205",
            ErrorCode::DuplicateStruct => "Z0206",
            ErrorCode::UnknownMacroOrStruct => "Z0207",
            ErrorCode::LocalOutsideProc => "Z0208",
            ErrorCode::InvalidLocalName => "Z0209",
            ErrorCode::MissingLabel => "Z0210",
            ErrorCode::ModuleInLocalScope => "Z0211",
            ErrorCode::DefinitionInLocalScope => "Z0212",
            ErrorCode::TypeMismatch => "Z0301",
            ErrorCode::DivideByZero => "Z0302",
            ErrorCode::ExpressionNotEvaluated => "Z0303",
            ErrorCode::InvalidFunctionCall => "Z0304",
            ErrorCode::LoopCounterOutsideLoop => "Z0305",
            ErrorCode::LoopCountTooLarge => "Z0401",
            ErrorCode::TooManyLoopIterations => "Z0402",
            ErrorCode::ForStepZero => "Z0403",
            ErrorCode::NotInLoop => "Z0404",
            ErrorCode::ForVariableIsLabel => "Z0405",
            ErrorCode::CodeSegmentOverflow => "Z0501",
            ErrorCode::BankNotSupported => "Z0502",
            ErrorCode::InvalidBank => "Z0503",
            ErrorCode::ValueOutOfRange => "Z0504",
            ErrorCode::DuplicateBank => "Z0505",
            ErrorCode::InvalidHexString => "Z0506",
            ErrorCode::SkipBackwards => "Z0507",
            ErrorCode::InvalidAlignment => "Z0508",
            ErrorCode::EncodingFailed => "Z0601",
            ErrorCode::EncodingLengthChanged => "Z0602",
            ErrorCode::TooManyMacroArguments => "Z0701",
            ErrorCode::NestedMacroDefinition => "Z0702",
            ErrorCode::MacroArgumentMisuse => "Z0703",
            ErrorCode::MissingMacroArgument => "Z0704",
            ErrorCode::DuplicateMacroParameter => "Z0705",
            ErrorCode::StructArguments => "Z0706",
            ErrorCode::UnknownStructField => "Z0707",
            ErrorCode::FieldAssignmentOutsideStruct => "Z0708",
            ErrorCode::InvalidStructStatement => "Z0709",
            ErrorCode::StructFieldOverflow => "Z0710",
            ErrorCode::DuplicateStructField => "Z0711",
            ErrorCode::UserError => "Z0801",
            ErrorCode::IncludeNotFound => "Z0802",
            ErrorCode::InvalidModel => "Z0803",
            ErrorCode::ModelAlreadySet => "Z0804",
            ErrorCode::RedundantLocal => "Z0805",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::MissingEndStatement
            | ErrorCode::OrphanEndStatement
            | ErrorCode::MacroRecursionTooDeep
            | ErrorCode::IncludeCycle
            | ErrorCode::UnbalancedDirective => ErrorClass::Structural,
            ErrorCode::EncodingFailed | ErrorCode::EncodingLengthChanged => ErrorClass::Encoding,
            ErrorCode::RedundantLocal => ErrorClass::Policy,
            _ => ErrorClass::Semantic,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic points in the sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file_name: String,
    pub line: u32,
    pub span: LineSpan,
}

/// One diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerErrorInfo {
    pub error_code: ErrorCode,
    pub file_name: String,
    pub line: u32,
    pub start_position: usize,
    pub end_position: Option<usize>,
    pub start_column: usize,
    pub end_column: Option<usize>,
    pub message: String,
    pub is_warning: bool,
    pub notes: Vec<String>,
}

impl AssemblerErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>, location: &ErrorLocation) -> Self {
        Self {
            error_code: code,
            file_name: location.file_name.clone(),
            line: location.line,
            start_position: location.span.start_position,
            end_position: location.span.end_position,
            start_column: location.span.start_column,
            end_column: location.span.end_column,
            message: message.into(),
            is_warning: false,
            notes: Vec::new(),
        }
    }

    pub fn warning(mut self) -> Self {
        self.is_warning = true;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_columns(mut self, start: usize, end: Option<usize>) -> Self {
        self.start_column = start;
        self.end_column = end;
        self
    }

    pub fn code(&self) -> &'static str {
        self.error_code.as_str()
    }

    pub fn class(&self) -> ErrorClass {
        self.error_code.class()
    }

    pub fn format(&self) -> String {
        let sev = if self.is_warning { "WARNING" } else { "ERROR" };
        if self.file_name.is_empty() {
            format!("{}: {} [{}] - {}", self.line, sev, self.code(), self.message)
        } else {
            format!(
                "{}:{}: {} [{}] - {}",
                self.file_name,
                self.line,
                sev,
                self.code(),
                self.message
            )
        }
    }

    pub fn format_with_context(&self, source_line: Option<&str>, use_color: bool) -> String {
        let mut out = self.format();
        out.push('\n');
        let column = if self.start_column > 0 {
            Some(self.start_column)
        } else {
            None
        };
        match source_line {
            Some(text) => out.push_str(&format!(
                "{:>5} | {}",
                self.line,
                crate::core::report::highlight_line(text, column, self.end_column, use_color)
            )),
            None => out.push_str(&format!("{:>5} | <source unavailable>", self.line)),
        }
        for note in &self.notes {
            out.push_str("\nnote: ");
            out.push_str(note);
        }
        out
    }
}

impl fmt::Display for AssemblerErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Identifies one execution of a loop construct.
pub type LoopRunId = usize;

/// Collects diagnostics and enforces the per-loop reporting ceiling.
///
/// Every loop run owns a counter of the errors reported while it ran. Once
/// any active run reaches the ceiling, further diagnostics are counted but
/// not recorded. Deferred diagnostics carry the runs they were recorded in,
/// so the ceiling still holds after those loops have finished.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<AssemblerErrorInfo>,
    error_count: usize,
    suppressed: usize,
    loop_runs: Vec<usize>,
    active_loops: Vec<LoopRunId>,
    max_loop_errors: usize,
}

impl ErrorCollector {
    pub fn new(max_loop_errors: usize) -> Self {
        Self {
            max_loop_errors,
            ..Self::default()
        }
    }

    /// Record a diagnostic. Returns `false` when a loop ceiling hid it.
    pub fn report(&mut self, info: AssemblerErrorInfo) -> bool {
        self.report_in_loops(info, &[])
    }

    /// Record a diagnostic raised on behalf of `runs` as well as the loops
    /// active now.
    pub fn report_in_loops(&mut self, info: AssemblerErrorInfo, runs: &[LoopRunId]) -> bool {
        let mut frames: Vec<LoopRunId> = runs.iter().chain(&self.active_loops).copied().collect();
        frames.sort_unstable();
        frames.dedup();

        if !info.is_warning {
            self.error_count += 1;
        }
        if frames
            .iter()
            .any(|id| self.loop_runs[*id] >= self.max_loop_errors)
        {
            self.suppressed += 1;
            return false;
        }
        // Warnings never use up a loop's ceiling.
        if !info.is_warning {
            for id in frames {
                self.loop_runs[id] += 1;
            }
        }
        self.errors.push(info);
        true
    }

    /// Record a structural diagnostic. Never hidden by a loop ceiling.
    pub fn report_fatal(&mut self, info: AssemblerErrorInfo) {
        self.error_count += 1;
        self.errors.push(info);
    }

    pub fn begin_loop(&mut self) -> LoopRunId {
        let id = self.loop_runs.len();
        self.loop_runs.push(0);
        self.active_loops.push(id);
        id
    }

    pub fn end_loop(&mut self) {
        self.active_loops.pop();
    }

    /// Loop runs enclosing the statement executing now, outermost first.
    pub fn active_loops(&self) -> &[LoopRunId] {
        &self.active_loops
    }

    pub fn errors(&self) -> &[AssemblerErrorInfo] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|info| info.is_warning).count()
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn into_parts(self) -> (Vec<AssemblerErrorInfo>, usize, usize) {
        (self.errors, self.error_count, self.suppressed)
    }
}
