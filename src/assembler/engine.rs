// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

/// A structural error stopped the directive pass. The diagnostic has already
/// been recorded when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AssemblyAbort;

/// An active macro invocation, used for depth limiting and error notes.
#[derive(Debug, Clone)]
pub(crate) struct MacroFrame {
    pub(crate) name: String,
    pub(crate) location: ErrorLocation,
}

/// The struct instance that field assignment lines patch.
#[derive(Debug, Clone)]
pub(crate) struct StructInstance {
    pub(crate) module: ModuleId,
    pub(crate) key: String,
    pub(crate) segment_index: usize,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

pub(crate) struct Assembler<'a> {
    pub(crate) options: &'a CompilerOptions,
    pub(crate) encoder: &'a dyn InstructionEncoder,
    pub(crate) lines: Arc<Vec<SourceLine>>,
    pub(crate) source_files: Vec<SourceFileItem>,
    pub(crate) defined_symbols: BTreeSet<String>,
    pub(crate) scopes: ScopeManager,
    pub(crate) emitter: SegmentEmitter,
    pub(crate) errors: ErrorCollector,
    pub(crate) source_map: SourceMap,
    pub(crate) list_items: Vec<ListFileItem>,
    pub(crate) trace_output: Vec<String>,
    pub(crate) module_fixups: Vec<Fixup>,
    pub(crate) entry_address: Option<u16>,
    pub(crate) export_entry_address: Option<u16>,
    pub(crate) model: Option<SpectrumModel>,
    pub(crate) model_from_pragma: bool,
    pub(crate) inject_options: BTreeSet<String>,
    pub(crate) macro_frames: Vec<MacroFrame>,
    pub(crate) struct_instance: Option<StructInstance>,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(options: &'a CompilerOptions, encoder: &'a dyn InstructionEncoder) -> Self {
        Self {
            options,
            encoder,
            lines: Arc::new(Vec::new()),
            source_files: Vec::new(),
            defined_symbols: options.predefined_symbols.keys().cloned().collect(),
            scopes: ScopeManager::new(
                options.use_case_sensitive_symbols,
                options.proc_explicit_locals_only,
            ),
            emitter: SegmentEmitter::new(options.default_start_address),
            errors: ErrorCollector::new(options.max_loop_errors_to_report),
            source_map: SourceMap::new(),
            list_items: Vec::new(),
            trace_output: Vec::new(),
            module_fixups: Vec::new(),
            entry_address: None,
            export_entry_address: None,
            model: options.current_model,
            model_from_pragma: false,
            inject_options: BTreeSet::new(),
            macro_frames: Vec::new(),
            struct_instance: None,
        }
    }

    pub(crate) fn location(&self, line: &SourceLine) -> ErrorLocation {
        ErrorLocation {
            file_name: self
                .source_files
                .get(line.file_index)
                .map(|item| item.filename.clone())
                .unwrap_or_default(),
            line: line.line,
            span: line.span,
        }
    }

    /// One "in expansion of" note per active macro frame, innermost first.
    fn macro_notes(&self) -> Vec<String> {
        self.macro_frames
            .iter()
            .rev()
            .map(|frame| {
                format!(
                    "in expansion of macro '{}' invoked at {}:{}",
                    frame.name, frame.location.file_name, frame.location.line
                )
            })
            .collect()
    }

    fn with_macro_notes(&self, info: AssemblerErrorInfo) -> AssemblerErrorInfo {
        self.macro_notes()
            .into_iter()
            .fold(info, |info, note| info.with_note(note))
    }

    pub(crate) fn report_info(&mut self, info: AssemblerErrorInfo) {
        let info = self.with_macro_notes(info);
        self.errors.report(info);
    }

    pub(crate) fn report(&mut self, line: &SourceLine, code: ErrorCode, message: impl Into<String>) {
        let info = AssemblerErrorInfo::new(code, message, &self.location(line));
        self.report_info(info);
    }

    pub(crate) fn report_at(
        &mut self,
        line: &SourceLine,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) {
        let mut info = AssemblerErrorInfo::new(code, message, &self.location(line));
        if span.col_start > 0 {
            info = info.with_columns(span.col_start, Some(span.col_end));
        }
        self.report_info(info);
    }

    pub(crate) fn warn(&mut self, line: &SourceLine, code: ErrorCode, message: impl Into<String>) {
        let info = AssemblerErrorInfo::new(code, message, &self.location(line)).warning();
        self.report_info(info);
    }

    pub(crate) fn report_eval_error(&mut self, line: &SourceLine, err: EvalError) {
        self.report_at(line, err.code, err.message, err.span);
    }

    /// Record a structural error and build the abort marker.
    pub(crate) fn abort(
        &mut self,
        line: &SourceLine,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> AssemblyAbort {
        let message = message.into();
        warn!(code = code.as_str(), line = line.line, "{message}");
        let info = self.with_macro_notes(AssemblerErrorInfo::new(code, message, &self.location(line)));
        self.errors.report_fatal(info);
        AssemblyAbort
    }

    pub(crate) fn effective_model(&self) -> Option<SpectrumModel> {
        self.model
    }

    pub(crate) fn push_scope(&mut self, kind: ScopeKind) -> usize {
        self.scopes.push_scope(kind)
    }

    /// Pop the innermost scope, retrying its fix-ups while its symbols are
    /// still visible. Leftovers move to the owner scope or the module list.
    pub(crate) fn close_scope(&mut self) {
        let pending = match self.scopes.current_mut() {
            Some(scope) => std::mem::take(&mut scope.fixups),
            None => return,
        };
        let target = SymbolTarget::Scope(self.scopes.depth() - 1);
        let unresolved = self.resolve_fixups(pending, Some(target));
        let Some(scope) = self.scopes.pop_scope() else {
            return;
        };
        match scope.owner.and_then(|owner| self.scopes.scope_mut(owner)) {
            Some(owner) => owner.fixups.extend(unresolved),
            None => self.module_fixups.extend(unresolved),
        }
    }

    /// Close scopes until the stack is `depth` deep.
    pub(crate) fn close_scopes_to(&mut self, depth: usize) {
        while self.scopes.depth() > depth {
            self.close_scope();
        }
    }

    /// Close a trailing short-term label group, if one is open.
    pub(crate) fn close_temporary_scope(&mut self) {
        if self
            .scopes
            .current()
            .is_some_and(|scope| scope.kind == ScopeKind::Temporary)
        {
            self.close_scope();
        }
    }

    pub(crate) fn add_fixup(&mut self, fixup: Fixup) {
        match self.scopes.current_mut() {
            Some(scope) => scope.fixups.push(fixup),
            None => self.module_fixups.push(fixup),
        }
    }

    /// Fix-up skeleton at the current emission point.
    pub(crate) fn new_fixup(
        &mut self,
        line: &SourceLine,
        kind: FixupKind,
        segment_index: usize,
        offset: usize,
        length: usize,
        address: u16,
    ) -> Fixup {
        Fixup {
            kind,
            segment_index,
            offset,
            length,
            address,
            loop_counter: self.scopes.loop_counter(),
            module: self.scopes.modules().current(),
            location: self.location(line),
            notes: self.macro_notes(),
            loop_runs: self.errors.active_loops().to_vec(),
        }
    }
}
