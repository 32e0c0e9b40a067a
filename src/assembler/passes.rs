// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Compilation run orchestration.
//!
//! Loads the sources, seeds predefined symbols, executes the statement list
//! once and then resolves the remaining module-level fix-ups.

use super::*;

use crate::core::module_tree::ROOT_MODULE;

impl<'a> Assembler<'a> {
    pub(crate) fn run(&mut self, provider: &dyn SourceProvider, main: &str) {
        debug!(file = main, "assembly started");
        let mut lines = Vec::new();
        if self.load_file(provider, main, None, None, &mut lines).is_err() {
            warn!(file = main, "source loading aborted");
            return;
        }
        self.lines = Arc::new(lines);
        self.seed_predefined_symbols();

        let lines = Arc::clone(&self.lines);
        if self.execute_range(&lines, 0, lines.len()).is_err() {
            warn!(file = main, errors = self.errors.error_count(), "assembly aborted");
            return;
        }
        self.close_scopes_to(0);
        self.finalize_fixups();
        debug!(
            file = main,
            errors = self.errors.error_count(),
            warnings = self.errors.warning_count(),
            bytes = self.emitter.total_bytes(),
            "assembly finished"
        );
    }

    fn seed_predefined_symbols(&mut self) {
        for (name, value) in &self.options.predefined_symbols {
            let seeded = self.scopes.define_symbol_at(
                SymbolTarget::Module(ROOT_MODULE),
                name,
                value.clone(),
                SymbolKind::Var,
            );
            if seeded.is_err() {
                warn!(name = name.as_str(), "predefined symbol ignored");
            }
        }
    }
}
