// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Lexical scope stack and symbol visibility.
//!
//! Scopes are pushed for loop iterations, procs, macro invocations and
//! short-term label groups. They are stored in a stack-shaped arena: a
//! scope's id is its depth and its owner is the scope right below it.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::assembler::error::ErrorCode;
use crate::core::assembler::fixup::Fixup;
use crate::core::ast::{Operand, SymbolPath};
use crate::core::module_tree::{AssemblySymbolInfo, ModuleId, ModuleTree, SymbolKind};
use crate::core::value::ExpressionValue;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Loop,
    Proc,
    Macro,
    /// Group of short-term (`` ` ``) labels, closed by the next normal label.
    Temporary,
}

/// Control transfer requested by `.break`/`.continue`, returned up the
/// statement executor call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControlSignal {
    None,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolScope {
    pub owner: Option<ScopeId>,
    pub kind: ScopeKind,
    pub module: ModuleId,
    pub loop_counter: i64,
    pub symbols: BTreeMap<String, AssemblySymbolInfo>,
    pub local_symbol_bookings: BTreeSet<String>,
    pub break_reached: bool,
    pub continue_reached: bool,
    pub macro_arguments: Option<BTreeMap<String, Operand>>,
    pub fixups: Vec<Fixup>,
}

impl SymbolScope {
    fn new(owner: Option<ScopeId>, kind: ScopeKind, module: ModuleId) -> Self {
        Self {
            owner,
            kind,
            module,
            loop_counter: 0,
            symbols: BTreeMap::new(),
            local_symbol_bookings: BTreeSet::new(),
            break_reached: false,
            continue_reached: false,
            macro_arguments: None,
            fixups: Vec::new(),
        }
    }

    pub fn is_loop(&self) -> bool {
        self.kind == ScopeKind::Loop
    }
}

/// Where a definition landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTarget {
    Scope(ScopeId),
    Module(ModuleId),
}

/// Scope stack plus module tree for one compilation.
#[derive(Debug, Clone)]
pub struct ScopeManager {
    scopes: Vec<SymbolScope>,
    modules: ModuleTree,
    proc_explicit_locals_only: bool,
}

impl ScopeManager {
    pub fn new(case_sensitive: bool, proc_explicit_locals_only: bool) -> Self {
        Self {
            scopes: Vec::new(),
            modules: ModuleTree::new(case_sensitive),
            proc_explicit_locals_only,
        }
    }

    pub fn modules(&self) -> &ModuleTree {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleTree {
        &mut self.modules
    }

    pub fn into_modules(self) -> ModuleTree {
        self.modules
    }

    pub fn normalize(&self, name: &str) -> String {
        self.modules.normalize(name)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        let owner = id.checked_sub(1);
        self.scopes
            .push(SymbolScope::new(owner, kind, self.modules.current()));
        id
    }

    pub fn pop_scope(&mut self) -> Option<SymbolScope> {
        self.scopes.pop()
    }

    pub fn current(&self) -> Option<&SymbolScope> {
        self.scopes.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut SymbolScope> {
        self.scopes.last_mut()
    }

    pub fn scope(&self, id: ScopeId) -> Option<&SymbolScope> {
        self.scopes.get(id)
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> Option<&mut SymbolScope> {
        self.scopes.get_mut(id)
    }

    fn innermost(&self, kind: ScopeKind) -> Option<ScopeId> {
        self.scopes.iter().rposition(|scope| scope.kind == kind)
    }

    pub fn innermost_loop(&self) -> Option<ScopeId> {
        self.innermost(ScopeKind::Loop)
    }

    pub fn innermost_proc(&self) -> Option<ScopeId> {
        self.innermost(ScopeKind::Proc)
    }

    pub fn has_local_scope(&self) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.kind != ScopeKind::Temporary)
    }

    pub fn loop_counter(&self) -> Option<i64> {
        self.innermost_loop()
            .map(|id| self.scopes[id].loop_counter)
    }

    /// Formal argument bound by the innermost macro invocation.
    pub fn macro_argument(&self, name: &str) -> Option<&Operand> {
        let id = self.innermost(ScopeKind::Macro)?;
        let key = self.normalize(name);
        self.scopes[id].macro_arguments.as_ref()?.get(&key)
    }

    /// Resolve a symbol from the current scope chain and module.
    pub fn resolve_symbol(&self, path: &SymbolPath) -> Option<&AssemblySymbolInfo> {
        self.resolve_symbol_in(path, self.modules.current())
    }

    /// Resolve a symbol from the current scope chain, falling back to the
    /// chain of module `module`. Marks the symbol as used.
    pub fn resolve_symbol_in(
        &self,
        path: &SymbolPath,
        module: ModuleId,
    ) -> Option<&AssemblySymbolInfo> {
        let found = self.find_symbol_in(path, module);
        if let Some(info) = found {
            info.mark_used();
        }
        found
    }

    /// Same lookup as [`Self::resolve_symbol_in`] without marking usage.
    pub fn find_symbol_in(&self, path: &SymbolPath, module: ModuleId) -> Option<&AssemblySymbolInfo> {
        if path.is_simple() {
            let key = self.normalize(path.name());
            self.scopes
                .iter()
                .rev()
                .find_map(|scope| scope.symbols.get(&key))
                .or_else(|| self.modules.resolve_symbol(module, path))
        } else {
            self.modules.resolve_symbol(module, path)
        }
    }

    /// Pick where a label named `name` is defined.
    ///
    /// Short-term labels go to the innermost temporary scope. Other labels go
    /// to the innermost loop or macro scope; a proc scope takes them unless
    /// explicit locals are enforced and the name is not booked there.
    pub fn label_target(&self, name: &str) -> SymbolTarget {
        let key = self.normalize(name);
        if name.starts_with('`') {
            if let Some(id) = self.innermost(ScopeKind::Temporary) {
                return SymbolTarget::Scope(id);
            }
        }
        for (id, scope) in self.scopes.iter().enumerate().rev() {
            match scope.kind {
                ScopeKind::Temporary => continue,
                ScopeKind::Loop | ScopeKind::Macro => return SymbolTarget::Scope(id),
                ScopeKind::Proc => {
                    if !self.proc_explicit_locals_only
                        || scope.local_symbol_bookings.contains(&key)
                    {
                        return SymbolTarget::Scope(id);
                    }
                }
            }
        }
        SymbolTarget::Module(self.modules.current())
    }

    fn symbols_mut(&mut self, target: SymbolTarget) -> &mut BTreeMap<String, AssemblySymbolInfo> {
        match target {
            SymbolTarget::Scope(id) => &mut self.scopes[id].symbols,
            SymbolTarget::Module(id) => &mut self.modules.module_mut(id).symbols,
        }
    }

    /// Define a symbol at `target`. Labels never redefine; variables update.
    pub fn define_symbol_at(
        &mut self,
        target: SymbolTarget,
        name: &str,
        value: ExpressionValue,
        kind: SymbolKind,
    ) -> Result<(), ErrorCode> {
        let key = self.normalize(name);
        let symbols = self.symbols_mut(target);
        match symbols.get_mut(&key) {
            Some(existing) if existing.kind == SymbolKind::Var && kind == SymbolKind::Var => {
                existing.value = value;
                Ok(())
            }
            Some(existing) if existing.kind == SymbolKind::Label && kind == SymbolKind::Var => {
                Err(ErrorCode::LabelNotVariable)
            }
            Some(_) => Err(ErrorCode::DuplicateSymbol),
            None => {
                symbols.insert(key, AssemblySymbolInfo::new(name, kind, value));
                Ok(())
            }
        }
    }

    pub fn define_symbol(
        &mut self,
        name: &str,
        value: ExpressionValue,
        kind: SymbolKind,
    ) -> Result<SymbolTarget, ErrorCode> {
        let target = self.label_target(name);
        self.define_symbol_at(target, name, value, kind)?;
        Ok(target)
    }

    /// `name = value`: update the nearest visible variable, or create one in
    /// the innermost non-temporary scope (or the current module).
    ///
    /// A label found first shadows any variable further out, so the new
    /// variable goes to the innermost scope; assigning to a label in that
    /// same scope or module is `LabelNotVariable`.
    pub fn assign_variable(
        &mut self,
        name: &str,
        value: ExpressionValue,
    ) -> Result<SymbolTarget, ErrorCode> {
        let key = self.normalize(name);
        let nearest = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(id, scope)| {
                scope
                    .symbols
                    .get(&key)
                    .map(|info| (SymbolTarget::Scope(id), info.kind))
            })
            .or_else(|| {
                self.modules
                    .chain(self.modules.current())
                    .into_iter()
                    .find_map(|id| {
                        self.modules
                            .module(id)
                            .symbols
                            .get(&key)
                            .map(|info| (SymbolTarget::Module(id), info.kind))
                    })
            });
        let target = match nearest {
            Some((target, SymbolKind::Var)) => target,
            _ => self
                .scopes
                .iter()
                .rposition(|scope| scope.kind != ScopeKind::Temporary)
                .map(SymbolTarget::Scope)
                .unwrap_or(SymbolTarget::Module(self.modules.current())),
        };
        self.define_symbol_at(target, name, value, SymbolKind::Var)?;
        Ok(target)
    }

    /// Reserve `name` as a local of the innermost proc.
    pub fn book_local(&mut self, name: &str) -> Result<(), ErrorCode> {
        if name.starts_with('`') || name.starts_with('@') {
            return Err(ErrorCode::InvalidLocalName);
        }
        let key = self.normalize(name);
        let id = self.innermost_proc().ok_or(ErrorCode::LocalOutsideProc)?;
        self.scopes[id].local_symbol_bookings.insert(key);
        Ok(())
    }

    /// Flag the nearest loop scope. `false` when no loop encloses the
    /// current statement.
    pub fn signal_loop(&mut self, signal: LoopControlSignal) -> bool {
        let Some(id) = self.innermost_loop() else {
            return false;
        };
        let scope = &mut self.scopes[id];
        match signal {
            LoopControlSignal::Break => scope.break_reached = true,
            LoopControlSignal::Continue => scope.continue_reached = true,
            LoopControlSignal::None => {}
        }
        true
    }
}
