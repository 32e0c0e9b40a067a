// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Hierarchical module namespace.
//!
//! Modules live in a flat arena owned by one compilation and refer to each
//! other by [`ModuleId`]. The root module has id 0 and no parent.

use std::cell::Cell;
use std::collections::BTreeMap;

use crate::core::ast::SymbolPath;
use crate::core::value::ExpressionValue;

pub type ModuleId = usize;

pub const ROOT_MODULE: ModuleId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    None,
    Label,
    Var,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::None => "none",
            SymbolKind::Label => "label",
            SymbolKind::Var => "var",
        }
    }
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub value: ExpressionValue,
    pub is_module_local: bool,
    pub is_short_term: bool,
    pub is_used: Cell<bool>,
}

impl AssemblySymbolInfo {
    pub fn new(name: &str, kind: SymbolKind, value: ExpressionValue) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value,
            is_module_local: name.starts_with('@'),
            is_short_term: name.starts_with('`'),
            is_used: Cell::new(false),
        }
    }

    pub fn label(name: &str, value: ExpressionValue) -> Self {
        Self::new(name, SymbolKind::Label, value)
    }

    pub fn var(name: &str, value: ExpressionValue) -> Self {
        Self::new(name, SymbolKind::Var, value)
    }

    pub fn mark_used(&self) {
        self.is_used.set(true);
    }
}

/// Line range of a definition body in the flattened statement list.
/// `first_line` is the first body line, `last_line` is exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefinitionSection {
    pub first_line: usize,
    pub last_line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    pub name: String,
    pub arg_names: Vec<String>,
    pub end_label: Option<String>,
    pub section: DefinitionSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub offset: u16,
    pub is_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDefinition {
    pub name: String,
    pub section: DefinitionSection,
    pub fields: BTreeMap<String, FieldDefinition>,
    pub size: u16,
    /// Bytes emitted by the struct body; copied on every instantiation.
    pub default_bytes: Vec<u8>,
}

impl StructDefinition {
    pub fn new(name: &str, section: DefinitionSection) -> Self {
        Self {
            name: name.to_string(),
            section,
            fields: BTreeMap::new(),
            size: 0,
            default_bytes: Vec::new(),
        }
    }

    pub fn add_field(&mut self, name: &str, offset: u16) -> bool {
        if self.fields.contains_key(name) {
            return false;
        }
        self.fields.insert(
            name.to_string(),
            FieldDefinition {
                offset,
                is_used: false,
            },
        );
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: Option<String>,
    pub parent: Option<ModuleId>,
    pub nested_modules: BTreeMap<String, ModuleId>,
    pub symbols: BTreeMap<String, AssemblySymbolInfo>,
    pub structs: BTreeMap<String, StructDefinition>,
    pub macros: BTreeMap<String, MacroDefinition>,
}

/// Arena of modules plus the cursor of the module being assembled.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    modules: Vec<Module>,
    current: ModuleId,
    case_sensitive: bool,
    anonymous_counter: u32,
}

impl ModuleTree {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            modules: vec![Module::default()],
            current: ROOT_MODULE,
            case_sensitive,
            anonymous_counter: 0,
        }
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Normalize a symbol, macro, struct or module name for lookup.
    pub fn normalize(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    pub fn current(&self) -> ModuleId {
        self.current
    }

    pub fn set_current(&mut self, id: ModuleId) {
        if id < self.modules.len() {
            self.current = id;
        }
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Create a nested module under the current one and make it current.
    /// Returns `None` when a sibling with the same name exists.
    pub fn enter_module(&mut self, name: Option<&str>) -> Option<ModuleId> {
        let key = match name {
            Some(name) => self.normalize(name),
            None => {
                self.anonymous_counter += 1;
                format!("__module{}", self.anonymous_counter)
            }
        };
        if self.modules[self.current].nested_modules.contains_key(&key) {
            return None;
        }
        let id = self.modules.len();
        self.modules.push(Module {
            name: Some(key.clone()),
            parent: Some(self.current),
            ..Module::default()
        });
        self.modules[self.current].nested_modules.insert(key, id);
        self.current = id;
        Some(id)
    }

    /// Return to the parent module. `false` at the root.
    pub fn leave_module(&mut self) -> bool {
        match self.modules[self.current].parent {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Module and its ancestors, innermost first.
    pub fn chain(&self, from: ModuleId) -> Vec<ModuleId> {
        let mut out = vec![from];
        let mut cursor = self.modules[from].parent;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.modules[id].parent;
        }
        out
    }

    /// Dotted name of a module, empty for the root.
    pub fn qualified_name(&self, id: ModuleId) -> String {
        let mut parts: Vec<&str> = self
            .chain(id)
            .iter()
            .filter_map(|m| self.modules[*m].name.as_deref())
            .collect();
        parts.reverse();
        parts.join(".")
    }

    fn find_nested(&self, from: ModuleId, segments: &[String], root: bool) -> Option<ModuleId> {
        let first = segments.first()?;
        let first = self.normalize(first);
        let start = if root {
            Some(ROOT_MODULE).filter(|id| self.modules[*id].nested_modules.contains_key(&first))
        } else {
            self.chain(from)
                .into_iter()
                .find(|id| self.modules[*id].nested_modules.contains_key(&first))
        }?;
        let mut cursor = self.modules[start].nested_modules.get(&first).copied()?;
        for segment in &segments[1..] {
            cursor = self.modules[cursor]
                .nested_modules
                .get(&self.normalize(segment))
                .copied()?;
        }
        Some(cursor)
    }

    /// Resolve a symbol starting from module `from`.
    ///
    /// Simple names walk the module chain outward. Module-local (`@`) symbols
    /// are only visible from their own module. Qualified names address a
    /// module explicitly.
    pub fn resolve_symbol(&self, from: ModuleId, path: &SymbolPath) -> Option<&AssemblySymbolInfo> {
        let name = self.normalize(path.name());
        if path.is_simple() {
            return self.chain(from).into_iter().find_map(|id| {
                self.modules[id]
                    .symbols
                    .get(&name)
                    .filter(|info| !info.is_module_local || id == from)
            });
        }
        let target = if path.segments.len() == 1 {
            ROOT_MODULE
        } else {
            self.find_nested(from, &path.segments[..path.segments.len() - 1], path.root)?
        };
        self.modules[target]
            .symbols
            .get(&name)
            .filter(|info| !info.is_module_local || target == from)
    }

    pub fn find_macro(&self, from: ModuleId, name: &str) -> Option<&MacroDefinition> {
        let key = self.normalize(name);
        self.chain(from)
            .into_iter()
            .find_map(|id| self.modules[id].macros.get(&key))
    }

    /// Locate the owning module and key of a struct visible from `from`.
    pub fn find_struct(&self, from: ModuleId, name: &str) -> Option<(ModuleId, String)> {
        let key = self.normalize(name);
        self.chain(from)
            .into_iter()
            .find(|id| self.modules[*id].structs.contains_key(&key))
            .map(|id| (id, key))
    }
}
