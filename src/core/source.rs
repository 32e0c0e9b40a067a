// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source loading seam and the include tree.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::ast::SourceLine;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source file '{0}' not found")]
    NotFound(String),
    #[error("cannot read '{file}': {reason}")]
    Unreadable { file: String, reason: String },
}

/// Supplies parsed statement lines for a file name.
///
/// Calls are restartable: the same file may be requested more than once.
pub trait SourceProvider {
    fn load(&self, filename: &str) -> Result<Vec<SourceLine>, SourceError>;
}

/// In-memory provider keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    files: HashMap<String, Vec<SourceLine>>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, filename: &str, lines: Vec<SourceLine>) -> Self {
        self.add_file(filename, lines);
        self
    }

    pub fn add_file(&mut self, filename: &str, lines: Vec<SourceLine>) {
        self.files.insert(filename.to_string(), lines);
    }
}

impl SourceProvider for MemorySourceProvider {
    fn load(&self, filename: &str) -> Result<Vec<SourceLine>, SourceError> {
        self.files
            .get(filename)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(filename.to_string()))
    }
}

/// One node of the include tree. `parent` and `includes` are indexes into
/// the compilation's source file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileItem {
    pub filename: String,
    pub parent: Option<usize>,
    pub includes: Vec<usize>,
}

impl SourceFileItem {
    pub fn new(filename: &str, parent: Option<usize>) -> Self {
        Self {
            filename: filename.to_string(),
            parent,
            includes: Vec::new(),
        }
    }
}

/// True when `filename` already appears on the include chain ending at `from`.
pub fn is_include_cycle(files: &[SourceFileItem], from: usize, filename: &str) -> bool {
    let mut cursor = Some(from);
    while let Some(index) = cursor {
        let Some(item) = files.get(index) else {
            return false;
        };
        if item.filename == filename {
            return true;
        }
        cursor = item.parent;
    }
    false
}
