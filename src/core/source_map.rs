// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source map support for mapping emitted addresses back to source lines.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileLine {
    pub file_index: usize,
    pub line: u32,
}

impl FileLine {
    pub fn new(file_index: usize, line: u32) -> Self {
        Self { file_index, line }
    }
}

/// Address to line (first writer wins) and line to every address it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    by_address: BTreeMap<u16, FileLine>,
    by_line: BTreeMap<FileLine, Vec<u16>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, address: u16, origin: FileLine) {
        self.by_address.entry(address).or_insert(origin);
        let addresses = self.by_line.entry(origin).or_default();
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    pub fn record_range(&mut self, start: u16, len: usize, origin: FileLine) {
        for ix in 0..len {
            self.record(start.wrapping_add(ix as u16), origin);
        }
    }

    pub fn origin_for_address(&self, address: u16) -> Option<FileLine> {
        self.by_address.get(&address).copied()
    }

    pub fn addresses_for_line(&self, origin: FileLine) -> &[u16] {
        self.by_line.get(&origin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn source_map(&self) -> &BTreeMap<u16, FileLine> {
        &self.by_address
    }

    pub fn address_map(&self) -> &BTreeMap<FileLine, Vec<u16>> {
        &self.by_line
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
