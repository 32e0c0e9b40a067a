// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! CPU-agnostic building blocks of the directive core.
//!
//! - [`ast`] - Parsed statement model consumed from the parser
//! - [`value`] - Typed expression values
//! - [`expr`] - Expression evaluation
//! - [`module_tree`] - Modules, symbols, macros and structures
//! - [`encoder`] - Seam to the instruction encoder
//! - [`source`] - Source provider seam and include tree
//! - [`source_map`] - Address to source line mapping
//! - [`report`] - Source line highlighting for diagnostics
//! - [`assembler`] - Scopes, segments, fix-ups, listing and diagnostics

pub mod assembler;
pub mod ast;
pub mod encoder;
pub mod expr;
pub mod module_tree;
pub mod report;
pub mod source;
pub mod source_map;
pub mod value;
