// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Core assembler components that are CPU-agnostic.
//!
//! - [`scope`] - Scope stack and symbol visibility
//! - [`segment`] - Binary segments and byte emission
//! - [`fixup`] - Deferred forward-reference records
//! - [`listing`] - Listing file generation
//! - [`error`] - Error codes, diagnostics and the error collector

pub mod error;
pub mod fixup;
pub mod listing;
pub mod scope;
pub mod segment;
