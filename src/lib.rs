// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Library entry exposing the directive core and the compiler front door.
pub mod assembler;
pub mod core;

pub use assembler::{Compiler, CompilerOptions, CompilerOutput, SpectrumModel};
