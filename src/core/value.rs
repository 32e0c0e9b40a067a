// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Typed result of expression evaluation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionValueType {
    Error,
    Bool,
    Integer,
    Real,
    String,
    NonEvaluated,
}

/// Value produced by one evaluation call. Immutable once produced.
///
/// `NonEvaluated` marks a forward reference: some symbol was not defined yet,
/// and the caller decides whether to defer (fix-up) or to fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue {
    Error,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Str(String),
    NonEvaluated,
}

impl ExpressionValue {
    pub fn value_type(&self) -> ExpressionValueType {
        match self {
            ExpressionValue::Error => ExpressionValueType::Error,
            ExpressionValue::Bool(_) => ExpressionValueType::Bool,
            ExpressionValue::Integer(_) => ExpressionValueType::Integer,
            ExpressionValue::Real(_) => ExpressionValueType::Real,
            ExpressionValue::Str(_) => ExpressionValueType::String,
            ExpressionValue::NonEvaluated => ExpressionValueType::NonEvaluated,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, ExpressionValue::Error | ExpressionValue::NonEvaluated)
    }

    pub fn is_non_evaluated(&self) -> bool {
        matches!(self, ExpressionValue::NonEvaluated)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ExpressionValue::Bool(_) | ExpressionValue::Integer(_) | ExpressionValue::Real(_)
        )
    }

    /// Integer view. Bools map to 0/1 and reals truncate toward zero.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            ExpressionValue::Bool(value) => Some(i64::from(*value)),
            ExpressionValue::Integer(value) => Some(*value),
            ExpressionValue::Real(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            ExpressionValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            ExpressionValue::Integer(value) => Some(*value as f64),
            ExpressionValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Truth value in a boolean context. Only bools and integers qualify.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExpressionValue::Bool(value) => Some(*value),
            ExpressionValue::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExpressionValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionValue::Error => write!(f, "<error>"),
            ExpressionValue::Bool(value) => write!(f, "{value}"),
            ExpressionValue::Integer(value) => write!(f, "{value}"),
            ExpressionValue::Real(value) => write!(f, "{value}"),
            ExpressionValue::Str(value) => write!(f, "{value}"),
            ExpressionValue::NonEvaluated => write!(f, "<non-evaluated>"),
        }
    }
}
