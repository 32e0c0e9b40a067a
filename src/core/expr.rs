// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression evaluation.
//!
//! Evaluation is a pure function of the expression and an [`EvalContext`]:
//! it never touches segments or defines symbols. An unresolved symbol does
//! not fail the evaluation; it yields [`ExpressionValue::NonEvaluated`] and
//! the caller decides whether to defer the statement or to report it.

use crate::core::assembler::error::ErrorCode;
use crate::core::ast::{BinaryOp, Expr, Span, SymbolPath, UnaryOp};
use crate::core::value::ExpressionValue;

/// Error returned from expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
}

impl EvalError {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }

    fn mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorCode::TypeMismatch, message, span)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Context for expression evaluation.
///
/// Provides symbol values, the current address (`$`) and the innermost loop
/// counter (`$cnt`).
pub trait EvalContext {
    /// Look up a symbol. `None` means "not defined (yet)".
    fn resolve_symbol(&self, path: &SymbolPath) -> Option<ExpressionValue>;

    /// The current assembly address, displacement included.
    fn current_address(&self) -> u16;

    /// `$cnt` of the innermost loop scope, if any.
    fn loop_counter(&self) -> Option<i64>;
}

/// Evaluate an expression, mapping failures to [`ExpressionValue::Error`].
pub fn evaluate(expr: &Expr, ctx: &dyn EvalContext) -> ExpressionValue {
    try_evaluate(expr, ctx).unwrap_or(ExpressionValue::Error)
}

/// Evaluate an expression.
///
/// `Ok(NonEvaluated)` is returned when a referenced symbol is not defined.
pub fn try_evaluate(expr: &Expr, ctx: &dyn EvalContext) -> Result<ExpressionValue, EvalError> {
    match expr {
        Expr::Integer(value, _) => Ok(ExpressionValue::Integer(*value)),
        Expr::Real(value, _) => Ok(ExpressionValue::Real(*value)),
        Expr::Bool(value, _) => Ok(ExpressionValue::Bool(*value)),
        Expr::Str(value, _) => Ok(ExpressionValue::Str(value.clone())),
        Expr::Symbol(path, _) => Ok(ctx
            .resolve_symbol(path)
            .unwrap_or(ExpressionValue::NonEvaluated)),
        Expr::CurrentAddress(_) => Ok(ExpressionValue::Integer(ctx.current_address() as i64)),
        Expr::LoopCounter(span) => ctx
            .loop_counter()
            .map(ExpressionValue::Integer)
            .ok_or_else(|| {
                EvalError::new(
                    ErrorCode::LoopCounterOutsideLoop,
                    "$cnt cannot be used outside of a loop",
                    *span,
                )
            }),
        Expr::Unary { op, expr, span } => {
            let value = try_evaluate(expr, ctx)?;
            apply_unary(*op, value, *span)
        }
        Expr::Binary {
            op,
            left,
            right,
            span,
        } => {
            let l = try_evaluate(left, ctx)?;
            if l.is_non_evaluated() {
                return Ok(ExpressionValue::NonEvaluated);
            }
            match op {
                BinaryOp::LogicAnd | BinaryOp::LogicOr => {
                    let lb = truth(&l, *span)?;
                    if (*op == BinaryOp::LogicAnd && !lb) || (*op == BinaryOp::LogicOr && lb) {
                        return Ok(ExpressionValue::Bool(lb));
                    }
                    let r = try_evaluate(right, ctx)?;
                    if r.is_non_evaluated() {
                        return Ok(ExpressionValue::NonEvaluated);
                    }
                    Ok(ExpressionValue::Bool(truth(&r, *span)?))
                }
                _ => {
                    let r = try_evaluate(right, ctx)?;
                    if r.is_non_evaluated() {
                        return Ok(ExpressionValue::NonEvaluated);
                    }
                    apply_binary(*op, l, r, *span)
                }
            }
        }
        Expr::Conditional {
            cond,
            then_expr,
            else_expr,
            span,
        } => {
            let cond_val = try_evaluate(cond, ctx)?;
            if cond_val.is_non_evaluated() {
                return Ok(ExpressionValue::NonEvaluated);
            }
            if truth(&cond_val, *span)? {
                try_evaluate(then_expr, ctx)
            } else {
                try_evaluate(else_expr, ctx)
            }
        }
        Expr::Function { name, args, span } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                let value = try_evaluate(arg, ctx)?;
                if value.is_non_evaluated() {
                    return Ok(ExpressionValue::NonEvaluated);
                }
                values.push(value);
            }
            call_function(name, &values, *span)
        }
    }
}

/// First symbol in `expr` the context cannot resolve, for diagnostics.
pub fn first_unresolved_symbol(expr: &Expr, ctx: &dyn EvalContext) -> Option<(SymbolPath, Span)> {
    let mut found = None;
    expr.for_each_symbol(&mut |path, span| {
        if found.is_none() && ctx.resolve_symbol(path).is_none() {
            found = Some((path.clone(), span));
        }
    });
    found
}

fn truth(value: &ExpressionValue, span: Span) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| {
        EvalError::mismatch(
            format!("A {:?} value cannot be used as a boolean", value.value_type()),
            span,
        )
    })
}

fn integer(value: &ExpressionValue, op: &str, span: Span) -> Result<i64, EvalError> {
    match value {
        ExpressionValue::Bool(_) | ExpressionValue::Integer(_) => {
            Ok(value.as_long().unwrap_or_default())
        }
        _ => Err(EvalError::mismatch(
            format!("Operator '{op}' requires integer operands"),
            span,
        )),
    }
}

/// Apply a unary operator to a value.
pub fn apply_unary(
    op: UnaryOp,
    value: ExpressionValue,
    span: Span,
) -> Result<ExpressionValue, EvalError> {
    if value.is_non_evaluated() {
        return Ok(value);
    }
    match op {
        UnaryOp::Plus | UnaryOp::Minus => {
            let negate = op == UnaryOp::Minus;
            match value {
                ExpressionValue::Real(v) => Ok(ExpressionValue::Real(if negate { -v } else { v })),
                ExpressionValue::Integer(_) | ExpressionValue::Bool(_) => {
                    let v = value.as_long().unwrap_or_default();
                    Ok(ExpressionValue::Integer(if negate { v.wrapping_neg() } else { v }))
                }
                _ => Err(EvalError::mismatch(
                    "Unary '+' and '-' require a numeric operand",
                    span,
                )),
            }
        }
        UnaryOp::LogicNot => Ok(ExpressionValue::Bool(!truth(&value, span)?)),
        UnaryOp::BitNot => Ok(ExpressionValue::Integer(!integer(&value, "~", span)?)),
    }
}

/// Apply a binary operator to two evaluated values.
pub fn apply_binary(
    op: BinaryOp,
    l: ExpressionValue,
    r: ExpressionValue,
    span: Span,
) -> Result<ExpressionValue, EvalError> {
    use ExpressionValue as V;

    if let (V::Str(a), V::Str(b)) = (&l, &r) {
        return match op {
            BinaryOp::Add => Ok(V::Str(format!("{a}{b}"))),
            BinaryOp::Eq => Ok(V::Bool(a == b)),
            BinaryOp::Ne => Ok(V::Bool(a != b)),
            BinaryOp::Lt => Ok(V::Bool(a < b)),
            BinaryOp::Le => Ok(V::Bool(a <= b)),
            BinaryOp::Gt => Ok(V::Bool(a > b)),
            BinaryOp::Ge => Ok(V::Bool(a >= b)),
            _ => Err(EvalError::mismatch(
                format!("Operator '{}' cannot be applied to strings", op.symbol()),
                span,
            )),
        };
    }
    if !l.is_numeric() || !r.is_numeric() {
        return Err(EvalError::mismatch(
            format!(
                "Operator '{}' cannot mix {:?} and {:?} operands",
                op.symbol(),
                l.value_type(),
                r.value_type()
            ),
            span,
        ));
    }

    let real = matches!(l, V::Real(_)) || matches!(r, V::Real(_));
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide if real => {
            let a = l.as_real().unwrap_or_default();
            let b = r.as_real().unwrap_or_default();
            Ok(V::Real(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(EvalError::new(
                            ErrorCode::DivideByZero,
                            "Division by zero",
                            span,
                        ));
                    }
                    a / b
                }
            }))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = if real {
                l.as_real()
                    .unwrap_or_default()
                    .partial_cmp(&r.as_real().unwrap_or_default())
            } else {
                Some(
                    l.as_long()
                        .unwrap_or_default()
                        .cmp(&r.as_long().unwrap_or_default()),
                )
            };
            let Some(ordering) = ordering else {
                return Ok(V::Bool(op == BinaryOp::Ne));
            };
            Ok(V::Bool(match op {
                BinaryOp::Eq => ordering.is_eq(),
                BinaryOp::Ne => !ordering.is_eq(),
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::LogicAnd => Ok(V::Bool(truth(&l, span)? && truth(&r, span)?)),
        BinaryOp::LogicOr => Ok(V::Bool(truth(&l, span)? || truth(&r, span)?)),
        _ => {
            let a = integer(&l, op.symbol(), span)?;
            let b = integer(&r, op.symbol(), span)?;
            Ok(V::Integer(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Subtract => a.wrapping_sub(b),
                BinaryOp::Multiply => a.wrapping_mul(b),
                BinaryOp::Divide | BinaryOp::Mod => {
                    if b == 0 {
                        return Err(EvalError::new(
                            ErrorCode::DivideByZero,
                            "Division by zero",
                            span,
                        ));
                    }
                    if op == BinaryOp::Divide {
                        a.wrapping_div(b)
                    } else {
                        a.wrapping_rem(b)
                    }
                }
                BinaryOp::Shl => a.wrapping_shl((b & 0x3f) as u32),
                BinaryOp::Shr => ((a as u64).wrapping_shr((b & 0x3f) as u32)) as i64,
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            }))
        }
    }
}

fn call_function(
    name: &str,
    args: &[ExpressionValue],
    span: Span,
) -> Result<ExpressionValue, EvalError> {
    use ExpressionValue as V;

    let lower = name.to_ascii_lowercase();
    let arity = |expected: usize| -> Result<(), EvalError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::new(
                ErrorCode::InvalidFunctionCall,
                format!("{name}() expects {expected} argument(s), got {}", args.len()),
                span,
            ))
        }
    };
    let number = |value: &V| -> Result<f64, EvalError> {
        value
            .as_real()
            .ok_or_else(|| EvalError::mismatch(format!("{name}() requires a numeric argument"), span))
    };
    let text = |value: &V| -> Result<String, EvalError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EvalError::mismatch(format!("{name}() requires a string argument"), span))
    };

    match lower.as_str() {
        "abs" => {
            arity(1)?;
            match &args[0] {
                V::Real(v) => Ok(V::Real(v.abs())),
                other => Ok(V::Integer(integer(other, "abs", span)?.wrapping_abs())),
            }
        }
        "low" | "high" | "word" => {
            arity(1)?;
            let v = integer(&args[0], &lower, span)?;
            Ok(V::Integer(match lower.as_str() {
                "low" => v & 0xff,
                "high" => (v >> 8) & 0xff,
                _ => v & 0xffff,
            }))
        }
        "int" => {
            arity(1)?;
            Ok(V::Integer(number(&args[0])?.trunc() as i64))
        }
        "frac" => {
            arity(1)?;
            Ok(V::Real(number(&args[0])?.fract()))
        }
        "round" => {
            arity(1)?;
            Ok(V::Integer(number(&args[0])?.round() as i64))
        }
        "sqrt" => {
            arity(1)?;
            Ok(V::Real(number(&args[0])?.sqrt()))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::new(
                    ErrorCode::InvalidFunctionCall,
                    format!("{name}() expects at least one argument"),
                    span,
                ));
            }
            let mut best = args[0].clone();
            number(&best)?;
            for candidate in &args[1..] {
                let c = number(candidate)?;
                let b = number(&best)?;
                if (lower == "min" && c < b) || (lower == "max" && c > b) {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        "len" => {
            arity(1)?;
            Ok(V::Integer(text(&args[0])?.chars().count() as i64))
        }
        "str" => {
            arity(1)?;
            Ok(V::Str(args[0].to_string()))
        }
        "upper" => {
            arity(1)?;
            Ok(V::Str(text(&args[0])?.to_uppercase()))
        }
        "lower" => {
            arity(1)?;
            Ok(V::Str(text(&args[0])?.to_lowercase()))
        }
        _ => Err(EvalError::new(
            ErrorCode::InvalidFunctionCall,
            format!("Unknown function '{name}'"),
            span,
        )),
    }
}

/// Returns true if the value fits in a signed or unsigned 8-bit byte (-128..=255).
pub fn value_fits_byte(value: i64) -> bool {
    (-128..=0xff).contains(&value)
}

/// Returns true if the value fits in a signed or unsigned 16-bit word (-32768..=65535).
pub fn value_fits_word(value: i64) -> bool {
    (-32768..=0xffff).contains(&value)
}
