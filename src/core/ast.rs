// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Parsed statement model.
//!
//! The tokenizer and parser live outside this crate; they hand the directive
//! core a sequence of [`SourceLine`] values per source file. The small
//! constructor helpers at the bottom of this module are what a parser (and the
//! test suites) use to build those values.

use std::fmt;

/// Column span of an expression or operand within a source line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub col_start: usize,
    pub col_end: usize,
}

impl Span {
    pub fn new(line: u32, col_start: usize, col_end: usize) -> Self {
        Self {
            line,
            col_start,
            col_end,
        }
    }
}

/// Position of a whole statement within its file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineSpan {
    pub start_position: usize,
    pub end_position: Option<usize>,
    pub start_column: usize,
    pub end_column: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicAnd,
    LogicOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// A symbol reference, optionally module-qualified.
///
/// `::name` sets `root`; `Outer.Inner.name` splits into segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolPath {
    pub root: bool,
    pub segments: Vec<String>,
}

impl SymbolPath {
    pub fn parse(text: &str) -> Self {
        let (root, rest) = match text.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        Self {
            root,
            segments: rest.split('.').map(str::to_string).collect(),
        }
    }

    pub fn simple(name: &str) -> Self {
        Self {
            root: false,
            segments: vec![name.to_string()],
        }
    }

    pub fn is_simple(&self) -> bool {
        !self.root && self.segments.len() == 1
    }

    /// The final segment: the symbol name itself.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root {
            write!(f, "::")?;
        }
        write!(f, "{}", self.segments.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64, Span),
    Real(f64, Span),
    Bool(bool, Span),
    Str(String, Span),
    Symbol(SymbolPath, Span),
    /// `$`
    CurrentAddress(Span),
    /// `$cnt`
    LoopCounter(Span),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Integer(_, span)
            | Expr::Real(_, span)
            | Expr::Bool(_, span)
            | Expr::Str(_, span)
            | Expr::Symbol(_, span)
            | Expr::CurrentAddress(span)
            | Expr::LoopCounter(span) => *span,
            Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Function { span, .. } => *span,
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::Integer(value, Span::default())
    }

    pub fn real(value: f64) -> Self {
        Expr::Real(value, Span::default())
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Bool(value, Span::default())
    }

    pub fn string(value: &str) -> Self {
        Expr::Str(value.to_string(), Span::default())
    }

    pub fn symbol(text: &str) -> Self {
        Expr::Symbol(SymbolPath::parse(text), Span::default())
    }

    pub fn dollar() -> Self {
        Expr::CurrentAddress(Span::default())
    }

    pub fn counter() -> Self {
        Expr::LoopCounter(Span::default())
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
            span: Span::default(),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        }
    }

    pub fn conditional(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            span: Span::default(),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_string(),
            args,
            span: Span::default(),
        }
    }

    /// Visit every symbol reference in evaluation order.
    pub fn for_each_symbol<'a>(&'a self, f: &mut dyn FnMut(&'a SymbolPath, Span)) {
        match self {
            Expr::Symbol(path, span) => f(path, *span),
            Expr::Unary { expr, .. } => expr.for_each_symbol(f),
            Expr::Binary { left, right, .. } => {
                left.for_each_symbol(f);
                right.for_each_symbol(f);
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                cond.for_each_symbol(f);
                then_expr.for_each_symbol(f);
                else_expr.for_each_symbol(f);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.for_each_symbol(f);
                }
            }
            _ => {}
        }
    }
}

/// An instruction or macro-invocation operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Register or condition name: `a`, `hl`, `nz`.
    Register(String),
    /// `(hl)`, `(c)`
    RegisterIndirect(String),
    /// `(nn)`
    Indirect(Expr),
    /// `(ix+d)`; a missing displacement means `+0`.
    Indexed {
        register: String,
        displacement: Option<Expr>,
    },
    Expr(Expr),
    /// An omitted macro argument: `m(1,,3)`.
    Empty,
}

impl Operand {
    pub fn reg(name: &str) -> Self {
        Operand::Register(name.to_string())
    }

    pub fn reg_indirect(name: &str) -> Self {
        Operand::RegisterIndirect(name.to_string())
    }

    pub fn expr(expr: Expr) -> Self {
        Operand::Expr(expr)
    }

    pub fn int(value: i64) -> Self {
        Operand::Expr(Expr::int(value))
    }

    pub fn symbol(text: &str) -> Self {
        Operand::Expr(Expr::symbol(text))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pragma {
    Org(Expr),
    Bank { bank: Expr, offset: Option<Expr> },
    Xorg(Expr),
    Ent(Expr),
    Xent(Expr),
    Disp(Expr),
    Equ(Expr),
    Var(Expr),
    Defb(Vec<Expr>),
    Defw(Vec<Expr>),
    Defm(Expr),
    Defn(Expr),
    Defc(Expr),
    Defh(Expr),
    Defs { count: Expr, fill: Option<Expr> },
    Fillb { count: Expr, value: Expr },
    Fillw { count: Expr, value: Expr },
    Skip { address: Expr, fill: Option<Expr> },
    Align(Option<Expr>),
    Trace { hex: bool, values: Vec<Expr> },
    Error(Expr),
    Model(String),
    InjectOpt(Vec<String>),
}

impl Pragma {
    pub fn name(&self) -> &'static str {
        match self {
            Pragma::Org(_) => ".org",
            Pragma::Bank { .. } => ".bank",
            Pragma::Xorg(_) => ".xorg",
            Pragma::Ent(_) => ".ent",
            Pragma::Xent(_) => ".xent",
            Pragma::Disp(_) => ".disp",
            Pragma::Equ(_) => ".equ",
            Pragma::Var(_) => ".var",
            Pragma::Defb(_) => ".defb",
            Pragma::Defw(_) => ".defw",
            Pragma::Defm(_) => ".defm",
            Pragma::Defn(_) => ".defn",
            Pragma::Defc(_) => ".defc",
            Pragma::Defh(_) => ".defh",
            Pragma::Defs { .. } => ".defs",
            Pragma::Fillb { .. } => ".fillb",
            Pragma::Fillw { .. } => ".fillw",
            Pragma::Skip { .. } => ".skip",
            Pragma::Align(_) => ".align",
            Pragma::Trace { hex: false, .. } => ".trace",
            Pragma::Trace { hex: true, .. } => ".tracehex",
            Pragma::Error(_) => ".error",
            Pragma::Model(_) => ".model",
            Pragma::InjectOpt(_) => ".injectopt",
        }
    }

    /// Pragmas allowed inside `.struct` bodies and field assignments.
    pub fn emits_data(&self) -> bool {
        matches!(
            self,
            Pragma::Defb(_)
                | Pragma::Defw(_)
                | Pragma::Defm(_)
                | Pragma::Defn(_)
                | Pragma::Defc(_)
                | Pragma::Defh(_)
                | Pragma::Defs { .. }
                | Pragma::Fillb { .. }
                | Pragma::Fillw { .. }
        )
    }
}

/// Preprocessor directives, resolved while sources are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Include(String),
    Define(String),
    Undef(String),
    IfDef(String),
    IfNDef(String),
    Else,
    EndIf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Macro { params: Vec<String> },
    EndMacro,
    Proc,
    EndProc,
    Local(Vec<String>),
    Loop(Expr),
    EndLoop,
    Repeat,
    Until(Expr),
    While(Expr),
    EndWhile,
    For {
        variable: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    Next,
    If(Expr),
    IfUsed(SymbolPath),
    IfNUsed(SymbolPath),
    Elif(Expr),
    Else,
    EndIf,
    Break,
    Continue,
    Module(Option<String>),
    EndModule,
    Struct,
    EndStruct,
}

impl Statement {
    pub fn keyword(&self) -> &'static str {
        match self {
            Statement::Macro { .. } => ".macro",
            Statement::EndMacro => ".endm",
            Statement::Proc => ".proc",
            Statement::EndProc => ".endp",
            Statement::Local(_) => ".local",
            Statement::Loop(_) => ".loop",
            Statement::EndLoop => ".endl",
            Statement::Repeat => ".repeat",
            Statement::Until(_) => ".until",
            Statement::While(_) => ".while",
            Statement::EndWhile => ".endw",
            Statement::For { .. } => ".for",
            Statement::Next => ".next",
            Statement::If(_) => ".if",
            Statement::IfUsed(_) => ".ifused",
            Statement::IfNUsed(_) => ".ifnused",
            Statement::Elif(_) => ".elif",
            Statement::Else => ".else",
            Statement::EndIf => ".endif",
            Statement::Break => ".break",
            Statement::Continue => ".continue",
            Statement::Module(_) => ".module",
            Statement::EndModule => ".endmodule",
            Statement::Struct => ".struct",
            Statement::EndStruct => ".ends",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Label-only or comment-only line.
    Empty,
    Instruction {
        mnemonic: String,
        operands: Vec<Operand>,
    },
    /// `Name(args)`: a macro call or a struct instance.
    Invocation { name: String, args: Vec<Operand> },
    Pragma(Pragma),
    Directive(Directive),
    Statement(Statement),
    /// `field -> .defb 1`, valid right after a struct invocation.
    FieldAssignment(Pragma),
}

/// One parsed statement line.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub file_index: usize,
    pub line: u32,
    pub span: LineSpan,
    pub label: Option<String>,
    pub kind: LineKind,
    pub source_text: String,
}

impl SourceLine {
    pub fn new(kind: LineKind) -> Self {
        Self {
            file_index: 0,
            line: 0,
            span: LineSpan::default(),
            label: None,
            kind,
            source_text: String::new(),
        }
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.source_text = text.to_string();
        self
    }

    pub fn statement(&self) -> Option<&Statement> {
        match &self.kind {
            LineKind::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    pub fn instruction(mnemonic: &str, operands: Vec<Operand>) -> Self {
        Self::new(LineKind::Instruction {
            mnemonic: mnemonic.to_string(),
            operands,
        })
    }

    pub fn pragma(pragma: Pragma) -> Self {
        Self::new(LineKind::Pragma(pragma))
    }

    pub fn stmt(statement: Statement) -> Self {
        Self::new(LineKind::Statement(statement))
    }

    pub fn directive(directive: Directive) -> Self {
        Self::new(LineKind::Directive(directive))
    }

    pub fn invoke(name: &str, args: Vec<Operand>) -> Self {
        Self::new(LineKind::Invocation {
            name: name.to_string(),
            args,
        })
    }

    pub fn label_only(label: &str) -> Self {
        Self::new(LineKind::Empty).labeled(label)
    }
}

/// Number lines sequentially from 1 and stamp the file index.
pub fn number_lines(lines: Vec<SourceLine>, file_index: usize) -> Vec<SourceLine> {
    lines
        .into_iter()
        .enumerate()
        .map(|(ix, mut line)| {
            line.file_index = file_index;
            if line.line == 0 {
                line.line = ix as u32 + 1;
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_path_parses_root_and_segments() {
        let path = SymbolPath::parse("::Outer.Inner.value");
        assert!(path.root);
        assert_eq!(path.segments, vec!["Outer", "Inner", "value"]);
        assert_eq!(path.name(), "value");
        assert_eq!(path.to_string(), "::Outer.Inner.value");
        assert!(SymbolPath::parse("plain").is_simple());
    }

    #[test]
    fn for_each_symbol_visits_nested_references() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::symbol("a"),
            Expr::call("max", vec![Expr::symbol("b"), Expr::int(3)]),
        );
        let mut seen = Vec::new();
        expr.for_each_symbol(&mut |path, _| seen.push(path.to_string()));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn number_lines_keeps_explicit_line_numbers() {
        let lines = number_lines(
            vec![
                SourceLine::new(LineKind::Empty),
                SourceLine::new(LineKind::Empty).at_line(42),
            ],
            3,
        );
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[1].line, 42);
        assert!(lines.iter().all(|line| line.file_index == 3));
    }
}
