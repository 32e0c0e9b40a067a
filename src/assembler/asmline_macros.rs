// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro definition, invocation and argument substitution.
//!
//! A macro body is not copied when it is invoked. The statement executor
//! runs the body lines in place, and every line executed while a macro
//! scope is active is rewritten by [`Assembler::prepare_line`] first.

use std::borrow::Cow;

use super::*;

use crate::core::module_tree::{DefinitionSection, MacroDefinition};

#[derive(Debug, Clone, PartialEq)]
struct SubstitutionError {
    code: ErrorCode,
    message: String,
    span: Span,
}

type Substituted<T> = Result<T, SubstitutionError>;

/// Rewrites formal parameter references with the actual arguments bound
/// by the innermost macro scope.
struct MacroSubstitution<'s> {
    scopes: &'s ScopeManager,
}

impl MacroSubstitution<'_> {
    fn formal(&self, path: &SymbolPath) -> Option<&Operand> {
        if !path.is_simple() {
            return None;
        }
        self.scopes.macro_argument(path.name())
    }

    fn missing(path: &SymbolPath, span: Span) -> SubstitutionError {
        SubstitutionError {
            code: ErrorCode::MissingMacroArgument,
            message: format!("Macro argument '{path}' has no value"),
            span,
        }
    }

    fn expr(&self, expr: &Expr) -> Substituted<Expr> {
        Ok(match expr {
            Expr::Symbol(path, span) => match self.formal(path) {
                None => expr.clone(),
                Some(Operand::Expr(actual)) => actual.clone(),
                Some(Operand::Empty) => return Err(Self::missing(path, *span)),
                Some(_) => {
                    return Err(SubstitutionError {
                        code: ErrorCode::MacroArgumentMisuse,
                        message: format!(
                            "Macro argument '{path}' is not an expression and cannot be used here"
                        ),
                        span: *span,
                    })
                }
            },
            Expr::Unary { op, expr, span } => Expr::Unary {
                op: *op,
                expr: Box::new(self.expr(expr)?),
                span: *span,
            },
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => Expr::Binary {
                op: *op,
                left: Box::new(self.expr(left)?),
                right: Box::new(self.expr(right)?),
                span: *span,
            },
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
                span,
            } => Expr::Conditional {
                cond: Box::new(self.expr(cond)?),
                then_expr: Box::new(self.expr(then_expr)?),
                else_expr: Box::new(self.expr(else_expr)?),
                span: *span,
            },
            Expr::Function { name, args, span } => Expr::Function {
                name: name.clone(),
                args: self.exprs(args)?,
                span: *span,
            },
            other => other.clone(),
        })
    }

    fn exprs(&self, exprs: &[Expr]) -> Substituted<Vec<Expr>> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn opt_expr(&self, expr: &Option<Expr>) -> Substituted<Option<Expr>> {
        expr.as_ref().map(|expr| self.expr(expr)).transpose()
    }

    fn operand(&self, operand: &Operand) -> Substituted<Operand> {
        Ok(match operand {
            Operand::Expr(Expr::Symbol(path, span)) => match self.formal(path) {
                None => operand.clone(),
                Some(Operand::Empty) => return Err(Self::missing(path, *span)),
                Some(actual) => actual.clone(),
            },
            Operand::Expr(expr) => Operand::Expr(self.expr(expr)?),
            Operand::Indirect(Expr::Symbol(path, span)) => match self.formal(path) {
                None => operand.clone(),
                Some(Operand::Register(register)) => Operand::RegisterIndirect(register.clone()),
                Some(Operand::Expr(actual)) => Operand::Indirect(actual.clone()),
                Some(Operand::Empty) => return Err(Self::missing(path, *span)),
                Some(_) => {
                    return Err(SubstitutionError {
                        code: ErrorCode::MacroArgumentMisuse,
                        message: format!("Macro argument '{path}' cannot be used indirectly"),
                        span: *span,
                    })
                }
            },
            Operand::Indirect(expr) => Operand::Indirect(self.expr(expr)?),
            Operand::Indexed {
                register,
                displacement,
            } => Operand::Indexed {
                register: register.clone(),
                displacement: self.opt_expr(displacement)?,
            },
            other => other.clone(),
        })
    }

    fn operands(&self, operands: &[Operand]) -> Substituted<Vec<Operand>> {
        operands.iter().map(|operand| self.operand(operand)).collect()
    }

    fn pragma(&self, pragma: &Pragma) -> Substituted<Pragma> {
        Ok(match pragma {
            Pragma::Org(expr) => Pragma::Org(self.expr(expr)?),
            Pragma::Bank { bank, offset } => Pragma::Bank {
                bank: self.expr(bank)?,
                offset: self.opt_expr(offset)?,
            },
            Pragma::Xorg(expr) => Pragma::Xorg(self.expr(expr)?),
            Pragma::Ent(expr) => Pragma::Ent(self.expr(expr)?),
            Pragma::Xent(expr) => Pragma::Xent(self.expr(expr)?),
            Pragma::Disp(expr) => Pragma::Disp(self.expr(expr)?),
            Pragma::Equ(expr) => Pragma::Equ(self.expr(expr)?),
            Pragma::Var(expr) => Pragma::Var(self.expr(expr)?),
            Pragma::Defb(exprs) => Pragma::Defb(self.exprs(exprs)?),
            Pragma::Defw(exprs) => Pragma::Defw(self.exprs(exprs)?),
            Pragma::Defm(expr) => Pragma::Defm(self.expr(expr)?),
            Pragma::Defn(expr) => Pragma::Defn(self.expr(expr)?),
            Pragma::Defc(expr) => Pragma::Defc(self.expr(expr)?),
            Pragma::Defh(expr) => Pragma::Defh(self.expr(expr)?),
            Pragma::Defs { count, fill } => Pragma::Defs {
                count: self.expr(count)?,
                fill: self.opt_expr(fill)?,
            },
            Pragma::Fillb { count, value } => Pragma::Fillb {
                count: self.expr(count)?,
                value: self.expr(value)?,
            },
            Pragma::Fillw { count, value } => Pragma::Fillw {
                count: self.expr(count)?,
                value: self.expr(value)?,
            },
            Pragma::Skip { address, fill } => Pragma::Skip {
                address: self.expr(address)?,
                fill: self.opt_expr(fill)?,
            },
            Pragma::Align(expr) => Pragma::Align(self.opt_expr(expr)?),
            Pragma::Trace { hex, values } => Pragma::Trace {
                hex: *hex,
                values: self.exprs(values)?,
            },
            Pragma::Error(expr) => Pragma::Error(self.expr(expr)?),
            Pragma::Model(_) | Pragma::InjectOpt(_) => pragma.clone(),
        })
    }

    fn statement(&self, statement: &Statement) -> Substituted<Statement> {
        Ok(match statement {
            Statement::Loop(expr) => Statement::Loop(self.expr(expr)?),
            Statement::Until(expr) => Statement::Until(self.expr(expr)?),
            Statement::While(expr) => Statement::While(self.expr(expr)?),
            Statement::If(expr) => Statement::If(self.expr(expr)?),
            Statement::Elif(expr) => Statement::Elif(self.expr(expr)?),
            Statement::For {
                variable,
                from,
                to,
                step,
            } => Statement::For {
                variable: variable.clone(),
                from: self.expr(from)?,
                to: self.expr(to)?,
                step: self.opt_expr(step)?,
            },
            other => other.clone(),
        })
    }

    fn kind(&self, kind: &LineKind) -> Substituted<LineKind> {
        Ok(match kind {
            LineKind::Instruction { mnemonic, operands } => LineKind::Instruction {
                mnemonic: mnemonic.clone(),
                operands: self.operands(operands)?,
            },
            LineKind::Invocation { name, args } => LineKind::Invocation {
                name: name.clone(),
                args: self.operands(args)?,
            },
            LineKind::Pragma(pragma) => LineKind::Pragma(self.pragma(pragma)?),
            LineKind::FieldAssignment(pragma) => LineKind::FieldAssignment(self.pragma(pragma)?),
            LineKind::Statement(statement) => LineKind::Statement(self.statement(statement)?),
            other => other.clone(),
        })
    }
}

impl<'a> Assembler<'a> {
    /// The line as it should execute: with macro arguments substituted when
    /// a macro expansion is active. A line that fails substitution is
    /// reported and runs as an empty line.
    pub(crate) fn prepare_line<'l>(&mut self, line: &'l SourceLine) -> Cow<'l, SourceLine> {
        if self.macro_frames.is_empty() {
            return Cow::Borrowed(line);
        }
        let substitution = MacroSubstitution {
            scopes: &self.scopes,
        };
        match substitution.kind(&line.kind) {
            Ok(kind) if kind == line.kind => Cow::Borrowed(line),
            Ok(kind) => Cow::Owned(SourceLine {
                kind,
                ..line.clone()
            }),
            Err(err) => {
                self.report_at(line, err.code, err.message, err.span);
                Cow::Owned(SourceLine {
                    kind: LineKind::Empty,
                    ..line.clone()
                })
            }
        }
    }

    /// Register the macro spanning `lines[start..=end]`.
    pub(crate) fn define_macro(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
    ) {
        let Some(Statement::Macro { params }) = line.statement() else {
            return;
        };
        let Some(name) = line.label.as_deref() else {
            self.report(line, ErrorCode::MissingLabel, "A macro definition requires a name label");
            return;
        };
        if self.scopes.has_local_scope() {
            self.report(
                line,
                ErrorCode::DefinitionInLocalScope,
                format!("Macro '{name}' cannot be defined in a local scope"),
            );
            return;
        }

        let mut seen = BTreeSet::new();
        for param in params {
            if !seen.insert(self.scopes.normalize(param)) {
                self.report(
                    line,
                    ErrorCode::DuplicateMacroParameter,
                    format!("Macro parameter '{param}' is declared more than once"),
                );
                return;
            }
        }

        let nested = (start + 1..end)
            .find(|ix| matches!(lines[*ix].statement(), Some(Statement::Macro { .. })));
        if let Some(ix) = nested {
            self.report(
                &lines[ix],
                ErrorCode::NestedMacroDefinition,
                "Macro definitions cannot be nested",
            );
            return;
        }

        let key = self.scopes.normalize(name);
        let definition = MacroDefinition {
            name: name.to_string(),
            arg_names: params.iter().map(|param| self.scopes.normalize(param)).collect(),
            end_label: lines[end].label.clone(),
            section: DefinitionSection {
                first_line: start + 1,
                last_line: end,
            },
        };
        let module = self.scopes.modules().current();
        let macros = &mut self.scopes.modules_mut().module_mut(module).macros;
        if macros.contains_key(&key) {
            self.report(line, ErrorCode::DuplicateMacro, format!("Macro '{name}' is already defined"));
            return;
        }
        debug!(name, params = params.len(), "defined macro");
        macros.insert(key, definition);
    }

    /// `Name(args)`: expand a macro or lay out a struct instance.
    pub(crate) fn execute_invocation(
        &mut self,
        line: &SourceLine,
        name: &str,
        args: &[Operand],
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        let module = self.scopes.modules().current();
        if let Some(definition) = self.scopes.modules().find_macro(module, name).cloned() {
            return self.invoke_macro(line, &definition, args);
        }
        if let Some((owner, key)) = self.scopes.modules().find_struct(module, name) {
            self.instantiate_struct(line, owner, &key, args);
            return Ok(LoopControlSignal::None);
        }
        self.report(
            line,
            ErrorCode::UnknownMacroOrStruct,
            format!("Unknown macro or structure '{name}'"),
        );
        Ok(LoopControlSignal::None)
    }

    fn invoke_macro(
        &mut self,
        line: &SourceLine,
        definition: &MacroDefinition,
        args: &[Operand],
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        if self.macro_frames.len() >= MAX_MACRO_DEPTH {
            return Err(self.abort(
                line,
                ErrorCode::MacroRecursionTooDeep,
                format!(
                    "Macro '{}' exceeds the maximum expansion depth of {MAX_MACRO_DEPTH}",
                    definition.name
                ),
            ));
        }
        if args.len() > definition.arg_names.len() {
            self.report(
                line,
                ErrorCode::TooManyMacroArguments,
                format!(
                    "Macro '{}' takes {} argument(s) but {} were passed",
                    definition.name,
                    definition.arg_names.len(),
                    args.len()
                ),
            );
            return Ok(LoopControlSignal::None);
        }

        let bound: BTreeMap<String, Operand> = definition
            .arg_names
            .iter()
            .enumerate()
            .map(|(ix, formal)| (formal.clone(), args.get(ix).cloned().unwrap_or(Operand::Empty)))
            .collect();

        let depth = self.scopes.depth();
        let id = self.push_scope(ScopeKind::Macro);
        if let Some(scope) = self.scopes.scope_mut(id) {
            scope.macro_arguments = Some(bound);
        }
        let frame = MacroFrame {
            name: definition.name.clone(),
            location: self.location(line),
        };
        self.macro_frames.push(frame);
        debug!(
            name = definition.name.as_str(),
            depth = self.macro_frames.len(),
            "expanding macro"
        );

        let lines = Arc::clone(&self.lines);
        let result = self.execute_range(
            &lines,
            definition.section.first_line,
            definition.section.last_line,
        );
        if result.is_ok() {
            self.close_scopes_to(id + 1);
            if let Some(label) = &definition.end_label {
                let address = ExpressionValue::Integer(self.emitter.current_address() as i64);
                if let Err(code) =
                    self.scopes
                        .define_symbol_at(SymbolTarget::Scope(id), label, address, SymbolKind::Label)
                {
                    self.report(line, code, format!("Symbol '{label}' is already defined"));
                }
            }
        }
        self.macro_frames.pop();
        let signal = result?;
        self.close_scopes_to(depth);
        Ok(signal)
    }
}
