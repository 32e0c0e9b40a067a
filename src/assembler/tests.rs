// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::{Compiler, CompilerOptions, CompilerOutput, SpectrumModel};
use crate::core::assembler::error::ErrorCode;
use crate::core::ast::{
    BinaryOp, Directive, Expr, LineKind, Operand, Pragma, SourceLine, Statement, SymbolPath,
};
use crate::core::encoder::{
    EncodeError, InstructionEncoder, InstructionRequest, OperandValue, ResolvedOperand,
};
use crate::core::source::MemorySourceProvider;
use crate::core::value::ExpressionValue;
use proptest::prelude::*;

/// Just enough Z80 for the directive tests.
struct FakeZ80;

fn word(opcode: u8, value: &OperandValue) -> Result<Vec<u8>, EncodeError> {
    let value = value.or_placeholder();
    if !(-32768..=0xffff).contains(&value) {
        return Err(EncodeError::OutOfRange { what: "word", value });
    }
    Ok(vec![opcode, value as u8, (value >> 8) as u8])
}

impl InstructionEncoder for FakeZ80 {
    fn encode(&self, request: &InstructionRequest<'_>) -> Result<Vec<u8>, EncodeError> {
        use ResolvedOperand as R;
        let mnemonic = request.mnemonic.to_ascii_lowercase();
        match (mnemonic.as_str(), request.operands) {
            ("nop", []) => Ok(vec![0x00]),
            ("ret", []) => Ok(vec![0xc9]),
            ("inc", [R::Register(r)]) if r == "a" => Ok(vec![0x3c]),
            ("ld", [R::Register(d), R::Register(s)]) if d == "a" && s == "b" => Ok(vec![0x78]),
            ("ld", [R::Register(d), R::Immediate(v)]) if d == "a" => {
                let value = v.or_placeholder();
                if !(-128..=0xff).contains(&value) {
                    return Err(EncodeError::OutOfRange { what: "byte", value });
                }
                Ok(vec![0x3e, value as u8])
            }
            ("ld", [R::Register(d), R::Immediate(v)]) if d == "bc" => word(0x01, v),
            ("ld", [R::Register(d), R::Immediate(v)]) if d == "hl" => word(0x21, v),
            ("ld", [R::Register(d), R::Indirect(v)]) if d == "a" => word(0x3a, v),
            ("jp", [R::Immediate(v)]) => word(0xc3, v),
            ("call", [R::Immediate(v)]) => word(0xcd, v),
            ("jr", [R::Immediate(v)]) => {
                let offset = match v {
                    OperandValue::Known(target) => target - (request.address as i64 + 2),
                    OperandValue::Deferred => 0,
                };
                if !(-128..=127).contains(&offset) {
                    return Err(EncodeError::OutOfRange {
                        what: "relative jump",
                        value: offset,
                    });
                }
                Ok(vec![0x18, offset as u8])
            }
            _ => Err(EncodeError::InvalidOperands(mnemonic)),
        }
    }
}

fn compile_with(options: CompilerOptions, lines: Vec<SourceLine>) -> CompilerOutput {
    Compiler::new(options, &FakeZ80).compile_lines(lines)
}

fn compile(lines: Vec<SourceLine>) -> CompilerOutput {
    compile_with(CompilerOptions::default(), lines)
}

fn codes(output: &CompilerOutput) -> Vec<ErrorCode> {
    output.errors.iter().map(|info| info.error_code).collect()
}

fn stmt(statement: Statement) -> SourceLine {
    SourceLine::stmt(statement)
}

fn defb(exprs: Vec<Expr>) -> SourceLine {
    SourceLine::pragma(Pragma::Defb(exprs))
}

fn equ(name: &str, expr: Expr) -> SourceLine {
    SourceLine::pragma(Pragma::Equ(expr)).labeled(name)
}

fn counter_is(value: i64) -> Expr {
    Expr::binary(BinaryOp::Eq, Expr::counter(), Expr::int(value))
}

fn if_then(condition: Expr, body: SourceLine) -> Vec<SourceLine> {
    vec![stmt(Statement::If(condition)), body, stmt(Statement::EndIf)]
}

fn instr(mnemonic: &str, operands: Vec<Operand>) -> SourceLine {
    SourceLine::instruction(mnemonic, operands)
}

fn continue_body() -> Vec<SourceLine> {
    let mut body = if_then(counter_is(4), stmt(Statement::Continue));
    body.push(defb(vec![Expr::counter()]));
    body
}

#[test]
fn loop_continue_skips_rest_of_iteration() {
    let mut lines = vec![stmt(Statement::Loop(Expr::int(5)))];
    lines.extend(continue_body());
    lines.push(stmt(Statement::EndLoop));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 2, 3, 5]);
}

#[test]
fn repeat_continue_still_checks_until() {
    let mut lines = vec![stmt(Statement::Repeat)];
    lines.extend(continue_body());
    lines.push(stmt(Statement::Until(counter_is(5))));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 2, 3, 5]);
}

#[test]
fn while_continue_still_rechecks_condition() {
    let condition = Expr::binary(BinaryOp::Le, Expr::counter(), Expr::int(5));
    let mut lines = vec![stmt(Statement::While(condition))];
    lines.extend(continue_body());
    lines.push(stmt(Statement::EndWhile));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 2, 3, 5]);
}

#[test]
fn for_continue_still_advances_variable() {
    let mut lines = vec![stmt(Statement::For {
        variable: "i".to_string(),
        from: Expr::int(1),
        to: Expr::int(5),
        step: None,
    })];
    lines.extend(if_then(
        Expr::binary(BinaryOp::Eq, Expr::symbol("i"), Expr::int(4)),
        stmt(Statement::Continue),
    ));
    lines.push(defb(vec![Expr::symbol("i")]));
    lines.push(stmt(Statement::Next));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 2, 3, 5]);
}

#[test]
fn for_counts_down_with_negative_step() {
    let lines = vec![
        stmt(Statement::For {
            variable: "i".to_string(),
            from: Expr::int(6),
            to: Expr::int(1),
            step: Some(Expr::int(-2)),
        }),
        defb(vec![Expr::symbol("i")]),
        stmt(Statement::Next),
    ];
    assert_eq!(compile(lines).code(), vec![6, 4, 2]);
}

#[test]
fn for_rejects_zero_step_and_label_variable() {
    let lines = vec![
        SourceLine::label_only("fixed"),
        stmt(Statement::For {
            variable: "i".to_string(),
            from: Expr::int(1),
            to: Expr::int(2),
            step: Some(Expr::int(0)),
        }),
        stmt(Statement::Next),
        stmt(Statement::For {
            variable: "fixed".to_string(),
            from: Expr::int(1),
            to: Expr::int(2),
            step: None,
        }),
        stmt(Statement::Next),
    ];
    let output = compile(lines);
    assert_eq!(
        codes(&output),
        vec![ErrorCode::ForStepZero, ErrorCode::ForVariableIsLabel]
    );
}

#[test]
fn break_terminates_loop_immediately() {
    let mut lines = vec![stmt(Statement::Loop(Expr::int(5)))];
    lines.extend(if_then(counter_is(3), stmt(Statement::Break)));
    lines.push(defb(vec![Expr::counter()]));
    lines.push(stmt(Statement::EndLoop));
    assert_eq!(compile(lines).code(), vec![1, 2]);
}

#[test]
fn inner_continue_does_not_affect_outer_loop() {
    let mut lines = vec![
        stmt(Statement::Loop(Expr::int(2))),
        stmt(Statement::Loop(Expr::int(3))),
    ];
    lines.extend(if_then(counter_is(2), stmt(Statement::Continue)));
    lines.push(instr("ld", vec![Operand::reg("bc"), Operand::int(0x1234)]));
    lines.push(stmt(Statement::EndLoop));
    lines.push(instr("inc", vec![Operand::reg("a")]));
    lines.push(stmt(Statement::EndLoop));
    let output = compile(lines);
    let pass = [0x01, 0x34, 0x12, 0x01, 0x34, 0x12, 0x3c];
    let expected: Vec<u8> = pass.iter().chain(pass.iter()).copied().collect();
    assert_eq!(output.code(), expected);
}

#[test]
fn zero_or_negative_loop_count_runs_nothing() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(0))),
        defb(vec![Expr::int(1)]),
        stmt(Statement::EndLoop),
        stmt(Statement::Loop(Expr::int(-3))),
        defb(vec![Expr::int(1)]),
        stmt(Statement::EndLoop),
    ];
    let output = compile(lines);
    assert!(output.is_successful());
    assert!(output.code().is_empty());
}

#[test]
fn loop_count_above_limit_is_rejected() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(0x10000))),
        stmt(Statement::EndLoop),
    ];
    assert_eq!(codes(&compile(lines)), vec![ErrorCode::LoopCountTooLarge]);
}

#[test]
fn break_outside_loop_is_reported_and_assembly_continues() {
    let lines = vec![stmt(Statement::Break), instr("nop", vec![])];
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::NotInLoop]);
    assert_eq!(output.code(), vec![0x00]);
}

#[test]
fn missing_end_statement_aborts_the_pass() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(2))),
        instr("nop", vec![]),
    ];
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::MissingEndStatement]);
    assert!(output.code().is_empty());
}

#[test]
fn orphan_end_statement_aborts_the_pass() {
    let lines = vec![
        instr("nop", vec![]),
        stmt(Statement::EndLoop),
        instr("nop", vec![]),
    ];
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::OrphanEndStatement]);
    assert_eq!(output.code(), vec![0x00]);
}

#[test]
fn labels_inside_loop_bodies_are_per_iteration() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(3))),
        instr("nop", vec![]).labeled("again"),
        stmt(Statement::EndLoop),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert!(output.symbol("again").is_none());
    assert_eq!(output.code().len(), 3);
}

#[test]
fn error_ceiling_limits_reports_per_loop() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(100))),
        SourceLine::pragma(Pragma::Error(Expr::string("boom"))),
        stmt(Statement::EndLoop),
    ];
    let output = compile_with(CompilerOptions::default().with_max_loop_errors(5), lines);
    assert_eq!(output.errors.len(), 5);
    assert_eq!(output.error_count, 100);
    assert_eq!(output.suppressed_diagnostics, 95);
    assert!(!output.is_successful());
}

#[test]
fn error_ceiling_covers_unresolved_references_from_loops() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(100))),
        defb(vec![Expr::symbol("nowhere")]),
        stmt(Statement::EndLoop),
        defb(vec![Expr::symbol("elsewhere")]),
    ];
    let output = compile_with(CompilerOptions::default().with_max_loop_errors(5), lines);
    let loop_reports = output
        .errors
        .iter()
        .filter(|info| info.message.contains("nowhere"))
        .count();
    assert_eq!(loop_reports, 5);
    assert!(output.errors.iter().any(|info| info.message.contains("elsewhere")));
    assert_eq!(output.error_count, 101);
    assert_eq!(output.suppressed_diagnostics, 95);
}

#[test]
fn loop_warnings_do_not_hide_later_errors() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(3))),
        stmt(Statement::Proc),
        stmt(Statement::Local(vec!["x".to_string()])),
        stmt(Statement::EndProc),
        stmt(Statement::EndLoop),
        stmt(Statement::Loop(Expr::int(1))),
        stmt(Statement::Proc),
        stmt(Statement::Local(vec!["y".to_string()])),
        stmt(Statement::EndProc),
        SourceLine::pragma(Pragma::Error(Expr::string("boom"))),
        stmt(Statement::EndLoop),
    ];
    let output = compile_with(CompilerOptions::default().with_max_loop_errors(1), lines);
    assert_eq!(
        codes(&output),
        vec![
            ErrorCode::RedundantLocal,
            ErrorCode::RedundantLocal,
            ErrorCode::RedundantLocal,
            ErrorCode::RedundantLocal,
            ErrorCode::UserError,
        ]
    );
}

#[test]
fn conditional_selects_exactly_one_branch() {
    let lines = vec![
        equ("mode", Expr::int(2)),
        stmt(Statement::If(Expr::binary(BinaryOp::Eq, Expr::symbol("mode"), Expr::int(1)))),
        defb(vec![Expr::int(1)]),
        stmt(Statement::Elif(Expr::binary(BinaryOp::Eq, Expr::symbol("mode"), Expr::int(2)))),
        defb(vec![Expr::int(2)]),
        equ("picked", Expr::int(2)),
        stmt(Statement::Else),
        defb(vec![Expr::int(3)]),
        equ("picked", Expr::int(3)),
        stmt(Statement::EndIf),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![2]);
    assert_eq!(output.symbol_value("picked"), Some(2));
}

#[test]
fn else_after_else_is_structural() {
    let lines = vec![
        stmt(Statement::If(Expr::boolean(true))),
        stmt(Statement::Else),
        stmt(Statement::Else),
        stmt(Statement::EndIf),
    ];
    assert_eq!(codes(&compile(lines)), vec![ErrorCode::OrphanEndStatement]);
}

#[test]
fn ifused_checks_earlier_references() {
    let lines = vec![
        equ("used_one", Expr::int(1)),
        equ("idle_one", Expr::int(2)),
        defb(vec![Expr::symbol("used_one")]),
        stmt(Statement::IfUsed(SymbolPath::simple("used_one"))),
        defb(vec![Expr::int(0xaa)]),
        stmt(Statement::EndIf),
        stmt(Statement::IfNUsed(SymbolPath::simple("idle_one"))),
        defb(vec![Expr::int(0xbb)]),
        stmt(Statement::EndIf),
    ];
    assert_eq!(compile(lines).code(), vec![1, 0xaa, 0xbb]);
}

#[test]
fn forward_jump_is_patched_after_the_pass() {
    let lines = vec![
        instr("jp", vec![Operand::symbol("target")]),
        instr("nop", vec![]),
        instr("ret", vec![]).labeled("target"),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![0xc3, 0x04, 0x80, 0x00, 0xc9]);
}

#[test]
fn forward_relative_jump_uses_recorded_address() {
    let lines = vec![
        instr("nop", vec![]),
        instr("jr", vec![Operand::symbol("skip")]),
        instr("nop", vec![]),
        instr("ret", vec![]).labeled("skip"),
    ];
    let output = compile(lines);
    assert_eq!(output.code(), vec![0x00, 0x18, 0x01, 0x00, 0xc9]);
}

#[test]
fn unresolved_symbol_is_reported_once_at_the_end() {
    let lines = vec![instr("call", vec![Operand::symbol("nowhere")])];
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::UnresolvedSymbol]);
    assert!(output.errors[0].message.contains("nowhere"));
    assert_eq!(output.code(), vec![0xcd, 0x00, 0x00]);
}

#[test]
fn equ_chains_resolve_regardless_of_order() {
    let lines = vec![
        equ("a", Expr::binary(BinaryOp::Add, Expr::symbol("b"), Expr::int(1))),
        equ("b", Expr::binary(BinaryOp::Multiply, Expr::symbol("c"), Expr::int(2))),
        equ("c", Expr::int(3)),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.symbol_value("a"), Some(7));
    assert_eq!(output.symbol_value("b"), Some(6));
}

#[test]
fn loop_fixups_keep_their_counter() {
    let lines = vec![
        stmt(Statement::Loop(Expr::int(2))),
        defb(vec![Expr::binary(BinaryOp::Add, Expr::symbol("later"), Expr::counter())]),
        stmt(Statement::EndLoop),
        equ("later", Expr::int(10)),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![11, 12]);
}

#[test]
fn proc_scope_shadows_module_symbol() {
    let lines = vec![
        equ("value", Expr::int(1)),
        stmt(Statement::Proc),
        equ("value", Expr::int(2)),
        defb(vec![Expr::symbol("value")]),
        stmt(Statement::EndProc),
        defb(vec![Expr::symbol("value")]),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![2, 1]);
}

#[test]
fn proc_variable_shadows_module_label() {
    let lines = vec![
        instr("nop", vec![]).labeled("value"),
        stmt(Statement::Proc),
        SourceLine::pragma(Pragma::Var(Expr::int(2))).labeled("value"),
        defb(vec![Expr::symbol("value")]),
        stmt(Statement::EndProc),
        defb(vec![Expr::symbol("value")]),
    ];
    let output = compile_with(CompilerOptions::default().with_start_address(0), lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![0x00, 0x02, 0x00]);
}

#[test]
fn explicit_proc_locals_route_other_labels_outward() {
    let lines = vec![
        stmt(Statement::Proc),
        stmt(Statement::Local(vec!["inner".to_string()])),
        instr("nop", vec![]).labeled("inner"),
        instr("nop", vec![]).labeled("outer"),
        stmt(Statement::EndProc),
    ];
    let options = CompilerOptions::default().with_explicit_proc_locals(true);
    let output = compile_with(options, lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert!(output.symbol("inner").is_none());
    assert_eq!(output.symbol_value("outer"), Some(0x8001));
}

#[test]
fn local_outside_proc_and_redundant_local() {
    let lines = vec![
        stmt(Statement::Local(vec!["x".to_string()])),
        stmt(Statement::Proc),
        stmt(Statement::Local(vec!["y".to_string()])),
        stmt(Statement::EndProc),
    ];
    let output = compile(lines);
    assert_eq!(
        codes(&output),
        vec![ErrorCode::LocalOutsideProc, ErrorCode::RedundantLocal]
    );
    assert!(output.errors[1].is_warning);
}

#[test]
fn short_term_labels_close_at_next_normal_label() {
    let lines = vec![
        instr("nop", vec![]).labeled("`tmp"),
        instr("jp", vec![Operand::symbol("`tmp")]),
        instr("nop", vec![]).labeled("main"),
        instr("nop", vec![]).labeled("`tmp"),
    ];
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![0x00, 0xc3, 0x00, 0x80, 0x00, 0x00]);
}

fn macro_def(name: &str, params: &[&str], body: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut lines = vec![stmt(Statement::Macro {
        params: params.iter().map(|p| p.to_string()).collect(),
    })
    .labeled(name)];
    lines.extend(body);
    lines.push(stmt(Statement::EndMacro));
    lines
}

#[test]
fn macro_arguments_substitute_registers_and_values() {
    let mut lines = macro_def(
        "ldv",
        &["reg", "val"],
        vec![instr("ld", vec![Operand::symbol("reg"), Operand::symbol("val")])],
    );
    lines.push(SourceLine::invoke("ldv", vec![Operand::reg("a"), Operand::int(5)]));
    lines.push(SourceLine::invoke("LDV", vec![Operand::reg("hl"), Operand::int(0x4000)]));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![0x3e, 0x05, 0x21, 0x00, 0x40]);
}

#[test]
fn macro_end_label_is_defined_per_invocation() {
    let mut lines = macro_def(
        "skip",
        &[],
        vec![
            instr("jp", vec![Operand::symbol("done")]),
            instr("nop", vec![]),
        ],
    );
    if let Some(end) = lines.pop() {
        lines.push(end.labeled("done"));
    }
    lines.push(SourceLine::invoke("skip", vec![]));
    lines.push(SourceLine::invoke("skip", vec![]));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(
        output.code(),
        vec![0xc3, 0x04, 0x80, 0x00, 0xc3, 0x08, 0x80, 0x00]
    );
    assert!(output.symbol("done").is_none());
}

#[test]
fn macro_end_label_is_not_visible_after_invocation() {
    let mut lines = macro_def("empty", &[], vec![instr("nop", vec![])]);
    if let Some(end) = lines.pop() {
        lines.push(end.labeled("finished"));
    }
    lines.push(SourceLine::invoke("empty", vec![]));
    lines.push(defb(vec![Expr::symbol("finished")]));
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::UnresolvedSymbol]);
}

#[test]
fn nested_macro_arguments_are_isolated() {
    let mut lines = macro_def("inner", &["v"], vec![defb(vec![Expr::symbol("v")])]);
    lines.extend(macro_def(
        "outer",
        &["v"],
        vec![
            defb(vec![Expr::symbol("v")]),
            SourceLine::invoke(
                "inner",
                vec![Operand::expr(Expr::binary(
                    BinaryOp::Add,
                    Expr::symbol("v"),
                    Expr::int(1),
                ))],
            ),
            defb(vec![Expr::symbol("v")]),
        ],
    ));
    lines.push(SourceLine::invoke("outer", vec![Operand::int(1)]));
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 2, 1]);
}

#[test]
fn register_argument_in_expression_is_misuse() {
    let mut lines = macro_def(
        "bad",
        &["r"],
        vec![defb(vec![Expr::binary(BinaryOp::Add, Expr::symbol("r"), Expr::int(1))])],
    );
    lines.push(SourceLine::invoke("bad", vec![Operand::reg("a")]));
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::MacroArgumentMisuse]);
    assert!(output.errors[0].notes[0].contains("in expansion of macro 'bad'"));
}

#[test]
fn macro_errors_without_arguments_or_with_too_many() {
    let mut lines = macro_def("one", &["v"], vec![defb(vec![Expr::symbol("v")])]);
    lines.push(SourceLine::invoke("one", vec![]));
    lines.push(SourceLine::invoke("one", vec![Operand::int(1), Operand::int(2)]));
    lines.push(SourceLine::invoke("missing", vec![]));
    let output = compile(lines);
    assert_eq!(
        codes(&output),
        vec![
            ErrorCode::MissingMacroArgument,
            ErrorCode::TooManyMacroArguments,
            ErrorCode::UnknownMacroOrStruct,
        ]
    );
}

#[test]
fn runaway_macro_recursion_aborts() {
    let mut lines = macro_def("again", &[], vec![SourceLine::invoke("again", vec![])]);
    lines.push(SourceLine::invoke("again", vec![]));
    lines.push(instr("nop", vec![]));
    let output = compile(lines);
    assert_eq!(codes(&output), vec![ErrorCode::MacroRecursionTooDeep]);
    assert!(output.code().is_empty());
}

#[test]
fn macro_break_reaches_enclosing_loop() {
    let mut lines = macro_def("stop", &[], vec![stmt(Statement::Break)]);
    lines.push(stmt(Statement::Loop(Expr::int(4))));
    lines.push(defb(vec![Expr::counter()]));
    lines.extend(if_then(counter_is(2), SourceLine::invoke("stop", vec![])));
    lines.push(stmt(Statement::EndLoop));
    assert_eq!(compile(lines).code(), vec![1, 2]);
}

#[test]
fn duplicate_macro_and_macro_in_proc_are_rejected() {
    let mut lines = macro_def("m", &[], vec![]);
    lines.extend(macro_def("M", &[], vec![]));
    lines.push(stmt(Statement::Proc));
    lines.extend(macro_def("inproc", &[], vec![]));
    lines.push(stmt(Statement::EndProc));
    assert_eq!(
        codes(&compile(lines)),
        vec![ErrorCode::DuplicateMacro, ErrorCode::DefinitionInLocalScope]
    );
}

#[test]
fn module_symbols_are_addressed_by_path() {
    let lines = vec![
        stmt(Statement::Module(Some("Inner".to_string()))),
        equ("value", Expr::int(5)),
        equ("@hidden", Expr::int(6)),
        stmt(Statement::EndModule),
        defb(vec![Expr::symbol("Inner.value")]),
        stmt(Statement::Module(Some("inner".to_string()))),
        stmt(Statement::EndModule),
    ];
    let output = compile(lines);
    assert_eq!(output.code(), vec![5]);
    assert_eq!(codes(&output), vec![ErrorCode::DuplicateModule]);
    assert_eq!(output.symbol_value("Inner.value"), Some(5));
    assert!(output.symbol("Inner.@hidden").is_none());
}

#[test]
fn module_inside_proc_is_rejected() {
    let lines = vec![
        stmt(Statement::Proc),
        stmt(Statement::Module(Some("m".to_string()))),
        stmt(Statement::EndModule),
        stmt(Statement::EndProc),
    ];
    assert_eq!(codes(&compile(lines)), vec![ErrorCode::ModuleInLocalScope]);
}

fn point_struct() -> Vec<SourceLine> {
    vec![
        stmt(Statement::Struct).labeled("Point"),
        defb(vec![Expr::int(1)]).labeled("x"),
        SourceLine::pragma(Pragma::Defw(vec![Expr::int(2)])).labeled("y"),
        stmt(Statement::EndStruct),
    ]
}

#[test]
fn struct_instance_emits_defaults_and_field_assignments_patch() {
    let mut lines = point_struct();
    lines.push(SourceLine::invoke("Point", vec![]));
    lines.push(
        SourceLine::new(LineKind::FieldAssignment(Pragma::Defw(vec![Expr::int(0x1234)])))
            .labeled("y"),
    );
    let output = compile(lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    assert_eq!(output.code(), vec![1, 0x34, 0x12]);
    let point = &output.root_module().structs["point"];
    assert_eq!(point.size, 3);
    assert!(point.fields["y"].is_used);
}

#[test]
fn struct_field_errors() {
    let mut lines = point_struct();
    lines.push(SourceLine::new(LineKind::FieldAssignment(Pragma::Defb(vec![Expr::int(1)]))).labeled("x"));
    lines.push(SourceLine::invoke("Point", vec![]));
    lines.push(SourceLine::new(LineKind::FieldAssignment(Pragma::Defb(vec![Expr::int(1)]))).labeled("z"));
    lines.push(
        SourceLine::new(LineKind::FieldAssignment(Pragma::Defb(vec![
            Expr::int(1),
            Expr::int(2),
            Expr::int(3),
        ])))
        .labeled("y"),
    );
    lines.push(SourceLine::invoke("Point", vec![Operand::int(1)]));
    let output = compile(lines);
    assert_eq!(
        codes(&output),
        vec![
            ErrorCode::FieldAssignmentOutsideStruct,
            ErrorCode::UnknownStructField,
            ErrorCode::StructFieldOverflow,
            ErrorCode::StructArguments,
        ]
    );
}

#[test]
fn struct_body_accepts_only_data() {
    let lines = vec![
        stmt(Statement::Struct).labeled("Bad"),
        instr("nop", vec![]),
        stmt(Statement::EndStruct),
    ];
    assert_eq!(codes(&compile(lines)), vec![ErrorCode::InvalidStructStatement]);
}

#[test]
fn bank_requires_banked_model() {
    let lines = vec![
        SourceLine::pragma(Pragma::Bank {
            bank: Expr::int(3),
            offset: None,
        }),
        instr("nop", vec![]),
    ];
    let output = compile(lines.clone());
    assert_eq!(codes(&output), vec![ErrorCode::BankNotSupported]);

    let options = CompilerOptions::default().with_model(SpectrumModel::Spectrum128);
    let output = compile_with(options, lines);
    assert!(output.is_successful(), "{:?}", output.errors);
    let segment = &output.segments[0];
    assert_eq!(segment.bank, Some(3));
    assert_eq!(segment.start_address, 0xc000);
    assert_eq!(segment.max_code_length, 0x4000);
}

#[test]
fn bank_rules_follow_the_model() {
    let bank = |id: i64, offset: Option<i64>| {
        SourceLine::pragma(Pragma::Bank {
            bank: Expr::int(id),
            offset: offset.map(Expr::int),
        })
    };
    let lines = vec![
        SourceLine::pragma(Pragma::Model("128".to_string())),
        bank(8, None),
        bank(1, Some(0x4000)),
        bank(1, Some(0x100)),
        bank(1, None),
    ];
    let output = compile(lines);
    assert_eq!(
        codes(&output),
        vec![ErrorCode::InvalidBank, ErrorCode::InvalidBank, ErrorCode::DuplicateBank]
    );
    assert_eq!(output.model_type, Some(SpectrumModel::Spectrum128));
    assert_eq!(output.segments[0].start_address, 0xc100);
}

#[test]
fn segment_overflow_is_a_warning() {
    let lines = vec![SourceLine::pragma(Pragma::Defs {
        count: Expr::int(4),
        fill: None,
    })];
    let output = compile_with(CompilerOptions::default().with_start_address(0xfffe), lines);
    assert_eq!(codes(&output), vec![ErrorCode::CodeSegmentOverflow]);
    assert!(output.errors[0].is_warning);
    assert!(output.is_successful());
    assert!(output.segments[0].overflow_detected);
}

#[test]
fn org_disp_and_dollar() {
    let lines = vec![
        SourceLine::pragma(Pragma::Org(Expr::int(0x6000))),
        SourceLine::pragma(Pragma::Disp(Expr::int(0x1000))),
        SourceLine::pragma(Pragma::Defw(vec![Expr::dollar()])),
        instr("nop", vec![]).labeled("here"),
    ];
    let output = compile(lines);
    assert_eq!(output.segments[0].start_address, 0x6000);
    assert_eq!(output.code(), vec![0x00, 0x70, 0x00]);
    assert_eq!(output.symbol_value("here"), Some(0x7002));
}

#[test]
fn skip_and_align_fill_gaps() {
    let lines = vec![
        defb(vec![Expr::int(1)]),
        SourceLine::pragma(Pragma::Skip {
            address: Expr::int(0x8003),
            fill: None,
        }),
        SourceLine::pragma(Pragma::Align(Some(Expr::int(4)))),
        defb(vec![Expr::int(2)]),
        SourceLine::pragma(Pragma::Skip {
            address: Expr::int(0x8000),
            fill: None,
        }),
    ];
    let output = compile(lines);
    assert_eq!(output.code(), vec![1, 0xff, 0xff, 0, 2]);
    assert_eq!(codes(&output), vec![ErrorCode::SkipBackwards]);
}

#[test]
fn string_and_hex_data_pragmas() {
    let lines = vec![
        SourceLine::pragma(Pragma::Defm(Expr::string("AB"))),
        SourceLine::pragma(Pragma::Defn(Expr::string("C"))),
        SourceLine::pragma(Pragma::Defc(Expr::string("DE"))),
        SourceLine::pragma(Pragma::Defh(Expr::string("0aFF"))),
        SourceLine::pragma(Pragma::Defh(Expr::string("xyz"))),
        SourceLine::pragma(Pragma::Fillw {
            count: Expr::int(2),
            value: Expr::int(0x1234),
        }),
    ];
    let output = compile(lines);
    assert_eq!(
        output.code(),
        vec![0x41, 0x42, 0x43, 0x00, 0x44, 0xc5, 0x0a, 0xff, 0x34, 0x12, 0x34, 0x12]
    );
    assert_eq!(codes(&output), vec![ErrorCode::InvalidHexString]);
}

#[test]
fn defb_strings_need_flexible_pragmas() {
    let lines = vec![defb(vec![Expr::string("hi"), Expr::int(300)])];
    assert_eq!(
        codes(&compile(lines.clone())),
        vec![ErrorCode::TypeMismatch]
    );
    let output = compile_with(CompilerOptions::default().with_flexible_def_pragmas(true), lines);
    assert_eq!(codes(&output), vec![ErrorCode::ValueOutOfRange]);
    assert_eq!(output.code(), vec![b'h', b'i', 300i64 as u8]);
}

#[test]
fn variables_update_across_loop_iterations() {
    let lines = vec![
        SourceLine::pragma(Pragma::Var(Expr::int(0))).labeled("total"),
        stmt(Statement::Loop(Expr::int(3))),
        SourceLine::pragma(Pragma::Var(Expr::binary(
            BinaryOp::Add,
            Expr::symbol("total"),
            Expr::counter(),
        )))
        .labeled("total"),
        stmt(Statement::EndLoop),
        defb(vec![Expr::symbol("total")]),
        instr("nop", vec![]).labeled("fixed"),
        SourceLine::pragma(Pragma::Var(Expr::int(1))).labeled("fixed"),
    ];
    let output = compile(lines);
    assert_eq!(output.code(), vec![6, 0]);
    assert_eq!(codes(&output), vec![ErrorCode::LabelNotVariable]);
}

#[test]
fn entry_trace_error_and_injectopt() {
    let lines = vec![
        SourceLine::pragma(Pragma::Ent(Expr::symbol("start"))),
        SourceLine::pragma(Pragma::Xent(Expr::int(0x9000))),
        SourceLine::pragma(Pragma::Trace {
            hex: true,
            values: vec![Expr::int(10), Expr::string(":"), Expr::int(0x1234)],
        }),
        SourceLine::pragma(Pragma::InjectOpt(vec!["cursork".to_string()])),
        instr("nop", vec![]),
        instr("ret", vec![]).labeled("start"),
        SourceLine::pragma(Pragma::Error(Expr::string("stop here"))),
    ];
    let output = compile(lines);
    assert_eq!(output.entry_address, Some(0x8001));
    assert_eq!(output.export_entry_address, Some(0x9000));
    assert_eq!(output.trace_output, vec!["$0A:$1234".to_string()]);
    assert_eq!(output.inject_options, vec!["cursork".to_string()]);
    assert_eq!(codes(&output), vec![ErrorCode::UserError]);
    assert_eq!(output.errors[0].message, "stop here");
}

#[test]
fn model_pragma_rules() {
    let lines = vec![
        SourceLine::pragma(Pragma::Model("zx81".to_string())),
        SourceLine::pragma(Pragma::Model("next".to_string())),
        SourceLine::pragma(Pragma::Model("48".to_string())),
    ];
    let output = compile(lines.clone());
    assert_eq!(
        codes(&output),
        vec![ErrorCode::InvalidModel, ErrorCode::ModelAlreadySet]
    );
    assert_eq!(output.model_type, Some(SpectrumModel::Next));

    let configured = CompilerOptions::default().with_model(SpectrumModel::SpectrumP3);
    assert_eq!(
        compile_with(configured, lines).model_type,
        Some(SpectrumModel::SpectrumP3)
    );
}

#[test]
fn predefined_symbols_are_variables_and_ifdef_symbols() {
    let options = CompilerOptions::default().with_symbol("LEVEL", ExpressionValue::Integer(3));
    let lines = vec![
        SourceLine::directive(Directive::IfDef("LEVEL".to_string())),
        defb(vec![Expr::symbol("level")]),
        SourceLine::directive(Directive::Else),
        defb(vec![Expr::int(0)]),
        SourceLine::directive(Directive::EndIf),
    ];
    assert_eq!(compile_with(options, lines).code(), vec![3]);
}

#[test]
fn include_cycle_and_missing_include() {
    let provider = MemorySourceProvider::new()
        .with_file(
            "main.asm",
            vec![
                SourceLine::directive(Directive::Include("missing.asm".to_string())),
                SourceLine::directive(Directive::Include("a.asm".to_string())),
            ],
        )
        .with_file(
            "a.asm",
            vec![SourceLine::directive(Directive::Include("main.asm".to_string()))],
        );
    let output = Compiler::new(CompilerOptions::default(), &FakeZ80).compile(&provider, "main.asm");
    assert_eq!(
        codes(&output),
        vec![ErrorCode::IncludeNotFound, ErrorCode::IncludeCycle]
    );
    assert_eq!(output.errors[1].file_name, "a.asm");
}

#[test]
fn unbalanced_preprocessor_directive_is_structural() {
    let lines = vec![SourceLine::directive(Directive::IfNDef("X".to_string()))];
    assert_eq!(codes(&compile(lines)), vec![ErrorCode::UnbalancedDirective]);
}

#[test]
fn source_map_and_listing_follow_emission() {
    let lines = vec![
        instr("ld", vec![Operand::reg("a"), Operand::int(5)])
            .at_line(1)
            .with_text("  ld a,5"),
        stmt(Statement::Loop(Expr::int(2))).at_line(2).with_text("  .loop 2"),
        instr("nop", vec![]).at_line(3).with_text("  nop"),
        stmt(Statement::EndLoop).at_line(4).with_text("  .endl"),
        equ("size", Expr::int(0x20)).at_line(5).with_text("size .equ $20"),
    ];
    let output = compile(lines);
    assert_eq!(output.source_map.origin_for_address(0x8001).map(|o| o.line), Some(1));
    assert_eq!(output.source_map.origin_for_address(0x8003).map(|o| o.line), Some(3));
    let nop_items = output
        .list_file_items
        .iter()
        .filter(|item| item.line_number == 3)
        .count();
    assert_eq!(nop_items, 2);

    let text = output.list_file_text();
    assert!(text.contains("8000  3E 05"), "{text}");
    assert!(text.contains("----  EQU 0020"), "{text}");
    assert!(text.contains("Total memory is 4 bytes"), "{text}");
}

#[test]
fn listing_places_diagnostics_after_their_line() {
    let lines = vec![
        stmt(Statement::Break).at_line(1).with_text(".break"),
        instr("nop", vec![]).at_line(2).with_text("nop"),
    ];
    let text = compile(lines).list_file_text();
    let error_at = text.find("Z0404").expect("diagnostic rendered");
    let nop_at = text.find("nop").expect("nop line rendered");
    assert!(error_at < nop_at, "{text}");
}

#[test]
fn json_output_has_stable_shape() {
    let lines = vec![
        equ("value", Expr::int(0x42)),
        defb(vec![Expr::symbol("value")]),
    ];
    let json = compile(lines).to_json();
    assert_eq!(json["schema"], "zxasm-output-v1");
    assert_eq!(json["segments"][0]["code"], "42");
    assert_eq!(json["segments"][0]["startAddress"], "8000");
    assert_eq!(json["modules"]["symbols"]["value"]["value"], 0x42);
    assert_eq!(json["modules"]["symbols"]["value"]["used"], true);
    assert_eq!(json["successful"], true);
}

proptest! {
    #[test]
    fn compilation_is_deterministic(count in 0i64..12, seed in 0i64..200) {
        let program = || vec![
            stmt(Statement::Loop(Expr::int(count))),
            defb(vec![Expr::binary(BinaryOp::Add, Expr::counter(), Expr::int(seed))]),
            instr("jp", vec![Operand::symbol("done")]),
            stmt(Statement::EndLoop),
            instr("ret", vec![]).labeled("done"),
        ];
        let first = compile(program()).to_json();
        let second = compile(program()).to_json();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn loop_emits_one_byte_per_iteration(count in 0i64..300) {
        let lines = vec![
            stmt(Statement::Loop(Expr::int(count))),
            defb(vec![Expr::call("low", vec![Expr::counter()])]),
            stmt(Statement::EndLoop),
        ];
        let output = compile(lines);
        prop_assert!(output.is_successful());
        prop_assert_eq!(output.code().len() as i64, count);
    }
}
