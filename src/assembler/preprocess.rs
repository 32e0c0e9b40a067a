// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source loading: `#include` splicing and `#ifdef` selection.

use super::*;

use crate::core::ast::number_lines;
use crate::core::source::is_include_cycle;

/// One open `#ifdef`/`#ifndef`.
struct ConditionalFrame {
    opener: SourceLine,
    parent_active: bool,
    branch_active: bool,
    in_else: bool,
}

impl<'a> Assembler<'a> {
    /// Load `filename` and append its active lines to `out`, recursing into
    /// includes.
    pub(crate) fn load_file(
        &mut self,
        provider: &dyn SourceProvider,
        filename: &str,
        parent: Option<usize>,
        including_line: Option<&SourceLine>,
        out: &mut Vec<SourceLine>,
    ) -> Result<(), AssemblyAbort> {
        if let (Some(parent), Some(line)) = (parent, including_line) {
            if is_include_cycle(&self.source_files, parent, filename) {
                return Err(self.abort(
                    line,
                    ErrorCode::IncludeCycle,
                    format!("Including '{filename}' creates an include cycle"),
                ));
            }
        }
        let lines = match provider.load(filename) {
            Ok(lines) => lines,
            Err(err) => {
                let info = match including_line {
                    Some(line) => AssemblerErrorInfo::new(
                        ErrorCode::IncludeNotFound,
                        err.to_string(),
                        &self.location(line),
                    ),
                    None => AssemblerErrorInfo::new(
                        ErrorCode::IncludeNotFound,
                        err.to_string(),
                        &ErrorLocation {
                            file_name: filename.to_string(),
                            ..ErrorLocation::default()
                        },
                    ),
                };
                self.report_info(info);
                return Ok(());
            }
        };

        let index = self.source_files.len();
        self.source_files.push(SourceFileItem::new(filename, parent));
        if let Some(parent) = parent.and_then(|parent| self.source_files.get_mut(parent)) {
            parent.includes.push(index);
        }
        debug!(file = filename, lines = lines.len(), index, "loaded source file");

        let mut frames: Vec<ConditionalFrame> = Vec::new();
        for line in number_lines(lines, index) {
            let active = frames.iter().all(|frame| frame.branch_active);
            let LineKind::Directive(directive) = &line.kind else {
                if active {
                    out.push(line);
                }
                continue;
            };
            match directive {
                Directive::IfDef(name) | Directive::IfNDef(name) => {
                    let defined = self.defined_symbols.contains(name);
                    let wanted = matches!(directive, Directive::IfDef(_));
                    frames.push(ConditionalFrame {
                        parent_active: active,
                        branch_active: active && defined == wanted,
                        in_else: false,
                        opener: line,
                    });
                }
                Directive::Else => match frames.last_mut() {
                    Some(frame) if !frame.in_else => {
                        frame.branch_active = frame.parent_active && !frame.branch_active;
                        frame.in_else = true;
                    }
                    _ => {
                        return Err(self.abort(
                            &line,
                            ErrorCode::UnbalancedDirective,
                            "'#else' without a matching '#ifdef' or '#ifndef'",
                        ))
                    }
                },
                Directive::EndIf => {
                    if frames.pop().is_none() {
                        return Err(self.abort(
                            &line,
                            ErrorCode::UnbalancedDirective,
                            "'#endif' without a matching '#ifdef' or '#ifndef'",
                        ));
                    }
                }
                _ if !active => {}
                Directive::Define(name) => {
                    self.defined_symbols.insert(name.clone());
                    out.push(line);
                }
                Directive::Undef(name) => {
                    self.defined_symbols.remove(name);
                    out.push(line);
                }
                Directive::Include(target) => {
                    let target = target.clone();
                    out.push(line.clone());
                    self.load_file(provider, &target, Some(index), Some(&line), out)?;
                }
            }
        }
        if let Some(frame) = frames.last() {
            return Err(self.abort(
                &frame.opener,
                ErrorCode::UnbalancedDirective,
                "Missing '#endif'",
            ));
        }
        Ok(())
    }
}
