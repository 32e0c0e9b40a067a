// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::*;

use crate::core::module_tree::{DefinitionSection, StructDefinition};

impl<'a> Assembler<'a> {
    /// `.proc` ... `.endp`: run the body in its own scope.
    pub(crate) fn execute_proc(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        let depth = self.scopes.depth();
        self.push_scope(ScopeKind::Proc);
        let signal = self.execute_range(lines, start + 1, end)?;
        self.close_scopes_to(depth);
        Ok(signal)
    }

    pub(crate) fn execute_local(&mut self, line: &SourceLine, names: &[String]) {
        for name in names {
            if let Err(code) = self.scopes.book_local(name) {
                let message = match code {
                    ErrorCode::LocalOutsideProc => "'.local' can only be used inside '.proc'".to_string(),
                    _ => format!("'{name}' cannot be declared local"),
                };
                self.report(line, code, message);
                return;
            }
        }
        if !self.options.proc_explicit_locals_only {
            self.warn(
                line,
                ErrorCode::RedundantLocal,
                "'.local' has no effect unless explicit proc locals are enabled",
            );
        }
    }

    /// `.module` ... `.endmodule`.
    pub(crate) fn execute_module(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
    ) -> Result<LoopControlSignal, AssemblyAbort> {
        let Some(Statement::Module(argument)) = line.statement() else {
            return Ok(LoopControlSignal::None);
        };
        if self.scopes.has_local_scope() {
            self.report(
                line,
                ErrorCode::ModuleInLocalScope,
                "A module cannot be declared inside a local scope",
            );
            return Ok(LoopControlSignal::None);
        }
        let name = argument.as_deref().or(line.label.as_deref());
        if argument.is_some() {
            if let Some(label) = &line.label {
                self.define_address_label(line, label);
            }
        }
        self.close_temporary_scope();
        if self.scopes.modules_mut().enter_module(name).is_none() {
            self.report(
                line,
                ErrorCode::DuplicateModule,
                format!("Module '{}' is already defined", name.unwrap_or_default()),
            );
            return Ok(LoopControlSignal::None);
        }
        let id = self.scopes.modules().current();
        debug!(module = %self.scopes.modules().qualified_name(id), "entering module");
        let result = self.execute_range(lines, start + 1, end);
        self.close_temporary_scope();
        self.scopes.modules_mut().leave_module();
        result
    }

    /// `.struct` ... `.ends`: lay the body out into a byte template.
    pub(crate) fn define_struct(
        &mut self,
        lines: &[SourceLine],
        start: usize,
        end: usize,
        line: &SourceLine,
    ) {
        let Some(name) = line.label.as_deref() else {
            self.report(line, ErrorCode::MissingLabel, "A structure definition requires a name label");
            return;
        };
        if self.scopes.has_local_scope() {
            self.report(
                line,
                ErrorCode::DefinitionInLocalScope,
                format!("Structure '{name}' cannot be defined in a local scope"),
            );
            return;
        }
        let key = self.scopes.normalize(name);
        let module = self.scopes.modules().current();
        if self.scopes.modules().module(module).structs.contains_key(&key) {
            self.report(
                line,
                ErrorCode::DuplicateStruct,
                format!("Structure '{name}' is already defined"),
            );
            return;
        }

        let mut definition = StructDefinition::new(
            name,
            DefinitionSection {
                first_line: start + 1,
                last_line: end,
            },
        );
        self.emitter.begin_capture();
        for body_line in &lines[start + 1..end] {
            if let Some(field) = &body_line.label {
                let offset = self.emitter.current_address();
                if !definition.add_field(&self.scopes.normalize(field), offset) {
                    self.report(
                        body_line,
                        ErrorCode::DuplicateStructField,
                        format!("Field '{field}' is already defined in '{name}'"),
                    );
                }
            }
            match &body_line.kind {
                LineKind::Empty => {}
                LineKind::Pragma(pragma) if pragma.emits_data() => {
                    let Some(data) = self.data_bytes(body_line, pragma) else {
                        continue;
                    };
                    if let Some(deferred) = data.deferred.first() {
                        self.report_at(
                            body_line,
                            ErrorCode::ExpressionNotEvaluated,
                            "Structure field values must be known at definition time",
                            deferred.expr.span(),
                        );
                    }
                    self.emitter.emit(&data.bytes);
                }
                _ => self.report(
                    body_line,
                    ErrorCode::InvalidStructStatement,
                    "Only data definitions are allowed inside a structure",
                ),
            }
        }
        let bytes = self.emitter.end_capture();
        definition.size = bytes.len() as u16;
        definition.default_bytes = bytes;
        debug!(name, size = definition.size, "defined structure");
        self.scopes
            .modules_mut()
            .module_mut(module)
            .structs
            .insert(key, definition);
    }

    /// `Name()` where `Name` is a structure: emit its default bytes.
    pub(crate) fn instantiate_struct(
        &mut self,
        line: &SourceLine,
        owner: ModuleId,
        key: &str,
        args: &[Operand],
    ) {
        if !args.is_empty() {
            self.report(
                line,
                ErrorCode::StructArguments,
                "A structure instance cannot take arguments",
            );
            return;
        }
        let Some(definition) = self.scopes.modules().module(owner).structs.get(key) else {
            return;
        };
        let bytes = definition.default_bytes.clone();
        let (segment_index, offset) = self.emit_bytes(line, &bytes);
        self.struct_instance = Some(StructInstance {
            module: owner,
            key: key.to_string(),
            segment_index,
            offset,
            size: bytes.len(),
        });
    }

    /// `field -> .defb ...`: overwrite a field of the struct just emitted.
    pub(crate) fn execute_field_assignment(&mut self, line: &SourceLine, pragma: &Pragma) {
        let Some(instance) = self.struct_instance.clone() else {
            self.report(
                line,
                ErrorCode::FieldAssignmentOutsideStruct,
                "A field assignment must follow a structure instance",
            );
            return;
        };
        let field_name = line.label.as_deref().unwrap_or_default();
        let field_key = self.scopes.normalize(field_name);
        let field_offset = self
            .scopes
            .modules_mut()
            .module_mut(instance.module)
            .structs
            .get_mut(&instance.key)
            .and_then(|definition| definition.fields.get_mut(&field_key))
            .map(|field| {
                field.is_used = true;
                field.offset as usize
            });
        let Some(field_offset) = field_offset else {
            self.report(
                line,
                ErrorCode::UnknownStructField,
                format!("Unknown structure field '{field_name}'"),
            );
            return;
        };
        if !pragma.emits_data() {
            self.report(
                line,
                ErrorCode::InvalidStructStatement,
                format!("'{}' cannot be used in a field assignment", pragma.name()),
            );
            return;
        }
        let Some(data) = self.data_bytes(line, pragma) else {
            return;
        };
        if field_offset + data.bytes.len() > instance.size {
            self.report(
                line,
                ErrorCode::StructFieldOverflow,
                format!("Field '{field_name}' assignment overflows the structure"),
            );
            return;
        }
        let base = instance.offset + field_offset;
        self.emitter.patch(instance.segment_index, base, &data.bytes);
        let address = self
            .emitter
            .segments()
            .get(instance.segment_index)
            .map(|segment| segment.start_address.wrapping_add(base as u16))
            .unwrap_or_default();
        self.register_data_fixups(line, data.deferred, instance.segment_index, base, address);
    }
}
