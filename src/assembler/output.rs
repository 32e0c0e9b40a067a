// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Compilation results and their JSON and list-file renderings.

use serde_json::{json, Value};

use super::*;

use crate::core::assembler::listing::{ListingLine, ListingWriter};
use crate::core::assembler::segment::BinarySegment;
use crate::core::module_tree::{AssemblySymbolInfo, Module, ModuleTree, ROOT_MODULE};

pub const OUTPUT_SCHEMA: &str = "zxasm-output-v1";

/// Everything one compilation produced.
#[derive(Debug, Clone)]
pub struct CompilerOutput {
    pub source_file_list: Vec<SourceFileItem>,
    pub segments: Vec<BinarySegment>,
    pub errors: Vec<AssemblerErrorInfo>,
    pub error_count: usize,
    /// Diagnostics hidden by per-loop ceilings.
    pub suppressed_diagnostics: usize,
    pub source_map: SourceMap,
    pub list_file_items: Vec<ListFileItem>,
    pub trace_output: Vec<String>,
    pub inject_options: Vec<String>,
    pub entry_address: Option<u16>,
    pub export_entry_address: Option<u16>,
    pub model_type: Option<SpectrumModel>,
    pub modules: ModuleTree,
}

fn format_addr(address: u16) -> String {
    format!("{address:04X}")
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn value_json(value: &ExpressionValue) -> Value {
    match value {
        ExpressionValue::Bool(flag) => json!(flag),
        ExpressionValue::Integer(number) => json!(number),
        ExpressionValue::Real(number) => json!(number),
        ExpressionValue::Str(text) => json!(text),
        ExpressionValue::Error | ExpressionValue::NonEvaluated => Value::Null,
    }
}

fn symbol_json(info: &AssemblySymbolInfo) -> Value {
    json!({
        "name": info.name,
        "kind": info.kind.as_str(),
        "value": value_json(&info.value),
        "moduleLocal": info.is_module_local,
        "shortTerm": info.is_short_term,
        "used": info.is_used.get(),
    })
}

fn module_json(tree: &ModuleTree, id: ModuleId) -> Value {
    let module = tree.module(id);
    let symbols: serde_json::Map<String, Value> = module
        .symbols
        .iter()
        .map(|(key, info)| (key.clone(), symbol_json(info)))
        .collect();
    let structs: serde_json::Map<String, Value> = module
        .structs
        .iter()
        .map(|(key, def)| {
            let fields: serde_json::Map<String, Value> = def
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), json!(field.offset)))
                .collect();
            (
                key.clone(),
                json!({
                    "name": def.name,
                    "size": def.size,
                    "fields": fields,
                    "defaultBytes": hex_string(&def.default_bytes),
                }),
            )
        })
        .collect();
    let macros: serde_json::Map<String, Value> = module
        .macros
        .iter()
        .map(|(key, def)| {
            (
                key.clone(),
                json!({
                    "name": def.name,
                    "params": def.arg_names,
                    "endLabel": def.end_label,
                }),
            )
        })
        .collect();
    let nested: serde_json::Map<String, Value> = module
        .nested_modules
        .iter()
        .map(|(name, child)| (name.clone(), module_json(tree, *child)))
        .collect();
    json!({
        "name": module.name,
        "symbols": symbols,
        "structs": structs,
        "macros": macros,
        "modules": nested,
    })
}

impl CompilerOutput {
    /// No errors were reported. Warnings do not count.
    pub fn is_successful(&self) -> bool {
        self.error_count == 0
    }

    pub fn root_module(&self) -> &Module {
        self.modules.module(ROOT_MODULE)
    }

    /// Look up a symbol from the root module; `Outer.Inner.name` paths
    /// address nested modules.
    pub fn symbol(&self, path: &str) -> Option<&AssemblySymbolInfo> {
        self.modules
            .resolve_symbol(ROOT_MODULE, &SymbolPath::parse(path))
    }

    /// Integer value of a symbol, if it has one.
    pub fn symbol_value(&self, path: &str) -> Option<i64> {
        self.symbol(path).and_then(|info| info.value.as_long())
    }

    /// Emitted bytes of every segment, in segment order.
    pub fn code(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|segment| segment.emitted_code.iter().copied())
            .collect()
    }

    fn file_name(&self, index: usize) -> &str {
        self.source_file_list
            .get(index)
            .map(|item| item.filename.as_str())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        let segments: Vec<Value> = self
            .segments
            .iter()
            .map(|segment| {
                json!({
                    "bank": segment.bank,
                    "bankOffset": segment.bank_offset,
                    "startAddress": format_addr(segment.start_address),
                    "maxCodeLength": segment.max_code_length,
                    "displacement": segment.displacement,
                    "xorg": segment.xorg_value.map(format_addr),
                    "overflow": segment.overflow_detected,
                    "code": hex_string(&segment.emitted_code),
                })
            })
            .collect();
        let errors: Vec<Value> = self
            .errors
            .iter()
            .map(|info| {
                json!({
                    "code": info.code(),
                    "file": info.file_name,
                    "line": info.line,
                    "startColumn": info.start_column,
                    "endColumn": info.end_column,
                    "message": info.message,
                    "warning": info.is_warning,
                    "notes": info.notes,
                })
            })
            .collect();
        let source_files: Vec<Value> = self
            .source_file_list
            .iter()
            .map(|item| {
                json!({
                    "filename": item.filename,
                    "parent": item.parent,
                    "includes": item.includes,
                })
            })
            .collect();
        let source_map: serde_json::Map<String, Value> = self
            .source_map
            .source_map()
            .iter()
            .map(|(address, origin)| {
                (
                    format_addr(*address),
                    json!({ "file": origin.file_index, "line": origin.line }),
                )
            })
            .collect();
        let list_items: Vec<Value> = self
            .list_file_items
            .iter()
            .map(|item| {
                json!({
                    "file": item.file_index,
                    "line": item.line_number,
                    "address": format_addr(item.address),
                    "segment": item.segment_index,
                    "codeStart": item.code_start_index,
                    "codeLength": item.code_length,
                    "source": item.source_text,
                })
            })
            .collect();
        json!({
            "schema": OUTPUT_SCHEMA,
            "successful": self.is_successful(),
            "errorCount": self.error_count,
            "suppressedDiagnostics": self.suppressed_diagnostics,
            "entryAddress": self.entry_address.map(format_addr),
            "exportEntryAddress": self.export_entry_address.map(format_addr),
            "model": self.model_type.map(SpectrumModel::as_str),
            "injectOptions": self.inject_options,
            "sourceFiles": source_files,
            "segments": segments,
            "errors": errors,
            "sourceMap": source_map,
            "listItems": list_items,
            "trace": self.trace_output,
            "modules": module_json(&self.modules, ROOT_MODULE),
        })
    }

    /// Render the list file, with each diagnostic after the line it
    /// refers to.
    pub fn list_file_text(&self) -> String {
        let mut out = Vec::new();
        // Writes into a Vec cannot fail.
        let _ = self.write_list_file(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn write_list_file(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        let mut writer = ListingWriter::new(out);
        let title = self
            .source_file_list
            .first()
            .map(|item| item.filename.as_str())
            .unwrap_or("(no source)");
        writer.header(title)?;

        let mut pending: Vec<&AssemblerErrorInfo> = self.errors.iter().collect();
        for item in &self.list_file_items {
            let bytes = self
                .segments
                .get(item.segment_index)
                .and_then(|segment| {
                    segment
                        .emitted_code
                        .get(item.code_start_index..item.code_start_index + item.code_length)
                })
                .unwrap_or_default();
            writer.write_line(ListingLine {
                addr: item.address,
                bytes,
                line_num: item.line_number,
                source: &item.source_text,
                equ: item.equ_value,
            })?;
            let file = self.file_name(item.file_index);
            let (here, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|info| info.file_name == file && info.line == item.line_number);
            for info in here {
                writer.write_diagnostic(&info.format_with_context(Some(&item.source_text), false))?;
            }
            pending = rest;
        }
        for info in pending {
            writer.write_diagnostic(&info.format())?;
        }

        let symbols: Vec<(String, String)> = self
            .root_module()
            .symbols
            .values()
            .map(|info| {
                let value = match &info.value {
                    ExpressionValue::Integer(number) => format!("${:04X}", *number as u16),
                    other => other.to_string(),
                };
                (info.name.clone(), value)
            })
            .collect();
        let total_bytes = self.segments.iter().map(|segment| segment.emitted_code.len()).sum();
        let warnings = self.errors.iter().filter(|info| info.is_warning).count();
        writer.footer(
            self.list_file_items.len(),
            self.error_count,
            warnings,
            &symbols,
            total_bytes,
        )
    }
}

impl<'a> Assembler<'a> {
    pub(crate) fn into_output(self) -> CompilerOutput {
        let (errors, error_count, suppressed) = self.errors.into_parts();
        CompilerOutput {
            source_file_list: self.source_files,
            segments: self.emitter.into_segments(),
            errors,
            error_count,
            suppressed_diagnostics: suppressed,
            source_map: self.source_map,
            list_file_items: self.list_items,
            trace_output: self.trace_output,
            inject_options: self.inject_options.into_iter().collect(),
            entry_address: self.entry_address,
            export_entry_address: self.export_entry_address,
            model_type: self.model,
            modules: self.scopes.into_modules(),
        }
    }
}
