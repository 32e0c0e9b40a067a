// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Data-definition pragmas: `.defb`, `.defw`, `.defm`, `.defn`, `.defc`,
//! `.defh`, `.defs`, `.fillb` and `.fillw`.

use super::*;

use crate::core::expr::{value_fits_byte, value_fits_word};

/// A value inside a data block that must be patched by a fix-up.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeferredData {
    pub(crate) offset: usize,
    pub(crate) width: DataWidth,
    pub(crate) expr: Expr,
}

/// Bytes of a data pragma, with placeholders for forward references.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DataBytes {
    pub(crate) bytes: Vec<u8>,
    pub(crate) deferred: Vec<DeferredData>,
}

impl DataBytes {
    fn push_word(&mut self, value: i64) {
        self.bytes.push(value as u8);
        self.bytes.push((value >> 8) as u8);
    }

    fn defer(&mut self, width: DataWidth, expr: &Expr) {
        self.deferred.push(DeferredData {
            offset: self.bytes.len(),
            width,
            expr: expr.clone(),
        });
        self.bytes.extend(std::iter::repeat(0).take(width.size()));
    }
}

/// Decode a `.defh` hex string.
pub(crate) fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|ix| u8::from_str_radix(&text[ix..ix + 2], 16).ok())
        .collect()
}

impl<'a> Assembler<'a> {
    /// Emit a data pragma at the current address.
    pub(crate) fn emit_data(&mut self, line: &SourceLine, pragma: &Pragma) {
        let address = self.emitter.current_address();
        let Some(data) = self.data_bytes(line, pragma) else {
            return;
        };
        let (segment_index, offset) = self.emit_bytes(line, &data.bytes);
        self.register_data_fixups(line, data.deferred, segment_index, offset, address);
    }

    /// Append bytes to the active segment and return where they landed.
    pub(crate) fn emit_bytes(&mut self, line: &SourceLine, bytes: &[u8]) -> (usize, usize) {
        if bytes.is_empty() {
            return self.emitter.peek_position();
        }
        let position = self.emitter.position();
        if self.emitter.emit(bytes) {
            let start = self
                .emitter
                .segments()
                .get(position.0)
                .map(|segment| segment.start_address)
                .unwrap_or_default();
            self.warn(
                line,
                ErrorCode::CodeSegmentOverflow,
                format!("Code segment starting at ${start:04X} overflows its maximum length"),
            );
        }
        position
    }

    pub(crate) fn register_data_fixups(
        &mut self,
        line: &SourceLine,
        deferred: Vec<DeferredData>,
        segment_index: usize,
        base: usize,
        address: u16,
    ) {
        for item in deferred {
            let length = item.width.size();
            let fixup = self.new_fixup(
                line,
                FixupKind::Data {
                    width: item.width,
                    expr: item.expr,
                },
                segment_index,
                base + item.offset,
                length,
                address,
            );
            self.add_fixup(fixup);
        }
    }

    /// Compute the bytes of a data pragma. `None` when nothing should be
    /// emitted because of an error.
    pub(crate) fn data_bytes(&mut self, line: &SourceLine, pragma: &Pragma) -> Option<DataBytes> {
        let mut data = DataBytes::default();
        match pragma {
            Pragma::Defb(exprs) => {
                for expr in exprs {
                    self.push_data_value(line, expr, DataWidth::Byte, &mut data)?;
                }
            }
            Pragma::Defw(exprs) => {
                for expr in exprs {
                    self.push_data_value(line, expr, DataWidth::Word, &mut data)?;
                }
            }
            Pragma::Defm(expr) | Pragma::Defn(expr) | Pragma::Defc(expr) => {
                let text = self.eval_string(line, expr)?;
                data.bytes.extend(text.bytes());
                match pragma {
                    Pragma::Defn(_) => data.bytes.push(0),
                    Pragma::Defc(_) => {
                        if let Some(last) = data.bytes.last_mut() {
                            *last |= 0x80;
                        }
                    }
                    _ => {}
                }
            }
            Pragma::Defh(expr) => {
                let text = self.eval_string(line, expr)?;
                let Some(bytes) = parse_hex_bytes(&text) else {
                    self.report_at(
                        line,
                        ErrorCode::InvalidHexString,
                        format!("'{text}' is not a valid hexadecimal byte string"),
                        expr.span(),
                    );
                    return None;
                };
                data.bytes = bytes;
            }
            Pragma::Defs { count, fill } => {
                let count = self.eval_count(line, count)?;
                let fill = match fill {
                    Some(expr) => self.eval_byte(line, expr)?,
                    None => 0,
                };
                data.bytes = vec![fill; count];
            }
            Pragma::Fillb { count, value } => {
                let count = self.eval_count(line, count)?;
                let value = self.eval_byte(line, value)?;
                data.bytes = vec![value; count];
            }
            Pragma::Fillw { count, value } => {
                let count = self.eval_count(line, count)?;
                let word = self.eval_integer(line, value)?;
                self.check_range(line, word, DataWidth::Word, value.span());
                for _ in 0..count {
                    data.push_word(word);
                }
            }
            _ => return None,
        }
        Some(data)
    }

    fn push_data_value(
        &mut self,
        line: &SourceLine,
        expr: &Expr,
        width: DataWidth,
        data: &mut DataBytes,
    ) -> Option<()> {
        match self.eval(line, expr)? {
            ExpressionValue::NonEvaluated => data.defer(width, expr),
            ExpressionValue::Str(text) if self.options.flexible_def_pragmas => {
                for byte in text.bytes() {
                    match width {
                        DataWidth::Byte => data.bytes.push(byte),
                        DataWidth::Word => data.push_word(byte as i64),
                    }
                }
            }
            ExpressionValue::Str(_) => {
                self.report_at(
                    line,
                    ErrorCode::TypeMismatch,
                    "A string value cannot be used here",
                    expr.span(),
                );
                return None;
            }
            value => {
                let value = value.as_long()?;
                self.check_range(line, value, width, expr.span());
                match width {
                    DataWidth::Byte => data.bytes.push(value as u8),
                    DataWidth::Word => data.push_word(value),
                }
            }
        }
        Some(())
    }

    /// Report a value that does not fit `width`. The masked value is still
    /// emitted.
    pub(crate) fn check_range(&mut self, line: &SourceLine, value: i64, width: DataWidth, span: Span) {
        let fits = match width {
            DataWidth::Byte => value_fits_byte(value),
            DataWidth::Word => value_fits_word(value),
        };
        if !fits {
            let what = match width {
                DataWidth::Byte => "byte",
                DataWidth::Word => "word",
            };
            self.report_at(
                line,
                ErrorCode::ValueOutOfRange,
                format!("Value {value} does not fit in a {what}"),
                span,
            );
        }
    }

    pub(crate) fn eval_byte(&mut self, line: &SourceLine, expr: &Expr) -> Option<u8> {
        let value = self.eval_integer(line, expr)?;
        self.check_range(line, value, DataWidth::Byte, expr.span());
        Some(value as u8)
    }

    /// A repeat count for `.defs` and the fill pragmas.
    fn eval_count(&mut self, line: &SourceLine, expr: &Expr) -> Option<usize> {
        let count = self.eval_integer(line, expr)?;
        if !(0..=0xffff).contains(&count) {
            self.report_at(
                line,
                ErrorCode::ValueOutOfRange,
                format!("Count {count} must be between 0 and 65535"),
                expr.span(),
            );
            return None;
        }
        Some(count as usize)
    }

    pub(crate) fn eval_string(&mut self, line: &SourceLine, expr: &Expr) -> Option<String> {
        match self.eval_immediate(line, expr)? {
            ExpressionValue::Str(text) => Some(text),
            other => {
                self.report_at(
                    line,
                    ErrorCode::TypeMismatch,
                    format!("A string is expected, found {:?}", other.value_type()),
                    expr.span(),
                );
                None
            }
        }
    }
}
