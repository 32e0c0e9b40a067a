// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! List file items and the listing text writer.

use std::io::Write;

/// One executed statement in the list file.
///
/// Loop and macro bodies produce one item per execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFileItem {
    pub file_index: usize,
    pub address: u16,
    pub segment_index: usize,
    pub code_start_index: usize,
    pub code_length: usize,
    pub line_number: u32,
    pub source_text: String,
    /// Value of the symbol an `.equ` line defined.
    pub equ_value: Option<i64>,
}

/// Data for a single listing line.
pub struct ListingLine<'a> {
    pub addr: u16,
    pub bytes: &'a [u8],
    pub line_num: u32,
    pub source: &'a str,
    /// Value shown instead of bytes for symbol-only lines (`.equ`).
    pub equ: Option<i64>,
}

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "ADDR  BYTES                    LINE  SOURCE")?;
        writeln!(self.out, "----  -----------------------  ----  ------")?;
        Ok(())
    }

    pub fn write_line(&mut self, line: ListingLine<'_>) -> std::io::Result<()> {
        let (loc, bytes_col) = match line.equ {
            Some(value) => (String::new(), format!("EQU {:04X}", value & 0xffff)),
            None if line.bytes.is_empty() => (String::new(), String::new()),
            None => (format!("{:04X}", line.addr), format_bytes(line.bytes)),
        };
        let loc = if loc.is_empty() {
            "----".to_string()
        } else {
            loc
        };
        writeln!(
            self.out,
            "{:<4}  {:<23}  {:>4}  {}",
            loc,
            bytes_col,
            line.line_num,
            line.source.trim_end()
        )
    }

    pub fn write_diagnostic(&mut self, rendered: &str) -> std::io::Result<()> {
        for line in rendered.lines() {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    pub fn footer(
        &mut self,
        lines: usize,
        errors: usize,
        warnings: usize,
        symbols: &[(String, String)],
        total_bytes: usize,
    ) -> std::io::Result<()> {
        writeln!(
            self.out,
            "\nLines: {}  Errors: {}  Warnings: {}",
            lines,
            errors,
            warnings
        )?;
        writeln!(self.out, "\nSYMBOL TABLE\n")?;
        if symbols.is_empty() {
            writeln!(self.out, "(none)")?;
        }
        for (name, value) in symbols {
            writeln!(self.out, "{name:<24} = {value}")?;
        }
        writeln!(self.out, "\nTotal memory is {total_bytes} bytes")
    }
}

/// Format bytes as hex string for listing. Long runs are elided.
pub fn format_bytes(bytes: &[u8]) -> String {
    let shown = bytes.len().min(7);
    let mut text = bytes[..shown]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > shown {
        text.push_str(" ..");
    }
    text
}
