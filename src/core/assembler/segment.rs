// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Binary segments and the byte emitter.

use std::collections::BTreeSet;

use crate::core::assembler::error::ErrorCode;

pub const BANK_BASE_ADDRESS: u16 = 0xc000;
pub const BANK_SIZE: usize = 0x4000;

/// A contiguous region of emitted code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySegment {
    pub bank: Option<u8>,
    pub bank_offset: u16,
    pub max_code_length: usize,
    pub start_address: u16,
    pub displacement: Option<i64>,
    /// Segment offset where `.disp` took effect.
    pub disp_pragma_offset: Option<usize>,
    pub xorg_value: Option<u16>,
    pub emitted_code: Vec<u8>,
    pub overflow_detected: bool,
    pub current_instruction_offset: Option<usize>,
}

impl BinarySegment {
    pub fn new(start_address: u16) -> Self {
        Self {
            start_address,
            max_code_length: 0x10000 - start_address as usize,
            ..Self::default()
        }
    }

    pub fn current_offset(&self) -> usize {
        self.emitted_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted_code.is_empty()
    }
}

/// Owns the segment list and the write cursor.
///
/// While a capture is active (struct definitions), bytes go to a side
/// buffer instead of a segment and `$` is the offset within it.
#[derive(Debug, Clone)]
pub struct SegmentEmitter {
    segments: Vec<BinarySegment>,
    default_start: u16,
    used_banks: BTreeSet<u8>,
    capture: Option<Vec<u8>>,
}

impl SegmentEmitter {
    pub fn new(default_start: u16) -> Self {
        Self {
            segments: Vec::new(),
            default_start,
            used_banks: BTreeSet::new(),
            capture: None,
        }
    }

    pub fn segments(&self) -> &[BinarySegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<BinarySegment> {
        self.segments
    }

    fn ensure_segment(&mut self) -> &mut BinarySegment {
        if self.segments.is_empty() {
            self.segments.push(BinarySegment::new(self.default_start));
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Index of the active segment and the write offset within it.
    pub fn position(&mut self) -> (usize, usize) {
        let offset = self.ensure_segment().current_offset();
        (self.segments.len() - 1, offset)
    }

    /// Like [`Self::position`] without opening a segment.
    pub fn peek_position(&self) -> (usize, usize) {
        match self.segments.last() {
            Some(segment) => (self.segments.len() - 1, segment.current_offset()),
            None => (0, 0),
        }
    }

    /// `.org`: reuse the active segment while it is empty, else open a new one.
    pub fn set_origin(&mut self, address: u16) {
        match self.segments.last_mut() {
            Some(segment) if segment.is_empty() && segment.bank.is_none() => {
                segment.start_address = address;
                segment.max_code_length = 0x10000 - address as usize;
            }
            _ => self.segments.push(BinarySegment::new(address)),
        }
    }

    /// `.bank`: open a segment mapped to a 16K bank slot.
    pub fn start_bank(&mut self, bank: u8, offset: u16) -> Result<(), ErrorCode> {
        if offset as usize >= BANK_SIZE {
            return Err(ErrorCode::InvalidBank);
        }
        if !self.used_banks.insert(bank) {
            return Err(ErrorCode::DuplicateBank);
        }
        let segment = BinarySegment {
            bank: Some(bank),
            bank_offset: offset,
            start_address: BANK_BASE_ADDRESS + offset,
            max_code_length: BANK_SIZE - offset as usize,
            ..BinarySegment::default()
        };
        match self.segments.last_mut() {
            Some(last) if last.is_empty() && last.bank.is_none() => *last = segment,
            _ => self.segments.push(segment),
        }
        Ok(())
    }

    pub fn set_xorg(&mut self, value: u16) {
        self.ensure_segment().xorg_value = Some(value);
    }

    pub fn set_displacement(&mut self, value: i64) {
        let segment = self.ensure_segment();
        segment.disp_pragma_offset = Some(segment.current_offset());
        segment.displacement = Some(value);
    }

    /// Address without `.disp` applied.
    pub fn physical_address(&self) -> u16 {
        if let Some(capture) = &self.capture {
            return capture.len() as u16;
        }
        match self.segments.last() {
            Some(segment) => {
                (segment.start_address as usize + segment.current_offset()) as u16
            }
            None => self.default_start,
        }
    }

    /// `$`: the current address with displacement.
    pub fn current_address(&self) -> u16 {
        let physical = self.physical_address();
        if self.capture.is_some() {
            return physical;
        }
        match self.segments.last().and_then(|segment| segment.displacement) {
            Some(disp) => (physical as i64).wrapping_add(disp) as u16,
            None => physical,
        }
    }

    pub fn mark_instruction_start(&mut self) {
        if self.capture.is_none() {
            let segment = self.ensure_segment();
            segment.current_instruction_offset = Some(segment.current_offset());
        }
    }

    /// Append bytes. Returns `true` when this write first overflowed the
    /// active segment.
    pub fn emit(&mut self, bytes: &[u8]) -> bool {
        if let Some(capture) = &mut self.capture {
            capture.extend_from_slice(bytes);
            return false;
        }
        let segment = self.ensure_segment();
        segment.emitted_code.extend_from_slice(bytes);
        if segment.current_offset() > segment.max_code_length && !segment.overflow_detected {
            segment.overflow_detected = true;
            return true;
        }
        false
    }

    /// Overwrite previously emitted bytes (fix-ups).
    pub fn patch(&mut self, segment_index: usize, offset: usize, bytes: &[u8]) -> bool {
        let Some(segment) = self.segments.get_mut(segment_index) else {
            return false;
        };
        let Some(target) = segment.emitted_code.get_mut(offset..offset + bytes.len()) else {
            return false;
        };
        target.copy_from_slice(bytes);
        true
    }

    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    pub fn end_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(BinarySegment::current_offset).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emission_starts_at_default_address() {
        let mut emitter = SegmentEmitter::new(0x8000);
        assert_eq!(emitter.current_address(), 0x8000);
        emitter.emit(&[1, 2, 3]);
        assert_eq!(emitter.current_address(), 0x8003);
        assert_eq!(emitter.segments().len(), 1);
    }

    #[test]
    fn org_reuses_empty_segment_and_opens_new_one_otherwise() {
        let mut emitter = SegmentEmitter::new(0x8000);
        emitter.set_origin(0x6000);
        emitter.emit(&[0]);
        emitter.set_origin(0x7000);
        emitter.emit(&[0, 0]);
        let segments = emitter.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_address, 0x6000);
        assert_eq!(segments[1].start_address, 0x7000);
        assert_eq!(emitter.current_address(), 0x7002);
    }

    #[test]
    fn overflow_is_flagged_once() {
        let mut emitter = SegmentEmitter::new(0xfffe);
        assert!(!emitter.emit(&[0, 0]));
        assert!(emitter.emit(&[0]));
        assert!(!emitter.emit(&[0]));
        assert!(emitter.segments()[0].overflow_detected);
        assert_eq!(emitter.segments()[0].emitted_code.len(), 4);
    }

    #[test]
    fn displacement_changes_dollar_but_not_emission() {
        let mut emitter = SegmentEmitter::new(0x8000);
        emitter.emit(&[0]);
        emitter.set_displacement(0x1000);
        assert_eq!(emitter.current_address(), 0x9001);
        assert_eq!(emitter.physical_address(), 0x8001);
        assert_eq!(emitter.segments()[0].disp_pragma_offset, Some(1));
    }

    #[test]
    fn banks_are_opened_once_with_bank_geometry() {
        let mut emitter = SegmentEmitter::new(0x8000);
        emitter.start_bank(3, 0x100).unwrap();
        let segment = &emitter.segments()[0];
        assert_eq!(segment.start_address, 0xc100);
        assert_eq!(segment.max_code_length, 0x3f00);
        assert_eq!(emitter.start_bank(3, 0), Err(ErrorCode::DuplicateBank));
        assert_eq!(emitter.start_bank(4, 0x4000), Err(ErrorCode::InvalidBank));
    }

    #[test]
    fn capture_diverts_bytes() {
        let mut emitter = SegmentEmitter::new(0x8000);
        emitter.begin_capture();
        emitter.emit(&[1, 2]);
        assert_eq!(emitter.current_address(), 2);
        assert_eq!(emitter.end_capture(), vec![1, 2]);
        assert!(emitter.segments().is_empty());
    }

    #[test]
    fn patch_overwrites_in_bounds_only() {
        let mut emitter = SegmentEmitter::new(0x8000);
        emitter.emit(&[0, 0, 0]);
        assert!(emitter.patch(0, 1, &[0xaa, 0xbb]));
        assert_eq!(emitter.segments()[0].emitted_code, vec![0, 0xaa, 0xbb]);
        assert!(!emitter.patch(0, 2, &[1, 2]));
        assert!(!emitter.patch(1, 0, &[1]));
    }
}
