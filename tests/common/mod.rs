use std::cell::RefCell;
use std::collections::BTreeMap;

use zxasm::core::ast::{Operand, SourceLine};
use zxasm::core::encoder::{
    EncodeError, InstructionEncoder, InstructionRequest, OperandValue, ResolvedOperand,
};
use zxasm::core::source::{MemorySourceProvider, SourceError, SourceProvider};

/// A handful of Z80 opcodes, enough for the integration programs.
pub struct TinyZ80;

fn word(opcode: u8, value: OperandValue) -> Vec<u8> {
    let value = value.or_placeholder();
    vec![opcode, value as u8, (value >> 8) as u8]
}

impl InstructionEncoder for TinyZ80 {
    fn encode(&self, request: &InstructionRequest<'_>) -> Result<Vec<u8>, EncodeError> {
        use ResolvedOperand as R;
        let mnemonic = request.mnemonic.to_ascii_lowercase();
        match (mnemonic.as_str(), request.operands) {
            ("nop", []) => Ok(vec![0x00]),
            ("ret", []) => Ok(vec![0xc9]),
            ("inc", [R::Register(r)]) if r == "a" => Ok(vec![0x3c]),
            ("ld", [R::Register(r), R::Immediate(v)]) if r == "a" => {
                Ok(vec![0x3e, v.or_placeholder() as u8])
            }
            ("ld", [R::Register(r), R::Immediate(v)]) if r == "hl" => Ok(word(0x21, *v)),
            ("call", [R::Immediate(v)]) => Ok(word(0xcd, *v)),
            ("jp", [R::Immediate(v)]) => Ok(word(0xc3, *v)),
            ("nop" | "ret" | "inc" | "ld" | "call" | "jp", _) => {
                Err(EncodeError::InvalidOperands(mnemonic))
            }
            _ => Err(EncodeError::UnknownMnemonic(mnemonic)),
        }
    }
}

pub fn instr(mnemonic: &str, operands: Vec<Operand>) -> SourceLine {
    SourceLine::instruction(mnemonic, operands)
}

/// Wraps the in-memory provider and counts how often each file is loaded.
pub struct CountingProvider {
    inner: MemorySourceProvider,
    loads: RefCell<BTreeMap<String, usize>>,
}

impl CountingProvider {
    pub fn new(inner: MemorySourceProvider) -> Self {
        Self {
            inner,
            loads: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn loads(&self, filename: &str) -> usize {
        self.loads.borrow().get(filename).copied().unwrap_or(0)
    }
}

impl SourceProvider for CountingProvider {
    fn load(&self, filename: &str) -> Result<Vec<SourceLine>, SourceError> {
        *self
            .loads
            .borrow_mut()
            .entry(filename.to_string())
            .or_insert(0) += 1;
        self.inner.load(filename)
    }
}
