//! Bytecode container and instruction emission backend
//!
//! `Assembler` is the emission surface the compiled expressions are built
//! against; it produces a `Bytecode` that the validator, disassembler and VM
//! consume.

mod assembler;
mod disasm;
mod opcode;
mod validator;

pub use assembler::{AssembleError, Assembler, Label};
pub use disasm::{disassemble, opcodes};
pub use opcode::{Opcode, StackEffect};
pub use validator::{validate, ValidationError, ValidationErrorKind};

use crate::span::Span;
use crate::value::Value;

/// Source position of one emitted instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSpan {
    /// Offset of the opcode byte
    pub instruction_offset: usize,
    pub span: Span,
}

/// A finished expression program
///
/// Each instruction is one opcode byte followed by its big-endian operands
/// (none, u8, u16, i16 or u32 depending on the opcode).
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    /// Pool addressed by u16 operands
    pub constants: Vec<Value>,
    /// Sorted by offset; empty when compiled without debug info
    pub debug_info: Vec<DebugSpan>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode without debug information
    pub fn emit(&mut self, opcode: Opcode) {
        self.instructions.push(opcode as u8);
    }

    /// Emit an opcode and record its source span
    pub fn emit_with_span(&mut self, opcode: Opcode, span: Span) {
        self.debug_info.push(DebugSpan {
            instruction_offset: self.instructions.len(),
            span,
        });
        self.instructions.push(opcode as u8);
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.instructions.push(byte);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.instructions.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_i16(&mut self, value: i16) {
        self.emit_u16(value as u16);
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.instructions.extend_from_slice(&value.to_be_bytes());
    }

    /// Append to the constant pool, returning the operand that names it
    pub fn add_constant(&mut self, value: Value) -> u16 {
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    /// Offset the next emitted byte will land at
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }

    /// Overwrite a previously emitted i16 operand
    pub fn patch_i16(&mut self, operand_offset: usize, value: i16) {
        let [hi, lo] = value.to_be_bytes();
        self.instructions[operand_offset] = hi;
        self.instructions[operand_offset + 1] = lo;
    }

    /// Source span of the instruction at `offset`, if debug info was recorded
    pub fn span_at(&self, offset: usize) -> Option<Span> {
        self.debug_info
            .iter()
            .rev()
            .find(|d| d.instruction_offset <= offset)
            .map(|d| d.span)
    }
}
