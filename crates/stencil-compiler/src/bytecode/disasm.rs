//! Bytecode disassembler
//!
//! Converts bytecode back to human-readable assembly-like format.
//! Used for debugging and for asserting on emitted code in tests.

use super::{Bytecode, Opcode};
use crate::runtime::RuntimeFn;
use crate::value::Value;
use std::fmt::Write;

/// Disassemble bytecode to human-readable format
///
/// # Format
/// ```text
/// === Constants ===
/// 0: 7
/// 1: "hello"
///
/// === Instructions ===
/// 0000  ConstInt 0
/// 0003  IntToFloat
/// 0004  Halt
/// ```
pub fn disassemble(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    // Writing to a String cannot fail.
    if !bytecode.constants.is_empty() {
        let _ = writeln!(output, "=== Constants ===");
        for (idx, constant) in bytecode.constants.iter().enumerate() {
            let _ = writeln!(output, "{}: {}", idx, format_value(constant));
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "=== Instructions ===");
    let mut offset = 0;
    while offset < bytecode.instructions.len() {
        let line = disassemble_instruction(bytecode, &mut offset);
        let _ = writeln!(output, "{}", line);
    }

    output
}

/// Opcode mnemonics in emission order, without offsets or operands
///
/// Handy for asserting on the shape of generated code.
pub fn opcodes(bytecode: &Bytecode) -> Vec<Opcode> {
    let mut result = Vec::new();
    let mut offset = 0;
    while let Some(&byte) = bytecode.instructions.get(offset) {
        let Ok(opcode) = Opcode::try_from(byte) else {
            break;
        };
        result.push(opcode);
        offset += 1 + opcode.operand_size();
    }
    result
}

/// Disassemble a single instruction at the given offset
///
/// Advances offset past the instruction and its operands.
fn disassemble_instruction(bytecode: &Bytecode, offset: &mut usize) -> String {
    let start_offset = *offset;
    let byte = bytecode.instructions[*offset];
    *offset += 1;

    let opcode = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => return format!("{:04}  <invalid opcode: {:#04x}>", start_offset, byte),
    };

    match opcode {
        Opcode::ConstInt | Opcode::ConstFloat | Opcode::Constant | Opcode::GetGlobal => {
            let index = read_u16(bytecode, offset);
            let shown = bytecode
                .constants
                .get(index as usize)
                .map(format_value)
                .unwrap_or_else(|| "?".to_string());
            format!("{:04}  {:?} {} ({})", start_offset, opcode, index, shown)
        }

        Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
            let jump_offset = read_u16(bytecode, offset) as i16;
            let target = *offset as isize + jump_offset as isize;
            format!(
                "{:04}  {:?} {} (-> {:04})",
                start_offset, opcode, jump_offset, target
            )
        }

        Opcode::Invoke => {
            let id = read_u8(bytecode, offset);
            match RuntimeFn::try_from(id) {
                Ok(func) => format!("{:04}  Invoke {}", start_offset, func.name()),
                Err(_) => format!("{:04}  Invoke <unknown {:#04x}>", start_offset, id),
            }
        }

        Opcode::CallNative => {
            let index = read_u16(bytecode, offset);
            let argc = read_u8(bytecode, offset);
            let name = match bytecode.constants.get(index as usize) {
                Some(Value::String(s)) => s.to_string(),
                _ => "?".to_string(),
            };
            format!("{:04}  CallNative {}/{}", start_offset, name, argc)
        }

        Opcode::NewList | Opcode::NewMap => {
            let capacity = read_u32(bytecode, offset);
            format!("{:04}  {:?} {}", start_offset, opcode, capacity)
        }

        _ => format!("{:04}  {:?}", start_offset, opcode),
    }
}

fn read_u8(bytecode: &Bytecode, offset: &mut usize) -> u8 {
    let value = bytecode.instructions.get(*offset).copied().unwrap_or(0);
    *offset += 1;
    value
}

fn read_u16(bytecode: &Bytecode, offset: &mut usize) -> u16 {
    let hi = read_u8(bytecode, offset) as u16;
    let lo = read_u8(bytecode, offset) as u16;
    (hi << 8) | lo
}

fn read_u32(bytecode: &Bytecode, offset: &mut usize) -> u32 {
    let hi = read_u16(bytecode, offset) as u32;
    let lo = read_u16(bytecode, offset) as u32;
    (hi << 16) | lo
}

/// Format a constant value for display
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Float(f) => format!("{:?}", f),
        other => other.to_string(),
    }
}
