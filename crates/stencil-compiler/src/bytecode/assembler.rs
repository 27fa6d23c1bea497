//! Instruction emission backend
//!
//! Wraps a `Bytecode` buffer with labels, forward-jump patching and stack
//! depth bookkeeping. Emission never fails eagerly: problems are collected
//! and reported together by `finish()`.

use super::{Bytecode, Opcode};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::value::Value;
use thiserror::Error;

/// Jump target handle returned by `Assembler::new_label`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Defect detected while assembling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("stack underflow: {opcode:?} at offset {offset} needs {needed} value(s), depth is {depth}")]
    StackUnderflow {
        opcode: Opcode,
        offset: usize,
        needed: usize,
        depth: usize,
    },
    #[error("stack depth mismatch at label {label}: expected {expected}, found {found}")]
    StackMismatch {
        label: usize,
        expected: usize,
        found: usize,
    },
    #[error("label {label} is jumped to but never marked")]
    UnmarkedLabel { label: usize },
    #[error("label {label} marked twice")]
    LabelMarkedTwice { label: usize },
    #[error("jump at offset {offset} spans {distance} bytes, beyond i16 range")]
    JumpTooFar { offset: usize, distance: isize },
    #[error("constant pool overflow (limit {limit})")]
    ConstantPoolOverflow { limit: usize },
    #[error("{opcode:?} needs inline operands; use its dedicated emitter")]
    OperandRequired { opcode: Opcode },
    #[error("native call with {count} arguments exceeds the limit of 255")]
    TooManyArguments { count: usize },
    #[error("unknown runtime function {0:#04x}")]
    UnknownRuntimeFn(u8),
}

#[derive(Debug, Clone, Default)]
struct LabelState {
    offset: Option<usize>,
    depth: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Offset of the i16 operand to patch
    operand: usize,
    label: Label,
}

/// Instruction emission backend
#[derive(Debug)]
pub struct Assembler {
    bytecode: Bytecode,
    depth: usize,
    max_depth: usize,
    /// False after an unconditional jump until the next label is marked
    reachable: bool,
    labels: Vec<LabelState>,
    fixups: Vec<Fixup>,
    errors: Vec<AssembleError>,
    span: Span,
    debug_info: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            bytecode: Bytecode::new(),
            depth: 0,
            max_depth: 0,
            reachable: true,
            labels: Vec::new(),
            fixups: Vec::new(),
            errors: Vec::new(),
            span: Span::dummy(),
            debug_info: true,
        }
    }

    /// Enable or disable recording of instruction spans
    pub fn set_debug_info(&mut self, enabled: bool) {
        self.debug_info = enabled;
    }

    /// Set the span attached to subsequent instructions, returning the previous one
    pub fn set_span(&mut self, span: Span) -> Span {
        std::mem::replace(&mut self.span, span)
    }

    /// Current simulated stack depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Deepest stack seen so far
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn current_offset(&self) -> usize {
        self.bytecode.current_offset()
    }

    // ------------------------------------------------------------------
    // Raw emission
    // ------------------------------------------------------------------

    fn instruction(&mut self, opcode: Opcode, operands: &[u8]) {
        let offset = self.bytecode.current_offset();
        if self.debug_info {
            self.bytecode.emit_with_span(opcode, self.span);
        } else {
            self.bytecode.emit(opcode);
        }
        for &byte in operands {
            self.bytecode.emit_u8(byte);
        }

        let Some(effect) = opcode.stack_effect(operands) else {
            if let Some(&id) = operands.first() {
                self.errors.push(AssembleError::UnknownRuntimeFn(id));
            }
            return;
        };

        if self.depth < effect.pops {
            self.errors.push(AssembleError::StackUnderflow {
                opcode,
                offset,
                needed: effect.pops,
                depth: self.depth,
            });
            self.depth = 0;
        } else {
            self.depth -= effect.pops;
        }
        self.depth += effect.pushes;
        self.max_depth = self.max_depth.max(self.depth);
    }

    /// Emit an instruction without inline operands
    pub fn emit(&mut self, opcode: Opcode) {
        if opcode.operand_size() != 0 {
            self.errors.push(AssembleError::OperandRequired { opcode });
            return;
        }
        self.instruction(opcode, &[]);
    }

    fn constant_index(&mut self, value: Value) -> u16 {
        let limit = u16::MAX as usize + 1;
        if self.bytecode.constants.len() >= limit {
            self.errors.push(AssembleError::ConstantPoolOverflow { limit });
            return 0;
        }
        self.bytecode.add_constant(value)
    }

    fn constant_instruction(&mut self, opcode: Opcode, value: Value) {
        let index = self.constant_index(value);
        self.instruction(opcode, &index.to_be_bytes());
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    pub fn push_null(&mut self) {
        self.emit(Opcode::Null);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.emit(if value { Opcode::True } else { Opcode::False });
    }

    pub fn push_int(&mut self, value: i64) {
        self.constant_instruction(Opcode::ConstInt, Value::Int(value));
    }

    pub fn push_float(&mut self, value: f64) {
        self.constant_instruction(Opcode::ConstFloat, Value::Float(value));
    }

    /// Push a boxed constant (strings and other pooled values)
    pub fn push_constant(&mut self, value: Value) {
        self.constant_instruction(Opcode::Constant, value);
    }

    // ------------------------------------------------------------------
    // Calls and collections
    // ------------------------------------------------------------------

    /// Call a runtime library function on the top `func.arity()` values
    pub fn invoke(&mut self, func: RuntimeFn) {
        self.instruction(Opcode::Invoke, &[func as u8]);
    }

    pub fn get_global(&mut self, name: &str) {
        self.constant_instruction(Opcode::GetGlobal, Value::string(name));
    }

    pub fn call_native(&mut self, name: &str, argc: usize) {
        let Ok(count) = u8::try_from(argc) else {
            self.errors
                .push(AssembleError::TooManyArguments { count: argc });
            return;
        };
        let [hi, lo] = self.constant_index(Value::string(name)).to_be_bytes();
        self.instruction(Opcode::CallNative, &[hi, lo, count]);
    }

    pub fn new_list(&mut self, capacity: u32) {
        self.instruction(Opcode::NewList, &capacity.to_be_bytes());
    }

    pub fn new_map(&mut self, capacity: u32) {
        self.instruction(Opcode::NewMap, &capacity.to_be_bytes());
    }

    // ------------------------------------------------------------------
    // Labels and jumps
    // ------------------------------------------------------------------

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() - 1)
    }

    /// Record the stack depth a path brings to `label`
    fn merge_depth(&mut self, label: Label, depth: usize) {
        let recorded = self.labels[label.0].depth;
        match recorded {
            None => self.labels[label.0].depth = Some(depth),
            Some(expected) if expected != depth => {
                self.errors.push(AssembleError::StackMismatch {
                    label: label.0,
                    expected,
                    found: depth,
                });
            }
            Some(_) => {}
        }
    }

    /// Place `label` at the current offset
    pub fn mark(&mut self, label: Label) {
        if self.labels[label.0].offset.is_some() {
            self.errors
                .push(AssembleError::LabelMarkedTwice { label: label.0 });
            return;
        }
        self.labels[label.0].offset = Some(self.bytecode.current_offset());

        if self.reachable {
            self.merge_depth(label, self.depth);
        } else if let Some(depth) = self.labels[label.0].depth {
            self.depth = depth;
        }
        self.reachable = true;
    }

    fn jump_instruction(&mut self, opcode: Opcode, label: Label) {
        let operand = self.bytecode.current_offset() + 1;
        self.instruction(opcode, &[0, 0]);
        self.fixups.push(Fixup { operand, label });
        self.merge_depth(label, self.depth);
    }

    pub fn jump(&mut self, label: Label) {
        self.jump_instruction(Opcode::Jump, label);
        self.reachable = false;
    }

    /// Pop a bool; jump when it is false
    pub fn jump_if_false(&mut self, label: Label) {
        self.jump_instruction(Opcode::JumpIfFalse, label);
    }

    /// Pop a bool; jump when it is true
    pub fn jump_if_true(&mut self, label: Label) {
        self.jump_instruction(Opcode::JumpIfTrue, label);
    }

    // ------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------

    /// Append `Halt`, patch jumps and return the bytecode or every error collected
    pub fn finish(mut self) -> Result<Bytecode, Vec<AssembleError>> {
        self.emit(Opcode::Halt);

        for fixup in std::mem::take(&mut self.fixups) {
            let Some(target) = self.labels[fixup.label.0].offset else {
                let error = AssembleError::UnmarkedLabel {
                    label: fixup.label.0,
                };
                if !self.errors.contains(&error) {
                    self.errors.push(error);
                }
                continue;
            };
            let distance = target as isize - (fixup.operand + 2) as isize;
            match i16::try_from(distance) {
                Ok(offset) => self.bytecode.patch_i16(fixup.operand, offset),
                Err(_) => self.errors.push(AssembleError::JumpTooFar {
                    offset: fixup.operand - 1,
                    distance,
                }),
            }
        }

        if self.errors.is_empty() {
            Ok(self.bytecode)
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_depth() {
        let mut asm = Assembler::new();
        asm.push_int(1);
        asm.push_int(2);
        assert_eq!(asm.depth(), 2);
        asm.emit(Opcode::IntAdd);
        assert_eq!(asm.depth(), 1);
        assert_eq!(asm.max_depth(), 2);
        asm.invoke(RuntimeFn::CoerceToString);
        assert_eq!(asm.depth(), 1);
    }

    #[test]
    fn test_forward_jump_is_patched() {
        let mut asm = Assembler::new();
        let end = asm.new_label();
        asm.push_bool(true);
        asm.jump_if_false(end);
        asm.push_null();
        asm.emit(Opcode::Pop);
        asm.mark(end);
        let bytecode = asm.finish().unwrap();

        // True, JumpIfFalse +2, Null, Pop, Halt
        assert_eq!(
            bytecode.instructions,
            vec![0x02, 0x51, 0x00, 0x02, 0x01, 0x11, 0xFF]
        );
    }

    #[test]
    fn test_branches_merge_at_same_depth() {
        let mut asm = Assembler::new();
        let else_label = asm.new_label();
        let end = asm.new_label();
        asm.push_bool(false);
        asm.jump_if_false(else_label);
        asm.push_int(1);
        asm.jump(end);
        asm.mark(else_label);
        assert_eq!(asm.depth(), 0);
        asm.push_int(2);
        asm.mark(end);
        assert_eq!(asm.depth(), 1);
        assert!(asm.finish().is_ok());
    }

    #[test]
    fn test_stack_mismatch_reported() {
        let mut asm = Assembler::new();
        let end = asm.new_label();
        asm.push_bool(true);
        asm.jump_if_true(end);
        asm.push_int(1);
        asm.mark(end);

        let errors = asm.finish().unwrap_err();
        assert_eq!(
            errors,
            vec![AssembleError::StackMismatch {
                label: 0,
                expected: 0,
                found: 1
            }]
        );
    }

    #[test]
    fn test_unmarked_label_reported() {
        let mut asm = Assembler::new();
        let nowhere = asm.new_label();
        asm.jump(nowhere);
        let errors = asm.finish().unwrap_err();
        assert_eq!(errors, vec![AssembleError::UnmarkedLabel { label: 0 }]);
    }

    #[test]
    fn test_underflow_reported() {
        let mut asm = Assembler::new();
        asm.emit(Opcode::Pop);
        let errors = asm.finish().unwrap_err();
        assert!(matches!(
            errors[0],
            AssembleError::StackUnderflow {
                opcode: Opcode::Pop,
                ..
            }
        ));
    }

    #[test]
    fn test_emit_rejects_operand_opcodes() {
        let mut asm = Assembler::new();
        asm.emit(Opcode::Jump);
        let errors = asm.finish().unwrap_err();
        assert_eq!(
            errors,
            vec![AssembleError::OperandRequired {
                opcode: Opcode::Jump
            }]
        );
    }

    #[test]
    fn test_debug_info_toggle() {
        let mut asm = Assembler::new();
        asm.set_debug_info(false);
        asm.push_null();
        let bytecode = asm.finish().unwrap();
        assert!(bytecode.debug_info.is_empty());

        let mut asm = Assembler::new();
        asm.set_span(Span::new(1, 4));
        asm.push_null();
        let bytecode = asm.finish().unwrap();
        assert_eq!(bytecode.span_at(0), Some(Span::new(1, 4)));
    }
}
