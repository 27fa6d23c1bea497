//! Bytecode instruction set
//!
//! Typed stack machine: integer, float and bool values travel unboxed;
//! strings, collections and dynamically typed values travel as boxed refs.
//! Operands are encoded inline after the opcode byte (big-endian).

use crate::runtime::RuntimeFn;

/// Bytecode opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // ===== Constants (0x01-0x0F) =====
    /// Push null
    Null = 0x01,
    /// Push true
    True = 0x02,
    /// Push false
    False = 0x03,
    /// Push unboxed int from pool [u16 index]
    ConstInt = 0x04,
    /// Push unboxed float from pool [u16 index]
    ConstFloat = 0x05,
    /// Push boxed constant from pool [u16 index]
    Constant = 0x06,
    /// Push the shared empty list
    EmptyList = 0x07,
    /// Push the shared empty map
    EmptyMap = 0x08,

    // ===== Stack manipulation (0x10-0x1F) =====
    /// Duplicate top of stack
    Dup = 0x10,
    /// Pop and discard top of stack
    Pop = 0x11,

    // ===== Integer arithmetic (0x20-0x27) =====
    /// Pop b, pop a, push a + b (wrapping)
    IntAdd = 0x20,
    /// Pop b, pop a, push a - b (wrapping)
    IntSub = 0x21,
    /// Pop b, pop a, push a * b (wrapping)
    IntMul = 0x22,
    /// Pop b, pop a, push a % b
    IntRem = 0x23,
    /// Pop a, push -a (wrapping)
    IntNeg = 0x24,

    // ===== Float arithmetic (0x28-0x2F) =====
    FloatAdd = 0x28,
    FloatSub = 0x29,
    FloatMul = 0x2A,
    FloatDiv = 0x2B,
    FloatNeg = 0x2C,

    // ===== Comparison (0x30-0x3F) =====
    /// Pop b, pop a, push a == b
    IntEq = 0x30,
    IntLt = 0x31,
    IntLe = 0x32,
    IntGt = 0x33,
    IntGe = 0x34,
    FloatEq = 0x38,
    FloatLt = 0x39,
    FloatLe = 0x3A,
    FloatGt = 0x3B,
    FloatGe = 0x3C,
    /// Pop bool a, push !a
    Not = 0x3F,

    // ===== Conversions (0x40-0x4F) =====
    IntToFloat = 0x40,
    IntToBool = 0x41,
    FloatToBool = 0x42,
    IntToString = 0x43,
    FloatToString = 0x44,
    BoolToString = 0x45,
    BoxInt = 0x46,
    BoxFloat = 0x47,
    BoxBool = 0x48,
    /// Pop boxed value, push unboxed int (type error unless the value is an int)
    UnboxInt = 0x49,
    /// Pop boxed number, push unboxed float
    UnboxFloat = 0x4A,

    // ===== Control flow (0x50-0x5F) =====
    /// Unconditional jump [i16 offset]
    Jump = 0x50,
    /// Pop condition, jump if false [i16 offset]
    JumpIfFalse = 0x51,
    /// Pop condition, jump if true [i16 offset]
    JumpIfTrue = 0x52,

    // ===== Calls (0x60-0x6F) =====
    /// Call a runtime library function [u8 RuntimeFn]
    Invoke = 0x60,
    /// Push global by name [u16 name_index]
    GetGlobal = 0x61,
    /// Call a registered native function [u16 name_index] [u8 arg_count]
    CallNative = 0x62,

    // ===== Collections (0x70-0x7F) =====
    /// Push a new list [u32 capacity]
    NewList = 0x70,
    /// Pop value, append to list on top of stack
    ListAppend = 0x71,
    /// Push a new insertion-ordered map [u32 capacity]
    NewMap = 0x72,
    /// Pop value, pop string key, insert into map on top of stack
    MapPut = 0x73,

    // ===== Special (0xF0-0xFF) =====
    /// End of bytecode
    Halt = 0xFF,
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Opcode::Null),
            0x02 => Ok(Opcode::True),
            0x03 => Ok(Opcode::False),
            0x04 => Ok(Opcode::ConstInt),
            0x05 => Ok(Opcode::ConstFloat),
            0x06 => Ok(Opcode::Constant),
            0x07 => Ok(Opcode::EmptyList),
            0x08 => Ok(Opcode::EmptyMap),
            0x10 => Ok(Opcode::Dup),
            0x11 => Ok(Opcode::Pop),
            0x20 => Ok(Opcode::IntAdd),
            0x21 => Ok(Opcode::IntSub),
            0x22 => Ok(Opcode::IntMul),
            0x23 => Ok(Opcode::IntRem),
            0x24 => Ok(Opcode::IntNeg),
            0x28 => Ok(Opcode::FloatAdd),
            0x29 => Ok(Opcode::FloatSub),
            0x2A => Ok(Opcode::FloatMul),
            0x2B => Ok(Opcode::FloatDiv),
            0x2C => Ok(Opcode::FloatNeg),
            0x30 => Ok(Opcode::IntEq),
            0x31 => Ok(Opcode::IntLt),
            0x32 => Ok(Opcode::IntLe),
            0x33 => Ok(Opcode::IntGt),
            0x34 => Ok(Opcode::IntGe),
            0x38 => Ok(Opcode::FloatEq),
            0x39 => Ok(Opcode::FloatLt),
            0x3A => Ok(Opcode::FloatLe),
            0x3B => Ok(Opcode::FloatGt),
            0x3C => Ok(Opcode::FloatGe),
            0x3F => Ok(Opcode::Not),
            0x40 => Ok(Opcode::IntToFloat),
            0x41 => Ok(Opcode::IntToBool),
            0x42 => Ok(Opcode::FloatToBool),
            0x43 => Ok(Opcode::IntToString),
            0x44 => Ok(Opcode::FloatToString),
            0x45 => Ok(Opcode::BoolToString),
            0x46 => Ok(Opcode::BoxInt),
            0x47 => Ok(Opcode::BoxFloat),
            0x48 => Ok(Opcode::BoxBool),
            0x49 => Ok(Opcode::UnboxInt),
            0x4A => Ok(Opcode::UnboxFloat),
            0x50 => Ok(Opcode::Jump),
            0x51 => Ok(Opcode::JumpIfFalse),
            0x52 => Ok(Opcode::JumpIfTrue),
            0x60 => Ok(Opcode::Invoke),
            0x61 => Ok(Opcode::GetGlobal),
            0x62 => Ok(Opcode::CallNative),
            0x70 => Ok(Opcode::NewList),
            0x71 => Ok(Opcode::ListAppend),
            0x72 => Ok(Opcode::NewMap),
            0x73 => Ok(Opcode::MapPut),
            0xFF => Ok(Opcode::Halt),
            _ => Err(()),
        }
    }
}

/// Values an instruction pops and pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    const fn new(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes }
    }

    /// Net change in stack depth
    pub fn delta(self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

impl Opcode {
    /// Number of inline operand bytes following the opcode
    pub fn operand_size(self) -> usize {
        match self {
            Opcode::Invoke => 1,
            Opcode::ConstInt
            | Opcode::ConstFloat
            | Opcode::Constant
            | Opcode::GetGlobal
            | Opcode::Jump
            | Opcode::JumpIfFalse
            | Opcode::JumpIfTrue => 2,
            Opcode::CallNative => 3,
            Opcode::NewList | Opcode::NewMap => 4,
            _ => 0,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue)
    }

    /// Stack effect given the instruction's operand bytes
    ///
    /// Returns `None` when the effect depends on an operand that does not
    /// decode (an unknown runtime function id).
    pub fn stack_effect(self, operands: &[u8]) -> Option<StackEffect> {
        let effect = match self {
            // Pushes
            Opcode::Null
            | Opcode::True
            | Opcode::False
            | Opcode::ConstInt
            | Opcode::ConstFloat
            | Opcode::Constant
            | Opcode::EmptyList
            | Opcode::EmptyMap
            | Opcode::GetGlobal
            | Opcode::NewList
            | Opcode::NewMap => StackEffect::new(0, 1),

            Opcode::Dup => StackEffect::new(1, 2),

            // Pop 1, push 1
            Opcode::IntNeg
            | Opcode::FloatNeg
            | Opcode::Not
            | Opcode::IntToFloat
            | Opcode::IntToBool
            | Opcode::FloatToBool
            | Opcode::IntToString
            | Opcode::FloatToString
            | Opcode::BoolToString
            | Opcode::BoxInt
            | Opcode::BoxFloat
            | Opcode::BoxBool
            | Opcode::UnboxInt
            | Opcode::UnboxFloat => StackEffect::new(1, 1),

            // Pop 2, push 1
            Opcode::IntAdd
            | Opcode::IntSub
            | Opcode::IntMul
            | Opcode::IntRem
            | Opcode::FloatAdd
            | Opcode::FloatSub
            | Opcode::FloatMul
            | Opcode::FloatDiv
            | Opcode::IntEq
            | Opcode::IntLt
            | Opcode::IntLe
            | Opcode::IntGt
            | Opcode::IntGe
            | Opcode::FloatEq
            | Opcode::FloatLt
            | Opcode::FloatLe
            | Opcode::FloatGt
            | Opcode::FloatGe => StackEffect::new(2, 1),

            // Collection stays on the stack
            Opcode::ListAppend => StackEffect::new(2, 1),
            Opcode::MapPut => StackEffect::new(3, 1),

            Opcode::Pop | Opcode::JumpIfFalse | Opcode::JumpIfTrue => StackEffect::new(1, 0),
            Opcode::Jump | Opcode::Halt => StackEffect::new(0, 0),

            Opcode::Invoke => {
                let func = RuntimeFn::try_from(*operands.first()?).ok()?;
                StackEffect::new(func.arity(), 1)
            }
            Opcode::CallNative => StackEffect::new(*operands.get(2)? as usize, 1),
        };
        Some(effect)
    }
}
