//! Stack-based virtual machine
//!
//! Executes assembled expression programs on a stack of typed slots.
//! - Unboxed ints, floats and bools live in their own slot kinds
//! - Boxed values (`Slot::Ref`) are runtime values handled by `runtime`
//! - Globals and native functions are bound by name before `run`

mod slot;

pub use slot::Slot;

use crate::bytecode::{Bytecode, Opcode};
use crate::options::VmOptions;
use crate::runtime::{coerce_to_string, RuntimeFn};
use crate::span::Span;
use crate::value::{format_float, RuntimeError, Value, ValueList, ValueMap};
use std::collections::HashMap;
use std::sync::Arc;

/// Host function callable with `CallNative`
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Virtual machine state
pub struct VM {
    /// Operand stack
    stack: Vec<Slot>,
    /// Values visible to `GetGlobal`
    globals: HashMap<String, Value>,
    /// Functions visible to `CallNative`
    natives: HashMap<String, NativeFn>,
    /// Program to execute
    bytecode: Bytecode,
    /// Instruction pointer
    ip: usize,
    /// Offset of the instruction being executed (for error spans)
    start: usize,
    options: VmOptions,
}

impl VM {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_options(bytecode, VmOptions::default())
    }

    pub fn with_options(bytecode: Bytecode, options: VmOptions) -> Self {
        Self {
            stack: Vec::with_capacity(options.max_stack_depth.min(64)),
            globals: HashMap::new(),
            natives: HashMap::new(),
            bytecode,
            ip: 0,
            start: 0,
            options,
        }
    }

    /// Bind a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Register a host function under `name`
    pub fn register_native<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.natives.insert(name.into(), Arc::new(f));
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Source span of the instruction currently executing
    pub fn current_span(&self) -> Option<Span> {
        self.bytecode.span_at(self.start)
    }

    /// Execute the program from the start and return the value left at `Halt`
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        self.stack.clear();
        self.ip = 0;
        self.start = 0;

        loop {
            self.start = self.ip;
            let opcode = self.read_opcode()?;

            match opcode {
                // ===== Constants =====
                Opcode::Null => self.push(Slot::Ref(Value::Null))?,
                Opcode::True => self.push(Slot::Bool(true))?,
                Opcode::False => self.push(Slot::Bool(false))?,
                Opcode::ConstInt => {
                    let index = self.read_u16()? as usize;
                    let n = match self.constant(index)? {
                        Value::Int(n) => *n,
                        other => return Err(self.invalid_constant("int", other)),
                    };
                    self.push(Slot::Int(n))?;
                }
                Opcode::ConstFloat => {
                    let index = self.read_u16()? as usize;
                    let f = match self.constant(index)? {
                        Value::Float(f) => *f,
                        other => return Err(self.invalid_constant("float", other)),
                    };
                    self.push(Slot::Float(f))?;
                }
                Opcode::Constant => {
                    let index = self.read_u16()? as usize;
                    let value = self.constant(index)?.clone();
                    self.push(Slot::Ref(value))?;
                }
                Opcode::EmptyList => self.push(Slot::Ref(Value::List(ValueList::shared_empty())))?,
                Opcode::EmptyMap => self.push(Slot::Ref(Value::Map(ValueMap::shared_empty())))?,

                // ===== Stack =====
                Opcode::Dup => {
                    let top = self.peek()?.clone();
                    self.push(top)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }

                // ===== Integer arithmetic =====
                Opcode::IntAdd => self.int_op(i64::wrapping_add)?,
                Opcode::IntSub => self.int_op(i64::wrapping_sub)?,
                Opcode::IntMul => self.int_op(i64::wrapping_mul)?,
                Opcode::IntRem => {
                    let b = self.pop_int()?;
                    let a = self.pop_int()?;
                    if b == 0 {
                        return Err(RuntimeError::DivideByZero { span: self.span() });
                    }
                    self.push(Slot::Int(a.wrapping_rem(b)))?;
                }
                Opcode::IntNeg => {
                    let a = self.pop_int()?;
                    self.push(Slot::Int(a.wrapping_neg()))?;
                }

                // ===== Float arithmetic =====
                Opcode::FloatAdd => self.float_op(|a, b| a + b)?,
                Opcode::FloatSub => self.float_op(|a, b| a - b)?,
                Opcode::FloatMul => self.float_op(|a, b| a * b)?,
                Opcode::FloatDiv => self.float_op(|a, b| a / b)?,
                Opcode::FloatNeg => {
                    let a = self.pop_float()?;
                    self.push(Slot::Float(-a))?;
                }

                // ===== Comparison =====
                Opcode::IntEq => self.int_cmp(|a, b| a == b)?,
                Opcode::IntLt => self.int_cmp(|a, b| a < b)?,
                Opcode::IntLe => self.int_cmp(|a, b| a <= b)?,
                Opcode::IntGt => self.int_cmp(|a, b| a > b)?,
                Opcode::IntGe => self.int_cmp(|a, b| a >= b)?,
                Opcode::FloatEq => self.float_cmp(|a, b| a == b)?,
                Opcode::FloatLt => self.float_cmp(|a, b| a < b)?,
                Opcode::FloatLe => self.float_cmp(|a, b| a <= b)?,
                Opcode::FloatGt => self.float_cmp(|a, b| a > b)?,
                Opcode::FloatGe => self.float_cmp(|a, b| a >= b)?,
                Opcode::Not => {
                    let b = self.pop_bool()?;
                    self.push(Slot::Bool(!b))?;
                }

                // ===== Conversions =====
                Opcode::IntToFloat => {
                    let n = self.pop_int()?;
                    self.push(Slot::Float(n as f64))?;
                }
                Opcode::IntToBool => {
                    let n = self.pop_int()?;
                    self.push(Slot::Bool(n != 0))?;
                }
                Opcode::FloatToBool => {
                    let f = self.pop_float()?;
                    self.push(Slot::Bool(f != 0.0 && !f.is_nan()))?;
                }
                Opcode::IntToString => {
                    let n = self.pop_int()?;
                    self.push(Slot::Ref(Value::string(n.to_string())))?;
                }
                Opcode::FloatToString => {
                    let f = self.pop_float()?;
                    self.push(Slot::Ref(Value::string(format_float(f))))?;
                }
                Opcode::BoolToString => {
                    let b = self.pop_bool()?;
                    self.push(Slot::Ref(Value::string(if b { "true" } else { "false" })))?;
                }
                Opcode::BoxInt => {
                    let n = self.pop_int()?;
                    self.push(Slot::Ref(Value::Int(n)))?;
                }
                Opcode::BoxFloat => {
                    let f = self.pop_float()?;
                    self.push(Slot::Ref(Value::Float(f)))?;
                }
                Opcode::BoxBool => {
                    let b = self.pop_bool()?;
                    self.push(Slot::Ref(Value::Bool(b)))?;
                }
                Opcode::UnboxInt => match self.pop_ref()? {
                    Value::Int(n) => self.push(Slot::Int(n))?,
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("expected int, found {}", other.type_name()),
                            self.span(),
                        ))
                    }
                },
                Opcode::UnboxFloat => {
                    let value = self.pop_ref()?;
                    match value.as_f64() {
                        Some(f) => self.push(Slot::Float(f))?,
                        None => {
                            return Err(RuntimeError::type_error(
                                format!("expected number, found {}", value.type_name()),
                                self.span(),
                            ))
                        }
                    }
                }

                // ===== Control flow =====
                Opcode::Jump => {
                    let offset = self.read_i16()?;
                    self.jump(offset);
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_i16()?;
                    if !self.pop_bool()? {
                        self.jump(offset);
                    }
                }
                Opcode::JumpIfTrue => {
                    let offset = self.read_i16()?;
                    if self.pop_bool()? {
                        self.jump(offset);
                    }
                }

                // ===== Calls =====
                Opcode::Invoke => {
                    let id = self.read_u8()?;
                    let func = RuntimeFn::try_from(id).map_err(|_| RuntimeError::InvalidOperand {
                        msg: format!("unknown runtime function 0x{:02x}", id),
                        span: self.span(),
                    })?;
                    let args = self.pop_values(func.arity())?;
                    tracing::trace!(function = func.name(), argc = args.len(), "invoke");
                    let result = func.call(&args, self.span())?;
                    let slot = match result {
                        Value::Bool(b) if func.returns_bool() => Slot::Bool(b),
                        other => Slot::Ref(other),
                    };
                    self.push(slot)?;
                }
                Opcode::GetGlobal => {
                    let name = self.read_name()?;
                    let value = self.globals.get(name.as_ref()).cloned().ok_or_else(|| {
                        RuntimeError::UndefinedVariable {
                            name: name.to_string(),
                            span: self.span(),
                        }
                    })?;
                    self.push(Slot::Ref(value))?;
                }
                Opcode::CallNative => {
                    let name = self.read_name()?;
                    let argc = self.read_u8()? as usize;
                    let args = self.pop_values(argc)?;
                    let native = self.natives.get(name.as_ref()).cloned().ok_or_else(|| {
                        RuntimeError::UnknownFunction {
                            name: name.to_string(),
                            span: self.span(),
                        }
                    })?;
                    tracing::trace!(function = %name, argc, "call native");
                    let result = native(&args)?;
                    self.push(Slot::Ref(result))?;
                }

                // ===== Collections =====
                Opcode::NewList => {
                    let capacity = self.read_u32()? as usize;
                    self.push(Slot::Ref(Value::List(ValueList::with_capacity(capacity))))?;
                }
                Opcode::ListAppend => {
                    let value = self.pop_value()?;
                    let span = self.span();
                    match self.peek_mut()? {
                        Slot::Ref(Value::List(list)) => list.push(value),
                        other => {
                            return Err(RuntimeError::type_error(
                                format!("cannot append to {}", other.kind_name()),
                                span,
                            ))
                        }
                    }
                }
                Opcode::NewMap => {
                    let capacity = self.read_u32()? as usize;
                    self.push(Slot::Ref(Value::Map(ValueMap::with_capacity(capacity))))?;
                }
                Opcode::MapPut => {
                    let value = self.pop_value()?;
                    let key = coerce_to_string(&self.pop_value()?);
                    let span = self.span();
                    match self.peek_mut()? {
                        Slot::Ref(Value::Map(map)) => map.insert(key, value),
                        other => {
                            return Err(RuntimeError::type_error(
                                format!("cannot insert into {}", other.kind_name()),
                                span,
                            ))
                        }
                    }
                }

                Opcode::Halt => {
                    if self.stack.len() != 1 {
                        return Err(RuntimeError::StackImbalance {
                            depth: self.stack.len(),
                            span: self.span(),
                        });
                    }
                    return self.pop().map(Slot::into_value);
                }
            }
        }
    }

    // ===== Helper Methods =====

    fn span(&self) -> Span {
        self.current_span().unwrap_or_else(Span::dummy)
    }

    fn push(&mut self, slot: Slot) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.options.max_stack_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.options.max_stack_depth,
                span: self.span(),
            });
        }
        self.stack.push(slot);
        Ok(())
    }

    fn pop(&mut self) -> Result<Slot, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::StackUnderflow { span: self.span() })
    }

    fn peek(&self) -> Result<&Slot, RuntimeError> {
        self.stack
            .last()
            .ok_or_else(|| RuntimeError::StackUnderflow { span: self.span() })
    }

    fn peek_mut(&mut self) -> Result<&mut Slot, RuntimeError> {
        let span = self.span();
        self.stack
            .last_mut()
            .ok_or(RuntimeError::StackUnderflow { span })
    }

    fn slot_error(&self, expected: &str, found: &Slot) -> RuntimeError {
        RuntimeError::InvalidOperand {
            msg: format!("expected {} slot, found {}", expected, found.kind_name()),
            span: self.span(),
        }
    }

    fn pop_int(&mut self) -> Result<i64, RuntimeError> {
        match self.pop()? {
            Slot::Int(n) => Ok(n),
            other => Err(self.slot_error("int", &other)),
        }
    }

    fn pop_float(&mut self) -> Result<f64, RuntimeError> {
        match self.pop()? {
            Slot::Float(f) => Ok(f),
            other => Err(self.slot_error("float", &other)),
        }
    }

    fn pop_bool(&mut self) -> Result<bool, RuntimeError> {
        match self.pop()? {
            Slot::Bool(b) => Ok(b),
            other => Err(self.slot_error("bool", &other)),
        }
    }

    fn pop_ref(&mut self) -> Result<Value, RuntimeError> {
        match self.pop()? {
            Slot::Ref(value) => Ok(value),
            other => Err(self.slot_error("reference", &other)),
        }
    }

    /// Pop any slot as a value, boxing unboxed primitives
    fn pop_value(&mut self) -> Result<Value, RuntimeError> {
        self.pop().map(Slot::into_value)
    }

    /// Pop `count` arguments as values, returned in push order
    fn pop_values(&mut self, count: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.stack.len() < count {
            return Err(RuntimeError::StackUnderflow { span: self.span() });
        }
        let args = self.stack.split_off(self.stack.len() - count);
        Ok(args.into_iter().map(Slot::into_value).collect())
    }

    fn int_op(&mut self, op: fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Slot::Int(op(a, b)))
    }

    fn float_op(&mut self, op: fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Slot::Float(op(a, b)))
    }

    fn int_cmp(&mut self, op: fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Slot::Bool(op(a, b)))
    }

    fn float_cmp(&mut self, op: fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Slot::Bool(op(a, b)))
    }

    fn jump(&mut self, offset: i16) {
        self.ip = (self.ip as isize + offset as isize) as usize;
    }

    fn truncated(&self) -> RuntimeError {
        RuntimeError::InvalidOperand {
            msg: "truncated instruction".to_string(),
            span: self.span(),
        }
    }

    fn read_opcode(&mut self) -> Result<Opcode, RuntimeError> {
        let Some(&byte) = self.bytecode.instructions.get(self.ip) else {
            return Err(RuntimeError::UnknownOpcode { span: self.span() });
        };
        self.ip += 1;
        Opcode::try_from(byte).map_err(|_| RuntimeError::UnknownOpcode { span: self.span() })
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], RuntimeError> {
        let bytes = self
            .bytecode
            .instructions
            .get(self.ip..self.ip + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or_else(|| self.truncated())?;
        self.ip += N;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.read_bytes::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        self.read_bytes().map(u16::from_be_bytes)
    }

    fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        self.read_bytes().map(i16::from_be_bytes)
    }

    fn read_u32(&mut self) -> Result<u32, RuntimeError> {
        self.read_bytes().map(u32::from_be_bytes)
    }

    fn constant(&self, index: usize) -> Result<&Value, RuntimeError> {
        self.bytecode
            .constants
            .get(index)
            .ok_or_else(|| RuntimeError::InvalidOperand {
                msg: format!("constant index {} out of bounds", index),
                span: self.span(),
            })
    }

    fn read_name(&mut self) -> Result<Arc<str>, RuntimeError> {
        let index = self.read_u16()? as usize;
        match self.constant(index)? {
            Value::String(name) => Ok(Arc::clone(name)),
            other => Err(self.invalid_constant("name", other)),
        }
    }

    fn invalid_constant(&self, expected: &str, found: &Value) -> RuntimeError {
        RuntimeError::InvalidOperand {
            msg: format!("expected {} constant, found {}", expected, found.type_name()),
            span: self.span(),
        }
    }
}
