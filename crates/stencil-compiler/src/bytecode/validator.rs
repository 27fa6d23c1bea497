//! Static bytecode checks run before VM execution
//!
//! Performs five checks:
//! 1. **Decode pass**: every byte is a known opcode with enough operand bytes
//! 2. **Jump targets**: all jump destinations are within bounds and land
//!    on a valid opcode boundary
//! 3. **Operand refs**: constant indices are within the pool and hold the
//!    kind of value the opcode expects; runtime function ids are known
//! 4. **Stack depth**: every path through the control-flow graph agrees on
//!    the depth at each instruction, never underflows, and halts with exactly
//!    one value
//! 5. **Terminator**: the last instruction is `Halt`
//!
//! Slot kinds are not tracked. `Invoke`, `CallNative`, `ListAppend` and
//! `MapPut` box whatever slot they pop, so unboxed arguments are valid.

use super::{Bytecode, Opcode};
use crate::runtime::RuntimeFn;
use crate::value::Value;
use std::collections::HashMap;

// ============================================================================
// Public API
// ============================================================================

/// A validation error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Byte offset in the instruction stream where the error was detected.
    pub offset: usize,
    /// What went wrong.
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset {:#06x}: {}", self.offset, self.kind)
    }
}

/// Kinds of errors the validator can detect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A byte that is not a recognised opcode.
    UnknownOpcode(u8),
    /// An opcode was found but the instruction stream ended before its operands.
    TruncatedInstruction { opcode: Opcode },
    /// A jump target falls outside `[0, instructions.len())`.
    JumpOutOfBounds { target: isize, len: usize },
    /// A jump target does not land on a known opcode boundary.
    JumpMisaligned { target: usize },
    /// A constant-pool index exceeds the pool size.
    ConstantIndexOutOfBounds { index: usize, pool_size: usize },
    /// A pooled constant has the wrong kind for the instruction using it.
    ConstantKindMismatch { index: usize, expected: &'static str },
    /// `Invoke` names a runtime function that does not exist.
    UnknownRuntimeFn(u8),
    /// Stack depth went negative: a pop with nothing on the stack.
    StackUnderflow { opcode: Opcode, depth_before: usize },
    /// Two paths reach the same instruction with different depths.
    InconsistentDepth { first: usize, second: usize },
    /// `Halt` reached with other than exactly one value on the stack.
    HaltDepth { depth: usize },
    /// The last instruction is not `Halt`.
    MissingTerminator,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode(b) => write!(f, "unknown opcode {:#04x}", b),
            Self::TruncatedInstruction { opcode } => {
                write!(
                    f,
                    "instruction {:?} is truncated (missing operand bytes)",
                    opcode
                )
            }
            Self::JumpOutOfBounds { target, len } => {
                write!(f, "jump target {} is out of bounds (len={})", target, len)
            }
            Self::JumpMisaligned { target } => {
                write!(
                    f,
                    "jump target {} does not align to an opcode boundary",
                    target
                )
            }
            Self::ConstantIndexOutOfBounds { index, pool_size } => {
                write!(
                    f,
                    "constant index {} out of bounds (pool size={})",
                    index, pool_size
                )
            }
            Self::ConstantKindMismatch { index, expected } => {
                write!(f, "constant {} is not {}", index, expected)
            }
            Self::UnknownRuntimeFn(id) => write!(f, "unknown runtime function {:#04x}", id),
            Self::StackUnderflow {
                opcode,
                depth_before,
            } => {
                write!(
                    f,
                    "stack underflow in {:?}: depth before = {}",
                    opcode, depth_before
                )
            }
            Self::InconsistentDepth { first, second } => {
                write!(
                    f,
                    "paths disagree on stack depth ({} vs {})",
                    first, second
                )
            }
            Self::HaltDepth { depth } => {
                write!(f, "halt with {} values on the stack, expected 1", depth)
            }
            Self::MissingTerminator => write!(f, "bytecode does not end with Halt"),
        }
    }
}

/// Validate `bytecode`, collecting all errors found.
///
/// Returns `Ok(())` if no issues are found, otherwise `Err(errors)` with every
/// detected problem. Does NOT short-circuit on the first error.
pub fn validate(bytecode: &Bytecode) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = Vec::new();

    // Pass 1: decode
    let decoded = decode_instructions(bytecode, &mut errors);

    // Map of opcode-start offset -> decoded index, for jump targets.
    let index_of: HashMap<usize, usize> = decoded
        .iter()
        .enumerate()
        .map(|(i, instr)| (instr.offset, i))
        .collect();

    // Pass 2: jump targets
    let targets = check_jump_targets(bytecode, &decoded, &index_of, &mut errors);

    // Pass 3: operand references
    check_operand_refs(bytecode, &decoded, &mut errors);

    // Pass 4: stack depth over the control-flow graph. Only meaningful once
    // the stream decodes cleanly and every jump resolves.
    if errors.is_empty() {
        check_stack_depth(&decoded, &targets, &mut errors);
    }

    // Pass 5: termination
    check_terminator(&decoded, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Internal decoded instruction
// ============================================================================

#[derive(Debug, Clone)]
struct DecodedInstruction {
    /// Byte offset of the opcode itself.
    offset: usize,
    opcode: Opcode,
    /// Raw operand bytes.
    operands: Vec<u8>,
}

impl DecodedInstruction {
    fn operand_u16(&self) -> usize {
        u16::from_be_bytes([self.operands[0], self.operands[1]]) as usize
    }

    fn operand_i16(&self) -> isize {
        i16::from_be_bytes([self.operands[0], self.operands[1]]) as isize
    }

    /// Offset of the next instruction
    fn end(&self) -> usize {
        self.offset + 1 + self.operands.len()
    }
}

// ============================================================================
// Pass 1: decode
// ============================================================================

fn decode_instructions(
    bytecode: &Bytecode,
    errors: &mut Vec<ValidationError>,
) -> Vec<DecodedInstruction> {
    let code = &bytecode.instructions;
    let mut decoded = Vec::new();
    let mut ip = 0usize;

    while ip < code.len() {
        let offset = ip;
        let byte = code[ip];
        ip += 1;

        let Ok(opcode) = Opcode::try_from(byte) else {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::UnknownOpcode(byte),
            });
            // Skip 1 byte and continue best-effort decoding
            continue;
        };

        let size = opcode.operand_size();
        if ip + size > code.len() {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::TruncatedInstruction { opcode },
            });
            break; // Can't continue; don't know where next op starts
        }

        decoded.push(DecodedInstruction {
            offset,
            opcode,
            operands: code[ip..ip + size].to_vec(),
        });
        ip += size;
    }

    decoded
}

// ============================================================================
// Pass 2: jump targets
// ============================================================================

/// Returns decoded index -> target decoded index for every valid jump
fn check_jump_targets(
    bytecode: &Bytecode,
    decoded: &[DecodedInstruction],
    index_of: &HashMap<usize, usize>,
    errors: &mut Vec<ValidationError>,
) -> HashMap<usize, usize> {
    let len = bytecode.instructions.len();
    let mut targets = HashMap::new();

    for (i, instr) in decoded.iter().enumerate() {
        if !instr.opcode.is_jump() {
            continue;
        }

        // Relative to the byte after the operand.
        let target = instr.end() as isize + instr.operand_i16();
        if target < 0 || target as usize >= len {
            errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::JumpOutOfBounds { target, len },
            });
            continue;
        }

        match index_of.get(&(target as usize)) {
            Some(&target_index) => {
                targets.insert(i, target_index);
            }
            None => errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::JumpMisaligned {
                    target: target as usize,
                },
            }),
        }
    }

    targets
}

// ============================================================================
// Pass 3: operand references
// ============================================================================

fn check_operand_refs(
    bytecode: &Bytecode,
    decoded: &[DecodedInstruction],
    errors: &mut Vec<ValidationError>,
) {
    let pool = &bytecode.constants;

    for instr in decoded {
        let expected = match instr.opcode {
            Opcode::ConstInt => "an int",
            Opcode::ConstFloat => "a float",
            Opcode::Constant => "a value",
            Opcode::GetGlobal | Opcode::CallNative => "a name",
            Opcode::Invoke => {
                let id = instr.operands[0];
                if RuntimeFn::try_from(id).is_err() {
                    errors.push(ValidationError {
                        offset: instr.offset,
                        kind: ValidationErrorKind::UnknownRuntimeFn(id),
                    });
                }
                continue;
            }
            _ => continue,
        };

        let index = instr.operand_u16();
        match pool.get(index) {
            None => errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::ConstantIndexOutOfBounds {
                    index,
                    pool_size: pool.len(),
                },
            }),
            Some(value) if !constant_matches(instr.opcode, value) => errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::ConstantKindMismatch { index, expected },
            }),
            Some(_) => {}
        }
    }
}

fn constant_matches(opcode: Opcode, value: &Value) -> bool {
    match opcode {
        Opcode::ConstInt => matches!(value, Value::Int(_)),
        Opcode::ConstFloat => matches!(value, Value::Float(_)),
        Opcode::GetGlobal | Opcode::CallNative => matches!(value, Value::String(_)),
        _ => true,
    }
}

// ============================================================================
// Pass 4: stack depth simulation
// ============================================================================

fn check_stack_depth(
    decoded: &[DecodedInstruction],
    targets: &HashMap<usize, usize>,
    errors: &mut Vec<ValidationError>,
) {
    if decoded.is_empty() {
        return;
    }

    let mut depth_at: Vec<Option<usize>> = vec![None; decoded.len()];
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];

    while let Some((start, start_depth)) = worklist.pop() {
        let mut index = start;
        let mut depth = start_depth;

        while let Some(instr) = decoded.get(index) {
            match depth_at[index] {
                Some(seen) if seen == depth => break,
                Some(seen) => {
                    errors.push(ValidationError {
                        offset: instr.offset,
                        kind: ValidationErrorKind::InconsistentDepth {
                            first: seen,
                            second: depth,
                        },
                    });
                    break;
                }
                None => depth_at[index] = Some(depth),
            }

            // Unknown runtime ids were reported in pass 3.
            let Some(effect) = instr.opcode.stack_effect(&instr.operands) else {
                break;
            };
            if depth < effect.pops {
                errors.push(ValidationError {
                    offset: instr.offset,
                    kind: ValidationErrorKind::StackUnderflow {
                        opcode: instr.opcode,
                        depth_before: depth,
                    },
                });
                break;
            }
            depth = depth - effect.pops + effect.pushes;

            match instr.opcode {
                Opcode::Halt => {
                    if depth != 1 {
                        errors.push(ValidationError {
                            offset: instr.offset,
                            kind: ValidationErrorKind::HaltDepth { depth },
                        });
                    }
                    break;
                }
                Opcode::Jump => match targets.get(&index) {
                    Some(&target) => index = target,
                    None => break,
                },
                Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                    if let Some(&target) = targets.get(&index) {
                        worklist.push((target, depth));
                    }
                    index += 1;
                }
                _ => index += 1,
            }
        }
    }
}

// ============================================================================
// Pass 5: termination
// ============================================================================

fn check_terminator(decoded: &[DecodedInstruction], errors: &mut Vec<ValidationError>) {
    match decoded.last() {
        Some(instr) if instr.opcode == Opcode::Halt => {}
        Some(instr) => errors.push(ValidationError {
            offset: instr.offset,
            kind: ValidationErrorKind::MissingTerminator,
        }),
        None => errors.push(ValidationError {
            offset: 0,
            kind: ValidationErrorKind::MissingTerminator,
        }),
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Assembler;

    fn kinds(result: Result<(), Vec<ValidationError>>) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    // ---- valid bytecode passes ----------------------------------------------

    #[test]
    fn test_valid_push_halt() {
        let mut asm = Assembler::new();
        asm.push_bool(true);
        let bc = asm.finish().unwrap();
        assert!(validate(&bc).is_ok());
    }

    #[test]
    fn test_valid_branches() {
        let mut asm = Assembler::new();
        let else_label = asm.new_label();
        let end = asm.new_label();
        asm.push_bool(true);
        asm.jump_if_false(else_label);
        asm.push_int(1);
        asm.jump(end);
        asm.mark(else_label);
        asm.push_int(2);
        asm.mark(end);
        let bc = asm.finish().unwrap();
        assert!(validate(&bc).is_ok());
    }

    #[test]
    fn test_valid_runtime_call() {
        let mut asm = Assembler::new();
        asm.push_constant(Value::string("5"));
        asm.push_int(5);
        asm.emit(Opcode::BoxInt);
        asm.invoke(RuntimeFn::GenericEquals);
        let bc = asm.finish().unwrap();
        assert!(validate(&bc).is_ok());
    }

    // ---- decode errors ------------------------------------------------------

    #[test]
    fn test_unknown_opcode() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit_u8(0xEE);
        bc.emit(Opcode::Halt);
        assert_eq!(kinds(validate(&bc)), vec![ValidationErrorKind::UnknownOpcode(0xEE)]);
    }

    #[test]
    fn test_truncated_operand() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::ConstInt);
        bc.emit_u8(0);
        let errors = kinds(validate(&bc));
        assert!(errors.contains(&ValidationErrorKind::TruncatedInstruction {
            opcode: Opcode::ConstInt
        }));
    }

    // ---- jumps --------------------------------------------------------------

    #[test]
    fn test_jump_out_of_bounds() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit(Opcode::Jump);
        bc.emit_i16(100);
        bc.emit(Opcode::Halt);
        let errors = kinds(validate(&bc));
        assert!(matches!(
            errors[0],
            ValidationErrorKind::JumpOutOfBounds { target: 104, .. }
        ));
    }

    #[test]
    fn test_jump_misaligned() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit(Opcode::Jump);
        bc.emit_i16(1); // lands inside ConstInt's operand
        bc.emit(Opcode::ConstInt);
        bc.emit_u16(0);
        bc.emit(Opcode::Halt);
        bc.add_constant(Value::Int(1));
        let errors = kinds(validate(&bc));
        assert_eq!(errors, vec![ValidationErrorKind::JumpMisaligned { target: 5 }]);
    }

    // ---- operand refs -------------------------------------------------------

    #[test]
    fn test_constant_index_out_of_bounds() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Constant);
        bc.emit_u16(3);
        bc.emit(Opcode::Halt);
        assert_eq!(
            kinds(validate(&bc)),
            vec![ValidationErrorKind::ConstantIndexOutOfBounds {
                index: 3,
                pool_size: 0
            }]
        );
    }

    #[test]
    fn test_const_int_must_reference_int() {
        let mut bc = Bytecode::new();
        let idx = bc.add_constant(Value::Float(1.5));
        bc.emit(Opcode::ConstInt);
        bc.emit_u16(idx);
        bc.emit(Opcode::Halt);
        assert_eq!(
            kinds(validate(&bc)),
            vec![ValidationErrorKind::ConstantKindMismatch {
                index: 0,
                expected: "an int"
            }]
        );
    }

    #[test]
    fn test_unknown_runtime_fn() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Null);
        bc.emit(Opcode::Invoke);
        bc.emit_u8(0xEE);
        bc.emit(Opcode::Halt);
        assert_eq!(
            kinds(validate(&bc)),
            vec![ValidationErrorKind::UnknownRuntimeFn(0xEE)]
        );
    }

    // ---- stack depth --------------------------------------------------------

    #[test]
    fn test_stack_underflow() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit(Opcode::IntAdd);
        bc.emit(Opcode::Halt);
        let errors = kinds(validate(&bc));
        assert_eq!(
            errors,
            vec![ValidationErrorKind::StackUnderflow {
                opcode: Opcode::IntAdd,
                depth_before: 1
            }]
        );
    }

    #[test]
    fn test_halt_depth_must_be_one() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit(Opcode::True);
        bc.emit(Opcode::Halt);
        assert_eq!(
            kinds(validate(&bc)),
            vec![ValidationErrorKind::HaltDepth { depth: 2 }]
        );
    }

    #[test]
    fn test_inconsistent_depth_across_paths() {
        // True; JumpIfTrue -> Halt; True; Halt
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        bc.emit(Opcode::True);
        bc.emit(Opcode::JumpIfTrue);
        bc.emit_i16(1);
        bc.emit(Opcode::True);
        bc.emit(Opcode::Halt);
        let errors = kinds(validate(&bc));
        assert!(errors
            .iter()
            .any(|k| matches!(k, ValidationErrorKind::InconsistentDepth { .. })));
    }

    #[test]
    fn test_missing_terminator() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::True);
        let errors = kinds(validate(&bc));
        assert!(errors.contains(&ValidationErrorKind::MissingTerminator));
    }

    #[test]
    fn test_empty_bytecode() {
        assert_eq!(
            kinds(validate(&Bytecode::new())),
            vec![ValidationErrorKind::MissingTerminator]
        );
    }
}
