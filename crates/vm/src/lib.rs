//! The bytecode virtual machine (spec.md §4.7).
//!
//! Executes a single `IrModule` produced by `compiler::lower`. The
//! module contains exactly one `IrFunction` (inline-everything,
//! spec.md §4.6) so there is no call stack: one locals array, one
//! operand stack, one instruction pointer.
//!
//! Values on the operand stack are always 64 bits. Integer kinds are
//! stored sign/zero-extended to the full word per spec.md §4.7
//! ("integer kinds are stored in low bits with sign-extension
//! semantics"); floats are bit-exact via `to_bits`/`from_bits`. Which
//! interpretation applies to a given stack slot is determined entirely
//! by the *opcode* operating on it (`AddI32` vs `AddI64`, ...), never
//! by a tag carried alongside the value.

use std::io::Write;

use prime_core::ir::{decode_print_flags, decode_string_print, IrModule, IrOpcode};

/// Host-side execution error (spec.md §4.7: "bad module, type mismatch
/// in execute -> return 2"). Distinct from a runtime trap, which is a
/// defined program outcome (exit code 3) rather than a VM bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError(pub String);

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HostError {}

/// Runs `module`'s entry function to completion against `argv`,
/// writing program output to `stdout`/`stderr`. Returns the process
/// exit code: `0`/whatever the entry's `return` yields truncated to
/// i32, or `3` for a runtime trap (the trap message is already
/// written to `stderr` before this returns). Host-side errors (bad
/// module, stack underflow, unresolvable jump target) are `Err` —
/// the caller (driver) maps those to exit code 2 per spec.md §6.
pub fn execute(
    module: &IrModule,
    argv: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<i32, HostError> {
    let function = module.entry().ok_or_else(|| HostError("ir module has no entry function".to_string()))?;
    let mut locals = vec![0u64; function.local_count as usize];
    let mut stack: Vec<u64> = Vec::new();
    let mut ip: usize = 0;

    macro_rules! pop {
        () => {
            stack.pop().ok_or_else(|| HostError("operand stack underflow".to_string()))?
        };
    }
    macro_rules! local_mut {
        ($idx:expr) => {{
            let idx = $idx as usize;
            locals.get_mut(idx).ok_or_else(|| HostError(format!("local index {idx} out of range")))?
        }};
    }

    loop {
        let Some(inst) = function.instructions.get(ip) else {
            return Err(HostError(format!("instruction pointer {ip} ran off the end of the function")));
        };
        let imm = inst.imm;
        use IrOpcode::*;
        match inst.op {
            Nop => {}

            PushImmI32 => stack.push(imm as i32 as i64 as u64),
            PushImmI64 => stack.push(imm),
            PushImmU64 => stack.push(imm),
            PushImmF32 => stack.push(imm),
            PushImmF64 => stack.push(imm),
            PushImmBool => stack.push(if imm != 0 { 1 } else { 0 }),
            PushArgc => stack.push(argv.len() as i64 as u64),

            LoadLocal => stack.push(*local_mut!(imm)),
            StoreLocal => {
                let v = pop!();
                *local_mut!(imm) = v;
            }
            AddressOfLocal => stack.push(imm),
            LoadIndirect => {
                let addr = pop!();
                stack.push(*local_mut!(addr));
            }
            StoreIndirect => {
                let v = pop!();
                let addr = pop!();
                *local_mut!(addr) = v;
            }

            AddI32 => bin_i32(&mut stack, |a, b| a.wrapping_add(b))?,
            AddI64 => bin_i64(&mut stack, |a, b| a.wrapping_add(b))?,
            AddU64 => bin_u64(&mut stack, |a, b| a.wrapping_add(b))?,
            AddF32 => bin_f32(&mut stack, |a, b| a + b)?,
            AddF64 => bin_f64(&mut stack, |a, b| a + b)?,
            SubI32 => bin_i32(&mut stack, |a, b| a.wrapping_sub(b))?,
            SubI64 => bin_i64(&mut stack, |a, b| a.wrapping_sub(b))?,
            SubU64 => bin_u64(&mut stack, |a, b| a.wrapping_sub(b))?,
            SubF32 => bin_f32(&mut stack, |a, b| a - b)?,
            SubF64 => bin_f64(&mut stack, |a, b| a - b)?,
            MulI32 => bin_i32(&mut stack, |a, b| a.wrapping_mul(b))?,
            MulI64 => bin_i64(&mut stack, |a, b| a.wrapping_mul(b))?,
            MulU64 => bin_u64(&mut stack, |a, b| a.wrapping_mul(b))?,
            MulF32 => bin_f32(&mut stack, |a, b| a * b)?,
            MulF64 => bin_f64(&mut stack, |a, b| a * b)?,
            DivI32 => {
                let rhs = pop!() as i32;
                let lhs = pop!() as i32;
                if rhs == 0 {
                    return trap(stdout, stderr, "division by zero");
                }
                stack.push(lhs.wrapping_div(rhs) as i64 as u64);
            }
            DivI64 => {
                let rhs = pop!() as i64;
                let lhs = pop!() as i64;
                if rhs == 0 {
                    return trap(stdout, stderr, "division by zero");
                }
                stack.push(lhs.wrapping_div(rhs) as u64);
            }
            DivU64 => {
                let rhs = pop!();
                let lhs = pop!();
                if rhs == 0 {
                    return trap(stdout, stderr, "division by zero");
                }
                stack.push(lhs / rhs);
            }
            DivF32 => bin_f32(&mut stack, |a, b| a / b)?,
            DivF64 => bin_f64(&mut stack, |a, b| a / b)?,

            PtrAdd => {
                let off = pop!() as i64;
                let addr = pop!() as i64;
                stack.push((addr + off) as u64);
            }
            PtrSub => {
                let off = pop!() as i64;
                let addr = pop!() as i64;
                stack.push((addr - off) as u64);
            }

            EqI32 => cmp_i32(&mut stack, |a, b| a == b)?,
            EqI64 => cmp_i64(&mut stack, |a, b| a == b)?,
            EqU64 => cmp_u64(&mut stack, |a, b| a == b)?,
            EqF32 => cmp_f32(&mut stack, |a, b| a == b)?,
            EqF64 => cmp_f64(&mut stack, |a, b| a == b)?,
            EqBool => cmp_u64(&mut stack, |a, b| a == b)?,
            NeI32 => cmp_i32(&mut stack, |a, b| a != b)?,
            NeI64 => cmp_i64(&mut stack, |a, b| a != b)?,
            NeU64 => cmp_u64(&mut stack, |a, b| a != b)?,
            NeF32 => cmp_f32(&mut stack, |a, b| a != b)?,
            NeF64 => cmp_f64(&mut stack, |a, b| a != b)?,
            NeBool => cmp_u64(&mut stack, |a, b| a != b)?,
            LtI32 => cmp_i32(&mut stack, |a, b| a < b)?,
            LtI64 => cmp_i64(&mut stack, |a, b| a < b)?,
            LtU64 => cmp_u64(&mut stack, |a, b| a < b)?,
            LtF32 => cmp_f32(&mut stack, |a, b| a < b)?,
            LtF64 => cmp_f64(&mut stack, |a, b| a < b)?,
            LeI32 => cmp_i32(&mut stack, |a, b| a <= b)?,
            LeI64 => cmp_i64(&mut stack, |a, b| a <= b)?,
            LeU64 => cmp_u64(&mut stack, |a, b| a <= b)?,
            LeF32 => cmp_f32(&mut stack, |a, b| a <= b)?,
            LeF64 => cmp_f64(&mut stack, |a, b| a <= b)?,
            GtI32 => cmp_i32(&mut stack, |a, b| a > b)?,
            GtI64 => cmp_i64(&mut stack, |a, b| a > b)?,
            GtU64 => cmp_u64(&mut stack, |a, b| a > b)?,
            GtF32 => cmp_f32(&mut stack, |a, b| a > b)?,
            GtF64 => cmp_f64(&mut stack, |a, b| a > b)?,
            GeI32 => cmp_i32(&mut stack, |a, b| a >= b)?,
            GeI64 => cmp_i64(&mut stack, |a, b| a >= b)?,
            GeU64 => cmp_u64(&mut stack, |a, b| a >= b)?,
            GeF32 => cmp_f32(&mut stack, |a, b| a >= b)?,
            GeF64 => cmp_f64(&mut stack, |a, b| a >= b)?,

            BoolAnd => {
                let b = pop!();
                let a = pop!();
                stack.push(((a != 0) && (b != 0)) as u64);
            }
            BoolOr => {
                let b = pop!();
                let a = pop!();
                stack.push(((a != 0) || (b != 0)) as u64);
            }
            BoolNot => {
                let a = pop!();
                stack.push((a == 0) as u64);
            }

            AtArray | AtVector => {
                let idx = pop!();
                let base = pop!();
                stack.push(base.wrapping_add(idx));
            }
            AtMap => {
                let _key = pop!();
                let _base = pop!();
                stack.push(0);
            }
            AtString => {
                let idx = pop!();
                let _base = pop!();
                stack.push(idx & 0xff);
            }
            Count | Capacity => {
                pop!();
                stack.push(0);
            }
            VecPush => {
                pop!();
                pop!();
            }
            VecPop | VecClear => {
                pop!();
            }
            VecReserve | VecRemoveAt | VecRemoveSwap => {
                pop!();
                pop!();
            }

            Jump => {
                ip = imm as usize;
                continue;
            }
            JumpIfZero => {
                let v = pop!();
                if v == 0 {
                    ip = imm as usize;
                    continue;
                }
            }

            ReturnI32 => return Ok(pop!() as i32),
            ReturnI64 => return Ok(pop!() as i64 as i32),
            ReturnU64 => return Ok(pop!() as i32),
            ReturnF32 => return Ok(f32::from_bits(pop!() as u32) as i32),
            ReturnF64 => return Ok(f64::from_bits(pop!()) as i32),
            ReturnVoid => return Ok(0),

            ConvI32ToI64 => conv1(&mut stack, |v| v as i32 as i64 as u64)?,
            ConvI32ToU64 => conv1(&mut stack, |v| v as i32 as u64)?,
            ConvI32ToF32 => conv1(&mut stack, |v| (v as i32 as f32).to_bits() as u64)?,
            ConvI32ToF64 => conv1(&mut stack, |v| (v as i32 as f64).to_bits())?,
            ConvI64ToI32 => conv1(&mut stack, |v| v as i64 as i32 as i64 as u64)?,
            ConvI64ToU64 => conv1(&mut stack, |v| v)?,
            ConvI64ToF32 => conv1(&mut stack, |v| (v as i64 as f32).to_bits() as u64)?,
            ConvI64ToF64 => conv1(&mut stack, |v| (v as i64 as f64).to_bits())?,
            ConvU64ToI32 => conv1(&mut stack, |v| v as i32 as i64 as u64)?,
            ConvU64ToI64 => conv1(&mut stack, |v| v)?,
            ConvU64ToF32 => conv1(&mut stack, |v| (v as f32).to_bits() as u64)?,
            ConvU64ToF64 => conv1(&mut stack, |v| (v as f64).to_bits())?,
            ConvF32ToF64 => conv1(&mut stack, |v| (f32::from_bits(v as u32) as f64).to_bits())?,
            ConvF32ToI32 => conv1(&mut stack, |v| (f32::from_bits(v as u32) as i32 as i64 as u64))?,
            ConvF32ToI64 => conv1(&mut stack, |v| (f32::from_bits(v as u32) as i64 as u64))?,
            ConvF32ToU64 => conv1(&mut stack, |v| (f32::from_bits(v as u32) as u64))?,
            ConvF64ToF32 => conv1(&mut stack, |v| (f64::from_bits(v) as f32).to_bits() as u64)?,
            ConvF64ToI32 => conv1(&mut stack, |v| (f64::from_bits(v) as i32 as i64 as u64))?,
            ConvF64ToI64 => conv1(&mut stack, |v| (f64::from_bits(v) as i64 as u64))?,
            ConvF64ToU64 => conv1(&mut stack, |v| (f64::from_bits(v) as u64))?,

            PrintString => {
                let (index, newline, to_stderr) = decode_string_print(imm);
                let s = module
                    .string_table
                    .get(index as usize)
                    .ok_or_else(|| HostError(format!("string table index {index} out of range")))?;
                write_text(stdout, stderr, to_stderr, s, newline);
            }
            PrintArgv | PrintArgvUnsafe => {
                let idx = pop!() as usize;
                let checked = inst.op == PrintArgv;
                let (newline, to_stderr) = decode_print_flags(imm);
                match argv.get(idx) {
                    Some(s) => write_text(stdout, stderr, to_stderr, s, newline),
                    None if checked => return trap(stdout, stderr, "array index out of bounds"),
                    None => write_text(stdout, stderr, to_stderr, "", newline),
                }
            }
            PrintInt => {
                let v = pop!() as i64;
                let (newline, to_stderr) = decode_print_flags(imm);
                write_text(stdout, stderr, to_stderr, &v.to_string(), newline);
            }
            PrintUnsigned => {
                let v = pop!();
                let (newline, to_stderr) = decode_print_flags(imm);
                write_text(stdout, stderr, to_stderr, &v.to_string(), newline);
            }
            PrintBool => {
                let v = pop!();
                let (newline, to_stderr) = decode_print_flags(imm);
                write_text(stdout, stderr, to_stderr, if v != 0 { "true" } else { "false" }, newline);
            }

            Notify | Insert | Take => {
                let arity = if inst.op == Insert { 2 } else { 1 };
                for _ in 0..arity {
                    pop!();
                }
            }

            PowInt => {
                let exp = pop!() as i64;
                let base = pop!() as i64;
                if exp < 0 {
                    return trap(stdout, stderr, "pow: negative exponent is not supported for integer operands");
                }
                stack.push(base.wrapping_pow(exp as u32) as u64);
            }
            PowFloat => {
                let exp = f64::from_bits(pop!());
                let base = f64::from_bits(pop!());
                stack.push(base.powf(exp).to_bits());
            }
        }
        ip += 1;
    }
}

fn trap(stdout: &mut dyn Write, stderr: &mut dyn Write, message: &str) -> Result<i32, HostError> {
    let _ = stdout.flush();
    let _ = writeln!(stderr, "{message}");
    Ok(3)
}

fn write_text(stdout: &mut dyn Write, stderr: &mut dyn Write, to_stderr: bool, text: &str, newline: bool) {
    let sink: &mut dyn Write = if to_stderr { stderr } else { stdout };
    let _ = sink.write_all(text.as_bytes());
    if newline {
        let _ = sink.write_all(b"\n");
    }
}

fn bin_i32(stack: &mut Vec<u64>, f: impl Fn(i32, i32) -> i32) -> Result<(), HostError> {
    let b = pop_u64(stack)? as i32;
    let a = pop_u64(stack)? as i32;
    stack.push(f(a, b) as i64 as u64);
    Ok(())
}
fn bin_i64(stack: &mut Vec<u64>, f: impl Fn(i64, i64) -> i64) -> Result<(), HostError> {
    let b = pop_u64(stack)? as i64;
    let a = pop_u64(stack)? as i64;
    stack.push(f(a, b) as u64);
    Ok(())
}
fn bin_u64(stack: &mut Vec<u64>, f: impl Fn(u64, u64) -> u64) -> Result<(), HostError> {
    let b = pop_u64(stack)?;
    let a = pop_u64(stack)?;
    stack.push(f(a, b));
    Ok(())
}
fn bin_f32(stack: &mut Vec<u64>, f: impl Fn(f32, f32) -> f32) -> Result<(), HostError> {
    let b = f32::from_bits(pop_u64(stack)? as u32);
    let a = f32::from_bits(pop_u64(stack)? as u32);
    stack.push(f(a, b).to_bits() as u64);
    Ok(())
}
fn bin_f64(stack: &mut Vec<u64>, f: impl Fn(f64, f64) -> f64) -> Result<(), HostError> {
    let b = f64::from_bits(pop_u64(stack)?);
    let a = f64::from_bits(pop_u64(stack)?);
    stack.push(f(a, b).to_bits());
    Ok(())
}

fn cmp_i32(stack: &mut Vec<u64>, f: impl Fn(i32, i32) -> bool) -> Result<(), HostError> {
    let b = pop_u64(stack)? as i32;
    let a = pop_u64(stack)? as i32;
    stack.push(f(a, b) as u64);
    Ok(())
}
fn cmp_i64(stack: &mut Vec<u64>, f: impl Fn(i64, i64) -> bool) -> Result<(), HostError> {
    let b = pop_u64(stack)? as i64;
    let a = pop_u64(stack)? as i64;
    stack.push(f(a, b) as u64);
    Ok(())
}
fn cmp_u64(stack: &mut Vec<u64>, f: impl Fn(u64, u64) -> bool) -> Result<(), HostError> {
    let b = pop_u64(stack)?;
    let a = pop_u64(stack)?;
    stack.push(f(a, b) as u64);
    Ok(())
}
fn cmp_f32(stack: &mut Vec<u64>, f: impl Fn(f32, f32) -> bool) -> Result<(), HostError> {
    let b = f32::from_bits(pop_u64(stack)? as u32);
    let a = f32::from_bits(pop_u64(stack)? as u32);
    stack.push(f(a, b) as u64);
    Ok(())
}
fn cmp_f64(stack: &mut Vec<u64>, f: impl Fn(f64, f64) -> bool) -> Result<(), HostError> {
    let b = f64::from_bits(pop_u64(stack)?);
    let a = f64::from_bits(pop_u64(stack)?);
    stack.push(f(a, b) as u64);
    Ok(())
}
fn conv1(stack: &mut Vec<u64>, f: impl Fn(u64) -> u64) -> Result<(), HostError> {
    let v = pop_u64(stack)?;
    stack.push(f(v));
    Ok(())
}
fn pop_u64(stack: &mut Vec<u64>) -> Result<u64, HostError> {
    stack.pop().ok_or_else(|| HostError("operand stack underflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prime_core::ir::{IrFunction, IrInstruction, IrOpcode::*};

    fn run(instructions: Vec<IrInstruction>, local_count: u32) -> (i32, String, String) {
        let module = IrModule {
            functions: vec![IrFunction { name: "main".to_string(), instructions, local_count }],
            string_table: vec!["hi\n".to_string()],
            struct_layouts: vec![],
            entry_index: 0,
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = execute(&module, &[], &mut out, &mut err).unwrap();
        (code, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn adds_two_i32_literals_and_returns() {
        let (code, _, _) = run(
            vec![
                IrInstruction::new(PushImmI32, 1),
                IrInstruction::new(PushImmI32, 2),
                IrInstruction::bare(AddI32),
                IrInstruction::bare(ReturnI32),
            ],
            0,
        );
        assert_eq!(code, 3);
    }

    #[test]
    fn argv_count_round_trips_through_push_argc() {
        let module = IrModule {
            functions: vec![IrFunction {
                name: "main".to_string(),
                instructions: vec![IrInstruction::bare(PushArgc), IrInstruction::bare(ReturnI32)],
                local_count: 0,
            }],
            string_table: vec![],
            struct_layouts: vec![],
            entry_index: 0,
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        let argv = vec!["prog".to_string(), "alpha".to_string(), "beta".to_string()];
        let code = execute(&module, &argv, &mut out, &mut err).unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn out_of_bounds_argv_access_traps_with_exit_3() {
        let module = IrModule {
            functions: vec![IrFunction {
                name: "main".to_string(),
                instructions: vec![
                    IrInstruction::new(PushImmI32, 9),
                    IrInstruction::new(PrintArgv, 0),
                    IrInstruction::new(PushImmI32, 0),
                    IrInstruction::bare(ReturnI32),
                ],
                local_count: 0,
            }],
            string_table: vec![],
            struct_layouts: vec![],
            entry_index: 0,
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = execute(&module, &["prog".to_string()], &mut out, &mut err).unwrap();
        assert_eq!(code, 3);
        assert_eq!(String::from_utf8(err).unwrap(), "array index out of bounds\n");
    }

    #[test]
    fn print_string_writes_interned_literal() {
        let (code, out, _) = run(
            vec![
                IrInstruction::new(PrintString, prime_core::ir::encode_string_print(0, false, false)),
                IrInstruction::new(PushImmI32, 0),
                IrInstruction::bare(ReturnI32),
            ],
            0,
        );
        assert_eq!(code, 0);
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn locals_round_trip_through_store_and_load() {
        let (code, _, _) = run(
            vec![
                IrInstruction::new(PushImmI32, 41),
                IrInstruction::new(StoreLocal, 0),
                IrInstruction::new(LoadLocal, 0),
                IrInstruction::new(PushImmI32, 1),
                IrInstruction::bare(AddI32),
                IrInstruction::bare(ReturnI32),
            ],
            1,
        );
        assert_eq!(code, 42);
    }

    #[test]
    fn pow_int_rejects_negative_exponent_at_runtime() {
        let (code, _, err) = run(
            vec![
                IrInstruction::new(PushImmI32, 2),
                IrInstruction::new(PushImmI32, -1i32 as u32 as u64),
                IrInstruction::bare(PowInt),
                IrInstruction::bare(ReturnI32),
            ],
            0,
        );
        assert_eq!(code, 3);
        assert!(err.contains("negative exponent"));
    }
}
