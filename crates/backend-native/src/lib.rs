//! ARM64 (AArch64) assembly text emitter (spec.md §4.8 "Native Emitter").
//!
//! Unlike the C++/GLSL backends, this one consumes the already-lowered
//! `IrModule` rather than walking the `Program` tree — the stack
//! machine's flat, inline-everything instruction stream maps directly
//! onto a straight-line sequence of AArch64 instructions with no call
//! graph to reconstruct. Recursion is already rejected at lowering
//! time (spec.md §4.6); this crate additionally rejects opcodes that
//! need a heap or string runtime this freestanding target doesn't
//! provide (vectors, maps, strings, argv, `notify`/`insert`/`take`).
//!
//! Only text is produced here. Assembling and linking the result is a
//! driver concern (`primec --emit=native` shells out to `as`/`ld`),
//! kept out of this crate so it stays testable without a toolchain.

use prime_core::ir::{ArithOp, CmpOp, IrFunction, IrInstruction, IrModule, IrOpcode};

#[derive(Debug)]
pub enum EmitError {
    Unsupported(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::Unsupported(s) => write!(f, "{s}"),
            EmitError::Format(e) => write!(f, "native emission error: {e}"),
        }
    }
}
impl std::error::Error for EmitError {}
impl From<std::fmt::Error> for EmitError {
    fn from(e: std::fmt::Error) -> Self {
        EmitError::Format(e)
    }
}
impl From<EmitError> for String {
    fn from(e: EmitError) -> Self {
        e.to_string()
    }
}

type R<T> = Result<T, EmitError>;

/// Entry point: emits a `.s`-format AArch64 text section for the
/// module's single function (spec.md §4.6: only the entry definition
/// survives lowering).
pub fn emit(module: &IrModule) -> Result<String, String> {
    emit_inner(module).map_err(Into::into)
}

fn emit_inner(module: &IrModule) -> R<String> {
    let func = module.entry().ok_or_else(|| EmitError::Unsupported("module has no entry function".to_string()))?;
    reject_unsupported(func)?;

    let mut out = String::new();
    use std::fmt::Write as _;

    writeln!(out, "// Generated by primec --emit=native. Do not edit by hand.")?;
    writeln!(out, ".text")?;
    writeln!(out, ".align 2")?;
    writeln!(out, ".global ps_entry")?;
    writeln!(out, ".extern ps_native_print_int")?;
    writeln!(out, ".extern ps_native_print_uint")?;
    writeln!(out, ".extern ps_native_print_bool")?;
    writeln!(out, ".extern ps_native_pow_i32")?;
    writeln!(out, ".extern ps_native_pow_f64")?;
    writeln!(out, "ps_entry:")?;

    let locals_size = round16((func.local_count as u64) * 8);
    writeln!(out, "    stp x29, x30, [sp, #-16]!")?;
    writeln!(out, "    mov x29, sp")?;
    if locals_size > 0 {
        writeln!(out, "    sub sp, sp, #{locals_size}")?;
    }

    for (idx, instr) in func.instructions.iter().enumerate() {
        writeln!(out, ".Li{idx}:")?;
        emit_instruction(&mut out, instr)?;
    }

    writeln!(out, ".Lepilogue:")?;
    writeln!(out, "    mov sp, x29")?;
    writeln!(out, "    ldp x29, x30, [sp], #16")?;
    writeln!(out, "    ret")?;
    Ok(out)
}

fn round16(n: u64) -> u64 {
    (n + 15) & !15
}

const UNSUPPORTED: &[(IrOpcode, &str)] = &[
    (IrOpcode::PushArgc, "program argument count"),
    (IrOpcode::AtVector, "vector indexing"),
    (IrOpcode::AtString, "string indexing"),
    (IrOpcode::AtMap, "map indexing"),
    (IrOpcode::Count, "container length queries"),
    (IrOpcode::Capacity, "container capacity queries"),
    (IrOpcode::VecPush, "vector mutation"),
    (IrOpcode::VecPop, "vector mutation"),
    (IrOpcode::VecReserve, "vector mutation"),
    (IrOpcode::VecClear, "vector mutation"),
    (IrOpcode::VecRemoveAt, "vector mutation"),
    (IrOpcode::VecRemoveSwap, "vector mutation"),
    (IrOpcode::PrintString, "string printing"),
    (IrOpcode::PrintArgv, "argv printing"),
    (IrOpcode::PrintArgvUnsafe, "argv printing"),
    (IrOpcode::Notify, "pathspace notify"),
    (IrOpcode::Insert, "pathspace insert"),
    (IrOpcode::Take, "pathspace take"),
];

fn reject_unsupported(func: &IrFunction) -> R<()> {
    for instr in &func.instructions {
        if let Some((_, reason)) = UNSUPPORTED.iter().find(|(op, _)| *op == instr.op) {
            return Err(EmitError::Unsupported(format!(
                "native backend has no heap, string, or argv runtime; {reason} ({:?}) is unsupported here",
                instr.op
            )));
        }
    }
    Ok(())
}

/// Loads a full 64-bit immediate with `movz`/`movk` (the idiomatic
/// AArch64 sequence for constants that don't fit a single `mov`).
fn load_imm64(out: &mut String, reg: &str, value: u64) -> std::fmt::Result {
    use std::fmt::Write as _;
    writeln!(out, "    movz {reg}, #{}", value & 0xffff)?;
    for shift in [16u32, 32, 48] {
        let chunk = (value >> shift) & 0xffff;
        if chunk != 0 {
            writeln!(out, "    movk {reg}, #{chunk}, lsl #{shift}")?;
        }
    }
    Ok(())
}

fn emit_instruction(out: &mut String, instr: &IrInstruction) -> R<()> {
    use std::fmt::Write as _;
    use IrOpcode::*;
    match instr.op {
        Nop => writeln!(out, "    nop")?,

        PushImmI32 => {
            writeln!(out, "    mov w9, #{}", instr.imm as u32)?;
            writeln!(out, "    sxtw x9, w9")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        PushImmI64 | PushImmU64 => {
            load_imm64(out, "x9", instr.imm)?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        PushImmF32 => {
            load_imm64(out, "w9", instr.imm & 0xffff_ffff)?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        PushImmF64 => {
            load_imm64(out, "x9", instr.imm)?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        PushImmBool => {
            writeln!(out, "    mov w9, #{}", if instr.imm != 0 { 1 } else { 0 })?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        LoadLocal => {
            let off = local_offset(instr.imm);
            writeln!(out, "    ldr x9, [x29, #-{off}]")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        StoreLocal => {
            let off = local_offset(instr.imm);
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    str x9, [x29, #-{off}]")?;
        }
        AddressOfLocal => {
            let off = local_offset(instr.imm);
            writeln!(out, "    sub x9, x29, #{off}")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        LoadIndirect => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [x10]")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        StoreIndirect => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    str x9, [x10]")?;
        }

        AddI32 | AddI64 | AddU64 | SubI32 | SubI64 | SubU64 | MulI32 | MulI64 | MulU64 | DivI32 | DivI64 | DivU64 => {
            emit_int_arith(out, instr.op)?;
        }
        AddF32 | SubF32 | MulF32 | DivF32 | AddF64 | SubF64 | MulF64 | DivF64 => {
            emit_float_arith(out, instr.op)?;
        }
        PtrAdd => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    add x9, x9, x10")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        PtrSub => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    sub x9, x9, x10")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        EqI32 | NeI32 | LtI32 | LeI32 | GtI32 | GeI32 | EqI64 | NeI64 | LtI64 | LeI64 | GtI64 | GeI64 | EqU64
        | NeU64 | LtU64 | LeU64 | GtU64 | GeU64 | EqBool | NeBool => emit_int_cmp(out, instr.op)?,
        EqF32 | NeF32 | LtF32 | LeF32 | GtF32 | GeF32 | EqF64 | NeF64 | LtF64 | LeF64 | GtF64 | GeF64 => {
            emit_float_cmp(out, instr.op)?
        }

        BoolAnd => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    and x9, x9, x10")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        BoolOr => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    orr x9, x9, x10")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        BoolNot => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    eor x9, x9, #1")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        AtArray => {
            writeln!(out, "    ldr x10, [sp], #16")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    ldr x9, [x9, x10, lsl #3]")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        Jump => writeln!(out, "    b .Li{}", instr.imm)?,
        JumpIfZero => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    cbz x9, .Li{}", instr.imm)?;
        }

        ReturnI32 | ReturnI64 | ReturnU64 | ReturnF32 | ReturnF64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    mov x0, x9")?;
            writeln!(out, "    b .Lepilogue")?;
        }
        ReturnVoid => writeln!(out, "    b .Lepilogue")?,

        ConvI32ToI64 | ConvI32ToU64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    sxtw x9, w9")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvI64ToI32 | ConvU64ToI32 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    sxtw x9, w9")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvI64ToU64 | ConvU64ToI64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvI32ToF32 | ConvI64ToF32 | ConvU64ToF32 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    scvtf s0, x9")?;
            writeln!(out, "    fmov w9, s0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvI32ToF64 | ConvI64ToF64 | ConvU64ToF64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    scvtf d0, x9")?;
            writeln!(out, "    fmov x9, d0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvF32ToF64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov s0, w9")?;
            writeln!(out, "    fcvt d0, s0")?;
            writeln!(out, "    fmov x9, d0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvF32ToI32 | ConvF32ToI64 | ConvF32ToU64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov s0, w9")?;
            writeln!(out, "    fcvtzs x9, s0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvF64ToF32 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov d0, x9")?;
            writeln!(out, "    fcvt s0, d0")?;
            writeln!(out, "    fmov w9, s0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }
        ConvF64ToI32 | ConvF64ToI64 | ConvF64ToU64 => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov d0, x9")?;
            writeln!(out, "    fcvtzs x9, d0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        PrintInt => {
            writeln!(out, "    ldr x0, [sp], #16")?;
            writeln!(out, "    bl ps_native_print_int")?;
        }
        PrintUnsigned => {
            writeln!(out, "    ldr x0, [sp], #16")?;
            writeln!(out, "    bl ps_native_print_uint")?;
        }
        PrintBool => {
            writeln!(out, "    ldr x0, [sp], #16")?;
            writeln!(out, "    bl ps_native_print_bool")?;
        }

        PowInt => {
            writeln!(out, "    ldr x1, [sp], #16")?;
            writeln!(out, "    ldr x0, [sp], #16")?;
            writeln!(out, "    bl ps_native_pow_i32")?;
            writeln!(out, "    str x0, [sp, #-16]!")?;
        }
        PowFloat => {
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov d1, x9")?;
            writeln!(out, "    ldr x9, [sp], #16")?;
            writeln!(out, "    fmov d0, x9")?;
            writeln!(out, "    bl ps_native_pow_f64")?;
            writeln!(out, "    fmov x9, d0")?;
            writeln!(out, "    str x9, [sp, #-16]!")?;
        }

        AtVector | AtString | AtMap | Count | Capacity | VecPush | VecPop | VecReserve | VecClear | VecRemoveAt
        | VecRemoveSwap | PrintString | PrintArgv | PrintArgvUnsafe | PushArgc | Notify | Insert | Take => {
            unreachable!("rejected by reject_unsupported before emission")
        }
    }
    Ok(())
}

fn local_offset(index: u64) -> u64 {
    8 * (index + 1)
}

fn emit_int_arith(out: &mut String, op: IrOpcode) -> R<()> {
    use std::fmt::Write as _;
    use IrOpcode::*;
    let (arith, is32, unsigned) = match op {
        AddI32 => (ArithOp::Add, true, false),
        AddI64 => (ArithOp::Add, false, false),
        AddU64 => (ArithOp::Add, false, true),
        SubI32 => (ArithOp::Sub, true, false),
        SubI64 => (ArithOp::Sub, false, false),
        SubU64 => (ArithOp::Sub, false, true),
        MulI32 => (ArithOp::Mul, true, false),
        MulI64 => (ArithOp::Mul, false, false),
        MulU64 => (ArithOp::Mul, false, true),
        DivI32 => (ArithOp::Div, true, false),
        DivI64 => (ArithOp::Div, false, false),
        DivU64 => (ArithOp::Div, false, true),
        _ => unreachable!(),
    };
    writeln!(out, "    ldr x10, [sp], #16")?;
    writeln!(out, "    ldr x9, [sp], #16")?;
    let (a, b) = if is32 { ("w9", "w10") } else { ("x9", "x10") };
    match arith {
        ArithOp::Add => writeln!(out, "    add {a}, {a}, {b}")?,
        ArithOp::Sub => writeln!(out, "    sub {a}, {a}, {b}")?,
        ArithOp::Mul => writeln!(out, "    mul {a}, {a}, {b}")?,
        ArithOp::Div if unsigned => writeln!(out, "    udiv {a}, {a}, {b}")?,
        ArithOp::Div => writeln!(out, "    sdiv {a}, {a}, {b}")?,
    }
    if is32 {
        writeln!(out, "    sxtw x9, w9")?;
    }
    writeln!(out, "    str x9, [sp, #-16]!")?;
    Ok(())
}

fn emit_float_arith(out: &mut String, op: IrOpcode) -> R<()> {
    use std::fmt::Write as _;
    use IrOpcode::*;
    let (arith, is32) = match op {
        AddF32 => (ArithOp::Add, true),
        AddF64 => (ArithOp::Add, false),
        SubF32 => (ArithOp::Sub, true),
        SubF64 => (ArithOp::Sub, false),
        MulF32 => (ArithOp::Mul, true),
        MulF64 => (ArithOp::Mul, false),
        DivF32 => (ArithOp::Div, true),
        DivF64 => (ArithOp::Div, false),
        _ => unreachable!(),
    };
    writeln!(out, "    ldr x10, [sp], #16")?;
    writeln!(out, "    ldr x9, [sp], #16")?;
    if is32 {
        writeln!(out, "    fmov s1, w10")?;
        writeln!(out, "    fmov s0, w9")?;
        match arith {
            ArithOp::Add => writeln!(out, "    fadd s0, s0, s1")?,
            ArithOp::Sub => writeln!(out, "    fsub s0, s0, s1")?,
            ArithOp::Mul => writeln!(out, "    fmul s0, s0, s1")?,
            ArithOp::Div => writeln!(out, "    fdiv s0, s0, s1")?,
        }
        writeln!(out, "    fmov w9, s0")?;
    } else {
        writeln!(out, "    fmov d1, x10")?;
        writeln!(out, "    fmov d0, x9")?;
        match arith {
            ArithOp::Add => writeln!(out, "    fadd d0, d0, d1")?,
            ArithOp::Sub => writeln!(out, "    fsub d0, d0, d1")?,
            ArithOp::Mul => writeln!(out, "    fmul d0, d0, d1")?,
            ArithOp::Div => writeln!(out, "    fdiv d0, d0, d1")?,
        }
        writeln!(out, "    fmov x9, d0")?;
    }
    writeln!(out, "    str x9, [sp, #-16]!")?;
    Ok(())
}

fn emit_int_cmp(out: &mut String, op: IrOpcode) -> R<()> {
    use std::fmt::Write as _;
    use IrOpcode::*;
    let (cmp, width, unsigned) = match op {
        EqI32 => (CmpOp::Eq, 32, false),
        NeI32 => (CmpOp::Ne, 32, false),
        LtI32 => (CmpOp::Lt, 32, false),
        LeI32 => (CmpOp::Le, 32, false),
        GtI32 => (CmpOp::Gt, 32, false),
        GeI32 => (CmpOp::Ge, 32, false),
        EqI64 => (CmpOp::Eq, 64, false),
        NeI64 => (CmpOp::Ne, 64, false),
        LtI64 => (CmpOp::Lt, 64, false),
        LeI64 => (CmpOp::Le, 64, false),
        GtI64 => (CmpOp::Gt, 64, false),
        GeI64 => (CmpOp::Ge, 64, false),
        EqU64 => (CmpOp::Eq, 64, true),
        NeU64 => (CmpOp::Ne, 64, true),
        LtU64 => (CmpOp::Lt, 64, true),
        LeU64 => (CmpOp::Le, 64, true),
        GtU64 => (CmpOp::Gt, 64, true),
        GeU64 => (CmpOp::Ge, 64, true),
        EqBool => (CmpOp::Eq, 32, false),
        NeBool => (CmpOp::Ne, 32, false),
        _ => unreachable!(),
    };
    writeln!(out, "    ldr x10, [sp], #16")?;
    writeln!(out, "    ldr x9, [sp], #16")?;
    let (a, b) = if width == 32 { ("w9", "w10") } else { ("x9", "x10") };
    writeln!(out, "    cmp {a}, {b}")?;
    let cond = match (cmp, unsigned) {
        (CmpOp::Eq, _) => "eq",
        (CmpOp::Ne, _) => "ne",
        (CmpOp::Lt, false) => "lt",
        (CmpOp::Le, false) => "le",
        (CmpOp::Gt, false) => "gt",
        (CmpOp::Ge, false) => "ge",
        (CmpOp::Lt, true) => "lo",
        (CmpOp::Le, true) => "ls",
        (CmpOp::Gt, true) => "hi",
        (CmpOp::Ge, true) => "hs",
    };
    writeln!(out, "    cset w9, {cond}")?;
    writeln!(out, "    str x9, [sp, #-16]!")?;
    Ok(())
}

fn emit_float_cmp(out: &mut String, op: IrOpcode) -> R<()> {
    use std::fmt::Write as _;
    use IrOpcode::*;
    let (cmp, is32) = match op {
        EqF32 => (CmpOp::Eq, true),
        NeF32 => (CmpOp::Ne, true),
        LtF32 => (CmpOp::Lt, true),
        LeF32 => (CmpOp::Le, true),
        GtF32 => (CmpOp::Gt, true),
        GeF32 => (CmpOp::Ge, true),
        EqF64 => (CmpOp::Eq, false),
        NeF64 => (CmpOp::Ne, false),
        LtF64 => (CmpOp::Lt, false),
        LeF64 => (CmpOp::Le, false),
        GtF64 => (CmpOp::Gt, false),
        GeF64 => (CmpOp::Ge, false),
        _ => unreachable!(),
    };
    writeln!(out, "    ldr x10, [sp], #16")?;
    writeln!(out, "    ldr x9, [sp], #16")?;
    if is32 {
        writeln!(out, "    fmov s1, w10")?;
        writeln!(out, "    fmov s0, w9")?;
        writeln!(out, "    fcmp s0, s1")?;
    } else {
        writeln!(out, "    fmov d1, x10")?;
        writeln!(out, "    fmov d0, x9")?;
        writeln!(out, "    fcmp d0, d1")?;
    }
    let cond = match cmp {
        CmpOp::Eq => "eq",
        CmpOp::Ne => "ne",
        CmpOp::Lt => "mi",
        CmpOp::Le => "ls",
        CmpOp::Gt => "gt",
        CmpOp::Ge => "ge",
    };
    writeln!(out, "    cset w9, {cond}")?;
    writeln!(out, "    str x9, [sp, #-16]!")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with(instructions: Vec<IrInstruction>, local_count: u32) -> IrModule {
        IrModule {
            functions: vec![IrFunction { name: "main".to_string(), instructions, local_count }],
            string_table: Vec::new(),
            struct_layouts: Vec::new(),
            entry_index: 0,
        }
    }

    #[test]
    fn emits_a_minimal_return() {
        let module = module_with(vec![IrInstruction::new(IrOpcode::PushImmI32, 5), IrInstruction::bare(IrOpcode::ReturnI32)], 0);
        let asm = emit(&module).unwrap();
        assert!(asm.contains("ps_entry:"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn rejects_vector_indexing() {
        let module = module_with(vec![IrInstruction::bare(IrOpcode::AtVector)], 0);
        let err = emit(&module).unwrap_err();
        assert!(err.contains("vector"));
    }

    #[test]
    fn emits_integer_addition() {
        let module = module_with(
            vec![
                IrInstruction::new(IrOpcode::PushImmI32, 1),
                IrInstruction::new(IrOpcode::PushImmI32, 2),
                IrInstruction::bare(IrOpcode::AddI32),
                IrInstruction::bare(IrOpcode::ReturnI32),
            ],
            0,
        );
        let asm = emit(&module).unwrap();
        assert!(asm.contains("add w9, w9, w10"));
    }
}
