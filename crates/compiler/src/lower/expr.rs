//! Expression/value lowering and numeric-kind tracking (spec.md §4.6
//! `inferExprKind`).
//!
//! Strings have no runtime representation on the operand stack at all
//! (the opcode set has no "push string" instruction): a string value
//! only ever reaches the VM as a literal baked into `PrintString`'s
//! immediate, or as an argv index consumed by `PrintArgv`/
//! `PrintArgvUnsafe`. Both are produced directly by `lower_print`
//! rather than by this module's general `lower_expr`, which is why
//! `LoweredKind` below carries no `Str` variant — any string-valued
//! expression that isn't a direct print argument is a lowering error.

use prime_core::ast::Expr;
use prime_core::ir::{arith_opcode, cmp_opcode, conv_opcode, encode_print_flags, encode_string_print, ArithOp, CmpOp, IrOpcode};
use prime_core::types::NumKind;

use crate::builtins::{self, KindRule};

use super::{inline, Ctx, Local};

/// What a fully-lowered expression leaves behind: either a numeric/
/// bool value already pushed on the operand stack, or an address
/// (also already pushed) pointing at a local holding a value of the
/// given kind.
#[derive(Clone, Copy)]
pub(crate) enum LoweredKind {
    Num(NumKind),
    Pointer(NumKind),
}

impl LoweredKind {
    fn num(self) -> Result<NumKind, String> {
        match self {
            LoweredKind::Num(k) => Ok(k),
            LoweredKind::Pointer(_) => Err("expected a numeric value, found a pointer".to_string()),
        }
    }
}

pub(crate) fn num_kind_from_literal(width: u32, signed: bool) -> NumKind {
    match (width, signed) {
        (32, _) => NumKind::I32,
        (64, true) => NumKind::I64,
        (64, false) => NumKind::U64,
        _ => NumKind::I32,
    }
}

fn push_literal(ctx: &mut Ctx, kind: NumKind, value: i64) {
    let op = match kind {
        NumKind::I32 => IrOpcode::PushImmI32,
        NumKind::I64 => IrOpcode::PushImmI64,
        NumKind::U64 => IrOpcode::PushImmU64,
        NumKind::Bool => IrOpcode::PushImmBool,
        NumKind::F32 | NumKind::F64 => unreachable!("float literals go through push_float"),
    };
    ctx.emit(op, value as u64);
}

fn push_float(ctx: &mut Ctx, kind: NumKind, text: &str) -> Result<(), String> {
    let bits = match kind {
        NumKind::F32 => text.parse::<f32>().map_err(|e| format!("invalid f32 literal '{text}': {e}"))?.to_bits() as u64,
        NumKind::F64 => text.parse::<f64>().map_err(|e| format!("invalid f64 literal '{text}': {e}"))?.to_bits(),
        _ => unreachable!(),
    };
    let op = if kind == NumKind::F32 { IrOpcode::PushImmF32 } else { IrOpcode::PushImmF64 };
    ctx.emit(op, bits);
    Ok(())
}

pub(crate) fn lower_expr(ctx: &mut Ctx, expr: &Expr) -> Result<LoweredKind, String> {
    match expr {
        Expr::Literal { value, width, signed, .. } => {
            let kind = num_kind_from_literal(*width, *signed);
            push_literal(ctx, kind, *value);
            Ok(LoweredKind::Num(kind))
        }
        Expr::BoolLiteral { value, .. } => {
            ctx.emit(IrOpcode::PushImmBool, *value as u64);
            Ok(LoweredKind::Num(NumKind::Bool))
        }
        Expr::FloatLiteral { text, width, .. } => {
            let kind = if *width == 64 { NumKind::F64 } else { NumKind::F32 };
            push_float(ctx, kind, text)?;
            Ok(LoweredKind::Num(kind))
        }
        Expr::StringLiteral { .. } => Err(
            "string value is not used as a direct print argument; the bytecode lowerer has no opcode to hold a string value otherwise".to_string(),
        ),
        Expr::Name { name, .. } => lower_name(ctx, name),
        Expr::Call { name, args, transforms, body_arguments, template_args, is_lambda, .. } => {
            if *is_lambda {
                return Err("lambda expressions are not supported by the IR lowerer".to_string());
            }
            lower_call(ctx, name, args, transforms, body_arguments, template_args)
        }
    }
}

fn lower_name(ctx: &mut Ctx, name: &str) -> Result<LoweredKind, String> {
    match ctx.lookup(name) {
        Some(Local::Num { slot, kind }) => {
            ctx.emit(IrOpcode::LoadLocal, slot as u64);
            Ok(LoweredKind::Num(kind))
        }
        Some(Local::Pointer { slot, pointee }) => {
            ctx.emit(IrOpcode::LoadLocal, slot as u64);
            Ok(LoweredKind::Pointer(pointee))
        }
        Some(Local::Argv) => Err("argv parameter has no scalar value; index it with at(...)/at_unsafe(...)".to_string()),
        Some(Local::Array { .. }) | Some(Local::Vector { .. }) => {
            Err(format!("'{name}' is a collection; index it with at(...)/at_unsafe(...) or take its address with location(...)"))
        }
        None => {
            let def = ctx
                .resolve_definition(name)
                .ok_or_else(|| format!("unknown identifier '{name}'"))?;
            inline::inline_call(ctx, def, &[])
        }
    }
}

fn lower_call(
    ctx: &mut Ctx,
    name: &str,
    args: &[Expr],
    transforms: &[prime_core::ast::Transform],
    body_arguments: &[Expr],
    template_args: &[String],
) -> Result<LoweredKind, String> {
    let _ = transforms;
    match name {
        "block" => lower_block_expr(ctx, body_arguments),
        "void" => {
            ctx.emit(IrOpcode::PushImmI32, 0);
            Ok(LoweredKind::Num(NumKind::I32))
        }
        "array" | "vector" => lower_collection_constructor(ctx, name, args, template_args),
        "convert" => lower_convert(ctx, args, template_args),
        "location" => lower_location(ctx, args),
        "dereference" => lower_dereference(ctx, args),
        "count" | "capacity" => lower_count_capacity(ctx, name, args),
        "at" | "at_unsafe" => lower_index(ctx, name, args),
        "assign" => lower_assign(ctx, args),
        "increment" | "decrement" => lower_incr_decr(ctx, name, args),
        _ => {
            if let Some(spec) = builtins::lookup(name) {
                return lower_builtin(ctx, name, spec, args);
            }
            let def = ctx.resolve_definition(name).ok_or_else(|| format!("unknown identifier '{name}'"))?;
            let mut kinds = Vec::with_capacity(args.len());
            for a in args {
                kinds.push(lower_expr(ctx, a)?);
            }
            inline::inline_call(ctx, def, &kinds)
        }
    }
}

fn lower_block_expr(ctx: &mut Ctx, body: &[Expr]) -> Result<LoweredKind, String> {
    ctx.push_scope();
    let result = (|| -> Result<LoweredKind, String> {
        if body.is_empty() {
            ctx.emit(IrOpcode::PushImmI32, 0);
            return Ok(LoweredKind::Num(NumKind::I32));
        }
        for stmt in &body[..body.len() - 1] {
            super::control_flow::lower_statement(ctx, stmt)?;
        }
        lower_expr(ctx, &body[body.len() - 1])
    })();
    ctx.pop_scope();
    result
}

fn lower_convert(ctx: &mut Ctx, args: &[Expr], template_args: &[String]) -> Result<LoweredKind, String> {
    let target_name = template_args.first().ok_or_else(|| "convert<T>(...) requires exactly one template argument".to_string())?;
    let target = super::num_kind_from_type_name(target_name)
        .ok_or_else(|| format!("convert<{target_name}>: only numeric target types are supported by the lowerer"))?;
    let from = lower_expr(ctx, &args[0])?.num()?;
    if from == target {
        return Ok(LoweredKind::Num(target));
    }
    let op = conv_opcode(from, target).ok_or_else(|| format!("no conversion from {from} to {target}"))?;
    ctx.emit_bare(op);
    Ok(LoweredKind::Num(target))
}

fn lower_location(ctx: &mut Ctx, args: &[Expr]) -> Result<LoweredKind, String> {
    let Expr::Name { name, .. } = &args[0] else {
        return Err("location(x) requires x to be a local binding".to_string());
    };
    match ctx.lookup(name) {
        Some(Local::Num { slot, kind }) => {
            ctx.emit(IrOpcode::AddressOfLocal, slot as u64);
            Ok(LoweredKind::Pointer(kind))
        }
        Some(Local::Array { base, elem, .. }) => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            Ok(LoweredKind::Pointer(elem))
        }
        Some(Local::Vector { base, elem, .. }) => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            Ok(LoweredKind::Pointer(elem))
        }
        _ => Err(format!("location(...) cannot take the address of '{name}'")),
    }
}

fn lower_dereference(ctx: &mut Ctx, args: &[Expr]) -> Result<LoweredKind, String> {
    let pointee = match lower_expr(ctx, &args[0])? {
        LoweredKind::Pointer(k) => k,
        LoweredKind::Num(_) => return Err("dereference(...) requires a Pointer<T>/Reference<T>".to_string()),
    };
    ctx.emit_bare(IrOpcode::LoadIndirect);
    Ok(LoweredKind::Num(pointee))
}

fn lower_count_capacity(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    let Expr::Name { name: target, .. } = &args[0] else {
        return Err(format!("'{name}' target must be a local binding name"));
    };
    match ctx.lookup(target) {
        Some(Local::Array { len, .. }) => {
            ctx.emit(IrOpcode::PushImmI32, len as u64);
            Ok(LoweredKind::Num(NumKind::I32))
        }
        Some(Local::Vector { capacity, count_slot, .. }) => {
            if name == "capacity" {
                ctx.emit(IrOpcode::PushImmI32, capacity as u64);
            } else {
                ctx.emit(IrOpcode::LoadLocal, count_slot as u64);
            }
            Ok(LoweredKind::Num(NumKind::I32))
        }
        _ => Err(format!("'{name}' target '{target}' is not an array/vector binding")),
    }
}

fn lower_index(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    let Expr::Name { name: target, .. } = &args[0] else {
        return Err(format!("'{name}' target must be a local binding name"));
    };
    let checked = name == "at";
    match ctx.lookup(target) {
        Some(Local::Argv) => Err(format!(
            "'{name}' on the argv parameter only has a defined meaning as a direct print argument"
        )),
        Some(Local::Array { base, len, elem }) => {
            let idx_slot = lower_index_value(ctx, name, &args[1])?;
            if checked {
                emit_range_guard(ctx, idx_slot, RangeBound::Constant(len), "array index out of bounds");
            }
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            ctx.emit(IrOpcode::LoadLocal, idx_slot as u64);
            ctx.emit_bare(IrOpcode::AtArray);
            ctx.emit_bare(IrOpcode::LoadIndirect);
            Ok(LoweredKind::Num(elem))
        }
        Some(Local::Vector { base, count_slot, elem, .. }) => {
            let idx_slot = lower_index_value(ctx, name, &args[1])?;
            if checked {
                emit_range_guard(ctx, idx_slot, RangeBound::Local(count_slot), "array index out of bounds");
            }
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            ctx.emit(IrOpcode::LoadLocal, idx_slot as u64);
            ctx.emit_bare(IrOpcode::AtVector);
            ctx.emit_bare(IrOpcode::LoadIndirect);
            Ok(LoweredKind::Num(elem))
        }
        _ => Err(format!("'{name}' target '{target}' must be an array/vector binding")),
    }
}

/// Lowers an index expression into a fresh local (rather than leaving
/// it on the stack), so the bounds guard and the actual address
/// arithmetic can each reload it independently.
fn lower_index_value(ctx: &mut Ctx, name: &str, index: &Expr) -> Result<u32, String> {
    let idx_kind = lower_expr(ctx, index)?.num()?;
    if !idx_kind.is_integer() {
        return Err(format!("'{name}' index must be an integer, found {idx_kind}"));
    }
    let slot = ctx.new_local();
    ctx.emit(IrOpcode::StoreLocal, slot as u64);
    Ok(slot)
}

enum RangeBound {
    Constant(u32),
    Local(u32),
}

/// Pushes `idx < 0 || idx >= bound` and emits the spec.md §4.6 trap
/// sequence when it's true, for a checked `at` access (spec.md's
/// worked example: `v[9i32]` against a 4-element array exits 3 with
/// "array index out of bounds" at runtime, not a compile-time error).
fn emit_range_guard(ctx: &mut Ctx, idx_slot: u32, bound: RangeBound, message: &str) {
    ctx.emit(IrOpcode::LoadLocal, idx_slot as u64);
    ctx.emit(IrOpcode::PushImmI32, 0);
    ctx.emit_bare(IrOpcode::LtI32);
    ctx.emit(IrOpcode::LoadLocal, idx_slot as u64);
    match bound {
        RangeBound::Constant(len) => ctx.emit(IrOpcode::PushImmI32, len as u64),
        RangeBound::Local(slot) => ctx.emit(IrOpcode::LoadLocal, slot as u64),
    };
    ctx.emit_bare(IrOpcode::GeI32);
    ctx.emit_bare(IrOpcode::BoolOr);
    super::emit_bounds_trap(ctx, message);
}

fn lower_assign(ctx: &mut Ctx, args: &[Expr]) -> Result<LoweredKind, String> {
    match &args[0] {
        Expr::Name { name, .. } => {
            let Some(Local::Num { slot, kind }) = ctx.lookup(name) else {
                return Err(format!("'{name}' is not a mutable numeric binding"));
            };
            let value_kind = lower_expr(ctx, &args[1])?.num()?;
            if value_kind != kind {
                return Err(format!("assign to '{name}': numeric kind mismatch ({kind} vs {value_kind})"));
            }
            ctx.emit(IrOpcode::StoreLocal, slot as u64);
            ctx.emit(IrOpcode::PushImmBool, 1);
            Ok(LoweredKind::Num(NumKind::Bool))
        }
        Expr::Call { name, args: deref_args, .. } if name == "dereference" => {
            let pointee = match lower_expr(ctx, &deref_args[0])? {
                LoweredKind::Pointer(k) => k,
                LoweredKind::Num(_) => return Err("assignment target must be a Pointer<T>/Reference<T>".to_string()),
            };
            let value_kind = lower_expr(ctx, &args[1])?.num()?;
            if value_kind != pointee {
                return Err(format!("assign through pointer: numeric kind mismatch ({pointee} vs {value_kind})"));
            }
            ctx.emit_bare(IrOpcode::StoreIndirect);
            ctx.emit(IrOpcode::PushImmBool, 1);
            Ok(LoweredKind::Num(NumKind::Bool))
        }
        _ => Err("assign(...) target must be a mutable binding or a pointer dereference".to_string()),
    }
}

fn lower_incr_decr(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    let delta_op = |kind: NumKind, increment: bool| -> Option<IrOpcode> {
        arith_opcode(if increment { ArithOp::Add } else { ArithOp::Sub }, kind)
    };
    let increment = name == "increment";
    match &args[0] {
        Expr::Name { name: var, .. } => {
            let Some(Local::Num { slot, kind }) = ctx.lookup(var) else {
                return Err(format!("'{var}' is not a mutable numeric binding"));
            };
            ctx.emit(IrOpcode::LoadLocal, slot as u64);
            push_literal(ctx, kind, 1);
            let op = delta_op(kind, increment).ok_or_else(|| format!("'{name}' is not supported for kind {kind}"))?;
            ctx.emit_bare(op);
            ctx.emit(IrOpcode::StoreLocal, slot as u64);
            ctx.emit(IrOpcode::LoadLocal, slot as u64);
            Ok(LoweredKind::Num(kind))
        }
        Expr::Call { name: inner, args: deref_args, .. } if inner == "dereference" => {
            let pointee = match lower_expr(ctx, &deref_args[0])? {
                LoweredKind::Pointer(k) => k,
                LoweredKind::Num(_) => return Err(format!("'{name}' target must be a Pointer<T>/Reference<T>")),
            };
            let addr_slot = ctx.new_local();
            ctx.emit(IrOpcode::StoreLocal, addr_slot as u64);
            ctx.emit(IrOpcode::LoadLocal, addr_slot as u64);
            ctx.emit_bare(IrOpcode::LoadIndirect);
            push_literal(ctx, pointee, 1);
            let op = delta_op(pointee, increment).ok_or_else(|| format!("'{name}' is not supported for kind {pointee}"))?;
            ctx.emit_bare(op);
            let val_slot = ctx.new_local();
            ctx.emit(IrOpcode::StoreLocal, val_slot as u64);
            ctx.emit(IrOpcode::LoadLocal, addr_slot as u64);
            ctx.emit(IrOpcode::LoadLocal, val_slot as u64);
            ctx.emit_bare(IrOpcode::StoreIndirect);
            ctx.emit(IrOpcode::LoadLocal, val_slot as u64);
            Ok(LoweredKind::Num(pointee))
        }
        _ => Err(format!("'{name}' target must be a mutable binding or a pointer dereference")),
    }
}

fn lower_collection_constructor(ctx: &mut Ctx, name: &str, args: &[Expr], template_args: &[String]) -> Result<LoweredKind, String> {
    let elem_name = template_args.first().ok_or_else(|| format!("{name}<T>(...) requires exactly one template argument"))?;
    let elem = super::num_kind_from_type_name(elem_name)
        .ok_or_else(|| format!("{name}<{elem_name}>: only numeric element types are supported by the lowerer"))?;
    let len = args.len() as u32;
    let base = ctx.reserve_locals(len.max(1));
    for (i, a) in args.iter().enumerate() {
        let kind = lower_expr(ctx, a)?.num()?;
        if kind != elem {
            return Err(format!("{name}<{elem}> element {i}: kind mismatch ({elem} vs {kind})"));
        }
        ctx.emit(IrOpcode::StoreLocal, (base + i as u32) as u64);
    }
    // A constructed-in-place collection has no name to bind it to at
    // this call site; the only thing a caller can usefully do with it
    // is bind it (`lower_binding` intercepts that before reaching
    // here) or take its address immediately.
    ctx.emit(IrOpcode::AddressOfLocal, base as u64);
    Ok(LoweredKind::Pointer(elem))
}

fn lower_builtin(ctx: &mut Ctx, name: &str, spec: builtins::BuiltinSpec, args: &[Expr]) -> Result<LoweredKind, String> {
    if args.len() != spec.arity {
        return Err(format!("builtin '{name}' expects {} argument(s), found {}", spec.arity, args.len()));
    }
    match spec.kind_rule {
        KindRule::SameNumericOrPointerOffset => lower_arith(ctx, name, args),
        KindRule::Comparable => lower_comparable(ctx, name, args),
        KindRule::Logical => lower_logical(ctx, name, args),
        KindRule::Pow => lower_pow(ctx, args),
        KindRule::VectorMutation => lower_vector_mutation(ctx, name, args),
        KindRule::Pathspace => lower_pathspace(ctx, name, args),
        KindRule::Print => unreachable!("print builtins are lowered by lower_print in control_flow, not as expressions"),
        KindRule::CollectionOrStringUnary | KindRule::IndexAccess => {
            unreachable!("count/capacity/at/location/dereference/convert are handled directly in lower_call")
        }
    }
}

fn lower_arith(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    if name == "negate" {
        let kind = lower_expr(ctx, &args[0])?.num()?;
        if kind == NumKind::Bool {
            return Err("negate(...) does not apply to bool".to_string());
        }
        // `Sub` pops (a, b) in push order and computes a - b; to get
        // -x as 0 - x, stash x and push the zero operand first.
        let tmp = ctx.new_local();
        ctx.emit(IrOpcode::StoreLocal, tmp as u64);
        if kind.is_integer() {
            push_literal(ctx, kind, 0);
        } else {
            push_float(ctx, kind, "0")?;
        }
        ctx.emit(IrOpcode::LoadLocal, tmp as u64);
        let op = arith_opcode(ArithOp::Sub, kind).ok_or_else(|| format!("negate(...) is not supported for kind {kind}"))?;
        ctx.emit_bare(op);
        return Ok(LoweredKind::Num(kind));
    }
    let base_op = match name {
        "plus" => ArithOp::Add,
        "minus" => ArithOp::Sub,
        "multiply" => ArithOp::Mul,
        "divide" => ArithOp::Div,
        _ => unreachable!("unexpected arithmetic builtin '{name}'"),
    };
    let lhs = lower_expr(ctx, &args[0])?;
    match lhs {
        LoweredKind::Pointer(pointee) => {
            let rhs = lower_expr(ctx, &args[1])?.num()?;
            if !rhs.is_integer() {
                return Err(format!("'{name}': pointer operand requires an integer offset, found {rhs}"));
            }
            let op = match base_op {
                ArithOp::Add => IrOpcode::PtrAdd,
                ArithOp::Sub => IrOpcode::PtrSub,
                _ => return Err(format!("'{name}': pointer arithmetic only supports plus/minus")),
            };
            ctx.emit_bare(op);
            Ok(LoweredKind::Pointer(pointee))
        }
        LoweredKind::Num(lhs_kind) => {
            let rhs_kind = lower_expr(ctx, &args[1])?.num()?;
            if lhs_kind != rhs_kind {
                return Err(format!("'{name}': numeric kind mismatch ({lhs_kind} vs {rhs_kind})"));
            }
            let op = arith_opcode(base_op, lhs_kind).ok_or_else(|| format!("'{name}' is not supported for kind {lhs_kind}"))?;
            ctx.emit_bare(op);
            Ok(LoweredKind::Num(lhs_kind))
        }
    }
}

fn lower_comparable(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    let lhs = lower_expr(ctx, &args[0])?.num()?;
    let rhs = lower_expr(ctx, &args[1])?.num()?;
    if lhs != rhs {
        return Err(format!("'{name}': numeric kind mismatch ({lhs} vs {rhs})"));
    }
    let base_op = match name {
        "equal" => CmpOp::Eq,
        "not_equal" => CmpOp::Ne,
        "less_than" => CmpOp::Lt,
        "less_than_or_equal" => CmpOp::Le,
        "greater_than" => CmpOp::Gt,
        "greater_than_or_equal" => CmpOp::Ge,
        _ => unreachable!("unexpected comparison builtin '{name}'"),
    };
    let op = cmp_opcode(base_op, lhs).ok_or_else(|| format!("'{name}' is not supported for kind {lhs}"))?;
    ctx.emit_bare(op);
    Ok(LoweredKind::Num(NumKind::Bool))
}

fn lower_logical(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    for a in args {
        let kind = lower_expr(ctx, a)?.num()?;
        if kind != NumKind::Bool {
            return Err(format!("'{name}' operand must be bool, found {kind}"));
        }
    }
    let op = match name {
        "and" => IrOpcode::BoolAnd,
        "or" => IrOpcode::BoolOr,
        "not" => IrOpcode::BoolNot,
        _ => unreachable!("unexpected logical builtin '{name}'"),
    };
    ctx.emit_bare(op);
    Ok(LoweredKind::Num(NumKind::Bool))
}

fn lower_pow(ctx: &mut Ctx, args: &[Expr]) -> Result<LoweredKind, String> {
    let lhs = lower_expr(ctx, &args[0])?.num()?;
    let rhs = lower_expr(ctx, &args[1])?.num()?;
    if lhs.is_integer() && rhs.is_integer() {
        ctx.emit_bare(IrOpcode::PowInt);
        Ok(LoweredKind::Num(lhs))
    } else if lhs.is_float() && rhs.is_float() {
        ctx.emit_bare(IrOpcode::PowFloat);
        Ok(LoweredKind::Num(lhs))
    } else {
        Err("pow(...) requires two integer or two float operands".to_string())
    }
}

fn lower_vector_mutation(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    let Expr::Name { name: target, .. } = &args[0] else {
        return Err(format!("'{name}' target must be a mutable vector binding"));
    };
    let Some(Local::Vector { base, capacity, count_slot, elem }) = ctx.lookup(target) else {
        return Err(format!("'{name}' target '{target}' must be a vector binding"));
    };

    match name {
        "push" => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            ctx.emit(IrOpcode::LoadLocal, count_slot as u64);
            ctx.emit_bare(IrOpcode::AtVector);
            let value_kind = lower_expr(ctx, &args[1])?.num()?;
            if value_kind != elem {
                return Err(format!("push onto vector<{elem}>: kind mismatch ({elem} vs {value_kind})"));
            }
            ctx.emit_bare(IrOpcode::StoreIndirect);
            bump_count(ctx, count_slot, 1);
        }
        "pop" => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            ctx.emit(IrOpcode::LoadLocal, count_slot as u64);
            ctx.emit_bare(IrOpcode::VecPop);
            bump_count(ctx, count_slot, -1);
        }
        "clear" => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            ctx.emit_bare(IrOpcode::VecClear);
            ctx.emit(IrOpcode::PushImmI32, 0);
            ctx.emit(IrOpcode::StoreLocal, count_slot as u64);
        }
        "reserve" => {
            let _ = capacity;
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            lower_expr(ctx, &args[1])?.num()?;
            ctx.emit_bare(IrOpcode::VecReserve);
        }
        "remove_at" | "remove_swap" => {
            ctx.emit(IrOpcode::AddressOfLocal, base as u64);
            lower_expr(ctx, &args[1])?.num()?;
            let op = if name == "remove_at" { IrOpcode::VecRemoveAt } else { IrOpcode::VecRemoveSwap };
            ctx.emit_bare(op);
            bump_count(ctx, count_slot, -1);
        }
        _ => unreachable!("unexpected vector mutation builtin '{name}'"),
    }
    ctx.emit(IrOpcode::PushImmI32, 0);
    Ok(LoweredKind::Num(NumKind::I32))
}

/// The VM's `VecPush`/`VecPop`/... opcodes are intentionally stubs
/// (spec.md §4.7: no heap, so real growth/compaction isn't modeled);
/// the lowerer keeps `count(vector)` meaningful by maintaining a
/// dedicated count local around every mutation site instead.
fn bump_count(ctx: &mut Ctx, count_slot: u32, delta: i32) {
    ctx.emit(IrOpcode::LoadLocal, count_slot as u64);
    ctx.emit(IrOpcode::PushImmI32, delta.unsigned_abs() as u64);
    ctx.emit_bare(if delta >= 0 { IrOpcode::AddI32 } else { IrOpcode::SubI32 });
    ctx.emit(IrOpcode::StoreLocal, count_slot as u64);
}

fn lower_pathspace(ctx: &mut Ctx, name: &str, args: &[Expr]) -> Result<LoweredKind, String> {
    // notify(key) / insert(key,value) / take(key): first argument must
    // be a string (a pathspace key), subject to the same "direct print
    // argument only" restriction as print's string argument. The key
    // is interned and pushed as its string-table index so the VM's
    // `Notify`/`Insert`/`Take` arm has something to pop; `insert` also
    // pushes its value operand so the opcode's pop-arity (2) balances
    // against what this call puts on the stack.
    let key_idx = match &args[0] {
        Expr::StringLiteral { value, .. } => ctx.intern(value),
        _ => return Err("pathspace builtin's key argument must be a string literal".to_string()),
    };
    ctx.emit(IrOpcode::PushImmI32, key_idx as u64);
    for a in &args[1..] {
        lower_expr(ctx, a)?.num()?;
    }
    let op = match name {
        "notify" => IrOpcode::Notify,
        "insert" => IrOpcode::Insert,
        "take" => IrOpcode::Take,
        _ => unreachable!("unexpected pathspace builtin '{name}'"),
    };
    ctx.emit_bare(op);
    ctx.emit(IrOpcode::PushImmI32, 0);
    Ok(LoweredKind::Num(NumKind::I32))
}
