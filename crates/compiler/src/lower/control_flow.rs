//! Statement lowering: bindings, branches, loops, and `return`
//! (spec.md §4.6). Every `lower_*` function here leaves the operand
//! stack exactly as it found it — a statement's value, if any, is
//! always discarded by storing it into a scratch local rather than
//! left on the stack, since the opcode set has no explicit "drop".

use prime_core::ast::{Expr, Transform};
use prime_core::ir::IrOpcode;
use prime_core::types::NumKind;

use crate::builtins;

use super::expr::{self, LoweredKind};
use super::{emit_return, num_kind_from_type_name, Ctx, Local};

pub(crate) fn lower_block(ctx: &mut Ctx, stmts: &[Expr]) -> Result<(), String> {
    for s in stmts {
        lower_statement(ctx, s)?;
    }
    Ok(())
}

pub(crate) fn lower_statement(ctx: &mut Ctx, stmt: &Expr) -> Result<(), String> {
    let Expr::Call { name, is_binding, binding_name, args, transforms, body_arguments, .. } = stmt else {
        return Ok(());
    };

    if *is_binding {
        return lower_binding(ctx, binding_name.as_deref().unwrap_or(""), args, transforms);
    }

    match name.as_str() {
        "if" => lower_if(ctx, args, body_arguments),
        "loop" => lower_counted_loop(ctx, &args[0], body_arguments),
        "repeat" => lower_counted_loop(ctx, &args[0], body_arguments),
        "while" => lower_while(ctx, &args[0], body_arguments),
        "for" => lower_for(ctx, args, body_arguments),
        "return" => lower_return(ctx, args),
        "print" | "print_line" | "print_error" | "print_line_error" => lower_print(ctx, name, &args[0]),
        _ => {
            let _ = (transforms, body_arguments);
            // A bare-statement call's value (assign/increment/push/pop/
            // a void helper's dummy 0/...) is never consumed; the
            // opcode set has no "drop", so discard it by storing into
            // a scratch local instead of leaving it on the stack.
            expr::lower_expr(ctx, stmt)?;
            let scratch = ctx.new_local();
            ctx.emit(IrOpcode::StoreLocal, scratch as u64);
            Ok(())
        }
    }
}

fn lower_return(ctx: &mut Ctx, args: &[Expr]) -> Result<(), String> {
    match args.first() {
        Some(Expr::Call { name, .. }) if name == "void" => {
            if ctx.return_redirect.is_empty() {
                ctx.emit_bare(IrOpcode::ReturnVoid);
            } else {
                ctx.emit(IrOpcode::PushImmI32, 0);
                emit_return(ctx, NumKind::I32)?;
            }
            Ok(())
        }
        Some(value) => {
            let kind = expr::lower_expr(ctx, value)?;
            let num_kind = match kind {
                LoweredKind::Num(k) => k,
                LoweredKind::Pointer(_) => NumKind::I64,
            };
            emit_return(ctx, num_kind)
        }
        None => {
            if ctx.return_redirect.is_empty() {
                ctx.emit_bare(IrOpcode::ReturnVoid);
            } else {
                ctx.emit(IrOpcode::PushImmI32, 0);
                emit_return(ctx, NumKind::I32)?;
            }
            Ok(())
        }
    }
}

fn lower_if(ctx: &mut Ctx, args: &[Expr], branches: &[Expr]) -> Result<(), String> {
    let cond_kind = expr::lower_expr(ctx, &args[0])?;
    if !matches!(cond_kind, LoweredKind::Num(NumKind::Bool)) {
        return Err("if condition must be bool".to_string());
    }
    let jump_to_else = ctx.emit(IrOpcode::JumpIfZero, 0);

    ctx.push_scope();
    let then_result = lower_block(ctx, envelope_statements(&branches[0]));
    ctx.pop_scope();
    then_result?;

    if branches.len() > 1 {
        let jump_to_end = ctx.emit(IrOpcode::Jump, 0);
        ctx.patch_to_here(jump_to_else);
        ctx.push_scope();
        let else_result = lower_block(ctx, envelope_statements(&branches[1]));
        ctx.pop_scope();
        else_result?;
        ctx.patch_to_here(jump_to_end);
    } else {
        ctx.patch_to_here(jump_to_else);
    }
    Ok(())
}

fn envelope_statements(e: &Expr) -> &[Expr] {
    match e {
        Expr::Call { body_arguments, .. } => body_arguments,
        _ => &[],
    }
}

fn loop_body(branches: &[Expr]) -> Result<&[Expr], String> {
    branches.first().map(envelope_statements).ok_or_else(|| "loop/while/for/repeat require a block-envelope body".to_string())
}

/// `loop(n) { ... }` / `repeat(n) { ... }`: runs the body exactly `n`
/// times, counting down in a hidden local so the count expression is
/// only evaluated once.
fn lower_counted_loop(ctx: &mut Ctx, count_expr: &Expr, branches: &[Expr]) -> Result<(), String> {
    let count_kind = expr::lower_expr(ctx, count_expr)?;
    let NumKind::I32 | NumKind::I64 | NumKind::U64 = (match count_kind {
        LoweredKind::Num(k) => k,
        LoweredKind::Pointer(_) => return Err("loop/repeat count must be an integer".to_string()),
    }) else {
        return Err("loop/repeat count must be an integer".to_string());
    };
    let counter = ctx.new_local();
    ctx.emit(IrOpcode::StoreLocal, counter as u64);

    let start = ctx.instructions.len();
    ctx.emit(IrOpcode::LoadLocal, counter as u64);
    ctx.emit(IrOpcode::PushImmI32, 0);
    ctx.emit_bare(IrOpcode::GtI32);
    let exit_jump = ctx.emit(IrOpcode::JumpIfZero, 0);

    ctx.push_scope();
    let body_result = lower_block(ctx, loop_body(branches)?);
    ctx.pop_scope();
    body_result?;

    ctx.emit(IrOpcode::LoadLocal, counter as u64);
    ctx.emit(IrOpcode::PushImmI32, 1);
    ctx.emit_bare(IrOpcode::SubI32);
    ctx.emit(IrOpcode::StoreLocal, counter as u64);
    ctx.emit(IrOpcode::Jump, start as u64);
    ctx.patch_to_here(exit_jump);
    Ok(())
}

fn lower_while(ctx: &mut Ctx, cond_expr: &Expr, branches: &[Expr]) -> Result<(), String> {
    let start = ctx.instructions.len();
    let cond_kind = expr::lower_expr(ctx, cond_expr)?;
    if !matches!(cond_kind, LoweredKind::Num(NumKind::Bool)) {
        return Err("while condition must be bool".to_string());
    }
    let exit_jump = ctx.emit(IrOpcode::JumpIfZero, 0);

    ctx.push_scope();
    let body_result = lower_block(ctx, loop_body(branches)?);
    ctx.pop_scope();
    body_result?;

    ctx.emit(IrOpcode::Jump, start as u64);
    ctx.patch_to_here(exit_jump);
    Ok(())
}

fn lower_for(ctx: &mut Ctx, args: &[Expr], branches: &[Expr]) -> Result<(), String> {
    if args.len() != 3 {
        return Err("for(init, cond, step) requires exactly three arguments".to_string());
    }
    ctx.push_scope();
    let result = (|| -> Result<(), String> {
        lower_statement(ctx, &args[0])?;

        let start = ctx.instructions.len();
        let cond_kind = expr::lower_expr(ctx, &args[1])?;
        if !matches!(cond_kind, LoweredKind::Num(NumKind::Bool)) {
            return Err("for condition must be bool".to_string());
        }
        let exit_jump = ctx.emit(IrOpcode::JumpIfZero, 0);

        ctx.push_scope();
        let body_result = lower_block(ctx, loop_body(branches)?);
        ctx.pop_scope();
        body_result?;

        lower_statement(ctx, &args[2])?;
        ctx.emit(IrOpcode::Jump, start as u64);
        ctx.patch_to_here(exit_jump);
        Ok(())
    })();
    ctx.pop_scope();
    result
}

const BINDING_REJECTED_TRANSFORMS: &[&str] = &["stack", "heap", "buffer", "effects", "capabilities", "return"];

fn lower_binding(ctx: &mut Ctx, name: &str, args: &[Expr], transforms: &[Transform]) -> Result<(), String> {
    for t in transforms {
        if BINDING_REJECTED_TRANSFORMS.contains(&t.name.as_str()) {
            return Err(format!("'{}' transform is not allowed on binding '{name}'", t.name));
        }
    }
    let init = args.first().ok_or_else(|| format!("binding '{name}' requires exactly one initializer expression"))?;

    // Collections get dedicated local storage the name resolves to
    // directly; everything else goes through the uniform expr path.
    if let Expr::Call { name: ctor, args: ctor_args, template_args, .. } = init {
        if ctor == "array" {
            bind_array(ctx, name, ctor_args, template_args)?;
            return Ok(());
        }
        if ctor == "vector" {
            bind_vector(ctx, name, ctor_args, template_args, transforms)?;
            return Ok(());
        }
    }

    let kind = expr::lower_expr(ctx, init)?;
    let slot = ctx.new_local();
    ctx.emit(IrOpcode::StoreLocal, slot as u64);
    let local = match kind {
        LoweredKind::Num(k) => Local::Num { slot, kind: k },
        LoweredKind::Pointer(k) => Local::Pointer { slot, pointee: k },
    };
    ctx.bind(name.to_string(), local);
    Ok(())
}

fn bind_array(ctx: &mut Ctx, name: &str, elements: &[Expr], template_args: &[String]) -> Result<(), String> {
    let elem_name = template_args.first().ok_or_else(|| "array<T>(...) requires exactly one template argument".to_string())?;
    let elem = num_kind_from_type_name(elem_name).ok_or_else(|| format!("array<{elem_name}>: only numeric element types are supported"))?;
    let len = elements.len() as u32;
    let base = ctx.reserve_locals(len.max(1));
    for (i, e) in elements.iter().enumerate() {
        let kind = expr::lower_expr(ctx, e)?;
        let LoweredKind::Num(k) = kind else { return Err(format!("array<{elem}> element {i} must be numeric")) };
        if k != elem {
            return Err(format!("array<{elem}> element {i}: kind mismatch ({elem} vs {k})"));
        }
        ctx.emit(IrOpcode::StoreLocal, (base + i as u32) as u64);
    }
    ctx.bind(name.to_string(), Local::Array { base, len, elem });
    Ok(())
}

fn bind_vector(ctx: &mut Ctx, name: &str, elements: &[Expr], template_args: &[String], transforms: &[Transform]) -> Result<(), String> {
    let elem_name = template_args.first().ok_or_else(|| "vector<T>(...) requires exactly one template argument".to_string())?;
    let elem = num_kind_from_type_name(elem_name).ok_or_else(|| format!("vector<{elem_name}>: only numeric element types are supported"))?;
    let initial_len = elements.len() as u32;
    let capacity = explicit_capacity(transforms).unwrap_or(initial_len.max(4));
    if initial_len > capacity {
        return Err(format!("vector<{elem}> '{name}': {initial_len} initial elements exceed capacity {capacity}"));
    }
    let base = ctx.reserve_locals(capacity.max(1));
    for (i, e) in elements.iter().enumerate() {
        let kind = expr::lower_expr(ctx, e)?;
        let LoweredKind::Num(k) = kind else { return Err(format!("vector<{elem}> element {i} must be numeric")) };
        if k != elem {
            return Err(format!("vector<{elem}> element {i}: kind mismatch ({elem} vs {k})"));
        }
        ctx.emit(IrOpcode::StoreLocal, (base + i as u32) as u64);
    }
    let count_slot = ctx.new_local();
    ctx.emit(IrOpcode::PushImmI32, initial_len as u64);
    ctx.emit(IrOpcode::StoreLocal, count_slot as u64);
    ctx.bind(name.to_string(), Local::Vector { base, capacity, count_slot, elem });
    Ok(())
}

fn explicit_capacity(transforms: &[Transform]) -> Option<u32> {
    transforms.iter().find(|t| t.name == "buffer").and_then(|t| match t.arguments.first() {
        Some(Expr::Literal { value, .. }) => Some(*value as u32),
        _ => None,
    })
}

fn lower_print(ctx: &mut Ctx, name: &str, arg: &Expr) -> Result<(), String> {
    let newline = builtins::print_adds_newline(name);
    let stderr = builtins::print_is_stderr(name);

    match arg {
        Expr::StringLiteral { value, .. } => {
            let idx = ctx.intern(value);
            ctx.emit(IrOpcode::PrintString, prime_core::ir::encode_string_print(idx, newline, stderr));
            Ok(())
        }
        Expr::Call { name: at_name, args, .. } if at_name == "at" || at_name == "at_unsafe" => {
            let Expr::Name { name: target, .. } = &args[0] else {
                return Err(format!("'{name}' argument's index target must be a local binding"));
            };
            if !matches!(ctx.lookup(target), Some(Local::Argv)) {
                return lower_print_numeric(ctx, name, arg, newline, stderr);
            }
            let idx_kind = expr::lower_expr(ctx, &args[1])?;
            if !matches!(idx_kind, LoweredKind::Num(k) if k.is_integer()) {
                return Err(format!("'{name}' argv index must be an integer"));
            }
            let op = if at_name == "at" { IrOpcode::PrintArgv } else { IrOpcode::PrintArgvUnsafe };
            ctx.emit(op, prime_core::ir::encode_print_flags(newline, stderr));
            Ok(())
        }
        _ => lower_print_numeric(ctx, name, arg, newline, stderr),
    }
}

fn lower_print_numeric(ctx: &mut Ctx, name: &str, arg: &Expr, newline: bool, stderr: bool) -> Result<(), String> {
    let kind = expr::lower_expr(ctx, arg)?;
    let imm = prime_core::ir::encode_print_flags(newline, stderr);
    match kind {
        LoweredKind::Num(NumKind::Bool) => ctx.emit(IrOpcode::PrintBool, imm),
        LoweredKind::Num(NumKind::U64) => ctx.emit(IrOpcode::PrintUnsigned, imm),
        LoweredKind::Num(k) if k.is_integer() => ctx.emit(IrOpcode::PrintInt, imm),
        _ => return Err(format!("'{name}' argument must be integer/bool or string")),
    };
    Ok(())
}
