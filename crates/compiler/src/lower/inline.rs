//! Definition-call inlining (spec.md §4.6: "inline-everything" — every
//! call to a non-entry definition is expanded at its call site rather
//! than kept as a separate `IrFunction`).

use prime_core::ast::{Definition, Expr};

use super::expr::LoweredKind;
use super::{control_flow, declared_return_kind, Ctx, Local};

/// Inlines a call to `def`. `arg_kinds[i]`'s value must already be on
/// the operand stack, pushed in argument order by the caller (so the
/// last argument is on top) — this pops them into fresh per-parameter
/// locals, lowers the body in a redirected-return scope, and leaves
/// the call's result value on the stack.
pub(crate) fn inline_call(ctx: &mut Ctx, def: &Definition, arg_kinds: &[LoweredKind]) -> Result<LoweredKind, String> {
    if !ctx.inlining.insert(def.full_path.clone()) {
        return Err(format!("recursive definition call: {}", def.full_path));
    }

    let result = inline_call_inner(ctx, def, arg_kinds);

    ctx.inlining.remove(&def.full_path);
    result
}

fn inline_call_inner(ctx: &mut Ctx, def: &Definition, arg_kinds: &[LoweredKind]) -> Result<LoweredKind, String> {
    if def.params.len() != arg_kinds.len() {
        return Err(format!("'{}' expects {} argument(s), found {}", def.full_path, def.params.len(), arg_kinds.len()));
    }

    ctx.push_scope();
    let param_result = (|| -> Result<(), String> {
        // Pop arguments in reverse (stack top = last argument) into
        // fresh locals, one per parameter, in declaration order.
        let mut param_locals = Vec::with_capacity(def.params.len());
        for _ in &def.params {
            param_locals.push(ctx.new_local());
        }
        for (i, param) in def.params.iter().enumerate().rev() {
            let Expr::Call { binding_name: Some(name), .. } = param else {
                return Err(format!("malformed parameter in definition '{}'", def.full_path));
            };
            let slot = param_locals[i];
            ctx.emit(prime_core::ir::IrOpcode::StoreLocal, slot as u64);
            let local = match arg_kinds[i] {
                LoweredKind::Num(k) => Local::Num { slot, kind: k },
                LoweredKind::Pointer(k) => Local::Pointer { slot, pointee: k },
            };
            ctx.bind(name.clone(), local);
        }
        Ok(())
    })();
    if let Err(e) = param_result {
        ctx.pop_scope();
        return Err(e);
    }

    let return_kind = declared_return_kind(def);
    let result_slot = ctx.new_local();
    ctx.return_redirect.push((result_slot, Vec::new()));

    let body_result = control_flow::lower_block(ctx, &def.statements);
    let tail_result = body_result.and_then(|()| match &def.return_expr {
        Some(Expr::Call { name, .. }) if name == "void" => {
            ctx.emit(prime_core::ir::IrOpcode::PushImmI32, 0);
            ctx.emit(prime_core::ir::IrOpcode::StoreLocal, result_slot as u64);
            Ok(())
        }
        Some(ret) => {
            let kind = super::expr::lower_expr(ctx, ret)?;
            let value_kind = match kind {
                LoweredKind::Num(_) | LoweredKind::Pointer(_) => kind,
            };
            let _ = value_kind;
            ctx.emit(prime_core::ir::IrOpcode::StoreLocal, result_slot as u64);
            Ok(())
        }
        None => {
            // No explicit trailing return expression: every path must
            // already have ended in a `return(...)` statement inside
            // the block (validator's return-coverage check, or this
            // definition is void).
            Ok(())
        }
    });

    let (_, pending) = ctx.return_redirect.pop().expect("pushed above");
    for at in pending {
        ctx.patch_to_here(at);
    }
    ctx.pop_scope();

    tail_result?;
    ctx.emit(prime_core::ir::IrOpcode::LoadLocal, result_slot as u64);
    Ok(LoweredKind::Num(return_kind))
}
