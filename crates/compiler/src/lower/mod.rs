//! IR lowerer (spec.md §4.6): walks a validated `Program` and produces
//! a single-function `IrModule`.
//!
//! "Inline-everything": the entry definition becomes the module's only
//! `IrFunction`; every other definition call is expanded in place at
//! the call site (`inline::inline_call`). Recursion — a call chain
//! that re-enters a definition already being inlined — is a lowering
//! error, not a validator concern (spec.md §4.6).
//!
//! Split into submodules mirroring `validate`'s own split:
//! `expr` (expression/value lowering and numeric kind tracking),
//! `inline` (definition call expansion), `control_flow` (statements,
//! branches, loops, and return redirection for inlined bodies).

mod control_flow;
mod expr;
mod inline;

use std::collections::{HashMap, HashSet};

use prime_core::ast::{Definition, Expr, Transform};
use prime_core::ir::{IrFunction, IrInstruction, IrModule, IrOpcode};
use prime_core::types::NumKind;
use prime_core::Program;

use crate::validate;

pub(crate) use expr::LoweredKind;

/// A name bound in the current lowering scope: either a plain numeric
/// local, the special argv parameter (no backing storage — only
/// meaningful as `at(args, i)` fed straight into a print builtin), or
/// a fixed-size array of contiguous numeric locals.
#[derive(Clone)]
pub(crate) enum Local {
    Num { slot: u32, kind: NumKind },
    Pointer { slot: u32, pointee: NumKind },
    Argv,
    Array { base: u32, len: u32, elem: NumKind },
    Vector { base: u32, capacity: u32, count_slot: u32, elem: NumKind },
}

/// Per-call lowering state. One `Ctx` is built per `lower_program`
/// call and threaded through every submodule function.
pub(crate) struct Ctx<'a> {
    pub(crate) program: &'a Program,
    pub(crate) definitions: HashMap<String, &'a Definition>,
    /// Reuses `validate`'s own name-resolution and type-resolution
    /// logic rather than re-implementing import/alias lookup here.
    pub(crate) vctx: validate::Context<'a>,
    pub(crate) instructions: Vec<IrInstruction>,
    pub(crate) local_count: u32,
    pub(crate) scopes: Vec<HashMap<String, Local>>,
    pub(crate) strings: Vec<String>,
    string_index: HashMap<String, u32>,
    /// Full paths of definitions currently being inlined, for
    /// recursion detection (spec.md §4.6: "recursive definition call").
    pub(crate) inlining: HashSet<String>,
    /// `Some((result_slot, pending jump-to-end indices))` while
    /// lowering an inlined definition's body; `return(expr)` statements
    /// store into `result_slot` and jump to the end instead of
    /// emitting a real `Return*` opcode. `None` at the entry's own
    /// top level, where `return` really does end the program.
    pub(crate) return_redirect: Vec<(u32, Vec<usize>)>,
}

impl<'a> Ctx<'a> {
    fn new(program: &'a Program) -> Self {
        let mut definitions = HashMap::new();
        for def in &program.definitions {
            definitions.insert(def.full_path.clone(), def);
        }
        Ctx {
            program,
            definitions,
            vctx: validate::Context::new(program),
            instructions: Vec::new(),
            local_count: 0,
            scopes: vec![HashMap::new()],
            strings: Vec::new(),
            string_index: HashMap::new(),
            inlining: HashSet::new(),
            return_redirect: Vec::new(),
        }
    }

    pub(crate) fn new_local(&mut self) -> u32 {
        let slot = self.local_count;
        self.local_count += 1;
        slot
    }

    pub(crate) fn reserve_locals(&mut self, count: u32) -> u32 {
        let base = self.local_count;
        self.local_count += count;
        base
    }

    pub(crate) fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.string_index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx
    }

    pub(crate) fn emit(&mut self, op: IrOpcode, imm: u64) -> usize {
        let at = self.instructions.len();
        self.instructions.push(IrInstruction::new(op, imm));
        at
    }

    pub(crate) fn emit_bare(&mut self, op: IrOpcode) -> usize {
        self.emit(op, 0)
    }

    /// Patches a previously-emitted jump's immediate to the current
    /// (next) instruction index.
    pub(crate) fn patch_to_here(&mut self, at: usize) {
        let here = self.instructions.len() as u64;
        self.instructions[at].imm = here;
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn bind(&mut self, name: String, local: Local) {
        self.scopes.last_mut().expect("at least one scope is always active").insert(name, local);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    pub(crate) fn resolve_definition(&self, name: &str) -> Option<&'a Definition> {
        let path = self.vctx.resolve_definition_path(name)?;
        self.definitions.get(&path).copied()
    }
}

fn declared_return_kind(def: &Definition) -> NumKind {
    for t in &def.transforms {
        if t.name == "return" {
            if let Some(name) = t.template_args.first() {
                if let Some(k) = num_kind_from_type_name(name) {
                    return k;
                }
            }
        }
    }
    NumKind::I32
}

fn num_kind_from_type_name(name: &str) -> Option<NumKind> {
    match name {
        "i32" | "int" => Some(NumKind::I32),
        "i64" => Some(NumKind::I64),
        "u64" => Some(NumKind::U64),
        "f32" | "float" => Some(NumKind::F32),
        "f64" => Some(NumKind::F64),
        "bool" => Some(NumKind::Bool),
        _ => None,
    }
}

fn is_void_return(def: &Definition) -> bool {
    matches!(&def.return_expr, Some(Expr::Call { name, .. }) if name == "void") || def.return_expr.is_none()
}

fn is_argv_param(transforms: &[Transform]) -> bool {
    transforms.iter().any(|t| t.name == "array" && t.template_args.first().map(String::as_str) == Some("string"))
}

/// Entry point (spec.md §4.6): lowers `program`'s `entry_path`
/// definition — and everything it transitively calls, inlined — into
/// a single-function `IrModule`. Assumes `validate::validate` already
/// accepted `program` against the same `entry_path`/`default_effects`.
pub fn lower_program(program: &Program, entry_path: &str, _default_effects: &[String]) -> Result<IrModule, String> {
    let entry = program.find_definition(entry_path).ok_or_else(|| format!("entry definition not found: {entry_path}"))?;

    let mut ctx = Ctx::new(program);

    // Entry params are bound in reverse: the VM has no calling
    // convention beyond "arguments are whatever the driver puts in
    // argv", so the only entry parameter this toolchain supports is
    // the conventional `array<string> args` — it becomes `Local::Argv`
    // and consumes no stack value at all.
    for param in &entry.params {
        let Expr::Call { binding_name: Some(name), transforms, .. } = param else {
            return Err(format!("malformed parameter in definition '{}'", entry.full_path));
        };
        if !is_argv_param(transforms) {
            return Err(format!("entry parameter '{name}' must be declared as array<string>"));
        }
        ctx.bind(name.clone(), Local::Argv);
    }

    control_flow::lower_block(&mut ctx, &entry.statements)?;

    if let Some(ret) = &entry.return_expr {
        if matches!(ret, Expr::Call { name, .. } if name == "void") {
            ctx.emit_bare(IrOpcode::ReturnVoid);
        } else {
            let kind = expr::lower_expr(&mut ctx, ret)?;
            let num_kind = match kind {
                LoweredKind::Num(k) => k,
                LoweredKind::Pointer(_) => NumKind::I64,
            };
            emit_return(&mut ctx, num_kind)?;
        }
    } else if is_void_return(entry) && !ends_in_return(&entry.statements) {
        ctx.emit_bare(IrOpcode::ReturnVoid);
    } else if !ends_in_return(&entry.statements) {
        // Validator's return-coverage check already guarantees every
        // path returns when a return type is declared; this is a
        // fallback for entries with no declared return transform.
        ctx.emit(IrOpcode::PushImmI32, 0);
        ctx.emit_bare(IrOpcode::ReturnI32);
    }

    let struct_layouts = validate::compute_all_struct_layouts(program)?;

    Ok(IrModule {
        functions: vec![IrFunction { name: entry.name().to_string(), instructions: ctx.instructions, local_count: ctx.local_count }],
        string_table: ctx.strings,
        struct_layouts,
        entry_index: 0,
    })
}

fn ends_in_return(stmts: &[Expr]) -> bool {
    matches!(stmts.last(), Some(Expr::Call { name, .. }) if name == "return")
}

/// Emits the checked-`at` trap sequence spec.md §4.6 requires: assumes
/// an "is out of bounds" bool has just been pushed, and emits
/// `JumpIfZero` past a literal `PrintString` of `message` plus
/// `ReturnI32(3)` — the `JumpIfZero` skips the trap when the popped
/// bool is zero (in bounds); an out-of-bounds access falls straight
/// into the trap and never returns to the caller.
pub(crate) fn emit_bounds_trap(ctx: &mut Ctx, message: &str) {
    let skip = ctx.emit(IrOpcode::JumpIfZero, 0);
    let idx = ctx.intern(message);
    ctx.emit(IrOpcode::PrintString, prime_core::ir::encode_string_print(idx, true, true));
    ctx.emit(IrOpcode::PushImmI32, 3);
    ctx.emit_bare(IrOpcode::ReturnI32);
    ctx.patch_to_here(skip);
}

pub(crate) fn emit_return(ctx: &mut Ctx, kind: NumKind) -> Result<(), String> {
    if let Some((slot, pending)) = ctx.return_redirect.last_mut() {
        let slot = *slot;
        ctx.emit(IrOpcode::StoreLocal, slot as u64);
        let jump_at = ctx.emit(IrOpcode::Jump, 0);
        ctx.return_redirect.last_mut().unwrap().1.push(jump_at);
        let _ = pending;
    } else {
        ctx.emit_bare(prime_core::ir::return_opcode(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn lower_src(src: &str, entry: &str) -> IrModule {
        let program = parse_program(src).unwrap();
        validate::validate(&program, entry, &[]).unwrap();
        lower_program(&program, entry, &[]).unwrap()
    }

    #[test]
    fn lowers_a_minimal_return() {
        let module = lower_src("[return<int>] main() { return(42i32) }", "/main");
        let main = module.entry().unwrap();
        assert!(matches!(main.instructions.last().unwrap().op, IrOpcode::ReturnI32));
    }

    #[test]
    fn inlines_a_simple_helper_call() {
        let module = lower_src(
            "[return<int>] add_one(x) { return(plus(x, 1i32)) } [return<int>] main() { return(add_one(41i32)) }",
            "/main",
        );
        let main = module.entry().unwrap();
        // Only one function survives lowering: the helper is expanded inline.
        assert_eq!(module.functions.len(), 1);
        assert!(main.instructions.iter().any(|i| i.op == IrOpcode::AddI32));
    }

    #[test]
    fn rejects_recursive_inlining() {
        let program = parse_program(
            "[return<int>] loopy(x) { return(loopy(x)) } [return<int>] main() { return(loopy(1i32)) }",
        )
        .unwrap();
        validate::validate(&program, "/main", &[]).unwrap();
        let err = lower_program(&program, "/main", &[]).unwrap_err();
        assert!(err.contains("recursive"), "got: {err}");
    }

    #[test]
    fn prints_an_argv_element_with_bounds_check() {
        let module = lower_src(
            "[return<int> effects(io_out)] main([array<string>] args) { print_line(args[1i32]) return(0i32) }",
            "/main",
        );
        let main = module.entry().unwrap();
        assert!(main.instructions.iter().any(|i| i.op == IrOpcode::PrintArgv));
    }
}
