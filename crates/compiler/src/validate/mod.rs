//! Semantic validator (spec.md §4.5) — "the largest subsystem".
//!
//! Entry point: [`validate`]. Walks every definition once: structs go
//! through [`layout::compute_layout`], callables get their statements
//! and return expression type-checked against a `Context` that tracks
//! local bindings, the active effect set, and the definition table for
//! name resolution.

pub(crate) mod layout;
pub(crate) mod types;

use prime_core::ast::{Definition, Expr, Transform};
use prime_core::types::{effect, NumKind, Type};
use prime_core::Program;
use std::collections::{HashMap, HashSet};

use crate::builtins::{self, KindRule};

struct BindingInfo {
    ty: Type,
    mutable: bool,
    is_param: bool,
}

/// Shared state threaded through a single `validate` call. Mirrors
/// spec.md §9's design note ("pass a `Context { defMap, bindings[stack],
/// effects[stack], errors }` explicitly") rather than the teacher's/
/// original's mutable-class-of-maps style.
pub struct Context<'a> {
    pub program: &'a Program,
    pub definitions: HashMap<String, &'a Definition>,
    imports: Vec<ImportEntry>,
    default_effects: HashSet<String>,
    scopes: Vec<HashMap<String, BindingInfo>>,
    active_effects: Vec<HashSet<String>>,
    /// Definitions whose return type is currently being inferred, to
    /// break cycles without rejecting recursion here — spec.md §4.6
    /// makes recursive definitions a *lowering* error
    /// ("recursive definition call: <path>"), not a validation one.
    resolving: HashSet<String>,
}

struct ImportEntry {
    alias: Option<String>,
    prefix: String,
    wildcard: bool,
}

impl<'a> Context<'a> {
    /// Builds a context with no default effects, for layout-only use
    /// (struct layout never consults effects).
    pub fn new(program: &'a Program) -> Self {
        Context::with_default_effects(program, &[])
    }

    pub fn with_default_effects(program: &'a Program, default_effects: &[String]) -> Self {
        let mut definitions = HashMap::new();
        for def in &program.definitions {
            definitions.insert(def.full_path.clone(), def);
        }
        let imports = program
            .imports
            .iter()
            .map(|path| {
                if let Some(prefix) = path.strip_suffix("/*") {
                    ImportEntry { alias: None, prefix: prefix.to_string(), wildcard: true }
                } else {
                    let alias = path.rsplit('/').next().unwrap_or(path).to_string();
                    ImportEntry { alias: Some(alias), prefix: path.clone(), wildcard: false }
                }
            })
            .collect();
        Context {
            program,
            definitions,
            imports,
            default_effects: default_effects.iter().cloned().collect(),
            scopes: Vec::new(),
            active_effects: Vec::new(),
            resolving: HashSet::new(),
        }
    }

    /// Name resolution order (spec.md §4.5 "Paths & name resolution"):
    /// local binding/param is checked by the caller before reaching
    /// here; this resolves a struct/definition path or an imported
    /// alias.
    pub(crate) fn resolve_definition_path(&self, name: &str) -> Option<String> {
        if name.starts_with('/') {
            return self.definitions.contains_key(name).then(|| name.to_string());
        }
        let root = format!("/{name}");
        if self.definitions.contains_key(root.as_str()) {
            return Some(root);
        }
        for entry in &self.imports {
            if entry.wildcard {
                let candidate = format!("{}/{}", entry.prefix, name);
                if self.definitions.contains_key(candidate.as_str()) {
                    return Some(candidate);
                }
            } else if entry.alias.as_deref() == Some(name) {
                return Some(entry.prefix.clone());
            }
        }
        // Fall back to a last-segment match against every known
        // definition, covering references from within a nested
        // namespace to a sibling defined elsewhere in the same file.
        self.definitions.keys().find(|path| path.rsplit('/').next() == Some(name)).cloned()
    }

    fn lookup_binding(&self, name: &str) -> Option<&BindingInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn insert_binding(&mut self, name: String, ty: Type, mutable: bool, is_param: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, BindingInfo { ty, mutable, is_param });
        }
    }

    fn active(&self) -> &HashSet<String> {
        self.active_effects.last().expect("active effect scope must be pushed before use")
    }
}

fn resolve_definition_path<'a>(ctx: &Context<'a>, name: &str) -> Option<&'a Definition> {
    ctx.resolve_definition_path(name).and_then(|p| ctx.definitions.get(&p).copied())
}

/// Extracts and validates the declared effect tokens from a
/// `[effects(...)]`/`[capabilities(...)]`-style transform list.
fn effect_tokens(transforms: &[Transform], transform_name: &str) -> Result<HashSet<String>, String> {
    let mut out = HashSet::new();
    for t in transforms {
        if t.name != transform_name {
            continue;
        }
        for arg in &t.arguments {
            let name = match arg {
                Expr::Name { name, .. } => name.clone(),
                other => return Err(format!("{transform_name}(...) argument must be a bare effect name, found {other:?}")),
            };
            if !effect::is_known(&name) {
                return Err(format!("unknown effect token '{name}'"));
            }
            if !out.insert(name.clone()) {
                return Err(format!("duplicate effect token '{name}' in {transform_name}(...)"));
            }
        }
    }
    Ok(out)
}

fn declared_effects(def: &Definition) -> Result<HashSet<String>, String> {
    effect_tokens(&def.transforms, "effects")
}

/// Entry point (spec.md §4.5): `validate(program, entryPath,
/// defaultEffects) -> Ok | Err(msg)`.
pub fn validate(program: &Program, entry_path: &str, default_effects: &[String]) -> Result<(), String> {
    let mut seen_paths = HashSet::new();
    for def in &program.definitions {
        if !seen_paths.insert(def.full_path.clone()) {
            return Err(format!("duplicate definition at path '{}'", def.full_path));
        }
    }
    if !program.definitions.iter().any(|d| d.full_path == entry_path) {
        return Err(format!("entry definition not found: {entry_path}"));
    }

    let mut ctx = Context::with_default_effects(program, default_effects);
    let mut layouts_in_progress = HashSet::new();
    for def in &program.definitions {
        if def.is_struct() {
            layout::compute_layout(&ctx, def, &mut layouts_in_progress)
                .map_err(|e| format!("struct '{}': {e}", def.full_path))?;
        }
    }
    for def in &program.definitions {
        if !def.is_struct() {
            validate_definition(&mut ctx, def)?;
        }
    }
    Ok(())
}

/// Computes every struct's `IrStructLayout`, in declaration order, for
/// `compiler::lower` to embed into `IrModule::struct_layouts`. Reruns
/// the same deterministic, side-effect-free algorithm `validate`
/// itself already ran (DESIGN.md: "called once per struct during
/// validation ... and again ... by the lowerer"), so it is only ever
/// invoked on a Program that already passed `validate`.
pub fn compute_all_struct_layouts(program: &Program) -> Result<Vec<prime_core::ir::IrStructLayout>, String> {
    let ctx = Context::new(program);
    let mut in_progress = HashSet::new();
    let mut layouts = Vec::new();
    for def in &program.definitions {
        if def.is_struct() {
            layouts.push(
                layout::compute_layout(&ctx, def, &mut in_progress)
                    .map_err(|e| format!("struct '{}': {e}", def.full_path))?,
            );
        }
    }
    Ok(layouts)
}

/// spec.md §4.8: "GLSL and native back-ends reject effects outside an
/// allowed small set". Called by those backends before emission.
pub fn check_backend_effects(program: &Program, permitted: &[&str]) -> Result<(), String> {
    for def in &program.definitions {
        if def.is_struct() {
            continue;
        }
        for e in declared_effects(def)? {
            if !permitted.contains(&e.as_str()) {
                return Err(format!("effect '{e}' is not permitted for this backend (definition '{}')", def.full_path));
            }
        }
    }
    Ok(())
}

fn validate_definition(ctx: &mut Context, def: &Definition) -> Result<(), String> {
    let declared = declared_effects(def)?;
    let mut active = declared.clone();
    active.extend(ctx.default_effects.iter().cloned());
    ctx.active_effects.push(active);
    ctx.push_scope();

    for param in &def.params {
        let Expr::Call { binding_name: Some(name), transforms, .. } = param else {
            ctx.pop_scope();
            ctx.active_effects.pop();
            return Err(format!("malformed parameter in definition '{}'", def.full_path));
        };
        let ty = types::resolve_type(ctx, transforms)
            .ok_or_else(|| format!("parameter '{name}' in '{}' is missing a type annotation", def.full_path))?;
        ctx.insert_binding(name.clone(), ty, false, true);
    }

    let result = (|| -> Result<(), String> {
        for stmt in &def.statements {
            validate_statement(ctx, stmt)?;
        }
        if let Some(ret) = &def.return_expr {
            if !matches!(ret, Expr::Call { name, .. } if name == "void") {
                infer_expr(ctx, ret)?;
            }
        }
        let declares_return = def.transforms.iter().any(|t| t.name == "return") || def.return_expr.is_some();
        if declares_return && !block_returns(&def.statements) && !matches!(&def.return_expr, Some(_)) {
            return Err(format!("definition '{}' has a path that does not return", def.full_path));
        }
        Ok(())
    })();

    ctx.pop_scope();
    ctx.active_effects.pop();
    result
}

fn envelope_statements(e: &Expr) -> &[Expr] {
    match e {
        Expr::Call { body_arguments, .. } => body_arguments,
        _ => &[],
    }
}

/// Control-flow return coverage (spec.md §4.5): every non-void path
/// must end in `return`; an `if` with two branches covers iff both
/// branches return.
fn block_returns(stmts: &[Expr]) -> bool {
    for s in stmts {
        if let Expr::Call { name, body_arguments, .. } = s {
            if name == "return" {
                return true;
            }
            if name == "if" && body_arguments.len() == 2 {
                let then_ret = block_returns(envelope_statements(&body_arguments[0]));
                let else_ret = block_returns(envelope_statements(&body_arguments[1]));
                if then_ret && else_ret {
                    return true;
                }
            }
        }
    }
    false
}

fn validate_statement(ctx: &mut Context, stmt: &Expr) -> Result<(), String> {
    let Expr::Call { name, is_binding, binding_name, args, transforms, body_arguments, .. } = stmt else {
        return Ok(());
    };

    if *is_binding {
        return validate_binding(ctx, binding_name.as_deref().unwrap_or(""), args, transforms, stmt.span());
    }

    match name.as_str() {
        "if" => {
            let cond_ty = infer_expr(ctx, &args[0])?;
            expect_bool(&cond_ty, "if condition")?;
            for branch in body_arguments {
                ctx.push_scope();
                let result = validate_block(ctx, envelope_statements(branch));
                ctx.pop_scope();
                result?;
            }
            Ok(())
        }
        "loop" => {
            let ty = infer_expr(ctx, &args[0])?;
            expect_integer(&ty, "loop count")?;
            validate_loop_body(ctx, body_arguments)
        }
        "while" => {
            let ty = infer_expr(ctx, &args[0])?;
            expect_bool(&ty, "while condition")?;
            validate_loop_body(ctx, body_arguments)
        }
        "for" => {
            if args.len() != 3 {
                return Err("for(init, cond, step) requires exactly three arguments".to_string());
            }
            ctx.push_scope();
            let result = (|| -> Result<(), String> {
                infer_expr(ctx, &args[0])?;
                let cond_ty = infer_expr(ctx, &args[1])?;
                expect_bool(&cond_ty, "for condition")?;
                infer_expr(ctx, &args[2])?;
                validate_loop_body(ctx, body_arguments)
            })();
            ctx.pop_scope();
            result
        }
        "repeat" => {
            let ty = infer_expr(ctx, &args[0])?;
            expect_integer(&ty, "repeat count")?;
            validate_loop_body(ctx, body_arguments)
        }
        "return" => {
            if let Some(value) = args.first() {
                if !matches!(value, Expr::Call { name, .. } if name == "void") {
                    infer_expr(ctx, value)?;
                }
            }
            Ok(())
        }
        _ => {
            infer_expr(ctx, stmt)?;
            Ok(())
        }
    }
}

fn validate_loop_body(ctx: &mut Context, body_arguments: &[Expr]) -> Result<(), String> {
    let Some(body) = body_arguments.first() else {
        return Err("loop/while/for/repeat require a block-envelope body".to_string());
    };
    ctx.push_scope();
    let result = validate_block(ctx, envelope_statements(body));
    ctx.pop_scope();
    result
}

fn validate_block(ctx: &mut Context, stmts: &[Expr]) -> Result<(), String> {
    for s in stmts {
        validate_statement(ctx, s)?;
    }
    Ok(())
}

const BINDING_PLACEMENT_TRANSFORMS: &[&str] = &["stack", "heap", "buffer"];
const BINDING_REJECTED_TRANSFORMS: &[&str] = &["effects", "capabilities", "return"];

fn validate_binding(
    ctx: &mut Context,
    name: &str,
    args: &[Expr],
    transforms: &[Transform],
    span: prime_core::ast::Span,
) -> Result<(), String> {
    let _ = span;
    let mut visibility_count = 0;
    for t in transforms {
        if BINDING_PLACEMENT_TRANSFORMS.contains(&t.name.as_str()) {
            return Err(format!("placement transform '{}' is not allowed on binding '{name}'", t.name));
        }
        if BINDING_REJECTED_TRANSFORMS.contains(&t.name.as_str()) {
            return Err(format!("'{}' transform is not allowed on binding '{name}'", t.name));
        }
        if matches!(t.name.as_str(), "public" | "private" | "package") {
            visibility_count += 1;
        }
        if t.name == "restrict" && t.template_args.len() != 1 {
            return Err(format!("restrict<T> on binding '{name}' requires exactly one template argument"));
        }
    }
    if visibility_count > 1 {
        return Err(format!("binding '{name}' carries more than one visibility transform"));
    }

    let Some(init) = args.first() else {
        return Err(format!("binding '{name}' requires exactly one initializer expression"));
    };
    if matches!(init, Expr::Call { name: n, .. } if n == "void") {
        return Err(format!("binding '{name}' requires an initializer expression"));
    }
    let inferred = infer_expr(ctx, init)?;
    let declared = types::resolve_type(ctx, transforms);
    let ty = declared.unwrap_or(inferred);
    let mutable = transforms.iter().any(|t| t.name == "mut");
    ctx.insert_binding(name.to_string(), ty, mutable, false);
    Ok(())
}

fn expect_bool(ty: &Type, context_label: &str) -> Result<(), String> {
    if *ty == Type::Primitive(NumKind::Bool) {
        Ok(())
    } else {
        Err(format!("{context_label} must be bool, found {ty}"))
    }
}

fn expect_integer(ty: &Type, context_label: &str) -> Result<(), String> {
    match ty.as_num_kind() {
        Some(k) if k.is_integer() => Ok(()),
        _ => Err(format!("{context_label} must be an integer, found {ty}")),
    }
}

fn numeric_kind_mismatch_message(a: NumKind, b: NumKind) -> String {
    if a.is_signed() != b.is_signed() && a.is_integer() && b.is_integer() {
        "mixed signed/unsigned".to_string()
    } else if a.is_integer() != b.is_integer() {
        "mixed int/float".to_string()
    } else {
        format!("numeric kind mismatch: {a} vs {b}")
    }
}

fn resolve_mutable_target(ctx: &mut Context, expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Name { name, .. } => match ctx.lookup_binding(name) {
            Some(b) if b.mutable && !b.is_param => Ok(()),
            Some(_) => Err(format!("'{name}' is not a mutable binding")),
            None => Err(format!("unknown identifier '{name}'")),
        },
        Expr::Call { name, args, .. } if name == "dereference" => {
            let ty = infer_expr(ctx, &args[0])?;
            if ty.is_pointer_family() {
                Ok(())
            } else {
                Err("dereference target of an assignment must be a Pointer<T>/Reference<T>".to_string())
            }
        }
        _ => Err("assign/increment/decrement target must be a mutable binding or a pointer dereference".to_string()),
    }
}

fn infer_expr(ctx: &mut Context, expr: &Expr) -> Result<Type, String> {
    match expr {
        Expr::Literal { width, signed, .. } => Ok(Type::Primitive(types::num_kind_from_literal(*width, *signed))),
        Expr::BoolLiteral { .. } => Ok(Type::Primitive(NumKind::Bool)),
        Expr::FloatLiteral { width, .. } => Ok(Type::Primitive(types::num_kind_from_float_width(*width))),
        Expr::StringLiteral { .. } => Ok(Type::String),
        Expr::Name { name, .. } => {
            if let Some(b) = ctx.lookup_binding(name) {
                return Ok(b.ty.clone());
            }
            if let Some(def) = resolve_definition_path(ctx, name) {
                return infer_definition_return_type(ctx, def);
            }
            Err(format!("unknown identifier '{name}'"))
        }
        Expr::Call { name, args, transforms, body_arguments, template_args, .. } => {
            let scoped = effect_tokens(transforms, "effects")?;
            let pushed = !scoped.is_empty();
            if pushed {
                let enclosing = ctx.active().clone();
                if !scoped.is_subset(&enclosing) {
                    return Err(format!(
                        "nested effect scope on '{name}' is not a subset of the enclosing effect set"
                    ));
                }
                ctx.active_effects.push(scoped);
            }
            let caps = effect_tokens(transforms, "capabilities")?;
            if !caps.is_empty() && !caps.is_subset(ctx.active()) {
                if pushed {
                    ctx.active_effects.pop();
                }
                return Err(format!("capabilities on '{name}' are not a subset of the active effect set"));
            }

            let result = infer_call(ctx, name, args, body_arguments, template_args);

            if pushed {
                ctx.active_effects.pop();
            }
            result
        }
    }
}

fn infer_call(
    ctx: &mut Context,
    name: &str,
    args: &[Expr],
    body_arguments: &[Expr],
    template_args: &[String],
) -> Result<Type, String> {
    if name == "block" {
        ctx.push_scope();
        let result = (|| -> Result<Type, String> {
            let mut last = Type::Primitive(NumKind::I32);
            for (i, s) in body_arguments.iter().enumerate() {
                if i + 1 == body_arguments.len() {
                    last = infer_expr(ctx, s)?;
                } else {
                    validate_statement(ctx, s)?;
                }
            }
            Ok(last)
        })();
        ctx.pop_scope();
        return result;
    }
    if name == "void" {
        return Ok(Type::Primitive(NumKind::I32));
    }
    if name == "lambda" {
        // Lambda bodies are validated in their own scope but their
        // value isn't reasoned about further here; native backend
        // rejects lambdas entirely at lowering time (spec.md §4.6).
        ctx.push_scope();
        let result = validate_block(ctx, body_arguments);
        ctx.pop_scope();
        result?;
        return Ok(Type::Primitive(NumKind::I32));
    }
    if let Some(array_ty) = collection_constructor_type(ctx, name, template_args)? {
        for a in args {
            infer_expr(ctx, a)?;
        }
        return Ok(array_ty);
    }
    if name == "convert" {
        let target = template_args.first().ok_or_else(|| "convert<T>(...) requires exactly one template argument".to_string())?;
        for a in args {
            infer_expr(ctx, a)?;
        }
        return types::resolve_type_name(ctx, target, &[])?.ok_or_else(|| format!("unknown conversion target type '{target}'"));
    }

    if let Some(spec) = builtins::lookup(name) {
        return infer_builtin(ctx, name, spec, args);
    }

    let def = resolve_definition_path(ctx, name).ok_or_else(|| format!("unknown identifier '{name}'"))?;
    for a in args {
        infer_expr(ctx, a)?;
    }
    infer_definition_return_type(ctx, def)
}

fn collection_constructor_type(ctx: &Context, name: &str, template_args: &[String]) -> Result<Option<Type>, String> {
    match name {
        "array" | "vector" | "map" => types::resolve_type_name(ctx, name, template_args),
        _ => Ok(None),
    }
}

fn infer_definition_return_type(ctx: &mut Context, def: &Definition) -> Result<Type, String> {
    if let Some(t) = def.transforms.iter().find(|t| t.name == "return") {
        if let Some(name) = t.template_args.first() {
            if let Some(ty) = types::resolve_type_name(ctx, name, &[])? {
                return Ok(ty);
            }
        }
    }
    if ctx.resolving.contains(&def.full_path) {
        // Recursive definitions are a lowering-time error (spec.md
        // §4.6); fall back to a placeholder rather than looping here.
        return Ok(Type::Primitive(NumKind::I32));
    }
    ctx.resolving.insert(def.full_path.clone());
    let result = match &def.return_expr {
        Some(Expr::Call { name, .. }) if name == "void" => Ok(Type::Primitive(NumKind::I32)),
        Some(ret) => infer_expr(ctx, ret),
        None => Ok(Type::Primitive(NumKind::I32)),
    };
    ctx.resolving.remove(&def.full_path);
    result
}

fn infer_builtin(ctx: &mut Context, name: &str, spec: builtins::BuiltinSpec, args: &[Expr]) -> Result<Type, String> {
    if args.len() != spec.arity {
        return Err(format!("builtin '{name}' expects {} argument(s), found {}", spec.arity, args.len()));
    }
    match spec.kind_rule {
        KindRule::SameNumericOrPointerOffset => infer_arith(ctx, name, args),
        KindRule::Comparable => infer_comparable(ctx, name, args),
        KindRule::Logical => infer_logical(ctx, name, args),
        KindRule::CollectionOrStringUnary => infer_unary_collection(ctx, name, args),
        KindRule::IndexAccess => infer_index(ctx, args),
        KindRule::VectorMutation => infer_vector_mutation(ctx, name, spec, args),
        KindRule::Print => infer_print(ctx, name, spec, args),
        KindRule::Pathspace => infer_pathspace(ctx, name, spec, args),
        KindRule::Pow => infer_pow(ctx, args),
    }
}

fn infer_arith(ctx: &mut Context, name: &str, args: &[Expr]) -> Result<Type, String> {
    if args.len() == 1 {
        if name == "increment" || name == "decrement" {
            resolve_mutable_target(ctx, &args[0])?;
        }
        return infer_expr(ctx, &args[0]);
    }
    let lhs = infer_expr(ctx, &args[0])?;
    let rhs = infer_expr(ctx, &args[1])?;
    match (&lhs, &rhs) {
        (Type::Primitive(a), Type::Primitive(b)) => {
            if a == b {
                Ok(lhs)
            } else {
                Err(numeric_kind_mismatch_message(*a, *b))
            }
        }
        (l, Type::Primitive(k)) if l.is_pointer_family() && k.is_integer() => Ok(lhs),
        (Type::Primitive(k), r) if r.is_pointer_family() && k.is_integer() => {
            Err(format!("'{name}': pointer operand must be on the left of a pointer/integer offset"))
        }
        (l, r) if l.is_pointer_family() && r.is_pointer_family() => {
            Err(format!("'{name}': pointer + pointer / pointer - pointer is not supported"))
        }
        _ => Err(format!("'{name}': type mismatch between {lhs} and {rhs}")),
    }
}

fn infer_comparable(ctx: &mut Context, name: &str, args: &[Expr]) -> Result<Type, String> {
    if name == "assign" {
        resolve_mutable_target(ctx, &args[0])?;
        infer_expr(ctx, &args[1])?;
        return Ok(Type::Primitive(NumKind::Bool));
    }
    let lhs = infer_expr(ctx, &args[0])?;
    let rhs = infer_expr(ctx, &args[1])?;
    if let (Type::Primitive(a), Type::Primitive(b)) = (&lhs, &rhs) {
        if a != b {
            return Err(numeric_kind_mismatch_message(*a, *b));
        }
    } else if std::mem::discriminant(&lhs) != std::mem::discriminant(&rhs) {
        return Err(format!("'{name}': type mismatch between {lhs} and {rhs}"));
    }
    Ok(Type::Primitive(NumKind::Bool))
}

fn infer_logical(ctx: &mut Context, name: &str, args: &[Expr]) -> Result<Type, String> {
    for a in args {
        let ty = infer_expr(ctx, a)?;
        expect_bool(&ty, name)?;
    }
    Ok(Type::Primitive(NumKind::Bool))
}

fn infer_unary_collection(ctx: &mut Context, name: &str, args: &[Expr]) -> Result<Type, String> {
    match name {
        "location" => {
            let Expr::Name { name: target, .. } = &args[0] else {
                return Err("location(x) requires x to be a local binding".to_string());
            };
            match ctx.lookup_binding(target) {
                Some(b) if !b.is_param => Ok(Type::Pointer(Box::new(b.ty.clone()))),
                Some(_) => Err(format!("location(...) cannot take the address of parameter '{target}'")),
                None => Err(format!("unknown identifier '{target}'")),
            }
        }
        "dereference" => {
            let ty = infer_expr(ctx, &args[0])?;
            match ty {
                Type::Pointer(inner) | Type::Reference(inner) => Ok(*inner),
                other => Err(format!("dereference(...) requires a Pointer<T>/Reference<T>, found {other}")),
            }
        }
        _ => {
            let ty = infer_expr(ctx, &args[0])?;
            match ty {
                Type::Array(_) | Type::Vector(_) | Type::Map(_, _) | Type::String => Ok(Type::Primitive(NumKind::I32)),
                Type::Struct(_) => Ok(Type::Primitive(NumKind::I32)),
                other => Err(format!("'{name}' requires a collection or string target, found {other}")),
            }
        }
    }
}

fn infer_index(ctx: &mut Context, args: &[Expr]) -> Result<Type, String> {
    let target = infer_expr(ctx, &args[0])?;
    let index = infer_expr(ctx, &args[1])?;
    expect_integer(&index, "index")?;
    match target {
        Type::Array(inner) | Type::Vector(inner) => Ok(*inner),
        Type::Map(_, value) => Ok(*value),
        // `at(string, i)` pushes the byte value as an i32, kept
        // separate from `AtArray`'s native-kind element (DESIGN.md
        // Open Question 1).
        Type::String => Ok(Type::Primitive(NumKind::I32)),
        other => Err(format!("at/at_unsafe target must be array/vector/map/string, found {other}")),
    }
}

fn infer_vector_mutation(ctx: &mut Context, name: &str, spec: builtins::BuiltinSpec, args: &[Expr]) -> Result<Type, String> {
    let Expr::Name { name: target, .. } = &args[0] else {
        return Err(format!("'{name}' target must be a mutable vector binding"));
    };
    let binding = ctx.lookup_binding(target).ok_or_else(|| format!("unknown identifier '{target}'"))?;
    if !matches!(binding.ty, Type::Vector(_)) {
        return Err(format!("'{name}' target must be a vector, found {}", binding.ty));
    }
    if !binding.mutable {
        return Err(format!("'{name}' target '{target}' must be a mutable vector binding"));
    }
    if spec.also_requires_heap_alloc && !ctx.active().contains(effect::HEAP_ALLOC) {
        return Err(format!("'{name}' requires the '{}' effect", effect::HEAP_ALLOC));
    }
    for a in &args[1..] {
        infer_expr(ctx, a)?;
    }
    Ok(Type::Primitive(NumKind::I32))
}

fn infer_print(ctx: &mut Context, name: &str, spec: builtins::BuiltinSpec, args: &[Expr]) -> Result<Type, String> {
    let ty = infer_expr(ctx, &args[0])?;
    match &ty {
        Type::Primitive(k) if k.is_integer() || *k == NumKind::Bool => {}
        Type::String => {}
        other => return Err(format!("'{name}' argument must be integer/bool or string, found {other}")),
    }
    let required = spec.required_effect.expect("print builtins declare a required effect");
    if !ctx.active().contains(required) {
        return Err(format!("'{name}' requires the '{required}' effect"));
    }
    Ok(Type::Primitive(NumKind::I32))
}

fn infer_pathspace(ctx: &mut Context, name: &str, spec: builtins::BuiltinSpec, args: &[Expr]) -> Result<Type, String> {
    let ty = infer_expr(ctx, &args[0])?;
    if ty != Type::String {
        return Err(format!("'{name}' first argument must be a string value"));
    }
    for a in &args[1..] {
        infer_expr(ctx, a)?;
    }
    let required = spec.required_effect.expect("pathspace builtins declare a required effect");
    if !ctx.active().contains(required) {
        return Err(format!("'{name}' requires the '{required}' effect"));
    }
    Ok(Type::Primitive(NumKind::I32))
}

fn infer_pow(ctx: &mut Context, args: &[Expr]) -> Result<Type, String> {
    let lhs = infer_expr(ctx, &args[0])?;
    let rhs = infer_expr(ctx, &args[1])?;
    match (lhs.as_num_kind(), rhs.as_num_kind()) {
        (Some(a), Some(b)) if a.is_integer() && b.is_integer() => Ok(Type::Primitive(a)),
        (Some(a), Some(b)) if a.is_float() && b.is_float() => Ok(Type::Primitive(a)),
        _ => Err("pow(...) requires two integer or two float operands".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn validate_src(src: &str) -> Result<(), String> {
        let program = parse_program(src).unwrap();
        validate(&program, "/main", &[])
    }

    #[test]
    fn accepts_a_minimal_entry() {
        validate_src("[return<int>] main() { return(1i32) }").unwrap();
    }

    #[test]
    fn rejects_mixed_signed_unsigned_comparison() {
        let err = validate_src("[return<bool>] main() { return(greater_than(1i64, 2u64)) }").unwrap_err();
        assert!(err.contains("mixed signed/unsigned"), "got: {err}");
    }

    #[test]
    fn rejects_print_without_effect() {
        let err =
            validate_src("main([array<string>] args) { print_line(args[1i32]) return(0i32) }").unwrap_err();
        assert!(err.contains("io_out"), "got: {err}");
    }

    #[test]
    fn accepts_print_with_declared_effect() {
        validate_src("[return<int> effects(io_out)] main([array<string>] args) { print_line(args[1i32]) return(0i32) }")
            .unwrap();
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = validate_src("main() { return(nope()) }").unwrap_err();
        assert!(err.contains("unknown identifier"), "got: {err}");
    }

    #[test]
    fn rejects_assignment_to_immutable_binding() {
        let err = validate_src("main() { x{1i32} assign(x, 2i32) return(0i32) }").unwrap_err();
        assert!(err.contains("not a mutable binding"), "got: {err}");
    }

    #[test]
    fn accepts_assignment_to_mutable_binding() {
        validate_src("main() { [mut] x{1i32} assign(x, 2i32) return(x) }").unwrap();
    }

    #[test]
    fn rejects_duplicate_definitions() {
        let program = parse_program("main() { return(1i32) } main() { return(2i32) }").unwrap();
        let err = validate(&program, "/main", &[]).unwrap_err();
        assert!(err.contains("duplicate definition"));
    }

    #[test]
    fn rejects_missing_entry() {
        let program = parse_program("main() { return(1i32) }").unwrap();
        let err = validate(&program, "/other", &[]).unwrap_err();
        assert!(err.contains("entry definition not found"));
    }

    #[test]
    fn backend_effect_gating_rejects_io_for_glsl() {
        let program =
            parse_program("[return<int> effects(io_out)] main() { print_line(\"x\"utf8) return(0i32) }").unwrap();
        let err = check_backend_effects(&program, effect::SHADER_PERMITTED).unwrap_err();
        assert!(err.contains("io_out"));
    }

    #[test]
    fn if_else_both_returning_counts_as_covered() {
        validate_src(
            "[return<int>] main() { if(equal(1i32, 1i32)) { return(1i32) } else { return(0i32) } return(9i32) }",
        )
        .unwrap();
    }
}
