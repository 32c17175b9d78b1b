//! Type resolution: primitive/alias tags, collections, pointer family,
//! and struct references (spec.md §4.5 "Type system").

use prime_core::ast::Transform;
use prime_core::types::{primitive_from_name, NumKind, Type, SOFTWARE_NUMERIC_TYPE_NAMES};

use super::Context;

/// Resolves a bare type name (already alias-expanded by
/// `primitive_from_name`, or a collection/pointer family, or a struct
/// reference) to a `Type`. Returns `Err` with the spec's exact message
/// for software-numeric placeholders; `Ok(None)` for names this
/// function doesn't recognize as a type at all (caller decides whether
/// that's an error).
pub fn resolve_type_name(ctx: &Context, name: &str, template_args: &[String]) -> Result<Option<Type>, String> {
    if SOFTWARE_NUMERIC_TYPE_NAMES.contains(&name) {
        return Err("software numeric types are not supported yet".to_string());
    }
    if let Some(prim) = primitive_from_name(name) {
        return Ok(Some(prim));
    }
    match name {
        "string" => Ok(Some(Type::String)),
        "array" => {
            let inner = template_args.first().ok_or_else(|| "array<T> requires exactly one template argument".to_string())?;
            Ok(Some(Type::Array(Box::new(resolve_named(ctx, inner)?))))
        }
        "vector" => {
            let inner = template_args.first().ok_or_else(|| "vector<T> requires exactly one template argument".to_string())?;
            Ok(Some(Type::Vector(Box::new(resolve_named(ctx, inner)?))))
        }
        "map" => {
            if template_args.len() != 2 {
                return Err("map<K,V> requires exactly two template arguments".to_string());
            }
            let k = resolve_named(ctx, &template_args[0])?;
            let v = resolve_named(ctx, &template_args[1])?;
            Ok(Some(Type::Map(Box::new(k), Box::new(v))))
        }
        "Pointer" => {
            if template_args.len() != 1 {
                return Err("Pointer<T> requires exactly one template argument".to_string());
            }
            Ok(Some(Type::Pointer(Box::new(resolve_named(ctx, &template_args[0])?))))
        }
        "Reference" => {
            if template_args.len() != 1 {
                return Err("Reference<T> requires exactly one template argument".to_string());
            }
            Ok(Some(Type::Reference(Box::new(resolve_named(ctx, &template_args[0])?))))
        }
        _ => {
            let path = ctx.resolve_definition_path(name);
            match path {
                Some(p) if ctx.definitions.get(p.as_str()).map(|d| d.is_struct()).unwrap_or(false) => Ok(Some(Type::Struct(p))),
                _ => Ok(None),
            }
        }
    }
}

fn resolve_named(ctx: &Context, name: &str) -> Result<Type, String> {
    resolve_type_name(ctx, name, &[])?.ok_or_else(|| format!("unknown type '{name}'"))
}

/// Resolves the single type-shaped transform on a binding/param
/// transform list, e.g. `[array<string>]`, `[Pointer<Vec3>]`, `[mut, i32]`.
/// Binding discipline transforms (`mut`/`copy`/`static`/`public`/...)
/// are not types and are skipped.
pub fn resolve_type(ctx: &Context, transforms: &[Transform]) -> Option<Type> {
    const NON_TYPE_TRANSFORMS: &[&str] = &[
        "mut", "copy", "static", "public", "private", "package", "align_bytes", "align_kbytes", "restrict", "effects",
        "return", "handle", "gpu_lane", "pod", "no_padding", "platform_independent_padding", "struct",
    ];
    for t in transforms {
        if NON_TYPE_TRANSFORMS.contains(&t.name.as_str()) {
            continue;
        }
        if let Ok(Some(ty)) = resolve_type_name(ctx, &t.name, &t.template_args) {
            return Some(ty);
        }
    }
    None
}

pub fn num_kind_from_literal(width: u32, signed: bool) -> NumKind {
    match (width, signed) {
        (32, _) => NumKind::I32,
        (64, true) => NumKind::I64,
        (64, false) => NumKind::U64,
        _ => NumKind::I32,
    }
}

pub fn num_kind_from_float_width(width: u32) -> NumKind {
    if width == 64 {
        NumKind::F64
    } else {
        NumKind::F32
    }
}
