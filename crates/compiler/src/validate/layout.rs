//! Struct layout algorithm (spec.md §4.5 "Struct layout").
//!
//! Computes an `IrStructLayout` for a struct-shaped `Definition`,
//! enforcing the field-tag constraints (`pod`/`handle`/`gpu_lane`,
//! `no_padding`, `platform_independent_padding`) along the way. Called
//! once per struct during validation (to surface layout errors early)
//! and again, on the same inputs, by the lowerer when it serializes
//! `module.structLayouts` — deterministic and side-effect-free so both
//! call sites agree.

use prime_core::ast::{Definition, Expr, Transform};
use prime_core::ir::{FieldCategory, IrStructField, IrStructLayout, PaddingKind, Visibility};
use prime_core::types::Type;
use std::collections::HashSet;

use super::types::resolve_type;
use super::Context;

fn align_up(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

fn type_size_and_align(ty: &Type) -> (u32, u32) {
    match ty {
        Type::Primitive(k) => {
            let bytes = k.width_bits().div_ceil(8).max(1);
            (bytes, bytes)
        }
        Type::String => (16, 8), // {ptr, len} as the native backend represents it
        Type::Array(_) | Type::Vector(_) => (16, 8),
        Type::Map(_, _) => (24, 8),
        Type::Pointer(_) | Type::Reference(_) => (8, 8),
        Type::Struct(_) => (8, 8), // resolved recursively by the caller; placeholder for opaque refs
    }
}

fn explicit_alignment(transforms: &[Transform]) -> Option<u32> {
    for t in transforms {
        if t.name == "align_bytes" {
            if let Some(Expr::Literal { value, .. }) = t.arguments.first() {
                return Some(*value as u32);
            }
        }
        if t.name == "align_kbytes" {
            if let Some(Expr::Literal { value, .. }) = t.arguments.first() {
                return Some(*value as u32 * 1024);
            }
        }
    }
    None
}

fn field_category(transforms: &[Transform]) -> Result<FieldCategory, String> {
    let has_handle = transforms.iter().any(|t| t.name == "handle");
    let has_gpu_lane = transforms.iter().any(|t| t.name == "gpu_lane");
    if has_handle && has_gpu_lane {
        return Err("handle and gpu_lane field tags are mutually exclusive".to_string());
    }
    Ok(if has_handle {
        FieldCategory::Handle
    } else if has_gpu_lane {
        FieldCategory::GpuLane
    } else {
        FieldCategory::Plain
    })
}

fn field_visibility(transforms: &[Transform]) -> Visibility {
    for t in transforms {
        match t.name.as_str() {
            "public" => return Visibility::Public,
            "private" => return Visibility::Private,
            "package" => return Visibility::Package,
            _ => {}
        }
    }
    Visibility::Public
}

/// Computes the layout of `def`, which must satisfy `def.is_struct()`.
/// `in_progress` tracks struct full-paths currently being laid out, to
/// reject `"recursive struct layout not supported"` (spec.md §4.5).
pub fn compute_layout(ctx: &Context, def: &Definition, in_progress: &mut HashSet<String>) -> Result<IrStructLayout, String> {
    if !in_progress.insert(def.full_path.clone()) {
        return Err("recursive struct layout not supported".to_string());
    }

    let no_padding = def.transforms.iter().any(|t| t.name == "no_padding");
    let platform_independent = def.transforms.iter().any(|t| t.name == "platform_independent_padding");
    let is_pod = def.transforms.iter().any(|t| t.name == "pod");
    let struct_align_override = explicit_alignment(&def.transforms);

    let mut fields = Vec::new();
    let mut offset = 0u32;
    let mut struct_alignment = 1u32;
    let mut static_offset = 0u32;

    for stmt in &def.statements {
        let Expr::Call { is_binding: true, binding_name: Some(name), transforms, .. } = stmt else {
            continue;
        };
        let category = field_category(transforms)?;
        if is_pod && category != FieldCategory::Plain {
            return Err(format!("pod struct '{}' cannot have a handle/gpu_lane field: '{}'", def.full_path, name));
        }

        let field_type = resolve_type_of_binding(ctx, stmt, def, in_progress)?;
        let (size, natural_align) = type_size_and_align(&field_type);
        let alignment = explicit_alignment(transforms).unwrap_or(natural_align).max(natural_align);
        let is_static = transforms.iter().any(|t| t.name == "static");

        if is_static {
            let field_offset = align_up(static_offset, alignment);
            static_offset = field_offset + size;
            fields.push(IrStructField {
                name: name.clone(),
                envelope: field_type.to_string(),
                offset_bytes: field_offset,
                size_bytes: size,
                alignment_bytes: alignment,
                padding_kind: PaddingKind::None,
                category,
                visibility: field_visibility(transforms),
                is_static: true,
            });
            continue;
        }

        let aligned_offset = align_up(offset, alignment);
        let padding_kind = if aligned_offset > offset {
            if no_padding {
                return Err(format!("struct '{}' field '{}' requires implicit padding but carries no_padding", def.full_path, name));
            }
            if platform_independent && explicit_alignment(transforms).is_none() {
                return Err(format!(
                    "struct '{}' field '{}' needs an explicit alignment transform under platform_independent_padding",
                    def.full_path, name
                ));
            }
            PaddingKind::Implicit
        } else if explicit_alignment(transforms).is_some() {
            PaddingKind::Explicit
        } else {
            PaddingKind::None
        };

        fields.push(IrStructField {
            name: name.clone(),
            envelope: field_type.to_string(),
            offset_bytes: aligned_offset,
            size_bytes: size,
            alignment_bytes: alignment,
            padding_kind,
            category,
            visibility: field_visibility(transforms),
            is_static: false,
        });
        offset = aligned_offset + size;
        struct_alignment = struct_alignment.max(alignment);
    }

    let struct_alignment = struct_align_override.unwrap_or(struct_alignment).max(struct_alignment);
    let total_size = align_up(offset, struct_alignment);

    in_progress.remove(&def.full_path);
    Ok(IrStructLayout { name: def.full_path.clone(), alignment_bytes: struct_alignment, total_size_bytes: total_size, fields })
}

fn resolve_type_of_binding(ctx: &Context, stmt: &Expr, _def: &Definition, in_progress: &mut HashSet<String>) -> Result<Type, String> {
    let Expr::Call { transforms, args, .. } = stmt else {
        return Err("malformed struct field".to_string());
    };
    if let Some(ty) = resolve_type(ctx, transforms) {
        if let Type::Struct(path) = &ty {
            if let Some(field_def) = ctx.definitions.get(path.as_str()) {
                if field_def.is_struct() {
                    compute_layout(ctx, field_def, in_progress)?;
                }
            }
        }
        return Ok(ty);
    }
    // No type transform: fall back to inferring from the initializer literal shape.
    match args.first() {
        Some(Expr::Literal { width, signed, .. }) => {
            Ok(Type::Primitive(super::types::num_kind_from_literal(*width, *signed)))
        }
        Some(Expr::BoolLiteral { .. }) => Ok(Type::Primitive(prime_core::types::NumKind::Bool)),
        Some(Expr::StringLiteral { .. }) => Ok(Type::String),
        _ => Err("struct field requires a type transform or a literal initializer".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::validate::Context;

    fn struct_def(src: &str) -> Definition {
        let program = parse_program(src).unwrap();
        program.definitions.into_iter().find(|d| d.is_struct()).unwrap()
    }

    #[test]
    fn pads_a_narrow_field_before_a_wide_one() {
        let def = struct_def("[pod] Packed() { [i32] a{0i32} [f64] b{0.0f64} }");
        let program = crate::parser::parse_program("[pod] Packed() { [i32] a{0i32} [f64] b{0.0f64} }").unwrap();
        let ctx = Context::new(&program);
        let mut seen = HashSet::new();
        let layout = compute_layout(&ctx, &def, &mut seen).unwrap();
        assert_eq!(layout.fields[0].offset_bytes, 0);
        assert_eq!(layout.fields[1].offset_bytes, 8);
        assert_eq!(layout.alignment_bytes, 8);
        assert_eq!(layout.total_size_bytes % layout.alignment_bytes, 0);
    }

    #[test]
    fn no_padding_rejects_implicit_padding() {
        let src = "[pod, no_padding] Packed() { [i32] a{0i32} [f64] b{0.0f64} }";
        let def = struct_def(src);
        let program = parse_program(src).unwrap();
        let ctx = Context::new(&program);
        let mut seen = HashSet::new();
        let err = compute_layout(&ctx, &def, &mut seen).unwrap_err();
        assert!(err.contains("no_padding"));
    }

    #[test]
    fn handle_and_gpu_lane_are_mutually_exclusive() {
        let src = "Thing() { [handle, gpu_lane] a{0i32} }";
        let def = struct_def(src);
        let program = parse_program(src).unwrap();
        let ctx = Context::new(&program);
        let mut seen = HashSet::new();
        let err = compute_layout(&ctx, &def, &mut seen).unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }
}
