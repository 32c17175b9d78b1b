//! Primitive types, pointer/collection families, and the effect vocabulary.
//!
//! This is the shared type system consulted by the validator, the IR
//! lowerer, and every backend. It does not carry any inference logic —
//! that lives in `compiler::validate::types` — only the vocabulary and
//! the handful of pure predicates (`is_numeric`, `width_bits`, ...)
//! every consumer needs.

use std::fmt;

/// A primitive numeric/bool kind, tracked per-expression by the lowerer
/// (`inferExprKind` in spec.md §4.6) to pick concrete opcodes.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    I32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

impl NumKind {
    pub fn is_integer(self) -> bool {
        matches!(self, NumKind::I32 | NumKind::I64 | NumKind::U64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumKind::F32 | NumKind::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, NumKind::I32 | NumKind::I64)
    }

    pub fn width_bits(self) -> u32 {
        match self {
            NumKind::I32 | NumKind::F32 => 32,
            NumKind::I64 | NumKind::U64 | NumKind::F64 => 64,
            NumKind::Bool => 1,
        }
    }
}

impl fmt::Display for NumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NumKind::I32 => "i32",
            NumKind::I64 => "i64",
            NumKind::U64 => "u64",
            NumKind::F32 => "f32",
            NumKind::F64 => "f64",
            NumKind::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

/// A resolved type, as consulted after alias expansion (`int -> i32`,
/// `float -> f32`, spec.md §4.5).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(NumKind),
    String,
    Array(Box<Type>),
    Vector(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Pointer(Box<Type>),
    Reference(Box<Type>),
    /// A user-defined struct, resolved by full path.
    Struct(String),
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn as_num_kind(&self) -> Option<NumKind> {
        match self {
            Type::Primitive(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_pointer_family(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Reference(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(k) => write!(f, "{k}"),
            Type::String => write!(f, "string"),
            Type::Array(t) => write!(f, "array<{t}>"),
            Type::Vector(t) => write!(f, "vector<{t}>"),
            Type::Map(k, v) => write!(f, "map<{k},{v}>"),
            Type::Pointer(t) => write!(f, "Pointer<{t}>"),
            Type::Reference(t) => write!(f, "Reference<{t}>"),
            Type::Struct(name) => write!(f, "{name}"),
        }
    }
}

/// Resolve a primitive/alias type name. Returns `None` for names that
/// are not primitive spellings (struct names, `integer`/`decimal`/...
/// software-numeric placeholders are handled by the caller so it can
/// produce the specific "software numeric types are not supported yet"
/// message from spec.md §4.5).
pub fn primitive_from_name(name: &str) -> Option<Type> {
    let kind = match name {
        "i32" | "int" => NumKind::I32,
        "i64" => NumKind::I64,
        "u64" => NumKind::U64,
        "f32" | "float" => NumKind::F32,
        "f64" => NumKind::F64,
        "bool" => NumKind::Bool,
        _ => return None,
    };
    Some(Type::Primitive(kind))
}

/// Type names the spec explicitly rejects with a dedicated message
/// because they imply arbitrary-precision or boxed-numeric semantics
/// this toolchain's stack machine cannot represent.
pub const SOFTWARE_NUMERIC_TYPE_NAMES: &[&str] = &["integer", "decimal", "complex"];

/// The fixed effect vocabulary (spec.md §3). Kept as plain strings
/// rather than an enum: the set is open-ended (`pathspace_*`) and the
/// validator only ever needs membership/subset checks, not dispatch.
pub mod effect {
    pub const IO_OUT: &str = "io_out";
    pub const IO_ERR: &str = "io_err";
    pub const HEAP_ALLOC: &str = "heap_alloc";
    pub const PATHSPACE_NOTIFY: &str = "pathspace_notify";
    pub const PATHSPACE_INSERT: &str = "pathspace_insert";
    pub const PATHSPACE_TAKE: &str = "pathspace_take";
    pub const ASSET_READ: &str = "asset_read";
    pub const GLOBAL_WRITE: &str = "global_write";
    pub const GPU_QUEUE: &str = "gpu_queue";
    pub const RENDER_GRAPH: &str = "render_graph";
    pub const GPU: &str = "gpu";

    /// Any `pathspace_*` token is a well-formed (if not individually
    /// enumerated) effect name.
    pub fn is_known(name: &str) -> bool {
        matches!(
            name,
            IO_OUT
                | IO_ERR
                | HEAP_ALLOC
                | PATHSPACE_NOTIFY
                | PATHSPACE_INSERT
                | PATHSPACE_TAKE
                | ASSET_READ
                | GLOBAL_WRITE
                | GPU_QUEUE
                | RENDER_GRAPH
                | GPU
        ) || name.starts_with("pathspace_")
    }

    /// The effect subset the GLSL/SPIR-V backend permits (spec.md §4.8:
    /// "rejects any definition with effects other than those in a
    /// permitted shader subset").
    pub const SHADER_PERMITTED: &[&str] = &[GPU, GPU_QUEUE, RENDER_GRAPH];

    /// The effect subset the native backend permits. The native
    /// backend targets a bare-metal-ish ARM64 program with stdio and
    /// bump-allocated heap but no pathspace/GPU runtime.
    pub const NATIVE_PERMITTED: &[&str] = &[IO_OUT, IO_ERR, HEAP_ALLOC];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution() {
        assert_eq!(primitive_from_name("int"), Some(Type::Primitive(NumKind::I32)));
        assert_eq!(primitive_from_name("float"), Some(Type::Primitive(NumKind::F32)));
        assert_eq!(primitive_from_name("u64"), Some(Type::Primitive(NumKind::U64)));
        assert_eq!(primitive_from_name("integer"), None);
    }

    #[test]
    fn shader_effects_are_a_small_subset() {
        assert!(effect::is_known(effect::GPU));
        assert!(!effect::SHADER_PERMITTED.contains(&effect::IO_OUT));
        assert!(!effect::SHADER_PERMITTED.contains(&effect::HEAP_ALLOC));
    }

    #[test]
    fn pathspace_wildcard_is_known() {
        assert!(effect::is_known("pathspace_subscribe"));
        assert!(!effect::is_known("totally_unknown"));
    }
}
