//! The uniform tagged expression tree (spec.md §3).
//!
//! A single `Expr` enum serves every syntactic role — types, values,
//! statements, bindings, parameters, and calls — the way the original
//! `PrimeStruct` source represents them. spec.md §9 flags this as a
//! design smell a from-scratch reimplementation should split into a
//! sum type per role; we keep the uniform tree because the front end,
//! validator, and lowerer in this spec are all written against it and
//! splitting it is out of scope for this pass.

/// 0-indexed source position, used only for error messages.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

/// `Transform` phase (spec.md §3): whether a `[...]` annotation is
/// consulted during text-level desugaring or during semantic
/// validation.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Text,
    Semantic,
}

/// A phased `[name<T1,T2>(arg1, arg2)]` annotation.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub name: String,
    pub arguments: Vec<Expr>,
    pub template_args: Vec<String>,
    pub phase: Phase,
}

impl Transform {
    pub fn new(name: impl Into<String>, phase: Phase) -> Self {
        Transform {
            name: name.into(),
            arguments: Vec::new(),
            template_args: Vec::new(),
            phase,
        }
    }
}

/// String literal suffix tag (spec.md §3).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringSuffix {
    Utf8,
    Ascii,
    RawUtf8,
}

/// The uniform tagged tree. Every field that is role-specific is an
/// `Option`/empty-`Vec` when unused by a given variant; see the
/// per-variant invariants in spec.md §3.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: i64,
        width: u32,
        signed: bool,
        span: Span,
    },
    BoolLiteral {
        value: bool,
        span: Span,
    },
    FloatLiteral {
        /// Decimal/exponent text is preserved verbatim so the lowerer
        /// can parse it with the exact width-appropriate parser
        /// without round-tripping through a different width first.
        text: String,
        width: u32,
        span: Span,
    },
    StringLiteral {
        value: String,
        suffix: Option<StringSuffix>,
        span: Span,
    },
    Name {
        namespace: Option<String>,
        name: String,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        arg_names: Vec<Option<String>>,
        template_args: Vec<String>,
        transforms: Vec<Transform>,
        body_arguments: Vec<Expr>,
        is_binding: bool,
        is_method_call: bool,
        is_lambda: bool,
        /// Populated only when `is_binding`.
        binding_name: Option<String>,
        /// Populated only when `is_lambda`: raw capture tokens
        /// (`=`, `&`, `ref x`, `x`) exactly as parsed.
        lambda_captures: Vec<String>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::BoolLiteral { span, .. }
            | Expr::FloatLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::Name { span, .. }
            | Expr::Call { span, .. } => *span,
        }
    }

    /// Constructs a block-envelope Call: `block(){...}`/`then(){...}`/
    /// `else(){...}`/loop bodies — empty `args`, empty `template_args`,
    /// non-empty `body_arguments` (spec.md §3).
    pub fn envelope(name: impl Into<String>, body: Vec<Expr>, span: Span) -> Self {
        Expr::Call {
            name: name.into(),
            args: Vec::new(),
            arg_names: Vec::new(),
            template_args: Vec::new(),
            transforms: Vec::new(),
            body_arguments: body,
            is_binding: false,
            is_method_call: false,
            is_lambda: false,
            binding_name: None,
            lambda_captures: Vec::new(),
            span,
        }
    }

    /// Constructs a plain call with no sugar flags set.
    pub fn call(name: impl Into<String>, args: Vec<Expr>, span: Span) -> Self {
        let arg_names = vec![None; args.len()];
        Expr::Call {
            name: name.into(),
            args,
            arg_names,
            template_args: Vec::new(),
            transforms: Vec::new(),
            body_arguments: Vec::new(),
            is_binding: false,
            is_method_call: false,
            is_lambda: false,
            binding_name: None,
            lambda_captures: Vec::new(),
            span,
        }
    }

    pub fn is_envelope(&self) -> bool {
        matches!(
            self,
            Expr::Call { args, template_args, body_arguments, .. }
                if args.is_empty() && template_args.is_empty() && !body_arguments.is_empty()
        )
    }

    pub fn as_call(&self) -> Option<(&str, &[Expr])> {
        match self {
            Expr::Call { name, args, .. } => Some((name.as_str(), args.as_slice())),
            _ => None,
        }
    }
}

/// A named, path-addressable callable or field-only record
/// (spec.md §3 "Definition").
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Absolute, slash-rooted path, e.g. `/math/add`.
    pub full_path: String,
    /// Enclosing namespace prefix, e.g. `/math`.
    pub namespace: String,
    pub params: Vec<Expr>,
    pub statements: Vec<Expr>,
    pub return_expr: Option<Expr>,
    pub transforms: Vec<Transform>,
    pub template_params: Vec<String>,
}

/// The struct-family transform names from spec.md §3.
pub const STRUCT_FAMILY_TRANSFORMS: &[&str] = &[
    "struct",
    "pod",
    "handle",
    "gpu_lane",
    "no_padding",
    "platform_independent_padding",
];

impl Definition {
    /// spec.md §3: "A definition is a *struct* iff it carries a
    /// struct-family transform OR has no return statement, no
    /// parameters, no return transform, and only binding statements."
    pub fn is_struct(&self) -> bool {
        let has_struct_transform = self
            .transforms
            .iter()
            .any(|t| STRUCT_FAMILY_TRANSFORMS.contains(&t.name.as_str()));
        if has_struct_transform {
            return true;
        }
        let has_return_transform = self.transforms.iter().any(|t| t.name == "return");
        if self.return_expr.is_some() || !self.params.is_empty() || has_return_transform {
            return false;
        }
        self.statements.iter().all(|s| matches!(s, Expr::Call { is_binding: true, .. }))
    }

    pub fn name(&self) -> &str {
        self.full_path.rsplit('/').next().unwrap_or(&self.full_path)
    }
}

/// A top-level or nested invocation of a `Definition` (spec.md §3
/// "Execution").
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub callee: String,
    pub args: Vec<Expr>,
    pub arg_names: Vec<Option<String>>,
    pub transforms: Vec<Transform>,
    pub span: Span,
}

/// Ordered sequence of definitions, executions, and import paths
/// (spec.md §3 "Program"). Immutable after parse+transform.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub executions: Vec<Execution>,
    pub imports: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn find_definition(&self, path: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.full_path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        Span::new(0, 0)
    }

    #[test]
    fn struct_detection_via_transform() {
        let def = Definition {
            full_path: "/Point".to_string(),
            namespace: "/".to_string(),
            params: vec![],
            statements: vec![],
            return_expr: None,
            transforms: vec![Transform::new("struct", Phase::Semantic)],
            template_params: vec![],
        };
        assert!(def.is_struct());
    }

    #[test]
    fn struct_detection_via_shape() {
        let def = Definition {
            full_path: "/Config".to_string(),
            namespace: "/".to_string(),
            params: vec![],
            statements: vec![Expr::Call {
                name: "".to_string(),
                args: vec![Expr::Literal { value: 1, width: 32, signed: true, span: dummy_span() }],
                arg_names: vec![None],
                template_args: vec![],
                transforms: vec![],
                body_arguments: vec![],
                is_binding: true,
                is_method_call: false,
                is_lambda: false,
                binding_name: Some("x".to_string()),
                lambda_captures: vec![],
                span: dummy_span(),
            }],
            return_expr: None,
            transforms: vec![],
            template_params: vec![],
        };
        assert!(def.is_struct());
    }

    #[test]
    fn a_callable_with_params_is_not_a_struct() {
        let def = Definition {
            full_path: "/add".to_string(),
            namespace: "/".to_string(),
            params: vec![Expr::Name { namespace: None, name: "x".to_string(), span: dummy_span() }],
            statements: vec![],
            return_expr: Some(Expr::Literal { value: 0, width: 32, signed: true, span: dummy_span() }),
            transforms: vec![],
            template_params: vec![],
        };
        assert!(!def.is_struct());
    }
}
