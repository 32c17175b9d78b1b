//! Source-tree rewrites applied after parsing, before validation
//! (spec.md §4.4).
//!
//! Operator rewrite, collection/brace sugar, and pointer/index sugar
//! are mostly already resolved during parsing (`parser.rs` parses
//! operators with precedence and builds raw-symbol `Call` nodes, and
//! desugars `x[i]`/`&x`/`*x`/primitive brace-constructors inline); what
//! remains here is exactly the part spec.md §4.4 describes as a
//! distinct post-parse pass: renaming those raw-symbol operator calls
//! to their semantic builtin names, and the opt-in implicit-literal
//! filters. Method-call path resolution needs a symbol table and is
//! deliberately left for the validator, per spec.md §4.4's own escape
//! clause ("otherwise left for the validator to resolve").

use prime_core::{Expr, Program, StringSuffix};

/// Which filters are active for a given compilation, driven by
/// `--text-filters`/`--no-transforms` on the `primec` CLI.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub implicit_i32: bool,
    pub implicit_utf8: bool,
    pub operator_rewrite: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig { implicit_i32: false, implicit_utf8: true, operator_rewrite: true }
    }
}

impl TransformConfig {
    /// Builds a config from `--text-filters <names>` and
    /// `--no-transforms`. An empty `filters` list with
    /// `no_transforms: false` means "use the defaults".
    pub fn from_cli(filters: &[String], no_transforms: bool) -> Self {
        if no_transforms {
            return TransformConfig { implicit_i32: false, implicit_utf8: false, operator_rewrite: false };
        }
        if filters.is_empty() {
            return TransformConfig::default();
        }
        TransformConfig {
            implicit_i32: filters.iter().any(|f| f == "implicit-i32"),
            implicit_utf8: filters.iter().any(|f| f == "implicit-utf8"),
            operator_rewrite: filters.iter().any(|f| f == "operator-rewrite"),
        }
    }
}

/// Raw surface operator symbol -> semantic builtin name, keyed by
/// (symbol, arity) since unary `-` and binary `-` share a symbol
/// (spec.md §4.4).
fn semantic_name(symbol: &str, arity: usize) -> Option<&'static str> {
    match (symbol, arity) {
        ("+", 2) => Some("plus"),
        ("-", 2) => Some("minus"),
        ("*", 2) => Some("multiply"),
        ("/", 2) => Some("divide"),
        ("==", 2) => Some("equal"),
        ("!=", 2) => Some("not_equal"),
        ("<", 2) => Some("less_than"),
        ("<=", 2) => Some("less_than_or_equal"),
        (">", 2) => Some("greater_than"),
        (">=", 2) => Some("greater_than_or_equal"),
        ("&&", 2) => Some("and"),
        ("||", 2) => Some("or"),
        ("!", 1) => Some("not"),
        ("=", 2) => Some("assign"),
        ("-", 1) => Some("negate"),
        ("++", 1) => Some("increment"),
        ("--", 1) => Some("decrement"),
        _ => None,
    }
}

pub fn apply(program: &mut Program, config: &TransformConfig) {
    for def in &mut program.definitions {
        for param in &mut def.params {
            rewrite_expr(param, config);
        }
        for stmt in &mut def.statements {
            rewrite_expr(stmt, config);
        }
        if let Some(ret) = &mut def.return_expr {
            rewrite_expr(ret, config);
        }
        for transform in &mut def.transforms {
            for arg in &mut transform.arguments {
                rewrite_expr(arg, config);
            }
        }
    }
    for exec in &mut program.executions {
        for arg in &mut exec.args {
            rewrite_expr(arg, config);
        }
        for transform in &mut exec.transforms {
            for arg in &mut transform.arguments {
                rewrite_expr(arg, config);
            }
        }
    }
}

fn rewrite_expr(expr: &mut Expr, config: &TransformConfig) {
    match expr {
        Expr::StringLiteral { suffix, .. } => {
            if config.implicit_utf8 && suffix.is_none() {
                *suffix = Some(StringSuffix::Utf8);
            }
        }
        Expr::Call { name, args, transforms, body_arguments, .. } => {
            for arg in args.iter_mut() {
                rewrite_expr(arg, config);
            }
            for body in body_arguments.iter_mut() {
                rewrite_expr(body, config);
            }
            for transform in transforms.iter_mut() {
                for arg in &mut transform.arguments {
                    rewrite_expr(arg, config);
                }
            }
            if config.operator_rewrite {
                if let Some(renamed) = semantic_name(name, args.len()) {
                    *name = renamed.to_string();
                }
            }
        }
        Expr::Literal { .. } | Expr::BoolLiteral { .. } | Expr::FloatLiteral { .. } | Expr::Name { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn rewrites_binary_operators_to_semantic_names() {
        let mut program = parse_program("main() { return(1i32 + 2i32) }").unwrap();
        apply(&mut program, &TransformConfig::default());
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, .. } => assert_eq!(name, "plus"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rewrites_unary_minus_and_not() {
        let mut program = parse_program("main([i32] x) { return(!(x < 0i32)) }").unwrap();
        apply(&mut program, &TransformConfig::default());
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "not");
                match &args[0] {
                    Expr::Call { name, .. } => assert_eq!(name, "less_than"),
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn implicit_utf8_tags_bare_strings() {
        let mut program = parse_program("main() { print_line('hi') return(0i32) }").unwrap();
        apply(&mut program, &TransformConfig::default());
        match &program.definitions[0].statements[0] {
            Expr::Call { args, .. } => match &args[0] {
                Expr::StringLiteral { suffix, .. } => assert_eq!(*suffix, Some(StringSuffix::Utf8)),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_transforms_leaves_operators_and_suffix_untouched() {
        let mut program = parse_program("main() { print_line('hi') return(1i32 + 2i32) }").unwrap();
        apply(&mut program, &TransformConfig::from_cli(&[], true));
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, .. } => assert_eq!(name, "+"),
            other => panic!("unexpected {other:?}"),
        }
        match &program.definitions[0].statements[0] {
            Expr::Call { args, .. } => match &args[0] {
                Expr::StringLiteral { suffix, .. } => assert_eq!(*suffix, None),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_filters_allowlist_restricts_to_named_filters() {
        let mut program = parse_program("main() { print_line('hi') return(1i32 + 2i32) }").unwrap();
        apply(&mut program, &TransformConfig::from_cli(&["implicit-utf8".to_string()], false));
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, .. } => assert_eq!(name, "+", "operator-rewrite was not requested"),
            other => panic!("unexpected {other:?}"),
        }
        match &program.definitions[0].statements[0] {
            Expr::Call { args, .. } => match &args[0] {
                Expr::StringLiteral { suffix, .. } => assert_eq!(*suffix, Some(StringSuffix::Utf8)),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
