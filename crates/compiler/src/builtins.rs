//! The fixed builtin arity/kind table (spec.md §4.5, §9 design note:
//! "the long `if (name == \"…\")` chains in validator and lowerer
//! should be table-driven").
//!
//! Every name the validator and lowerer both need to recognize as a
//! builtin (rather than a user-defined call) is registered here once,
//! with the arity/kind/effect rule it obeys. The lowerer consults the
//! same table (via `lookup`) to decide whether a call needs inline
//! expansion (user definition) or direct opcode emission (builtin).

use prime_core::types::effect;

/// How a builtin's operand kinds are constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindRule {
    /// Both operands share one numeric kind (rejecting mixed
    /// signed/unsigned, mixed int/float), or the left is a pointer and
    /// the right an integer offset.
    SameNumericOrPointerOffset,
    /// Two operands, numeric/bool/string, but string comparisons are
    /// rejected by the VM and native backends (spec.md §4.5).
    Comparable,
    /// One operand: `array<T>`/`vector<T>`/`map<K,V>`/`string`, or a
    /// user-defined `/type/count` method.
    CollectionOrStringUnary,
    /// Two operands: target collection/string, index integer.
    IndexAccess,
    /// Statement-only mutation of a `vector` binding.
    VectorMutation,
    /// Statement-only print family.
    Print,
    /// Statement-only pathspace family (`notify`/`insert`/`take`).
    Pathspace,
    /// Two integer or two float operands.
    Pow,
    /// Boolean unary/binary logical operators.
    Logical,
}

/// One entry in the builtin table: arity, kind rule, statement/
/// expression form, and the effect a call site must already have
/// active (if any).
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub arity: usize,
    pub kind_rule: KindRule,
    pub statement_only: bool,
    /// `Some(effect)` for builtins whose form requires a fixed effect;
    /// the print family picks between two depending on which name is
    /// used (`print*` vs `print*_error`).
    pub required_effect: Option<&'static str>,
    /// `push`/`reserve` additionally require `heap_alloc` on top of
    /// being a vector mutation (spec.md §4.5).
    pub also_requires_heap_alloc: bool,
}

const fn spec(
    name: &'static str,
    arity: usize,
    kind_rule: KindRule,
    statement_only: bool,
    required_effect: Option<&'static str>,
) -> BuiltinSpec {
    BuiltinSpec { name, arity, kind_rule, statement_only, required_effect, also_requires_heap_alloc: false }
}

/// The static table. `lookup` is the only entry point the validator
/// and lowerer use; this array is otherwise private.
const TABLE: &[BuiltinSpec] = &[
    spec("plus", 2, KindRule::SameNumericOrPointerOffset, false, None),
    spec("minus", 2, KindRule::SameNumericOrPointerOffset, false, None),
    spec("multiply", 2, KindRule::SameNumericOrPointerOffset, false, None),
    spec("divide", 2, KindRule::SameNumericOrPointerOffset, false, None),
    spec("equal", 2, KindRule::Comparable, false, None),
    spec("not_equal", 2, KindRule::Comparable, false, None),
    spec("less_than", 2, KindRule::Comparable, false, None),
    spec("less_than_or_equal", 2, KindRule::Comparable, false, None),
    spec("greater_than", 2, KindRule::Comparable, false, None),
    spec("greater_than_or_equal", 2, KindRule::Comparable, false, None),
    spec("and", 2, KindRule::Logical, false, None),
    spec("or", 2, KindRule::Logical, false, None),
    spec("not", 1, KindRule::Logical, false, None),
    spec("negate", 1, KindRule::SameNumericOrPointerOffset, false, None),
    spec("assign", 2, KindRule::Comparable, true, None),
    spec("increment", 1, KindRule::SameNumericOrPointerOffset, true, None),
    spec("decrement", 1, KindRule::SameNumericOrPointerOffset, true, None),
    spec("count", 1, KindRule::CollectionOrStringUnary, false, None),
    spec("capacity", 1, KindRule::CollectionOrStringUnary, false, None),
    spec("at", 2, KindRule::IndexAccess, false, None),
    spec("at_unsafe", 2, KindRule::IndexAccess, false, None),
    spec("push", 2, KindRule::VectorMutation, true, None),
    spec("pop", 1, KindRule::VectorMutation, true, None),
    spec("reserve", 2, KindRule::VectorMutation, true, None),
    spec("clear", 1, KindRule::VectorMutation, true, None),
    spec("remove_at", 2, KindRule::VectorMutation, true, None),
    spec("remove_swap", 2, KindRule::VectorMutation, true, None),
    spec("print", 1, KindRule::Print, true, Some(effect::IO_OUT)),
    spec("print_line", 1, KindRule::Print, true, Some(effect::IO_OUT)),
    spec("print_error", 1, KindRule::Print, true, Some(effect::IO_ERR)),
    spec("print_line_error", 1, KindRule::Print, true, Some(effect::IO_ERR)),
    spec("notify", 1, KindRule::Pathspace, true, Some(effect::PATHSPACE_NOTIFY)),
    spec("insert", 2, KindRule::Pathspace, true, Some(effect::PATHSPACE_INSERT)),
    spec("take", 1, KindRule::Pathspace, true, Some(effect::PATHSPACE_TAKE)),
    spec("pow", 2, KindRule::Pow, false, None),
    spec("location", 1, KindRule::CollectionOrStringUnary, false, None),
    spec("dereference", 1, KindRule::CollectionOrStringUnary, false, None),
    spec("convert", 1, KindRule::CollectionOrStringUnary, false, None),
];

/// `push`/`reserve` need `heap_alloc` in addition to being a vector
/// mutation; encoded as a lookup-time predicate rather than a literal
/// in `TABLE` to keep the table declarative.
fn heap_alloc_required(name: &str) -> bool {
    matches!(name, "push" | "reserve")
}

pub fn lookup(name: &str) -> Option<BuiltinSpec> {
    TABLE.iter().find(|b| b.name == name).map(|b| BuiltinSpec { also_requires_heap_alloc: heap_alloc_required(name), ..*b })
}

pub fn is_builtin(name: &str) -> bool {
    TABLE.iter().any(|b| b.name == name)
}

/// Print builtins that append a trailing newline (spec.md §4.6 print
/// flag encoding).
pub fn print_adds_newline(name: &str) -> bool {
    matches!(name, "print_line" | "print_line_error")
}

/// Print builtins that write to stderr.
pub fn print_is_stderr(name: &str) -> bool {
    matches!(name, "print_error" | "print_line_error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_builtins_are_binary() {
        for name in ["plus", "minus", "multiply", "divide"] {
            let b = lookup(name).unwrap();
            assert_eq!(b.arity, 2);
            assert_eq!(b.kind_rule, KindRule::SameNumericOrPointerOffset);
        }
    }

    #[test]
    fn push_and_reserve_require_heap_alloc_on_top_of_vector_mutation() {
        assert!(lookup("push").unwrap().also_requires_heap_alloc);
        assert!(lookup("reserve").unwrap().also_requires_heap_alloc);
        assert!(!lookup("pop").unwrap().also_requires_heap_alloc);
    }

    #[test]
    fn print_family_requires_the_right_effect() {
        assert_eq!(lookup("print").unwrap().required_effect, Some(effect::IO_OUT));
        assert_eq!(lookup("print_error").unwrap().required_effect, Some(effect::IO_ERR));
        assert!(print_adds_newline("print_line"));
        assert!(!print_adds_newline("print"));
        assert!(print_is_stderr("print_line_error"));
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert!(!is_builtin("user_defined_helper"));
        assert!(lookup("user_defined_helper").is_none());
    }
}
