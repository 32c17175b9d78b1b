//! Prime compiler: front end, semantic validator, and IR lowerer
//! (spec.md §2). This crate owns every stage up to and including
//! `IrModule` production; execution (`prime-vm`) and backend emission
//! (`backend-cpp`/`backend-native`/`backend-glsl`) are separate crates
//! the `primec` binary (`main.rs`) wires together.
//!
//! # Pipeline
//!
//! `compile_source` runs the whole front-to-IR pipeline in one call:
//! include expansion -> lex -> parse -> text transforms -> validate ->
//! lower. Each stage is also exposed individually (`lexer`, `parser`,
//! `include_resolver`, `text_transform`, `validate`, `lower`) for
//! `--dump-stage` and for the backends that need the validated
//! `Program` rather than the lowered `IrModule` (the C++ and GLSL
//! emitters walk the tree directly, per spec.md §4.8).

pub mod builtins;
pub mod config;
pub mod include_resolver;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod text_transform;
pub mod validate;

pub use config::CompileConfig;
pub use prime_core::{IrModule, Program};

use std::path::Path;

/// One stage's output, for `--dump-stage` (spec.md §6). There is no
/// mandated dump format beyond "debug dump"; `pre_ast` is raw source
/// text, and `ast`/`ir` render as pretty-printed JSON via `prime-core`'s
/// `serde-dump` feature (the teacher's `serde`/`serde_json` stack) so
/// the dump is machine-parseable rather than a bespoke `Debug` dump
/// only a human can read.
pub enum StageDump {
    PreAst(String),
    Ast(Program),
    Ir(IrModule),
}

impl std::fmt::Display for StageDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageDump::PreAst(text) => write!(f, "{text}"),
            StageDump::Ast(program) => match serde_json::to_string_pretty(program) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => write!(f, "{program:#?}"),
            },
            StageDump::Ir(module) => match serde_json::to_string_pretty(module) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => write!(f, "{module:#?}"),
            },
        }
    }
}

/// Runs include expansion, lexing, and parsing, returning the raw
/// `Program` before text transforms or validation (the `pre_ast`/`ast`
/// split of `--dump-stage` happens one step later, in `compile_source`).
pub fn parse_file(entry_path: &Path, config: &CompileConfig) -> Result<(String, Program), String> {
    let source = include_resolver::expand_includes(entry_path, &config.include_roots)?;
    let program = parser::parse_program(&source)?;
    Ok((source, program))
}

/// Front end through validation: expands includes, parses, applies
/// text transforms, and validates. Returns the validated `Program`,
/// ready for either `lower::lower_program` (VM/native) or direct tree
/// walking (C++/GLSL emitters), per spec.md §4.8.
pub fn validate_file(entry_path: &Path, config: &CompileConfig) -> Result<Program, String> {
    let (_source, mut program) = parse_file(entry_path, config)?;
    text_transform::apply(&mut program, &config.transforms);
    validate::validate(&program, &config.entry_path, &config.default_effects)?;
    Ok(program)
}

/// The full front-to-IR pipeline (spec.md §2's flow diagram).
pub fn compile_source(entry_path: &Path, config: &CompileConfig) -> Result<IrModule, String> {
    let program = validate_file(entry_path, config)?;
    lower::lower_program(&program, &config.entry_path, &config.default_effects)
}

/// Produces exactly the stage `--dump-stage <pre_ast|ast|ir>` asks for,
/// running only as much of the pipeline as that stage requires.
pub fn dump_stage(stage: &str, entry_path: &Path, config: &CompileConfig) -> Result<StageDump, String> {
    match stage {
        "pre_ast" => {
            let source = include_resolver::expand_includes(entry_path, &config.include_roots)?;
            Ok(StageDump::PreAst(source))
        }
        "ast" => Ok(StageDump::Ast(validate_file(entry_path, config)?)),
        "ir" => Ok(StageDump::Ir(compile_source(entry_path, config)?)),
        other => Err(format!("unknown --dump-stage '{other}' (expected pre_ast|ast|ir)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn compiles_a_minimal_entry_to_ir() {
        let f = write_temp("[return<int>] main() { return(plus(1i32, 2i32)) }");
        let module = compile_source(f.path(), &CompileConfig::default()).unwrap();
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn dump_stage_ast_runs_validation() {
        let f = write_temp("[return<int>] main() { return(0i32) }");
        let dump = dump_stage("ast", f.path(), &CompileConfig::default()).unwrap();
        assert!(matches!(dump, StageDump::Ast(_)));
    }

    #[test]
    fn dump_stage_rejects_unknown_name() {
        let f = write_temp("[return<int>] main() { return(0i32) }");
        let err = dump_stage("bogus", f.path(), &CompileConfig::default()).unwrap_err();
        assert!(err.contains("unknown --dump-stage"));
    }

    #[test]
    fn validation_errors_surface_as_a_single_string() {
        let f = write_temp("[return<bool>] main() { return(greater_than(1i64, 2u64)) }");
        let err = compile_source(f.path(), &CompileConfig::default()).unwrap_err();
        assert!(!err.is_empty());
    }
}
