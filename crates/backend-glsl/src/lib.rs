//! GLSL 450 shader source emitter (spec.md §4.8 "GLSL/SPIR-V Emitter").
//!
//! Walks the validated `Program` tree, same as the C++ backend, but
//! targets a much smaller language subset: shaders have no heap, no
//! strings, and only the `gpu`/`gpu_queue`/`render_graph` effects are
//! permitted (spec.md §4.8's "permitted shader subset"). Compiling the
//! emitted text to SPIR-V is a separate, optional step (`compile_to_spirv`)
//! that shells out to an external validator/compiler toolchain.

use std::fmt::Write as _;
use std::process::Command;

use prime_core::ast::{Definition, Expr, Program, Transform};
use prime_core::types::effect;

#[derive(Debug)]
pub enum EmitError {
    Logic(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::Logic(s) => write!(f, "{s}"),
            EmitError::Format(e) => write!(f, "GLSL emission error: {e}"),
        }
    }
}
impl std::error::Error for EmitError {}
impl From<std::fmt::Error> for EmitError {
    fn from(e: std::fmt::Error) -> Self {
        EmitError::Format(e)
    }
}
impl From<EmitError> for String {
    fn from(e: EmitError) -> Self {
        e.to_string()
    }
}

type R<T> = Result<T, EmitError>;

const SHADER_PERMITTED: &[&str] = effect::SHADER_PERMITTED;

const NON_TYPE_TRANSFORMS: &[&str] = &[
    "mut", "copy", "static", "public", "private", "package", "align_bytes", "align_kbytes", "restrict", "effects",
    "capabilities", "return", "handle", "gpu_lane", "pod", "no_padding", "platform_independent_padding", "struct",
];

fn glsl_type_name(name: &str) -> String {
    match name {
        "i32" | "int" => "int".to_string(),
        "i64" | "u64" => "int".to_string(),
        "f32" | "float" => "float".to_string(),
        "f64" => "double".to_string(),
        "bool" => "bool".to_string(),
        other => flatten_path(other),
    }
}

fn glsl_type_from_transform(t: &Transform) -> String {
    match t.name.as_str() {
        "array" | "vector" => {
            let inner = t.template_args.first().map(String::as_str).unwrap_or("int");
            format!("{}[]", glsl_type_name(inner))
        }
        other => glsl_type_name(other),
    }
}

fn flatten_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    format!("ps_{}", trimmed.replace('/', "_"))
}

fn binding_type(transforms: &[Transform]) -> Option<String> {
    transforms.iter().find(|t| !NON_TYPE_TRANSFORMS.contains(&t.name.as_str())).map(glsl_type_from_transform)
}

/// Duplicates `compiler::validate::check_backend_effects` in miniature:
/// this crate cannot depend on `prime-compiler` (which depends on this
/// crate), so the primary enforcement point is the driver calling the
/// validator's version before invoking `emit`. This copy lets the
/// crate reject obviously-out-of-subset effects even when used
/// standalone.
fn declared_effects(def: &Definition) -> Vec<String> {
    let mut out = Vec::new();
    for t in &def.transforms {
        if t.name != "effects" {
            continue;
        }
        for arg in &t.arguments {
            if let Expr::Name { name, .. } = arg {
                out.push(name.clone());
            }
        }
    }
    out
}

fn check_effects(program: &Program) -> R<()> {
    for def in &program.definitions {
        if def.is_struct() {
            continue;
        }
        for e in declared_effects(def) {
            if !SHADER_PERMITTED.contains(&e.as_str()) {
                return Err(EmitError::Logic(format!(
                    "effect '{e}' is not permitted for the GLSL backend (definition '{}')",
                    def.full_path
                )));
            }
        }
    }
    Ok(())
}

struct Emitter<'a> {
    program: &'a Program,
    out: String,
    uses_f64: bool,
}

/// Entry point (spec.md §4.8): emits a complete GLSL 450 fragment-style
/// source for `program`'s entry definition.
pub fn emit(program: &Program) -> Result<String, String> {
    let mut emitter = Emitter { program, out: String::new(), uses_f64: uses_f64(program) };
    emitter.run().map_err(Into::into)
}

fn uses_f64(program: &Program) -> bool {
    program.definitions.iter().any(|d| d.transforms.iter().any(|t| t.name == "f64" || t.template_args.iter().any(|a| a == "f64")))
}

impl<'a> Emitter<'a> {
    fn run(&mut self) -> R<()> {
        check_effects(self.program)?;
        writeln!(self.out, "// Generated by primec --emit=glsl. Do not edit by hand.")?;
        writeln!(self.out, "#version 450")?;
        if self.uses_f64 {
            writeln!(self.out, "#extension GL_ARB_gpu_shader_fp64 : require")?;
        }
        self.out.push('\n');

        for def in &self.program.definitions {
            if def.is_struct() {
                self.emit_struct(def)?;
            }
        }
        for def in &self.program.definitions {
            if !def.is_struct() && def.full_path != "/main" {
                self.emit_function(def)?;
            }
        }
        self.emit_main()?;
        Ok(())
    }

    fn emit_struct(&mut self, def: &Definition) -> R<()> {
        writeln!(self.out, "struct {} {{", flatten_path(&def.full_path))?;
        for stmt in &def.statements {
            let Expr::Call { is_binding: true, binding_name: Some(name), transforms, .. } = stmt else {
                continue;
            };
            let ty = binding_type(transforms).unwrap_or_else(|| "float".to_string());
            writeln!(self.out, "    {ty} {name};")?;
        }
        writeln!(self.out, "}};\n")?;
        Ok(())
    }

    fn emit_function(&mut self, def: &Definition) -> R<()> {
        let ret_ty = return_type(def);
        write!(self.out, "{ret_ty} {}(", flatten_path(&def.full_path))?;
        for (i, param) in def.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let Expr::Call { binding_name: Some(name), transforms, .. } = param else {
                return Err(EmitError::Logic(format!("malformed parameter in '{}'", def.full_path)));
            };
            let ty = binding_type(transforms).unwrap_or_else(|| "float".to_string());
            write!(self.out, "{ty} {name}")?;
        }
        writeln!(self.out, ") {{")?;
        for stmt in &def.statements {
            self.emit_statement(stmt, 1)?;
        }
        if let Some(ret) = &def.return_expr {
            let val = self.emit_expr(ret)?;
            writeln!(self.out, "    return {val};")?;
        }
        writeln!(self.out, "}}\n")?;
        Ok(())
    }

    fn emit_main(&mut self) -> R<()> {
        let Some(main_def) = self.program.find_definition("/main") else {
            return Err(EmitError::Logic("entry definition not found: /main".to_string()));
        };
        writeln!(self.out, "void main() {{")?;
        for stmt in &main_def.statements {
            self.emit_statement(stmt, 1)?;
        }
        writeln!(self.out, "}}")?;
        Ok(())
    }

    fn emit_statement(&mut self, stmt: &Expr, indent: usize) -> R<()> {
        let pad = "    ".repeat(indent);
        match stmt {
            Expr::Call { is_binding: true, binding_name: Some(name), args, transforms, .. } => {
                let value = self.emit_expr(&args[0])?;
                let ty = binding_type(transforms).unwrap_or_else(|| "float".to_string());
                writeln!(self.out, "{pad}{ty} {name} = {value};")?;
            }
            Expr::Call { name, args, .. } if name == "return" => {
                let val = self.emit_expr(&args[0])?;
                writeln!(self.out, "{pad}return {val};")?;
            }
            Expr::Call { name, args, body_arguments, .. } if name == "if" => {
                let cond = self.emit_expr(&args[0])?;
                writeln!(self.out, "{pad}if ({cond}) {{")?;
                if let Some(Expr::Call { body_arguments: then_body, .. }) = body_arguments.first() {
                    for s in then_body {
                        self.emit_statement(s, indent + 1)?;
                    }
                }
                writeln!(self.out, "{pad}}}")?;
                if let Some(Expr::Call { name, body_arguments: else_body, .. }) = body_arguments.get(1) {
                    if name == "else" {
                        writeln!(self.out, "{pad}else {{")?;
                        for s in else_body {
                            self.emit_statement(s, indent + 1)?;
                        }
                        writeln!(self.out, "{pad}}}")?;
                    }
                }
            }
            Expr::Call { name, args, body_arguments, .. } if matches!(name.as_str(), "loop" | "repeat") => {
                let count = self.emit_expr(&args[0])?;
                writeln!(self.out, "{pad}for (int ps_i = 0; ps_i < ({count}); ++ps_i) {{")?;
                if let Some(Expr::Call { body_arguments: inner, .. }) = body_arguments.first() {
                    for s in inner {
                        self.emit_statement(s, indent + 1)?;
                    }
                }
                writeln!(self.out, "{pad}}}")?;
            }
            Expr::Call { name, args, body_arguments, .. } if name == "while" => {
                let cond = self.emit_expr(&args[0])?;
                writeln!(self.out, "{pad}while ({cond}) {{")?;
                if let Some(Expr::Call { body_arguments: inner, .. }) = body_arguments.first() {
                    for s in inner {
                        self.emit_statement(s, indent + 1)?;
                    }
                }
                writeln!(self.out, "{pad}}}")?;
            }
            other => {
                let expr = self.emit_expr(other)?;
                writeln!(self.out, "{pad}{expr};")?;
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr) -> R<String> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.to_string()),
            Expr::BoolLiteral { value, .. } => Ok(value.to_string()),
            Expr::FloatLiteral { text, width, .. } => {
                if *width == 64 {
                    Ok(text.clone())
                } else {
                    let lit = if text.contains(['.', 'e', 'E']) { text.clone() } else { format!("{text}.0") };
                    Ok(lit)
                }
            }
            Expr::StringLiteral { .. } => Err(EmitError::Logic("string literals are not representable in GLSL".to_string())),
            Expr::Name { name, .. } => Ok(self.resolve_name(name)),
            Expr::Call { name, args, .. } => self.emit_call(name, args),
        }
    }

    fn resolve_name(&self, name: &str) -> String {
        if self.program.find_definition(&format!("/{name}")).is_some() {
            flatten_path(name)
        } else {
            name.to_string()
        }
    }

    fn emit_call(&mut self, name: &str, args: &[Expr]) -> R<String> {
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push(self.emit_expr(a)?);
        }
        match name {
            "plus" => Ok(format!("({} + {})", rendered[0], rendered[1])),
            "minus" => Ok(format!("({} - {})", rendered[0], rendered[1])),
            "multiply" => Ok(format!("({} * {})", rendered[0], rendered[1])),
            "divide" => Ok(format!("({} / {})", rendered[0], rendered[1])),
            "negate" => Ok(format!("(-{})", rendered[0])),
            "equal" => Ok(format!("({} == {})", rendered[0], rendered[1])),
            "not_equal" => Ok(format!("({} != {})", rendered[0], rendered[1])),
            "less_than" => Ok(format!("({} < {})", rendered[0], rendered[1])),
            "less_than_or_equal" => Ok(format!("({} <= {})", rendered[0], rendered[1])),
            "greater_than" => Ok(format!("({} > {})", rendered[0], rendered[1])),
            "greater_than_or_equal" => Ok(format!("({} >= {})", rendered[0], rendered[1])),
            "and" => Ok(format!("({} && {})", rendered[0], rendered[1])),
            "or" => Ok(format!("({} || {})", rendered[0], rendered[1])),
            "not" => Ok(format!("(!{})", rendered[0])),
            "assign" => Ok(format!("({} = {})", rendered[0], rendered[1])),
            "increment" => Ok(format!("(++{})", rendered[0])),
            "decrement" => Ok(format!("(--{})", rendered[0])),
            "at" | "at_unsafe" => Ok(format!("{}[{}]", rendered[0], rendered[1])),
            "pow" => Ok(format!("pow({}, {})", rendered[0], rendered[1])),
            "convert" => Ok(rendered[0].clone()),
            "print" | "print_line" | "print_error" | "print_line_error" | "notify" | "insert" | "take" => Err(
                EmitError::Logic(format!("'{name}' has no GLSL equivalent; shaders have no host I/O or pathspace")),
            ),
            other => Ok(format!("{}({})", flatten_path(other), rendered.join(", "))),
        }
    }
}

fn return_type(def: &Definition) -> String {
    for t in &def.transforms {
        if t.name == "return" {
            if let Some(name) = t.template_args.first() {
                return glsl_type_name(name);
            }
        }
    }
    "void".to_string()
}

/// Compiles emitted GLSL text to a SPIR-V binary by shelling out to
/// `glslangValidator` (falling back to `glslc`), per spec.md §4.8 /
/// §6's `--emit=spirv`. Exits with code 2 ("host environment problem")
/// when neither tool is on `PATH`, matching the exit-code table for
/// missing external tooling.
pub fn compile_to_spirv(source: &str, stage: &str, out_path: &std::path::Path) -> Result<(), String> {
    let dir = tempfile_dir()?;
    let src_path = dir.join(format!("shader.{stage}"));
    std::fs::write(&src_path, source).map_err(|e| format!("failed to write temporary shader source: {e}"))?;

    if let Ok(status) = Command::new("glslangValidator").arg("-V").arg(&src_path).arg("-o").arg(out_path).status() {
        if status.success() {
            return Ok(());
        }
        return Err(format!("glslangValidator failed with {status}"));
    }
    if let Ok(status) = Command::new("glslc").arg(&src_path).arg("-o").arg(out_path).status() {
        if status.success() {
            return Ok(());
        }
        return Err(format!("glslc failed with {status}"));
    }
    Err("glslangValidator or glslc not found".to_string())
}

fn tempfile_dir() -> Result<std::path::PathBuf, String> {
    let dir = std::env::temp_dir().join(format!("primec-glsl-{}", std::process::id()));
    std::fs::create_dir_all(&dir).map_err(|e| format!("failed to create temporary directory: {e}"))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prime_core::ast::{Phase, Span};

    fn minimal_entry() -> Program {
        Program {
            definitions: vec![Definition {
                full_path: "/main".to_string(),
                namespace: "/".to_string(),
                params: Vec::new(),
                statements: Vec::new(),
                return_expr: None,
                transforms: Vec::new(),
                template_params: Vec::new(),
            }],
            executions: Vec::new(),
            imports: Vec::new(),
        }
    }

    #[test]
    fn emits_a_version_header() {
        let program = minimal_entry();
        let glsl = emit(&program).unwrap();
        assert!(glsl.contains("#version 450"));
        assert!(glsl.contains("void main()"));
    }

    #[test]
    fn rejects_io_effect() {
        let mut program = minimal_entry();
        let mut t = Transform::new("effects", Phase::Semantic);
        t.arguments.push(Expr::Name { namespace: None, name: "io_out".to_string(), span: Span::default() });
        program.definitions[0].transforms.push(t);
        let err = emit(&program).unwrap_err();
        assert!(err.contains("not permitted"));
    }

    #[test]
    fn rejects_print_calls() {
        let mut program = minimal_entry();
        program.definitions[0].statements.push(Expr::call(
            "print_line",
            vec![Expr::StringLiteral { value: "hi".to_string(), suffix: None, span: Span::default() }],
            Span::default(),
        ));
        let err = emit(&program).unwrap_err();
        assert!(err.contains("no GLSL equivalent"));
    }
}
