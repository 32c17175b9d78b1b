//! `primec` — the Prime compiler driver (spec.md §6 "CLI surface").
//!
//! Thin orchestration layer over `primec_lib`: parses flags, builds a
//! `CompileConfig`, runs the pipeline through whichever stage the
//! requested `--emit`/`--dump-stage` needs, and hands the result to
//! one of the backend crates or to `prime-vm` directly. Exit codes
//! follow spec.md §6's table: `0` success, `2` parse/semantic/
//! lowering/driver error, `3` a VM/generated-program runtime trap,
//! anything else the literal exit status of an external tool this
//! driver shelled out to.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use clap::Parser as ClapParser;

use primec_lib::config::{parse_default_effects, CompileConfig};
use primec_lib::text_transform::TransformConfig;

#[derive(ClapParser)]
#[command(name = "primec", about = "Compile a Prime source file to one of several targets")]
struct Cli {
    /// Entry source file
    input: PathBuf,

    /// Back-end to produce: cpp|exe|ir|vm|native|glsl|spirv
    #[arg(long)]
    emit: Option<String>,

    /// Output path (required for every `--emit` except `vm`)
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Entry definition path (default `/main`)
    #[arg(long)]
    entry: Option<String>,

    /// Root directory for unquoted `include</…>` directives; repeatable
    #[arg(long = "include-path")]
    include_path: Vec<PathBuf>,

    /// Comma list of effect tokens; `default` enables `io_out`, `none` disables all
    #[arg(long = "default-effects")]
    default_effects: Option<String>,

    /// Comma list of text-transform filter names, e.g. `default,implicit-i32`
    #[arg(long = "text-filters")]
    text_filters: Option<String>,

    /// Disable all text transforms
    #[arg(long = "no-transforms")]
    no_transforms: bool,

    /// Dump one pipeline stage (`pre_ast|ast|ir`) to stdout instead of emitting
    #[arg(long = "dump-stage")]
    dump_stage: Option<String>,

    /// Base directory for a relative `-o`
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Arguments forwarded as argv[1..] to `--emit=vm` execution
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(DriverError::Message(msg)) => {
            eprintln!("primec: {msg}");
            ExitCode::from(2)
        }
    }
}

enum DriverError {
    Message(String),
}

impl From<String> for DriverError {
    fn from(msg: String) -> Self {
        DriverError::Message(msg)
    }
}

fn run(cli: Cli) -> Result<ExitCode, DriverError> {
    let config = build_config(&cli)?;

    if let Some(stage) = &cli.dump_stage {
        let dump = primec_lib::dump_stage(stage, &cli.input, &config)?;
        println!("{dump}");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(emit) = cli.emit.as_deref() else {
        return Err("--emit=<cpp|exe|ir|vm|native|glsl|spirv> is required (or pass --dump-stage)".to_string().into());
    };

    match emit {
        "cpp" => emit_cpp(&cli, &config),
        "exe" => emit_exe(&cli, &config),
        "ir" => emit_ir(&cli, &config),
        "vm" => emit_vm(&cli, &config),
        "native" => emit_native(&cli, &config),
        "glsl" => emit_glsl(&cli, &config),
        "spirv" => emit_spirv(&cli, &config),
        other => Err(format!("unknown --emit target '{other}' (expected cpp|exe|ir|vm|native|glsl|spirv)").into()),
    }
}

fn build_config(cli: &Cli) -> Result<CompileConfig, DriverError> {
    let default_effects = match &cli.default_effects {
        Some(spec) => parse_default_effects(spec)?,
        None => CompileConfig::default().default_effects,
    };
    let filters: Vec<String> = cli
        .text_filters
        .as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    Ok(CompileConfig {
        entry_path: cli.entry.clone().unwrap_or_else(|| "/main".to_string()),
        include_roots: cli.include_path.clone(),
        default_effects,
        transforms: TransformConfig::from_cli(&filters, cli.no_transforms),
    })
}

fn resolve_output(cli: &Cli) -> Result<PathBuf, DriverError> {
    let out =
        cli.output.clone().ok_or_else(|| format!("-o <path> is required for --emit={}", cli.emit.as_deref().unwrap_or("")))?;
    Ok(match (&cli.out_dir, out.is_relative()) {
        (Some(dir), true) => dir.join(out),
        _ => out,
    })
}

fn emit_cpp(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let program = primec_lib::validate_file(&cli.input, config)?;
    let text = backend_cpp::emit(&program)?;
    let out = resolve_output(cli)?;
    write_file(&out, text.as_bytes())?;
    Ok(ExitCode::SUCCESS)
}

fn emit_exe(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let program = primec_lib::validate_file(&cli.input, config)?;
    let cpp_text = backend_cpp::emit(&program)?;
    let out = resolve_output(cli)?;

    let tmp_dir = std::env::temp_dir().join(format!("primec-cpp-{}", std::process::id()));
    std::fs::create_dir_all(&tmp_dir).map_err(|e| format!("failed to create temporary directory: {e}"))?;
    let src_path = tmp_dir.join("main.cpp");
    std::fs::write(&src_path, &cpp_text).map_err(|e| format!("failed to write temporary C++ source: {e}"))?;

    let compiler = std::env::var("CXX").unwrap_or_else(|_| "c++".to_string());
    let status = Command::new(&compiler)
        .args(["-std=c++23", "-O2", "-o"])
        .arg(&out)
        .arg(&src_path)
        .status()
        .map_err(|e| format!("failed to invoke '{compiler}': {e}"))?;
    if !status.success() {
        return Ok(exit_code_from_status(status));
    }
    Ok(ExitCode::SUCCESS)
}

fn emit_ir(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let module = primec_lib::compile_source(&cli.input, config)?;
    let bytes = prime_core::serialize::serialize(&module);
    let out = resolve_output(cli)?;
    write_file(&out, &bytes)?;
    Ok(ExitCode::SUCCESS)
}

fn emit_vm(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let module = primec_lib::compile_source(&cli.input, config)?;
    let mut argv = vec![cli.input.display().to_string()];
    argv.extend(cli.program_args.clone());

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    match prime_vm::execute(&module, &argv, &mut out, &mut err) {
        Ok(code) => Ok(ExitCode::from(code as u8)),
        Err(e) => {
            eprintln!("primec: {e}");
            Ok(ExitCode::from(2))
        }
    }
}

fn emit_native(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let module = primec_lib::compile_source(&cli.input, config)?;
    let asm = backend_native::emit(&module)?;
    let out = resolve_output(cli)?;
    write_file(&out, asm.as_bytes())?;
    Ok(ExitCode::SUCCESS)
}

fn emit_glsl(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let program = primec_lib::validate_file(&cli.input, config)?;
    let text = backend_glsl::emit(&program)?;
    let out = resolve_output(cli)?;
    write_file(&out, text.as_bytes())?;
    Ok(ExitCode::SUCCESS)
}

fn emit_spirv(cli: &Cli, config: &CompileConfig) -> Result<ExitCode, DriverError> {
    let program = primec_lib::validate_file(&cli.input, config)?;
    let glsl_text = backend_glsl::emit(&program)?;
    let out = resolve_output(cli)?;
    backend_glsl::compile_to_spirv(&glsl_text, "frag", &out)?;
    Ok(ExitCode::SUCCESS)
}

fn exit_code_from_status(status: std::process::ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) if (0..=255).contains(&code) => ExitCode::from(code as u8),
        _ => ExitCode::from(2),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), DriverError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| format!("failed to create '{}': {e}", parent.display()))?;
        }
    }
    std::fs::write(path, contents).map_err(|e| format!("failed to write '{}': {e}", path.display()).into())
}
