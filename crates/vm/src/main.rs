//! `primevm` — standalone runner for a serialized Prime IR module
//! (spec.md §2 "Bytecode VM", §6 IR binary format).

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

#[derive(ClapParser)]
#[command(name = "primevm", about = "Execute a serialized Prime IR module")]
struct Cli {
    /// Path to a `.prir` file produced by `primec --emit=ir`
    module: PathBuf,

    /// Arguments passed to the executed program as argv[1..]
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    let bytes = match fs::read(&cli.module) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("primevm: failed to read {}: {e}", cli.module.display());
            return ExitCode::from(2);
        }
    };
    let module = match prime_core::serialize::deserialize(&bytes) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("primevm: {e}");
            return ExitCode::from(2);
        }
    };

    let mut argv = vec![cli.module.display().to_string()];
    argv.extend(cli.args);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    match prime_vm::execute(&module, &argv, &mut out, &mut err) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("primevm: {e}");
            ExitCode::from(2)
        }
    }
}
