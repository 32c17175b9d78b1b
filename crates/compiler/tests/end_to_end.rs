//! Black-box scenarios from spec.md §8, driven end to end through
//! `primec_lib::compile_source` and `prime_vm::execute` — the same
//! path `primec --emit=vm` takes, without going through the CLI.

use std::io::Write;
use std::path::Path;

use primec_lib::config::CompileConfig;

fn write_source(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("main.prime");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn run(source: &str, argv_tail: &[&str]) -> (i32, String, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_source(dir.path(), source);
    let module = primec_lib::compile_source(&path, &CompileConfig::default()).expect("compile should succeed");

    let mut argv = vec![path.display().to_string()];
    argv.extend(argv_tail.iter().map(|s| s.to_string()));

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = prime_vm::execute(&module, &argv, &mut stdout, &mut stderr).expect("execution should not host-error");
    (code, String::from_utf8(stdout).unwrap(), String::from_utf8(stderr).unwrap())
}

#[test]
fn literal_addition_returns_sum() {
    let (code, _out, _err) = run("[return<int>] main() { return(plus(1i32, 2i32)) }", &[]);
    assert_eq!(code, 3);
}

#[test]
fn argv_count_includes_program_name() {
    // argv is [prog, alpha, beta] -> count() == 3
    let (code, _out, _err) = run(
        "[return<int>] main([array<string>] args) { return(args.count()) }",
        &["alpha", "beta"],
    );
    assert_eq!(code, 3);
}

#[test]
fn out_of_bounds_array_index_traps_with_exit_3() {
    let (code, _out, err) = run(
        "[return<int>] main() { [array<i32>] v{array<i32>(4i32)} return(v[9i32]) }",
        &[],
    );
    assert_eq!(code, 3);
    assert_eq!(err, "array index out of bounds\n");
}

#[test]
fn print_line_of_an_argv_entry_with_io_out_effect() {
    let (code, out, _err) = run(
        "[return<int> effects(io_out)] main([array<string>] args) { print_line(args[1i32]) return(0i32) }",
        &["alpha"],
    );
    assert_eq!(code, 0);
    assert_eq!(out, "alpha\n");
}

#[test]
fn mixed_signed_unsigned_comparison_is_a_semantic_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_source(dir.path(), "[return<bool>] main() { return(greater_than(1i64, 2u64)) }");
    let err = primec_lib::compile_source(&path, &CompileConfig::default()).unwrap_err();
    assert!(err.contains("mixed signed/unsigned"), "unexpected error: {err}");
}

#[test]
fn include_version_selection_picks_newest_matching_patch() {
    let dir = tempfile::tempdir().unwrap();
    let write = |rel: &str, contents: &str| {
        let full = dir.path().join(rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, contents).unwrap();
    };
    write("1.2.0/lib/lib.prime", "lib() { return(5i32) }\n");
    write("1.2.3/lib/lib.prime", "lib() { return(7i32) }\n");
    let main_path = dir.path().join("main.prime");
    std::fs::write(&main_path, "include</lib, version=\"1.2\">\n[return<int>] main() { return(lib()) }\n").unwrap();

    let config = CompileConfig {
        include_roots: vec![dir.path().to_path_buf()],
        ..CompileConfig::default()
    };
    let module = primec_lib::compile_source(&main_path, &config).expect("compile should succeed");
    let argv = vec![main_path.display().to_string()];
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = prime_vm::execute(&module, &argv, &mut stdout, &mut stderr).unwrap();
    assert_eq!(code, 7);
}
