//! Textual include expansion (spec.md §4.3).
//!
//! Runs on raw source text before lexing. Grounded on
//! `IncludeResolver.cpp`'s substring scan for `"include<"` and its
//! `while (changed)` re-scan loop; the version-selecting resolution of
//! unquoted `/path` forms is this spec's own addition (see DESIGN.md
//! Open Question 3) and has no counterpart in that file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Expands every `include<...>` directive in the file at `entry_path`,
/// recursively, relative to its own directory for quoted paths and
/// relative to `include_roots` for unquoted `/path` forms.
pub fn expand_includes(entry_path: &Path, include_roots: &[PathBuf]) -> Result<String, String> {
    let entry_path = entry_path
        .canonicalize()
        .map_err(|e| format!("failed to read input: {}: {e}", entry_path.display()))?;
    let mut source = fs::read_to_string(&entry_path)
        .map_err(|_| format!("failed to read input: {}", entry_path.display()))?;
    let base_dir = entry_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let mut expanded = HashSet::new();
    expand_internal(&base_dir, include_roots, &mut source, &mut expanded)?;
    Ok(source)
}

#[derive(Debug, Clone)]
enum IncludeToken {
    QuotedPath(String),
    UnquotedPath(String),
    Version(String),
}

fn expand_internal(
    base_dir: &Path,
    include_roots: &[PathBuf],
    source: &mut String,
    expanded: &mut HashSet<PathBuf>,
) -> Result<(), String> {
    let mut changed = true;
    while changed {
        changed = false;
        let mut result = String::with_capacity(source.len());
        let bytes: Vec<char> = source.chars().collect();
        let mut i = 0usize;
        while i < bytes.len() {
            if matches_at(&bytes, i, "include<") {
                let start = i + "include<".len();
                let end = find_char(&bytes, start, '>')
                    .ok_or_else(|| "unterminated include<...> directive".to_string())?;
                let payload: String = bytes[start..end].iter().collect();
                let tokens = parse_payload(&payload)?;

                let version = tokens.iter().find_map(|t| match t {
                    IncludeToken::Version(v) => Some(v.clone()),
                    _ => None,
                });
                let paths: Vec<&IncludeToken> =
                    tokens.iter().filter(|t| !matches!(t, IncludeToken::Version(_))).collect();
                if paths.is_empty() {
                    return Err("include<...> requires at least one quoted path".to_string());
                }

                for token in paths {
                    let resolved = match token {
                        IncludeToken::QuotedPath(path) => {
                            let candidate = PathBuf::from(path);
                            if candidate.is_relative() { base_dir.join(candidate) } else { candidate }
                        }
                        IncludeToken::UnquotedPath(path) => {
                            resolve_unquoted(path, version.as_deref(), include_roots)?
                        }
                        IncludeToken::Version(_) => unreachable!(),
                    };
                    let resolved = resolved
                        .canonicalize()
                        .map_err(|_| format!("failed to read include: {}", resolved.display()))?;
                    if !expanded.insert(resolved.clone()) {
                        continue;
                    }
                    let mut included = fs::read_to_string(&resolved)
                        .map_err(|_| format!("failed to read include: {}", resolved.display()))?;
                    let child_base = resolved.parent().unwrap_or(Path::new(".")).to_path_buf();
                    expand_internal(&child_base, include_roots, &mut included, expanded)?;
                    result.push_str(&included);
                    if !included.ends_with('\n') {
                        result.push('\n');
                    }
                }
                i = end + 1;
                changed = true;
                continue;
            }
            result.push(bytes[i]);
            i += 1;
        }
        *source = result;
    }
    Ok(())
}

fn matches_at(chars: &[char], pos: usize, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    if pos + needle.len() > chars.len() {
        return false;
    }
    chars[pos..pos + needle.len()] == needle[..]
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    chars[from..].iter().position(|c| *c == target).map(|p| p + from)
}

const STRING_SUFFIXES: &[&str] = &["utf8", "ascii", "raw_utf8"];

fn parse_payload(payload: &str) -> Result<Vec<IncludeToken>, String> {
    let chars: Vec<char> = payload.chars().collect();
    let mut pos = 0usize;
    let mut out = Vec::new();
    while pos < chars.len() {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }
        if matches_at(&chars, pos, "version=") {
            pos += "version=".len();
            if pos < chars.len() && chars[pos] == '"' {
                pos += 1;
                let quote_end = find_char(&chars, pos, '"')
                    .ok_or_else(|| "unterminated version string in include<...>".to_string())?;
                let value: String = chars[pos..quote_end].iter().collect();
                out.push(IncludeToken::Version(value));
                pos = quote_end + 1;
            }
        } else if chars[pos] == '"' || chars[pos] == '\'' {
            let quote = chars[pos];
            pos += 1;
            let quote_end = find_char(&chars, pos, quote)
                .ok_or_else(|| "unterminated include path string".to_string())?;
            let path: String = chars[pos..quote_end].iter().collect::<String>().trim().to_string();
            pos = quote_end + 1;
            for suffix in STRING_SUFFIXES {
                if matches_at(&chars, pos, suffix) {
                    return Err("include path cannot have suffix".to_string());
                }
            }
            out.push(IncludeToken::QuotedPath(path));
        } else {
            let mut end = pos;
            while end < chars.len() && chars[end] != ',' {
                end += 1;
            }
            let token: String = chars[pos..end].iter().collect::<String>().trim().to_string();
            pos = end;
            if !token.is_empty() {
                out.push(IncludeToken::UnquotedPath(token));
            }
        }
        if pos < chars.len() && chars[pos] == ',' {
            pos += 1;
        }
    }
    Ok(out)
}

/// Resolves an unquoted `/path` form against `include_roots`, selecting
/// the newest `X.Y.Z` version subdirectory whose major.minor matches
/// `version` (spec.md §4.3, worked example spec.md §8).
fn resolve_unquoted(path: &str, version: Option<&str>, include_roots: &[PathBuf]) -> Result<PathBuf, String> {
    let version = version.ok_or_else(|| format!("include<{path}> requires a version= clause to resolve an unquoted path"))?;
    let trimmed = path.trim_start_matches('/');
    let leaf = trimmed.rsplit('/').next().unwrap_or(trimmed).to_string();

    for root in include_roots {
        let mut candidates: Vec<(u32, PathBuf)> = Vec::new();
        let Ok(entries) = fs::read_dir(root) else { continue };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some((major_minor, patch)) = name.rsplit_once('.') else { continue };
            let Ok(patch_num) = patch.parse::<u32>() else { continue };
            if major_minor == version {
                let file_path = root.join(name.as_ref()).join(trimmed).join(format!("{leaf}.prime"));
                if file_path.exists() {
                    candidates.push((patch_num, file_path));
                }
            }
        }
        if let Some((_, best)) = candidates.into_iter().max_by_key(|(patch, _)| *patch) {
            return Ok(best);
        }
    }
    Err(format!("failed to read include: {path} (version {version})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let full = dir.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        let mut f = fs::File::create(full).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn expands_quoted_relative_include() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib.prime", "helper() { return(1i32) }\n");
        write(dir.path(), "main.prime", "include<\"lib.prime\">\nmain() { return(helper()) }\n");
        let out = expand_includes(&dir.path().join("main.prime"), &[]).unwrap();
        assert!(out.contains("helper()"));
        assert!(!out.contains("include<"));
    }

    #[test]
    fn deduplicates_repeated_include() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib.prime", "helper() { return(1i32) }\n");
        write(
            dir.path(),
            "main.prime",
            "include<\"lib.prime\">\ninclude<\"lib.prime\">\nmain() { return(helper()) }\n",
        );
        let out = expand_includes(&dir.path().join("main.prime"), &[]).unwrap();
        assert_eq!(out.matches("helper() {").count(), 1);
    }

    #[test]
    fn recurses_into_nested_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.prime", "b_helper() { return(2i32) }\n");
        write(dir.path(), "a.prime", "include<\"b.prime\">\na_helper() { return(b_helper()) }\n");
        write(dir.path(), "main.prime", "include<\"a.prime\">\nmain() { return(a_helper()) }\n");
        let out = expand_includes(&dir.path().join("main.prime"), &[]).unwrap();
        assert!(out.contains("b_helper()"));
        assert!(out.contains("a_helper()"));
    }

    #[test]
    fn version_selection_picks_greatest_matching_patch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1.2.0/lib/lib.prime", "lib() { return(5i32) }\n");
        write(dir.path(), "1.2.3/lib/lib.prime", "lib() { return(7i32) }\n");
        write(dir.path(), "main.prime", "include</lib, version=\"1.2\">\nmain() { return(lib()) }\n");
        let out = expand_includes(&dir.path().join("main.prime"), &[dir.path().to_path_buf()]).unwrap();
        assert!(out.contains("return(7i32)"));
        assert!(!out.contains("return(5i32)"));
    }

    #[test]
    fn unterminated_directive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.prime", "include<\"a.prime\"\nmain() { return(0i32) }\n");
        let err = expand_includes(&dir.path().join("main.prime"), &[]).unwrap_err();
        assert!(err.contains("unterminated include<...> directive"));
    }

    #[test]
    fn empty_path_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.prime", "include<version=\"1.2\">\nmain() { return(0i32) }\n");
        let err = expand_includes(&dir.path().join("main.prime"), &[]).unwrap_err();
        assert!(err.contains("requires at least one quoted path"));
    }

    #[test]
    fn suffix_on_include_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.prime", "include<\"lib.prime\"utf8>\nmain() { return(0i32) }\n");
        let err = expand_includes(&dir.path().join("main.prime"), &[]).unwrap_err();
        assert!(err.contains("cannot have suffix"));
    }
}
