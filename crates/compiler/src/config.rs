//! Driver-facing compilation configuration (spec.md §6): the bits of
//! the CLI surface that feed `validate`/`lower`/the backends rather
//! than a single stage in isolation — entry path, include roots, and
//! the default effect set every definition's own `[effects(...)]` is
//! unioned with.

use std::path::PathBuf;

/// `--default-effects=<list>` (spec.md §6): a comma list of effect
/// tokens, with two special tokens — `default` enables `io_out`,
/// `none` disables everything (the list must then be empty).
pub fn parse_default_effects(spec: &str) -> Result<Vec<String>, String> {
    let spec = spec.trim();
    if spec.is_empty() || spec == "default" {
        return Ok(vec![prime_core::types::effect::IO_OUT.to_string()]);
    }
    if spec == "none" {
        return Ok(Vec::new());
    }
    let mut effects = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token {
            "default" => effects.push(prime_core::types::effect::IO_OUT.to_string()),
            "none" => return Err("'none' cannot be combined with other --default-effects tokens".to_string()),
            _ => {
                if !prime_core::types::effect::is_known(token) {
                    return Err(format!("unknown effect token '{token}' in --default-effects"));
                }
                effects.push(token.to_string());
            }
        }
    }
    Ok(effects)
}

/// Compilation-wide configuration threaded from CLI flags into the
/// pipeline (spec.md §6). Distinct from `text_transform::TransformConfig`,
/// which only governs the text-transform stage.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    pub entry_path: String,
    pub include_roots: Vec<PathBuf>,
    pub default_effects: Vec<String>,
    pub transforms: crate::text_transform::TransformConfig,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            entry_path: "/main".to_string(),
            include_roots: Vec::new(),
            default_effects: vec![prime_core::types::effect::IO_OUT.to_string()],
            transforms: crate::text_transform::TransformConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_enables_io_out() {
        assert_eq!(parse_default_effects("default").unwrap(), vec!["io_out".to_string()]);
    }

    #[test]
    fn none_token_disables_everything() {
        assert_eq!(parse_default_effects("none").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn comma_list_of_known_effects() {
        let effects = parse_default_effects("io_out,heap_alloc").unwrap();
        assert_eq!(effects, vec!["io_out".to_string(), "heap_alloc".to_string()]);
    }

    #[test]
    fn unknown_token_is_an_error() {
        assert!(parse_default_effects("not_a_real_effect").is_err());
    }
}
