//! Typed `{identifier}` / `{identifier.field}` substitution for build scripts.
//!
//! Unlike a general-purpose template engine, this formatter knows its whole
//! vocabulary up front and rejects anything outside it with `UnknownTemplateKey`
//! rather than leaving the token in the output.

use std::path::Path;

use crate::error::{MusselsError, Result};
use crate::tools::Toolchain;

pub struct TemplateContext<'a> {
    pub install: &'a Path,
    pub includes: &'a Path,
    pub libs: &'a Path,
    pub build: &'a Path,
    pub target: &'a str,
    pub toolchain: &'a Toolchain,
}

/// Expands every `{...}` token in `template`. Forward slashes are used for paths
/// even on Windows, per the recipe substitution grammar.
pub fn expand(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < template.len() {
        let c = template[i..].chars().next().unwrap();
        if c == '{' {
            match template[i + 1..].find('}') {
                Some(rel_end) => {
                    let end = i + 1 + rel_end;
                    let token = &template[i + 1..end];
                    out.push_str(&resolve(token, ctx)?);
                    i = end + 1;
                }
                None => return Err(MusselsError::UnknownTemplateKey(template[i..].to_string())),
            }
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }
    Ok(out)
}

fn resolve(token: &str, ctx: &TemplateContext) -> Result<String> {
    let (head, field) = match token.split_once('.') {
        Some((h, f)) => (h, Some(f)),
        None => (token, None),
    };

    match (head, field) {
        ("install", None) => Ok(to_slash(ctx.install)),
        ("includes", None) => Ok(to_slash(ctx.includes)),
        ("libs", None) => Ok(to_slash(ctx.libs)),
        ("build", None) => Ok(to_slash(ctx.build)),
        ("target", None) => Ok(ctx.target.to_string()),
        (tool_name, Some(variable)) => ctx
            .toolchain
            .get(tool_name)
            .and_then(|tool| tool.variables.get(variable))
            .cloned()
            .ok_or_else(|| MusselsError::UnknownTemplateKey(token.to_string())),
        _ => Err(MusselsError::UnknownTemplateKey(token.to_string())),
    }
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx(toolchain: &Toolchain) -> TemplateContext<'_> {
        TemplateContext {
            install: Path::new("/data/install"),
            includes: Path::new("/data/install/host/include"),
            libs: Path::new("/data/install/host/lib"),
            build: Path::new("/data/cache/work/host/zlib-1.2.11"),
            target: "host",
            toolchain,
        }
    }

    #[test]
    fn expands_known_keys() {
        let toolchain = Toolchain::default();
        let out = expand("--prefix={install} --includedir={includes}", &ctx(&toolchain)).unwrap();
        assert_eq!(out, "--prefix=/data/install --includedir=/data/install/host/include");
    }

    #[test]
    fn expands_tool_variable() {
        let mut toolchain = Toolchain::default();
        let mut variables = BTreeMap::new();
        variables.insert("cc".to_string(), "clang".to_string());
        toolchain.tools.push(crate::tools::ResolvedTool {
            nvc: crate::model::Nvc::new("compiler", "1.0", "local"),
            tool_path: None,
            variables,
        });
        let out = expand("CC={compiler.cc}", &ctx(&toolchain)).unwrap();
        assert_eq!(out, "CC=clang");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let toolchain = Toolchain::default();
        assert!(matches!(
            expand("{bogus}", &ctx(&toolchain)),
            Err(MusselsError::UnknownTemplateKey(_))
        ));
    }

    #[test]
    fn unknown_tool_variable_is_an_error() {
        let toolchain = Toolchain::default();
        assert!(matches!(
            expand("{compiler.cc}", &ctx(&toolchain)),
            Err(MusselsError::UnknownTemplateKey(_))
        ));
    }

    #[test]
    fn paths_always_use_forward_slashes() {
        let toolchain = Toolchain::default();
        let out = expand("{build}", &ctx(&toolchain)).unwrap();
        assert!(!out.contains('\\'));
    }

    #[test]
    fn literal_text_passes_through() {
        let toolchain = Toolchain::default();
        let out = expand("no substitution here", &ctx(&toolchain)).unwrap();
        assert_eq!(out, "no substitution here");
    }

    #[test]
    fn unterminated_brace_is_an_error() {
        let toolchain = Toolchain::default();
        assert!(expand("{install", &ctx(&toolchain)).is_err());
    }
}
