use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const PREFIX: &str = "CHATCTX_";

fn rust_sources(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut found = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_'
}

/// `CHATCTX_*` names that start a word. Bare prefixes and stems ending in
/// `_` are not variables.
fn env_names(source: &str) -> impl Iterator<Item = &str> {
    source.match_indices(PREFIX).filter_map(move |(start, _)| {
        let preceded = source[..start].chars().next_back().is_some_and(is_name_char);
        if preceded {
            return None;
        }
        let len = source[start..]
            .find(|ch: char| !is_name_char(ch))
            .unwrap_or(source.len() - start);
        let name = &source[start..start + len];
        (name.len() > PREFIX.len() && !name.ends_with('_')).then_some(name)
    })
}

fn main() -> std::io::Result<()> {
    let mut names = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        if let Ok(content) = fs::read_to_string(&file) {
            names.extend(env_names(&content).map(str::to_string));
        }
    }

    let out_dir = env::var("OUT_DIR").map_err(std::io::Error::other)?;
    let mut out = fs::File::create(Path::new(&out_dir).join("chatctx_env_allowlist.rs"))?;
    writeln!(out, "pub const GENERATED_CHATCTX_ENV_ALLOWLIST: &[&str] = &[")?;
    for name in &names {
        writeln!(out, "    {name:?},")?;
    }
    writeln!(out, "];")?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
