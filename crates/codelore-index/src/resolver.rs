//! Rewrites file-local use names into global node identifiers.
//!
//! Resolution is a single pass over one file: a name bound by a relative
//! import becomes `<resolved path>:<name>`, a name declared in the same file
//! becomes that symbol's id, anything else is left as is.

use std::collections::HashMap;

use crate::extractor::Import;
use crate::symbol::{SymbolNode, symbol_id};

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Resolve every use of every symbol in one file, in place.
///
/// Already-qualified names are never rewritten again, so running this twice
/// is the same as running it once.
pub fn resolve_file(symbols: &mut [SymbolNode], imports: &[Import], file_path: &str) {
    let imported = import_map(imports, file_path);
    let local: HashMap<String, String> = symbols
        .iter()
        .map(|s| (s.name.clone(), s.id()))
        .collect();

    for symbol in symbols.iter_mut() {
        for u in symbol.uses_mut() {
            if let Some(target) = imported.get(&u.name).or_else(|| local.get(&u.name)) {
                u.name.clone_from(target);
            }
        }
    }
}

/// Local binding name to fully-qualified target id, for relative imports only.
fn import_map(imports: &[Import], file_path: &str) -> HashMap<String, String> {
    imports
        .iter()
        .filter_map(|i| {
            let path = resolve_specifier(file_path, &i.specifier)?;
            let name = i.imported.as_deref().unwrap_or(&i.local);
            Some((i.local.clone(), symbol_id(&path, name)))
        })
        .collect()
}

/// Resolve a relative module specifier against the importing file.
///
/// Returns `None` for package imports. The result is normalised with `/`
/// separators; a specifier without a source extension takes the importing
/// file's extension.
#[must_use]
pub fn resolve_specifier(importer: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return None;
    }

    let importer = importer.replace('\\', "/");
    let dir = importer.rsplit_once('/').map_or("", |(d, _)| d);

    let mut parts: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(specifier.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    let mut path = parts.join("/");

    let has_source_ext = path
        .rsplit_once('.')
        .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext));
    if !has_source_ext {
        let ext = importer
            .rsplit_once('.')
            .map(|(_, e)| e)
            .filter(|e| SOURCE_EXTENSIONS.contains(e))
            .unwrap_or("ts");
        path.push('.');
        path.push_str(ext);
    }
    Some(path)
}
