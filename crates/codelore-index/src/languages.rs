//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source language with a symbol extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Lang {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-ts")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-ts")]
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "mts" | "cts" => Some(Lang::TypeScript),
        "tsx" => Some(Lang::Tsx),
        _ => None,
    }
}

/// A file is indexable when its extension is in `extensions` and a grammar is compiled in.
#[must_use]
pub fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|e| e == ext) && detect_language(path).and_then(Lang::grammar).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["ts".into(), "js".into()]
    }

    #[test]
    fn detect_language_ts() {
        assert_eq!(
            detect_language(Path::new("src/main.ts")),
            Some(Lang::TypeScript)
        );
        assert_eq!(detect_language(Path::new("view.tsx")), Some(Lang::Tsx));
    }

    #[test]
    fn detect_language_js() {
        assert_eq!(
            detect_language(Path::new("lib/index.mjs")),
            Some(Lang::JavaScript)
        );
    }

    #[test]
    fn detect_language_unknown() {
        assert_eq!(detect_language(Path::new("README.md")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn indexable_respects_extension_list() {
        assert!(is_indexable(Path::new("a.ts"), &exts()));
        assert!(is_indexable(Path::new("a.js"), &exts()));
        assert!(!is_indexable(Path::new("a.tsx"), &exts()));
        assert!(!is_indexable(Path::new("a.rs"), &exts()));
    }

    #[test]
    fn grammars_available() {
        assert!(Lang::TypeScript.grammar().is_some());
        assert!(Lang::JavaScript.grammar().is_some());
    }

    #[test]
    fn display_matches_id() {
        assert_eq!(Lang::TypeScript.to_string(), "typescript");
    }
}
