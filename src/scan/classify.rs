//! Extension/path classification and text/binary sniffing, used by the
//! Scanner (C2) and the Semantic Tagger (C4).

use std::path::Path;

/// Category tags a file can receive; a file may carry more than one.
pub const CATEGORY_SOURCE: &str = "source";
pub const CATEGORY_DOC: &str = "doc";
pub const CATEGORY_TEST: &str = "test";
pub const CATEGORY_CONFIG: &str = "config";
pub const CATEGORY_DATA: &str = "data";
pub const CATEGORY_BUILD: &str = "build";

/// Derives the `{source, doc, test, config, data, build}` category set for a
/// repo-relative path, by extension and path shape.
pub fn classify(relative_path: &str, extension: &str) -> Vec<&'static str> {
    let mut categories = Vec::new();
    let lower = relative_path.to_ascii_lowercase();

    if is_test_path(&lower) {
        categories.push(CATEGORY_TEST);
    }
    if is_build_path(&lower) {
        categories.push(CATEGORY_BUILD);
    }

    match extension {
        ".md" | ".rst" | ".txt" | ".adoc" => categories.push(CATEGORY_DOC),
        ".yaml" | ".yml" | ".toml" | ".json" | ".ini" | ".cfg" => categories.push(CATEGORY_CONFIG),
        ".csv" | ".tsv" | ".sql" => categories.push(CATEGORY_DATA),
        "" => {}
        _ if is_source_extension(extension) => categories.push(CATEGORY_SOURCE),
        _ => {}
    }

    if categories.is_empty() {
        categories.push(CATEGORY_SOURCE);
    }
    categories
}

fn is_test_path(lower_path: &str) -> bool {
    lower_path.split('/').any(|component| component == "test" || component == "tests")
        || lower_path.ends_with("_test.rs")
        || lower_path.ends_with("_test.go")
        || lower_path.ends_with(".test.ts")
        || lower_path.ends_with(".test.js")
        || lower_path.contains("test_")
        || lower_path.contains("_test")
}

fn is_build_path(lower_path: &str) -> bool {
    const BUILD_DIRS: &[&str] =
        &["target", "dist", "build", "node_modules", "vendor", "__pycache__", ".venv"];
    lower_path.split('/').any(|component| BUILD_DIRS.contains(&component))
}

fn is_source_extension(extension: &str) -> bool {
    matches!(
        extension,
        ".rs" | ".py"
            | ".pyi"
            | ".js"
            | ".jsx"
            | ".ts"
            | ".tsx"
            | ".go"
            | ".java"
            | ".kt"
            | ".c"
            | ".h"
            | ".cpp"
            | ".hpp"
            | ".cs"
            | ".rb"
            | ".php"
            | ".swift"
            | ".scala"
            | ".sh"
            | ".bash"
            | ".zsh"
    )
}

/// Maps an extension (or special filename) to a language tag, matching the
/// teacher's `get_language`.
pub fn detect_language(extension: &str, file_name: &str) -> String {
    let ext = extension.to_ascii_lowercase();
    let lang = match ext.as_str() {
        ".py" | ".pyi" => "python",
        ".js" | ".jsx" | ".mjs" | ".cjs" => "javascript",
        ".ts" | ".tsx" => "typescript",
        ".go" => "go",
        ".java" => "java",
        ".kt" | ".kts" => "kotlin",
        ".rs" => "rust",
        ".c" | ".h" => "c",
        ".cpp" | ".hpp" | ".cc" | ".cxx" => "cpp",
        ".cs" => "csharp",
        ".rb" => "ruby",
        ".php" => "php",
        ".swift" => "swift",
        ".scala" => "scala",
        ".sh" | ".bash" => "bash",
        ".zsh" => "zsh",
        ".md" => "markdown",
        ".rst" => "restructuredtext",
        ".adoc" => "asciidoc",
        ".txt" => "text",
        ".yaml" | ".yml" => "yaml",
        ".toml" => "toml",
        ".json" => "json",
        ".ini" | ".cfg" => "ini",
        ".sql" => "sql",
        _ => {
            let name = file_name.to_ascii_lowercase();
            return match name.as_str() {
                "dockerfile" => "dockerfile".to_string(),
                "makefile" => "makefile".to_string(),
                _ => "text".to_string(),
            };
        }
    };
    lang.to_string()
}

/// Extracts the extension (with leading dot, lowercased) from a path, or an
/// empty string when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Content sniff for `is_text`: a null byte within the first 8 KiB marks a
/// file as binary, the same heuristic `git` and the teacher's encoding
/// sniffing use.
pub fn sniff_is_text(sample: &[u8]) -> bool {
    let window = &sample[..sample.len().min(8192)];
    !window.contains(&0u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rust_test_file_as_source_and_test() {
        let cats = classify("src/scan/mod_test.rs", ".rs");
        assert!(cats.contains(&CATEGORY_SOURCE));
        assert!(cats.contains(&CATEGORY_TEST));
    }

    #[test]
    fn classifies_markdown_as_doc() {
        let cats = classify("README.md", ".md");
        assert_eq!(cats, vec![CATEGORY_DOC]);
    }

    #[test]
    fn detects_build_directory() {
        let cats = classify("target/debug/build.rs", ".rs");
        assert!(cats.contains(&CATEGORY_BUILD));
    }

    #[test]
    fn sniffs_binary_via_null_byte() {
        assert!(sniff_is_text(b"fn main() {}"));
        assert!(!sniff_is_text(&[0x00, 0x01, 0x02]));
    }

    #[test]
    fn detects_language_from_extension_and_special_name() {
        assert_eq!(detect_language(".rs", "main.rs"), "rust");
        assert_eq!(detect_language("", "Dockerfile"), "dockerfile");
    }
}
