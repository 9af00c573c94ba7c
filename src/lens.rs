//! Lens Inference (C15): pure `path -> lens` classification (§4.14).
//!
//! Precedence: `guards > data_models > pipelines > entrypoints > ui >
//! interfaces > core`; `core` is the terminal fallback.

const LENS_PRECEDENCE: &[(&str, &[&str])] = &[
    ("guards", &["guard", "guards", "policy", "policies", "auth"]),
    ("data_models", &["domain", "model", "models", "schema", "schemas"]),
    ("pipelines", &["pipeline", "pipelines", "emit", "scan", "chunk", "index"]),
    ("entrypoints", &["cli", "bin", "main"]),
    ("ui", &["ui", "view", "views", "render", "templates"]),
    ("interfaces", &["interfaces", "api", "contracts"]),
];

/// Classifies a repo-relative path into one of the seven lenses.
pub fn lens_for(relative_path: &str) -> &'static str {
    let components: Vec<String> = relative_path
        .to_ascii_lowercase()
        .split('/')
        .map(|c| c.rsplit_once('.').map(|(stem, _)| stem.to_string()).unwrap_or_else(|| c.to_string()))
        .collect();

    for (lens, markers) in LENS_PRECEDENCE {
        if components.iter().any(|c| markers.contains(&c.as_str())) {
            return lens;
        }
    }
    "core"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_outranks_data_models() {
        assert_eq!(lens_for("src/guards/domain/auth.rs"), "guards");
    }

    #[test]
    fn pipelines_detected_from_component() {
        assert_eq!(lens_for("src/pipeline/emit/mod.rs"), "pipelines");
    }

    #[test]
    fn entrypoint_detected_from_bin_filename() {
        assert_eq!(lens_for("src/main.rs"), "entrypoints");
    }

    #[test]
    fn unmatched_path_falls_back_to_core() {
        assert_eq!(lens_for("src/misc/helper.rs"), "core");
    }
}
