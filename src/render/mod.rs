//! Markdown Emitter (C6): canonical merged markdown with zone markers and
//! optional splitting into numbered parts (§4.6).
//!
//! Zone symmetry is the load-bearing invariant here: every `zone:begin` has
//! exactly one matching `zone:end` with the same `type` and `id`, and zones
//! nest as a proper stack (§8). This module only ever pushes matched pairs,
//! so the invariant holds by construction; `verify.rs` re-checks it anyway
//! against emitted bytes, since the manifest-building fix-point can also
//! feed the verifier artifacts assembled by other means.

use crate::domain::FileInfo;

/// One file's rendered content, ready to be concatenated into a code zone.
pub struct RenderedFile<'a> {
    pub info: &'a FileInfo,
    pub content: &'a str,
}

/// Produces the canonical merged markdown body (unsplit). Splitting into
/// parts is a byte-budget concern layered on top by [`split_into_parts`].
pub fn render_merged_markdown(
    reading_policy_comment: &str,
    meta_zone_body: &str,
    structure_zone_body: &str,
    index_zone_body: &str,
    manifest_zone_body: &str,
    files: &[RenderedFile<'_>],
) -> String {
    let mut out = String::new();
    out.push_str(reading_policy_comment);
    out.push('\n');

    push_zone(&mut out, "meta", "meta", meta_zone_body);
    push_zone(&mut out, "structure", "structure", structure_zone_body);
    push_zone(&mut out, "index", "index", index_zone_body);
    push_zone(&mut out, "manifest", "manifest", manifest_zone_body);

    for file in files {
        let zone_id = &file.info.file_id;
        out.push_str(&format!("<!-- zone:begin type=code id={zone_id} -->\n"));
        out.push_str(&format!("<!-- FILE_START path={} -->\n", file.info.relative_path));
        out.push_str("```");
        out.push_str(&file_language_hint(file.info));
        out.push('\n');
        out.push_str(file.content);
        if !file.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
        out.push_str(&format!("<!-- FILE_END path={} -->\n", file.info.relative_path));
        out.push_str(&format!("<!-- zone:end type=code id={zone_id} -->\n"));
    }

    out
}

pub(crate) fn push_zone(out: &mut String, zone_type: &str, id: &str, body: &str) {
    out.push_str(&format!("<!-- zone:begin type={zone_type} id={id} -->\n"));
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("<!-- zone:end type={zone_type} id={id} -->\n"));
}

fn file_language_hint(info: &FileInfo) -> String {
    info.extension.trim_start_matches('.').to_string()
}

/// Splits `merged` into numbered parts of at most `split_size` bytes each,
/// breaking only on zone boundaries so no part starts mid-zone. `split_size
/// == 0` disables splitting (§4.6).
pub fn split_into_parts(merged: &str, split_size: u64) -> Vec<String> {
    if split_size == 0 {
        return vec![merged.to_string()];
    }
    let split_size = split_size as usize;

    let mut parts = Vec::new();
    let mut current = String::new();
    for line in merged.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > split_size && is_zone_boundary(&current)
        {
            parts.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.is_empty() {
        parts.push(String::new());
    }
    parts
}

fn is_zone_boundary(accumulated: &str) -> bool {
    accumulated.trim_end().ends_with("-->")
}

/// Verifies zone marker symmetry and proper nesting over rendered markdown
/// (§8). Returns `Err` with the first offending line on mismatch.
pub fn verify_zone_symmetry(markdown: &str) -> Result<(), String> {
    let mut stack: Vec<(String, String)> = Vec::new();

    for (line_no, line) in markdown.lines().enumerate() {
        if let Some((zone_type, id)) = parse_zone_marker(line, "begin") {
            stack.push((zone_type, id));
        } else if let Some((zone_type, id)) = parse_zone_marker(line, "end") {
            match stack.pop() {
                Some((open_type, open_id)) if open_type == zone_type && open_id == id => {}
                Some((open_type, open_id)) => {
                    return Err(format!(
                        "line {}: zone:end type={zone_type} id={id} does not match open zone type={open_type} id={open_id}",
                        line_no + 1
                    ));
                }
                None => {
                    return Err(format!(
                        "line {}: zone:end type={zone_type} id={id} has no matching zone:begin",
                        line_no + 1
                    ));
                }
            }
        }
    }

    if let Some((zone_type, id)) = stack.pop() {
        return Err(format!("unclosed zone: type={zone_type} id={id}"));
    }
    Ok(())
}

fn parse_zone_marker(line: &str, marker: &str) -> Option<(String, String)> {
    let prefix = format!("<!-- zone:{marker} type=");
    let rest = line.trim().strip_prefix(&prefix)?;
    let rest = rest.strip_suffix(" -->")?;
    let (zone_type, id_part) = rest.split_once(" id=")?;
    Some((zone_type.to_string(), id_part.to_string()))
}
