//! Chunker (C3): deterministic line-aware greedy segmentation (§4.3).
//!
//! Byte offsets are always computed from the UTF-8 encoding of each line,
//! never from `str::len` on a substring that might not exist contiguously —
//! the teacher's tree-sitter chunker tracks the same invariant when it
//! re-bases nested chunk offsets in `code_chunker.rs`.

use crate::domain::{chunk_id as derive_chunk_id, Chunk};
use crate::hash::hash_bytes;

/// Greedy-fill bounds; defaults match §4.3 (2048/8192 bytes, 200/400 lines).
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub min_size: usize,
    pub max_size: usize,
    pub min_lines: usize,
    pub max_lines: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { min_size: 2048, max_size: 8192, min_lines: 200, max_lines: 400 }
    }
}

/// Splits `content` into gap-free, non-overlapping chunks per §3/§4.3.
///
/// `byte_offset_base` lets a caller chunk a sub-slice of a larger file while
/// keeping byte offsets absolute; `file_path` feeds `chunk_id` derivation so
/// identical content at a different path yields a distinct ID.
pub fn chunk_content(
    file_id: &str,
    content: &str,
    byte_offset_base: usize,
    file_path: &str,
    language: &str,
    params: ChunkParams,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if content.is_empty() {
        return chunks;
    }

    let mut buffer_start_byte = byte_offset_base;
    let mut buffer_start_line = 1usize;
    let mut buffer_len_bytes = 0usize;
    let mut buffer_lines = 0usize;
    let mut current_line = 1usize;
    let mut cursor = byte_offset_base;

    for line in content.split_inclusive('\n') {
        let line_bytes = line.len();

        let would_overflow = buffer_lines > 0
            && (buffer_len_bytes + line_bytes > params.max_size || buffer_lines + 1 > params.max_lines);

        if would_overflow {
            chunks.push(make_chunk(
                file_id,
                file_path,
                language,
                buffer_start_byte,
                cursor,
                buffer_start_line,
                current_line - 1,
                content,
                byte_offset_base,
            ));
            buffer_start_byte = cursor;
            buffer_start_line = current_line;
            buffer_len_bytes = 0;
            buffer_lines = 0;
        }

        buffer_len_bytes += line_bytes;
        buffer_lines += 1;
        cursor += line_bytes;
        current_line += 1;
    }

    if buffer_lines > 0 {
        chunks.push(make_chunk(
            file_id,
            file_path,
            language,
            buffer_start_byte,
            cursor,
            buffer_start_line,
            current_line - 1,
            content,
            byte_offset_base,
        ));
    }

    chunks
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    file_id: &str,
    file_path: &str,
    language: &str,
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
    end_line: usize,
    content: &str,
    byte_offset_base: usize,
) -> Chunk {
    let local_start = start_byte - byte_offset_base;
    let local_end = end_byte - byte_offset_base;
    let slice = &content.as_bytes()[local_start..local_end];
    let content_sha256 = hash_bytes(slice);
    let chunk_id = derive_chunk_id(file_path, start_line, &content_sha256);

    Chunk {
        chunk_id,
        file_id: file_id.to_string(),
        path: file_path.to_string(),
        start_byte,
        end_byte,
        start_line,
        end_line,
        content_sha256,
        size_bytes: end_byte - start_byte,
        language: language.to_string(),
        section: String::new(),
        layer: String::new(),
        artifact_type: String::new(),
        concepts: Vec::new(),
    }
}
