//! `<script>` block isolation for component files.
//!
//! Vue and Svelte sources embed their JavaScript/TypeScript inside one or
//! more `<script>` tags (Svelte additionally allows a `context="module"`
//! block). Extraction pulls each block out, picks the grammar from the
//! `lang` attribute, and pads the block with leading newlines so parser
//! spans map back to lines of the original component source.

use log::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptBlock {
    /// Block content padded with newlines so line numbers match the
    /// original component file.
    pub source: String,
    pub typescript: bool,
}

pub(crate) fn script_blocks(source: &str) -> Vec<ScriptBlock> {
    let mut blocks = Vec::new();
    let lower = source.to_ascii_lowercase();
    let mut cursor = 0;

    while let Some(rel) = lower[cursor..].find("<script") {
        let open_start = cursor + rel;
        let Some(tag_end_rel) = lower[open_start..].find('>') else {
            break;
        };
        let content_start = open_start + tag_end_rel + 1;
        let open_tag = &source[open_start..content_start];

        let Some(close_rel) = lower[content_start..].find("</script") else {
            break;
        };
        let content_end = content_start + close_rel;

        let content = &source[content_start..content_end];
        let lines_before = source[..content_start].matches('\n').count();
        let typescript = lang_is_typescript(open_tag);
        trace!(
            "Found script block at line {} (typescript: {})",
            lines_before + 1,
            typescript
        );

        let mut padded = "\n".repeat(lines_before);
        padded.push_str(content);
        blocks.push(ScriptBlock { source: padded, typescript });

        cursor = content_end;
    }

    blocks
}

/// Read the `lang` attribute out of an opening `<script ...>` tag.
fn lang_is_typescript(open_tag: &str) -> bool {
    let lower = open_tag.to_ascii_lowercase();
    let Some(idx) = lower.find("lang") else {
        return false;
    };
    let rest = &lower[idx + "lang".len()..];
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix('=') else {
        return false;
    };
    let rest = rest.trim_start();
    let value = match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &rest[1..];
            match inner.find(quote) {
                Some(end) => &inner[..end],
                None => inner,
            }
        }
        _ => rest.split([' ', '>', '/']).next().unwrap_or(""),
    };
    matches!(value, "ts" | "typescript")
}
