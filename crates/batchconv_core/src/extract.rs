const FENCE: &str = "```";

pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &str) -> String;
}

/// Recovers the final translated unit from noisy model output.
///
/// First match wins:
/// 1. `<tag>...</tag>`, taking the last closing tag and the nearest opening
///    tag before it (case-insensitive),
/// 2. the last bare fenced block (an opening fence with no info string),
/// 3. the last fenced block annotated with a language,
/// 4. the text after the first start marker line, when a marker is configured,
/// 5. the input unchanged.
///
/// Iterative generations tend to emit a draft followed by a corrected block,
/// hence the last occurrence is preferred everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBlockExtractor {
    tag: String,
    start_marker: Option<String>,
}

impl LastBlockExtractor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            start_marker: None,
        }
    }

    pub fn with_start_marker(mut self, marker: impl Into<String>) -> Self {
        self.start_marker = Some(marker.into());
        self
    }
}

impl Extractor for LastBlockExtractor {
    fn extract(&self, raw: &str) -> String {
        if let Some(block) = last_tagged_block(raw, &self.tag) {
            return block.to_string();
        }

        let blocks = fenced_blocks(raw);
        if let Some(block) = blocks.iter().rev().find(|block| block.info.is_empty()) {
            return block.body.to_string();
        }
        if let Some(block) = blocks.iter().rev().find(|block| !block.info.is_empty()) {
            return block.body.to_string();
        }

        if let Some(rest) = self
            .start_marker
            .as_deref()
            .and_then(|marker| after_marker(raw, marker))
        {
            return rest.to_string();
        }

        raw.to_string()
    }
}

fn last_tagged_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    if tag.is_empty() {
        return None;
    }
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let tag = tag.to_ascii_lowercase();
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let close_idx = lower.rfind(&close)?;
    let open_idx = lower[..close_idx].rfind(&open)?;
    Some(&text[open_idx + open.len()..close_idx])
}

#[derive(Debug)]
struct FencedBlock<'a> {
    info: &'a str,
    body: &'a str,
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(FENCE) {
        let open = cursor + offset;
        let after_fence = open + FENCE.len();
        let Some(line_end) = text[after_fence..].find('\n') else {
            break;
        };
        let info = text[after_fence..after_fence + line_end].trim();
        let body_start = after_fence + line_end + 1;

        let Some(close_offset) = text[body_start..].find(FENCE) else {
            break;
        };
        let close = body_start + close_offset;
        blocks.push(FencedBlock {
            info,
            body: &text[body_start..close],
        });
        cursor = close + FENCE.len();
    }

    blocks
}

fn after_marker<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    Some(rest.strip_prefix('\n').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_blocks_pairs_fences_in_order() {
        let text = "a\n```kotlin\nx\n```\nb\n```\ny\n```\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].info, "kotlin");
        assert_eq!(blocks[0].body, "x\n");
        assert_eq!(blocks[1].info, "");
        assert_eq!(blocks[1].body, "y\n");
    }

    #[test]
    fn unterminated_fence_is_ignored() {
        assert!(fenced_blocks("```kotlin\nfun main() {}").is_empty());
    }
}
