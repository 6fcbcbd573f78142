//! Markdown → structural tree conversion.
//!
//! Converts fragment text into a restricted set of [`StructuralNode`]s.
//! Only a small markdown subset is recognised: headings, list items,
//! blockquotes, fenced code, horizontal rules, paragraphs, and the
//! `**bold**` / `*italic*` / `` `code` `` inline spans.
//!
//! ## Guarantees
//!
//! * **Total**: [`convert`] never fails. Anything it does not recognise
//!   (unmatched `**`, stray backticks, HTML) ends up as literal text.
//! * **Escaped**: every string placed in the tree has passed through
//!   [`escape_html`]. Raw `<script>` in the source can never reach the
//!   renderer as markup.
//! * **Not idempotent**: feeding converted output back in is undefined;
//!   each raw fragment is converted exactly once.
//!
//! ## Inline spans
//!
//! Scanning is left to right; at each position the first span that can be
//! closed wins, and its contents are taken literally (no nesting). An opener
//! whose first closing marker yields an empty or whitespace-padded span is
//! not a span at all and degrades to text.

use crate::output::{InlineRun, StructuralNode};
use once_cell::sync::Lazy;
use regex::Regex;

/// Blockquotes nested deeper than this are kept as paragraph text.
const MAX_QUOTE_DEPTH: usize = 16;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.*)$").unwrap());
static RE_CLOSING_HASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+#+$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-{3,}$").unwrap());
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.[ \t]+(.*)$").unwrap());
static RE_UNORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+][ \t]+(.*)$").unwrap());

/// Convert fragment markdown into structural nodes.
pub fn convert(text: &str) -> Vec<StructuralNode> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalised.lines().collect();
    convert_lines(&lines, 0)
}

/// Escape the five HTML-special characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn convert_lines<'a>(lines: &[&'a str], depth: usize) -> Vec<StructuralNode> {
    let mut nodes = Vec::new();
    let mut paragraph: Vec<&'a str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut nodes);
            i += 1;
            continue;
        }

        // Fenced code: everything up to the closing fence (or EOF) is verbatim.
        if let Some(language) = opening_fence(trimmed) {
            flush_paragraph(&mut paragraph, &mut nodes);
            let start = i + 1;
            let mut end = start;
            while end < lines.len() && !is_closing_fence(lines[end]) {
                end += 1;
            }
            nodes.push(StructuralNode::CodeBlock {
                language,
                text: escape_html(&lines[start..end].join("\n")),
            });
            i = end + 1;
            continue;
        }

        if depth < MAX_QUOTE_DEPTH && trimmed.starts_with('>') {
            flush_paragraph(&mut paragraph, &mut nodes);
            let mut quoted = Vec::new();
            while i < lines.len() {
                match lines[i].trim_start().strip_prefix('>') {
                    Some(rest) => {
                        quoted.push(rest.strip_prefix(' ').unwrap_or(rest));
                        i += 1;
                    }
                    None => break,
                }
            }
            nodes.push(StructuralNode::Blockquote {
                children: convert_lines(&quoted, depth + 1),
            });
            continue;
        }

        if let Some(caps) = RE_HEADING.captures(trimmed) {
            flush_paragraph(&mut paragraph, &mut nodes);
            let text = strip_closing_hashes(&caps[2]);
            nodes.push(StructuralNode::Heading {
                level: caps[1].len() as u8,
                text: flatten(&parse_inline(text)),
            });
            i += 1;
            continue;
        }

        if RE_RULE.is_match(trimmed) {
            flush_paragraph(&mut paragraph, &mut nodes);
            nodes.push(StructuralNode::Rule);
            i += 1;
            continue;
        }

        let list_item = RE_ORDERED
            .captures(trimmed)
            .map(|c| (true, c))
            .or_else(|| RE_UNORDERED.captures(trimmed).map(|c| (false, c)));
        if let Some((ordered, caps)) = list_item {
            flush_paragraph(&mut paragraph, &mut nodes);
            nodes.push(StructuralNode::ListItem {
                ordered,
                runs: parse_inline(caps[1].trim()),
            });
            i += 1;
            continue;
        }

        paragraph.push(trimmed);
        i += 1;
    }

    flush_paragraph(&mut paragraph, &mut nodes);
    nodes
}

/// Drop an optional closing `#` run. It only counts when it is the whole
/// text or follows whitespace, so `C#` keeps its hash.
fn strip_closing_hashes(text: &str) -> &str {
    let text = text.trim_end();
    if text.chars().all(|c| c == '#') {
        return "";
    }
    match RE_CLOSING_HASHES.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

fn flush_paragraph(paragraph: &mut Vec<&str>, nodes: &mut Vec<StructuralNode>) {
    if paragraph.is_empty() {
        return;
    }
    let runs = parse_inline(&paragraph.join(" "));
    paragraph.clear();
    if !runs.is_empty() {
        nodes.push(StructuralNode::Paragraph { runs });
    }
}

/// `Some(language)` when the line opens a fenced code block.
fn opening_fence(trimmed: &str) -> Option<Option<String>> {
    let info = trimmed.strip_prefix("```")?.trim_start_matches('`').trim();
    Some(info.split_whitespace().next().map(escape_html))
}

fn is_closing_fence(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("```") && trimmed.trim_start_matches('`').trim().is_empty()
}

// ── Inline spans ─────────────────────────────────────────────────────────

/// Scan inline markup into escaped runs.
pub(crate) fn parse_inline(text: &str) -> Vec<InlineRun> {
    let mut runs = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = closing_emphasis(after, "**") {
                flush_literal(&mut literal, &mut runs);
                runs.push(InlineRun::Bold(escape_html(&after[..end])));
                i += 2 + end + 2;
            } else {
                literal.push_str("**");
                i += 2;
            }
            continue;
        }

        if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = closing_emphasis(after, "*") {
                flush_literal(&mut literal, &mut runs);
                runs.push(InlineRun::Italic(escape_html(&after[..end])));
                i += 1 + end + 1;
                continue;
            }
        }

        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find('`').filter(|&e| e > 0) {
                flush_literal(&mut literal, &mut runs);
                runs.push(InlineRun::InlineCode(escape_html(&after[..end])));
                i += 1 + end + 1;
                continue;
            }
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        literal.push(ch);
        i += ch.len_utf8();
    }

    flush_literal(&mut literal, &mut runs);
    runs
}

/// Byte offset of the first closing `marker`, if it closes a valid span.
fn closing_emphasis(after: &str, marker: &str) -> Option<usize> {
    let end = after.find(marker)?;
    let inner = &after[..end];
    let padded = inner.starts_with(char::is_whitespace) || inner.ends_with(char::is_whitespace);
    if inner.is_empty() || padded {
        None
    } else {
        Some(end)
    }
}

fn flush_literal(literal: &mut String, runs: &mut Vec<InlineRun>) {
    if !literal.is_empty() {
        runs.push(InlineRun::Text(escape_html(literal)));
        literal.clear();
    }
}

fn flatten(runs: &[InlineRun]) -> String {
    runs.iter().map(InlineRun::text).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> InlineRun {
        InlineRun::Text(s.to_string())
    }

    #[test]
    fn test_headings() {
        let nodes = convert("# Title\n###### Deep ##\n####### not a heading");
        assert_eq!(
            nodes[0],
            StructuralNode::Heading {
                level: 1,
                text: "Title".into()
            }
        );
        assert_eq!(
            nodes[1],
            StructuralNode::Heading {
                level: 6,
                text: "Deep".into()
            }
        );
        assert!(matches!(nodes[2], StructuralNode::Paragraph { .. }));
    }

    #[test]
    fn test_heading_keeps_hash_inside_words() {
        let nodes = convert("## Learning C#\n# F# and C#\n### C# ###\n# ##");
        let texts: Vec<_> = nodes.iter().map(StructuralNode::plain_text).collect();
        assert_eq!(texts, vec!["Learning C#", "F# and C#", "C#", ""]);
    }

    #[test]
    fn test_heading_flattens_emphasis() {
        let nodes = convert("## The **Rust** <Way>");
        assert_eq!(
            nodes,
            vec![StructuralNode::Heading {
                level: 2,
                text: "The Rust &lt;Way&gt;".into()
            }]
        );
    }

    #[test]
    fn test_inline_spans() {
        let runs = parse_inline("a **bold** and *it* with `x < y`");
        assert_eq!(
            runs,
            vec![
                text("a "),
                InlineRun::Bold("bold".into()),
                text(" and "),
                InlineRun::Italic("it".into()),
                text(" with "),
                InlineRun::InlineCode("x &lt; y".into()),
            ]
        );
    }

    #[test]
    fn test_unmatched_bold_degrades_to_text() {
        assert_eq!(parse_inline("a ** b"), vec![text("a ** b")]);
        assert_eq!(parse_inline("**open"), vec![text("**open")]);
    }

    #[test]
    fn test_overlapping_emphasis_is_leftmost_first() {
        let runs = parse_inline("**a*b**c*");
        assert_eq!(runs, vec![InlineRun::Bold("a*b".into()), text("c*")]);
    }

    #[test]
    fn test_padded_emphasis_is_literal() {
        assert_eq!(parse_inline("2 * 3 * 4"), vec![text("2 * 3 * 4")]);
        assert_eq!(parse_inline("``"), vec![text("``")]);
    }

    #[test]
    fn test_list_items() {
        let nodes = convert("- one\n* two\n1. first\n  2. **second**");
        assert_eq!(
            nodes,
            vec![
                StructuralNode::ListItem {
                    ordered: false,
                    runs: vec![text("one")]
                },
                StructuralNode::ListItem {
                    ordered: false,
                    runs: vec![text("two")]
                },
                StructuralNode::ListItem {
                    ordered: true,
                    runs: vec![text("first")]
                },
                StructuralNode::ListItem {
                    ordered: true,
                    runs: vec![InlineRun::Bold("second".into())]
                },
            ]
        );
    }

    #[test]
    fn test_italic_line_is_not_a_list() {
        let nodes = convert("*emphasis* opens this line");
        assert!(matches!(nodes[0], StructuralNode::Paragraph { .. }));
    }

    #[test]
    fn test_blockquote_merges_consecutive_lines() {
        let nodes = convert("> first\n> second\n>\n> - item\nafter");
        assert_eq!(nodes.len(), 2);
        let StructuralNode::Blockquote { children } = &nodes[0] else {
            panic!("expected blockquote, got {:?}", nodes[0]);
        };
        assert_eq!(
            children[0],
            StructuralNode::Paragraph {
                runs: vec![text("first second")]
            }
        );
        assert!(matches!(children[1], StructuralNode::ListItem { ordered: false, .. }));
        assert!(matches!(nodes[1], StructuralNode::Paragraph { .. }));
    }

    #[test]
    fn test_code_block_is_verbatim_and_escaped() {
        let nodes = convert("```python\nif a < b and **c**:\n    print('x')\n```\ntail");
        assert_eq!(
            nodes[0],
            StructuralNode::CodeBlock {
                language: Some("python".into()),
                text: "if a &lt; b and **c**:\n    print(&#39;x&#39;)".into()
            }
        );
        assert_eq!(
            nodes[1],
            StructuralNode::Paragraph {
                runs: vec![text("tail")]
            }
        );
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let nodes = convert("```\n# not a heading");
        assert_eq!(
            nodes,
            vec![StructuralNode::CodeBlock {
                language: None,
                text: "# not a heading".into()
            }]
        );
    }

    #[test]
    fn test_rule_and_paragraph_joining() {
        let nodes = convert("line one\nline two\n\n---\n\nnext");
        assert_eq!(
            nodes,
            vec![
                StructuralNode::Paragraph {
                    runs: vec![text("line one line two")]
                },
                StructuralNode::Rule,
                StructuralNode::Paragraph {
                    runs: vec![text("next")]
                },
            ]
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let nodes = convert("# A\r\n\r\nbody\r\n");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_script_is_escaped_everywhere() {
        let src = "<script>alert(1)</script>\n# <script>\n- <script>\n> <script>\n```\n<script>\n```";
        for node in convert(src) {
            assert!(!node.plain_text().contains("<script>"), "leaked in {node:?}");
        }
    }

    #[test]
    fn test_convert_is_total() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
        let lossy = String::from_utf8_lossy(&bytes).into_owned();
        let deep_quote = ">".repeat(10_000) + " deep";
        for input in [
            "",
            "\n\n\n",
            "**",
            "*",
            "`",
            "```",
            "> ",
            "#",
            "1.",
            "ü**ö*ä`ß",
            lossy.as_str(),
            deep_quote.as_str(),
        ] {
            let _ = convert(input);
        }
        assert!(convert("").is_empty());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
