//! Cleanup: deterministic fixes for generator-written markdown.
//!
//! ## Why is cleanup necessary?
//!
//! The content generator is a language model behind a script. Even when
//! prompted carefully it occasionally produces text that is fine for a human
//! reader but awkward for assembly:
//!
//! - Whole chapters wrapped in ` ```markdown ... ``` ` fences
//! - `![figure](https://…)` links pointing at images nobody will fetch
//! - Windows-style `\r\n` line endings and zero-width characters
//! - Titles decorated as `## **"The Title"**`
//!
//! The rules below are pure `&str → String` passes so each one can be tested
//! on its own. They never change wording, and the whitespace rules leave
//! fenced code blocks exactly as written.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! only has to handle one shape of input; image links are replaced before
//! blank lines are collapsed because a removed link can leave an empty line.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every text rule to chapter or afterword content.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Replace image links with their alt text as an italic caption
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 5. Trim trailing whitespace per line, outside fenced code
/// 6. Collapse runs of blank lines down to one, outside fenced code
/// 7. Trim the whole text
pub fn clean_text(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = replace_image_links(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Strip the decoration generators like to put around titles.
///
/// `## **"Rust in Action"**` becomes `Rust in Action`.
pub fn clean_title(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let mut s = s.trim();
    loop {
        let before = s.len();
        s = s.trim_start_matches('#').trim();
        s = strip_pair(s, "**");
        s = strip_pair(s, "__");
        s = QUOTE_PAIRS
            .iter()
            .fold(s, |acc, (open, close)| strip_quotes(acc, *open, *close))
            .trim();
        if s.len() == before {
            break;
        }
    }
    s.to_string()
}

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('„', '“'),
    ('«', '»'),
    ('»', '«'),
];

fn strip_pair<'a>(s: &'a str, marker: &str) -> &'a str {
    match s.strip_prefix(marker).and_then(|r| r.strip_suffix(marker)) {
        Some(inner) => inner.trim(),
        None => s,
    }
}

fn strip_quotes(s: &str, open: char, close: char) -> &str {
    match s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
        Some(inner) => inner,
        None => s,
    }
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Replace image links ──────────────────────────────────────────────
//
// Images belong to chapters, not to running text: the chapter image slot is
// the only way an illustration reaches the document. An inline link would
// hand the renderer a remote URL, so the alt text is kept as a caption and
// the link itself is dropped.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn replace_image_links(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{}*", alt)
            }
        })
        .to_string()
}

// ── Rule 4: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    lines
        .iter()
        .zip(inside_fences(&lines))
        .map(|(line, code)| if code { *line } else { line.trim_end() })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse blank lines ─────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut previous_blank = false;
    for (line, code) in lines.iter().zip(inside_fences(&lines)) {
        let blank = !code && line.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        out.push(*line);
    }
    out.join("\n")
}

/// For each line, whether it sits between an opening and a closing fence.
/// Fence lines themselves are not inside. Matches how the converter opens
/// (any ```` ``` ```` line) and closes (backticks only) code blocks.
fn inside_fences(lines: &[&str]) -> Vec<bool> {
    let mut open = false;
    lines
        .iter()
        .map(|line| {
            let trimmed = line.trim();
            let closing = trimmed.starts_with("```") && trimmed.trim_start_matches('`').is_empty();
            if !open {
                open = trimmed.starts_with("```");
                false
            } else if closing {
                open = false;
                false
            } else {
                true
            }
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────
