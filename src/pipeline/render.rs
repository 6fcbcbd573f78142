//! HTML hand-off: [`ComposedDocument`] → one self-contained HTML page.
//!
//! The page renderer that turns this into a print document lives outside
//! the crate. What it gets from us:
//!
//! - `<title>` and author/keyword `<meta>` tags from [`DocumentMeta`]
//! - a print stylesheet with a running `title | author` header (suppressed on
//!   the cover) and `Page n/m` page numbers
//! - one `<section>` per [`Section`], with `page-break-before: always`
//!   where the composer asked for it
//! - `<img>` elements for local assets only
//!
//! All node text is escaped by the converter, so it is written as-is here.
//! Only values that never passed through the converter (image paths, code
//! languages) are escaped on the way out.

use super::markdown::escape_html;
use crate::model::ImageRef;
use crate::output::{ComposedDocument, DocumentMeta, InlineRun, Section, SectionKind, StructuralNode};
use std::fmt::Write as _;

const STYLESHEET: &str = r#"
@page {
  size: A4;
  margin: 25mm 20mm;
  @top-center { content: element(running-header); font-size: 8pt; font-weight: bold; }
  @bottom-center { content: "Page " counter(page) "/" counter(pages); font-size: 8pt; font-style: italic; }
}
@page :first {
  @top-center { content: none; }
}
.running-header { position: running(running-header); }
body { font-family: serif; font-size: 11pt; line-height: 1.5; }
section.cover { text-align: center; }
section.cover .byline { text-align: right; }
figure { margin: 1em 0; text-align: center; }
figure img { max-width: 100%; }
pre { white-space: pre-wrap; font-size: 9pt; }
blockquote { margin-left: 1.5em; font-style: italic; }
"#;

/// Render the composed document as an HTML page.
pub fn to_html(document: &ComposedDocument) -> String {
    let mut out = String::with_capacity(4096);
    write_head(&mut out, &document.meta);

    out.push_str("<body>\n");
    let _ = writeln!(
        out,
        "<div class=\"running-header\">{} | {}</div>",
        document.meta.title, document.meta.author
    );
    for section in &document.sections {
        write_section(&mut out, section);
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn write_head(out: &mut String, meta: &DocumentMeta) {
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", meta.title);
    let _ = writeln!(out, "<meta name=\"author\" content=\"{}\">", meta.author);
    if !meta.keywords.is_empty() {
        let _ = writeln!(
            out,
            "<meta name=\"keywords\" content=\"{}\">",
            meta.keywords.join(", ")
        );
    }
    if let Some(ref publisher) = meta.publisher {
        let _ = writeln!(out, "<meta name=\"publisher\" content=\"{}\">", publisher);
    }
    let _ = writeln!(out, "<meta name=\"language\" content=\"{}\">", meta.language);
    let _ = writeln!(out, "<style>{}</style>", STYLESHEET);
    out.push_str("</head>\n");
}

fn write_section(out: &mut String, section: &Section) {
    let class = match section.kind {
        SectionKind::Cover => "cover",
        SectionKind::TableOfContents => "toc",
        SectionKind::Chapter => "chapter",
        SectionKind::Afterword => "afterword",
    };
    let style = if section.page_break_before {
        " style=\"page-break-before: always\""
    } else {
        ""
    };
    let _ = writeln!(out, "<section class=\"{}\"{}>", class, style);

    if let Some(ref heading) = section.heading {
        let _ = writeln!(out, "<h1>{}</h1>", heading);
    }

    // Cover art goes below the byline; chapter art right under the heading.
    if section.kind == SectionKind::Cover {
        for node in &section.body {
            out.push_str("<p class=\"byline\">");
            write_runs_of(out, node);
            out.push_str("</p>\n");
        }
        write_image(out, &section.image);
    } else {
        write_image(out, &section.image);
        write_nodes(out, &section.body);
    }

    out.push_str("</section>\n");
}

fn write_image(out: &mut String, image: &ImageRef) {
    if let ImageRef::LocalAsset { path } = image {
        let _ = writeln!(
            out,
            "<figure><img src=\"{}\" alt=\"\"></figure>",
            escape_html(&path.to_string_lossy())
        );
    }
}

fn write_nodes(out: &mut String, nodes: &[StructuralNode]) {
    let mut open_list: Option<bool> = None;

    for node in nodes {
        let ordered_here = match node {
            StructuralNode::ListItem { ordered, .. } => Some(*ordered),
            _ => None,
        };
        if open_list != ordered_here {
            if let Some(ordered) = open_list {
                out.push_str(if ordered { "</ol>\n" } else { "</ul>\n" });
            }
            if let Some(ordered) = ordered_here {
                out.push_str(if ordered { "<ol>\n" } else { "<ul>\n" });
            }
            open_list = ordered_here;
        }
        write_node(out, node);
    }

    if let Some(ordered) = open_list {
        out.push_str(if ordered { "</ol>\n" } else { "</ul>\n" });
    }
}

fn write_node(out: &mut String, node: &StructuralNode) {
    match node {
        StructuralNode::Heading { level, text } => {
            // Section headings are <h1>; content headings sit one level below.
            let level = (*level).clamp(1, 5) + 1;
            let _ = writeln!(out, "<h{level}>{text}</h{level}>");
        }
        StructuralNode::Paragraph { runs } => {
            out.push_str("<p>");
            write_runs(out, runs);
            out.push_str("</p>\n");
        }
        StructuralNode::ListItem { runs, .. } => {
            out.push_str("<li>");
            write_runs(out, runs);
            out.push_str("</li>\n");
        }
        StructuralNode::Blockquote { children } => {
            out.push_str("<blockquote>\n");
            write_nodes(out, children);
            out.push_str("</blockquote>\n");
        }
        StructuralNode::CodeBlock { language, text } => match language {
            Some(lang) => {
                let _ = writeln!(
                    out,
                    "<pre><code class=\"language-{}\">{}</code></pre>",
                    escape_html(lang),
                    text
                );
            }
            None => {
                let _ = writeln!(out, "<pre><code>{}</code></pre>", text);
            }
        },
        StructuralNode::Rule => out.push_str("<hr>\n"),
    }
}

/// Inline content of a cover body node.
fn write_runs_of(out: &mut String, node: &StructuralNode) {
    match node {
        StructuralNode::Paragraph { runs } | StructuralNode::ListItem { runs, .. } => {
            write_runs(out, runs)
        }
        other => out.push_str(&other.plain_text()),
    }
}

fn write_runs(out: &mut String, runs: &[InlineRun]) {
    for run in runs {
        match run {
            InlineRun::Text(s) => out.push_str(s),
            InlineRun::Bold(s) => {
                let _ = write!(out, "<strong>{}</strong>", s);
            }
            InlineRun::Italic(s) => {
                let _ = write!(out, "<em>{}</em>", s);
            }
            InlineRun::InlineCode(s) => {
                let _ = write!(out, "<code>{}</code>", s);
            }
        }
    }
}
