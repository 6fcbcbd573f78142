//! Integration tests for the full assembly pipeline.
//!
//! Content comes from in-process fake generators and images from a tiny
//! HTTP server on a loopback port, so these run offline and in CI.
//!
//! Run with:
//!   cargo test --test assembly -- --nocapture

use async_trait::async_trait;
use bookgen::{
    assemble, assemble_from, assemble_to_file, summarize, AssemblyConfig, AssetError, BookError,
    BookRequest,
    ContentGenerator, ContentSource, ErrorKind, GeneratedBook, GenerationRequest, ImageRef,
    RawContent, SectionKind, SectionLabels, StructuralNode,
};
use serde_json::json;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Test helpers ─────────────────────────────────────────────────────────────

enum Behaviour {
    Book(GeneratedBook),
    ErrorDocument(String),
    Fail(String),
}

/// In-process generator that counts how often it was asked.
struct FakeGenerator {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeGenerator {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<RawContent, BookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Book(book) => Ok(RawContent::Structured(book.clone())),
            Behaviour::ErrorDocument(error) => Ok(RawContent::Failed {
                error: error.clone(),
            }),
            Behaviour::Fail(message) => Err(BookError::generation(message.clone())),
        }
    }
}

fn generated(value: serde_json::Value) -> GeneratedBook {
    serde_json::from_value(value).unwrap()
}

fn three_chapters() -> GeneratedBook {
    generated(json!({
        "title": "Learning Rust",
        "chapters": [
            {"title": "Ownership", "content": "Values have **one** owner."},
            {"title": "Borrowing", "content": "References:\n\n- shared\n- mutable"},
            {"title": "Lifetimes", "content": "Scopes matter."}
        ],
        "afterword": "Thanks for reading."
    }))
}

fn config_with(generator: Arc<FakeGenerator>, asset_dir: &Path) -> AssemblyConfig {
    AssemblyConfig::builder()
        .generator(generator)
        .asset_dir(asset_dir)
        .image_timeout_secs(5)
        .build()
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Serve `/ok.png` as a PNG and everything else as 404, until the test ends.
async fn image_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let png = png_bytes();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let png = png.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let (status, body): (&str, &[u8]) = if head.starts_with("GET /ok.png ") {
                    ("200 OK", png.as_slice())
                } else {
                    ("404 Not Found", &b"missing"[..])
                };
                let header = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Accept connections and hold them open without ever answering.
async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

fn kinds(sections: &[bookgen::Section]) -> Vec<SectionKind> {
    sections.iter().map(|s| s.kind).collect()
}

// ── Structure ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sections_follow_cover_toc_chapters_afterword() {
    let assets = tempfile::tempdir().unwrap();
    let generator = FakeGenerator::new(Behaviour::Book(three_chapters()));
    let config = config_with(generator.clone(), assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(output.source, ContentSource::Generator);
    assert_eq!(
        kinds(&output.document.sections),
        vec![
            SectionKind::Cover,
            SectionKind::TableOfContents,
            SectionKind::Chapter,
            SectionKind::Chapter,
            SectionKind::Chapter,
            SectionKind::Afterword,
        ]
    );
    assert_eq!(output.document.count(SectionKind::Cover), 1);
    assert_eq!(output.document.count(SectionKind::TableOfContents), 1);

    let headings: Vec<_> = output.document.sections[2..5]
        .iter()
        .map(|s| s.heading.clone().unwrap_or_default())
        .collect();
    assert_eq!(headings, vec!["Ownership", "Borrowing", "Lifetimes"]);

    assert!(!output.document.sections[0].page_break_before);
    assert!(output.document.sections[1..]
        .iter()
        .all(|s| s.page_break_before));
    assert_eq!(output.stats.chapter_count, 3);
    assert_eq!(output.stats.section_count, 6);
}

#[tokio::test]
async fn synthesized_toc_lists_introduction_chapters_conclusion() {
    let assets = tempfile::tempdir().unwrap();
    let generator = FakeGenerator::new(Behaviour::Book(three_chapters()));
    let config = config_with(generator, assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();

    let labels = SectionLabels::english();
    let entries: Vec<String> = output.document.sections[1]
        .body
        .iter()
        .map(|node| match node {
            StructuralNode::ListItem { ordered: true, .. } => node.plain_text(),
            other => panic!("unexpected TOC node {other:?}"),
        })
        .collect();
    assert_eq!(
        entries,
        vec![
            labels.introduction.clone(),
            "Ownership".to_string(),
            "Borrowing".to_string(),
            "Lifetimes".to_string(),
            labels.conclusion.clone(),
        ]
    );
}

#[tokio::test]
async fn german_books_get_german_labels() {
    let assets = tempfile::tempdir().unwrap();
    let mut book = three_chapters();
    book.language = Some("German".into());
    let config = config_with(FakeGenerator::new(Behaviour::Book(book)), assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();

    let labels = SectionLabels::german();
    assert_eq!(
        output.document.sections[1].heading.as_deref(),
        Some(labels.table_of_contents.as_str())
    );
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn images_are_downloaded_or_left_absent() {
    let addr = image_server().await;
    let assets = tempfile::tempdir().unwrap();
    let book = generated(json!({
        "title": "Pictures",
        "cover_image": format!("http://{addr}/ok.png"),
        "chapters": [
            {"title": "Found", "content": "a", "image": format!("http://{addr}/ok.png")},
            {"title": "Gone", "content": "b", "image": format!("http://{addr}/gone.png")},
            {"title": "Plain", "content": "c"}
        ]
    }));
    let config = config_with(FakeGenerator::new(Behaviour::Book(book)), assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();

    assert_eq!(output.stats.images_requested, 3);
    assert_eq!(output.stats.images_resolved, 2);
    assert_eq!(output.stats.images_absent, 1);
    assert_eq!(output.asset_failures.len(), 1);

    let sections = &output.document.sections;
    assert_eq!(sections.len(), 5);

    let cover = sections[0].image.local_path().unwrap();
    assert!(cover.starts_with(assets.path()));
    assert!(cover.extension().is_some_and(|e| e == "png"));
    assert!(cover.exists());

    assert!(matches!(sections[2].image, ImageRef::LocalAsset { .. }));
    assert_eq!(sections[3].image, ImageRef::Absent);
    assert_eq!(sections[4].image, ImageRef::Absent);

    // Every stored file is a distinct name.
    assert_ne!(sections[0].image, sections[2].image);
    assert_eq!(std::fs::read_dir(assets.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn silent_image_server_times_out_to_absent() {
    let addr = silent_server().await;
    let assets = tempfile::tempdir().unwrap();
    let book = generated(json!({
        "title": "Waiting",
        "chapters": [
            {"title": "Stalled", "content": "a", "image": format!("http://{addr}/slow.png")}
        ]
    }));
    let config = AssemblyConfig::builder()
        .generator(FakeGenerator::new(Behaviour::Book(book)))
        .asset_dir(assets.path())
        .image_timeout_secs(1)
        .build()
        .unwrap();

    let start = Instant::now();
    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    let chapter = output
        .document
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Chapter)
        .unwrap();
    assert_eq!(chapter.image, ImageRef::Absent);
    assert_eq!(output.asset_failures.len(), 1);
    assert!(matches!(
        output.asset_failures[0],
        AssetError::Timeout { secs: 1, .. }
    ));
    assert_eq!(std::fs::read_dir(assets.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unreachable_images_never_fail_the_run() {
    let assets = tempfile::tempdir().unwrap();
    let book = generated(json!({
        "title": "Offline",
        "cover_image": "http://127.0.0.1:9/cover.png",
        "chapters": [
            {"title": "One", "content": "a", "image": "http://127.0.0.1:9/1.png"},
            {"title": "Two", "content": "b", "image": "http://127.0.0.1:9/2.png"}
        ]
    }));
    let config = config_with(FakeGenerator::new(Behaviour::Book(book)), assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();

    assert_eq!(
        kinds(&output.document.sections),
        vec![
            SectionKind::Cover,
            SectionKind::TableOfContents,
            SectionKind::Chapter,
            SectionKind::Chapter,
        ]
    );
    assert!(output
        .document
        .sections
        .iter()
        .all(|s| s.image == ImageRef::Absent));
    assert_eq!(output.asset_failures.len(), 3);
}

// ── Safety and determinism ───────────────────────────────────────────────────

#[tokio::test]
async fn markup_in_content_is_escaped_everywhere() {
    let assets = tempfile::tempdir().unwrap();
    let book = generated(json!({
        "title": "<script>alert('t')</script>",
        "author": "Eve <script>",
        "chapters": [
            {"title": "<b>bold</b>", "content": "<script>alert(1)</script>\n\n> <img src=x onerror=y>"}
        ],
        "afterword": "```\n<script>\n```"
    }));
    let config = config_with(FakeGenerator::new(Behaviour::Book(book)), assets.path());

    let output = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap();
    let html = bookgen::pipeline::render::to_html(&output.document);

    assert!(!html.contains("<script>"));
    assert!(!html.contains("<img src=x"));
    assert!(!html.contains("<b>bold</b>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn same_input_composes_the_same_document() {
    let assets = tempfile::tempdir().unwrap();
    let config = config_with(
        FakeGenerator::new(Behaviour::Book(three_chapters())),
        assets.path(),
    );
    let request = BookRequest::new("Ada", ["Rust", "Tokio"]);

    let first = assemble(&request, &config).await.unwrap();
    let second = assemble(&request, &config).await.unwrap();

    assert_eq!(first.document, second.document);
    assert_eq!(first.book, second.book);
}

// ── Content sources and errors ───────────────────────────────────────────────

#[tokio::test]
async fn blank_author_is_rejected_before_generation() {
    let generator = FakeGenerator::new(Behaviour::Book(three_chapters()));
    let config = config_with(generator.clone(), Path::new("unused"));

    let err = assemble(&BookRequest::new("   ", ["Rust"]), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    let err = assemble(&BookRequest::new("Ada", [" ", ""]), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn generator_failure_escalates_without_fragments() {
    let generator = FakeGenerator::new(Behaviour::Fail("quota exceeded".into()));
    let config = config_with(generator.clone(), Path::new("unused"));

    let err = assemble(&BookRequest::new("Ada", ["Rust"]), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn error_document_falls_back_to_fragments() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("Vorwort.html"), "Willkommen").unwrap();
    std::fs::write(uploads.path().join("kapitel1.html"), "Erstes Kapitel").unwrap();
    std::fs::write(uploads.path().join("Nachwort.html"), "Ende").unwrap();

    let generator = FakeGenerator::new(Behaviour::ErrorDocument("model offline".into()));
    let config = AssemblyConfig::builder()
        .generator(generator.clone())
        .fragments_dir(uploads.path())
        .asset_dir(uploads.path().join("assets"))
        .build()
        .unwrap();
    let request = BookRequest::new("Ada", ["Rust"])
        .with_language("German")
        .with_fragments(["kapitel1.html", "Vorwort.html", "Nachwort.html"]);

    let output = assemble(&request, &config).await.unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(output.source, ContentSource::Fragments);
    assert_eq!(output.book.chapters.len(), 2);
    assert_eq!(output.book.chapters[0].title, SectionLabels::german().foreword);
    assert_eq!(output.book.chapters[0].content, "Willkommen");
    assert_eq!(output.book.chapters[1].content, "Erstes Kapitel");
    assert_eq!(output.book.afterword.as_deref(), Some("Ende"));
    assert_eq!(
        kinds(&output.document.sections).last(),
        Some(&SectionKind::Afterword)
    );
}

#[tokio::test]
async fn supplied_content_skips_the_generator() {
    let assets = tempfile::tempdir().unwrap();
    let generator = FakeGenerator::new(Behaviour::Fail("should not run".into()));
    let config = config_with(generator.clone(), assets.path());

    let output = assemble_from(
        RawContent::Structured(three_chapters()),
        &BookRequest::new("Ada", ["Rust"]),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(generator.calls(), 0);
    assert_eq!(output.source, ContentSource::Supplied);
    assert_eq!(output.book.title, "Learning Rust");
}

// ── Hand-off ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn assemble_to_file_writes_html_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(
        FakeGenerator::new(Behaviour::Book(three_chapters())),
        &dir.path().join("assets"),
    );
    let path = dir.path().join("out").join("book.html");

    let output = assemble_to_file(&BookRequest::new("Ada", ["Rust"]), &path, &config)
        .await
        .unwrap();

    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>Learning Rust</title>"));
    assert_eq!(html.matches("<section").count(), output.stats.section_count);
    assert!(!path.with_extension("html.tmp").exists());
}

#[tokio::test]
async fn summary_reports_success_and_failure() {
    let assets = tempfile::tempdir().unwrap();
    let config = config_with(
        FakeGenerator::new(Behaviour::Book(three_chapters())),
        assets.path(),
    );

    let ok = assemble(&BookRequest::new("Ada", ["Rust"]), &config).await;
    let value = serde_json::to_value(summarize(&ok)).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["bookSummary"]["chapterCount"], 3);
    assert!(value["bookSummary"]["totalWords"].as_u64().unwrap() > 0);

    let failed = assemble(&BookRequest::new("", ["Rust"]), &config).await;
    let value = serde_json::to_value(summarize(&failed)).unwrap();
    assert_eq!(value["success"], false);
    assert_eq!(value["errorKind"], "input");
    assert!(value.get("bookSummary").is_none());
}
