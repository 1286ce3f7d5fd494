//! Integration tests for the epub-forge pipeline.
//!
//! These tests validate:
//! - Extraction of metadata and chapters from real EPUB containers
//! - Block composition for single- and multi-chapter books
//! - PDF output exists and has valid format in both layout modes
//! - The upload service routes and their error bodies

use std::cell::RefCell;
use std::io::{Cursor, Write};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use epub_forge::book::{Chapter, LayoutBlock};
use epub_forge::compose::compose;
use epub_forge::config::{ConvertConfig, ServerConfig};
use epub_forge::error::{ContainerError, ConvertError, SkipReason};
use epub_forge::extract::{extract, extract_from};
use epub_forge::epub::EpubArchive;
use epub_forge::observer::{ConversionEvent, ConversionObserver, NullObserver};
use epub_forge::pipeline::{convert_bytes, convert_file};
use epub_forge::server::router;

// =====================================================================
// Helpers
// =====================================================================

struct Item<'a> {
    id: &'a str,
    properties: Option<&'a str>,
    body: String,
    /// `false` lists the item in the manifest without writing its entry.
    in_archive: bool,
}

fn item<'a>(id: &'a str, body: impl Into<String>) -> Item<'a> {
    Item {
        id,
        properties: None,
        body: body.into(),
        in_archive: true,
    }
}

fn xhtml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head>\
         <body>{body}</body></html>"
    )
}

fn filler(words: usize) -> String {
    format!("<p>{}</p>", "lorem ipsum ".repeat(words).trim_end())
}

/// Build an EPUB in memory. Items are listed in the manifest in the given
/// order; `spine` names the idrefs in reading order.
fn build_epub(title: Option<&str>, author: Option<&str>, items: &[Item], spine: &[&str]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
    )
    .unwrap();

    let mut metadata = String::new();
    if let Some(t) = title {
        metadata.push_str(&format!("<dc:title>{t}</dc:title>"));
    }
    if let Some(a) = author {
        metadata.push_str(&format!("<dc:creator>{a}</dc:creator>"));
    }
    let mut manifest = String::new();
    for it in items {
        let href = href_of(it);
        let props = it
            .properties
            .map(|p| format!(" properties=\"{p}\""))
            .unwrap_or_default();
        manifest.push_str(&format!(
            "<item id=\"{}\" href=\"{href}\" media-type=\"application/xhtml+xml\"{props}/>",
            it.id
        ));
    }
    manifest.push_str(r#"<item id="css" href="style.css" media-type="text/css"/>"#);
    let spine: String = spine.iter().map(|id| format!("<itemref idref=\"{id}\"/>")).collect();

    zip.start_file("OEBPS/content.opf", deflated).unwrap();
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{metadata}</metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
        )
        .as_bytes(),
    )
    .unwrap();

    for it in items.iter().filter(|it| it.in_archive) {
        zip.start_file(format!("OEBPS/{}", href_of(it)), deflated).unwrap();
        zip.write_all(it.body.as_bytes()).unwrap();
    }
    zip.start_file("OEBPS/style.css", deflated).unwrap();
    zip.write_all(b"p { margin: 0; }").unwrap();

    zip.finish().unwrap().into_inner()
}

fn href_of(it: &Item) -> String {
    format!("{}.xhtml", it.id)
}

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".epub").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

#[derive(Default)]
struct Recorder(RefCell<Vec<ConversionEvent>>);

impl ConversionObserver for Recorder {
    fn notify(&self, event: &ConversionEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

fn paragraphs(blocks: &[LayoutBlock]) -> Vec<&str> {
    blocks
        .iter()
        .filter_map(|b| match b {
            LayoutBlock::Paragraph(p) => Some(p.as_str()),
            _ => None,
        })
        .collect()
}

// =====================================================================
// End-to-end scenarios
// =====================================================================

#[test]
fn single_chapter_book_end_to_end() {
    let epub = build_epub(
        Some("Test Book"),
        Some("A. Writer"),
        &[item("c1", xhtml("<p>Hello world.</p><p>Second paragraph.</p>"))],
        &["c1"],
    );
    let file = write_temp(&epub);
    let mut config = ConvertConfig::default();
    config.limits.min_chapter_chars = 20;

    let book = extract(file.path(), &config, &NullObserver).unwrap();
    assert_eq!(book.title, "Test Book");
    assert_eq!(book.author, "A. Writer");
    assert_eq!(book.chapters.len(), 1);

    let blocks = compose(&book, &config.limits, &NullObserver);
    assert_eq!(
        blocks,
        vec![
            LayoutBlock::TitleBlock("Test Book".into()),
            LayoutBlock::AuthorBlock("A. Writer".into()),
            LayoutBlock::PageBreak,
            LayoutBlock::Paragraph("Hello world.".into()),
            LayoutBlock::Paragraph("Second paragraph.".into()),
        ]
    );

    let out = convert_file(file.path(), &config, &NullObserver).unwrap();
    assert_valid_pdf(&out.pdf);
    assert_eq!(out.page_count(), 2);
    assert_eq!(out.layout.page_text(1), vec!["Hello world.", "Second paragraph."]);
}

#[test]
fn corrupt_container_is_fatal() {
    let file = write_temp(b"this is definitely not a zip archive");
    let err = extract(file.path(), &ConvertConfig::default(), &NullObserver).unwrap_err();
    assert!(matches!(err, ContainerError::Archive(_)));

    let err = convert_file(file.path(), &ConvertConfig::default(), &NullObserver).unwrap_err();
    assert!(matches!(err, ConvertError::InvalidContainer(_)));
}

#[test]
fn zip_without_container_xml_is_fatal() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = convert_bytes(&bytes, &ConvertConfig::default(), &NullObserver).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::InvalidContainer(ContainerError::MissingEntry(ref p)) if p == "META-INF/container.xml"
    ));
}

#[test]
fn short_stub_still_yields_title_page() {
    let epub = build_epub(
        Some("Stub"),
        None,
        &[item("nav", xhtml("<p>Contents!!</p>"))],
        &["nav"],
    );
    let recorder = Recorder::default();
    let book = epub_forge::extract::extract_from_reader(Cursor::new(&epub), &ConvertConfig::default(), &recorder)
        .unwrap();
    assert!(book.chapters.is_empty());
    assert_eq!(book.author, "Unknown Author");
    assert!(recorder.0.borrow().iter().any(|e| matches!(
        e,
        ConversionEvent::ItemSkipped {
            reason: SkipReason::TooShort { chars: 10, min: 100 },
            ..
        }
    )));

    let blocks = compose(&book, &ConvertConfig::default().limits, &NullObserver);
    assert_eq!(
        blocks,
        vec![
            LayoutBlock::TitleBlock("Stub".into()),
            LayoutBlock::AuthorBlock("Unknown Author".into()),
            LayoutBlock::PageBreak,
        ]
    );

    let out = convert_bytes(&epub, &ConvertConfig::default(), &NullObserver).unwrap();
    assert_valid_pdf(&out.pdf);
    assert_eq!(out.page_count(), 1);
    assert_eq!(out.chapters, 0);
}

// =====================================================================
// Extraction
// =====================================================================

#[test]
fn spine_order_wins_and_nav_is_excluded() {
    let mut nav = item("nav", xhtml(&format!("<nav><ol><li>One</li></ol></nav>{}", filler(40))));
    nav.properties = Some("nav");
    let extra = item("appendix", xhtml(&format!("<p>Appendix text.</p>{}", filler(30))));
    let epub = build_epub(
        Some("Ordered"),
        Some("Someone"),
        &[
            nav,
            item("c2", xhtml(&format!("<p>Second chapter.</p>{}", filler(30)))),
            extra,
            item("c1", xhtml(&format!("<p>First chapter.</p>{}", filler(30)))),
        ],
        &["c1", "c2"],
    );

    let mut archive = EpubArchive::from_reader(Cursor::new(epub)).unwrap();
    let extraction = extract_from(&mut archive, &ConvertConfig::default(), &NullObserver);
    let hrefs: Vec<&str> = extraction.items.iter().map(|i| i.href.as_str()).collect();
    assert_eq!(hrefs, vec!["OEBPS/c1.xhtml", "OEBPS/c2.xhtml", "OEBPS/appendix.xhtml"]);

    let book = extraction.into_book();
    let openings: Vec<&str> = book
        .chapters
        .iter()
        .map(|c| c.as_str().split("\n\n").next().unwrap_or_default())
        .collect();
    assert_eq!(openings, vec!["First chapter.", "Second chapter.", "Appendix text."]);

    let blocks = compose(&book, &ConvertConfig::default().limits, &NullObserver);
    let breaks = blocks.iter().filter(|b| **b == LayoutBlock::PageBreak).count();
    // One after the title page plus chapters - 1 between chapters.
    assert_eq!(breaks, 1 + 2);
    assert_eq!(blocks[3], LayoutBlock::ChapterHeading(1));
    assert_eq!(paragraphs(&blocks)[0], "First chapter.");
}

#[test]
fn bad_items_are_skipped_and_the_rest_converts() {
    let mut missing = item("missing", xhtml(&filler(30)));
    missing.in_archive = false;
    let depth = epub_forge::dom::MAX_DEPTH + 5;
    let deep = format!("{}{}{}", "<div>".repeat(depth), "word ".repeat(40), "</div>".repeat(depth));
    let epub = build_epub(
        Some("Survivor"),
        Some("Someone"),
        &[
            missing,
            item("deep", deep),
            item("good", xhtml(&format!("<p>The good chapter.</p>{}", filler(30)))),
        ],
        &["missing", "deep", "good"],
    );

    let recorder = Recorder::default();
    let mut archive = EpubArchive::from_reader(Cursor::new(&epub)).unwrap();
    let extraction = extract_from(&mut archive, &ConvertConfig::default(), &recorder);
    let skipped: Vec<&str> = extraction.skipped().map(|(href, _)| href).collect();
    assert_eq!(skipped, vec!["OEBPS/missing.xhtml", "OEBPS/deep.xhtml"]);

    let events = recorder.0.borrow();
    assert!(events.iter().any(|e| matches!(
        e,
        ConversionEvent::ItemSkipped { href, reason: SkipReason::Unreadable(_) } if href == "OEBPS/missing.xhtml"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ConversionEvent::ItemSkipped { href, reason: SkipReason::Markup(_) } if href == "OEBPS/deep.xhtml"
    )));
    drop(events);

    let book = extraction.into_book();
    assert_eq!(book.chapters.len(), 1);
    assert!(book.chapters[0].as_str().starts_with("The good chapter."));

    for config in [ConvertConfig::default(), ConvertConfig::html()] {
        let out = convert_bytes(&epub, &config, &NullObserver).unwrap();
        assert_valid_pdf(&out.pdf);
        assert_eq!(out.chapters, 1);
        assert_eq!(out.page_count(), 2);
    }
}

#[test]
fn malformed_markup_uses_permissive_parser() {
    let broken = format!(
        "<html><body><p>Caf&eacute; &nbsp;opens <b>early</p><p>{}</body></html>",
        "word ".repeat(40)
    );
    let epub = build_epub(Some("Broken"), None, &[item("c1", broken)], &["c1"]);
    let recorder = Recorder::default();
    let book =
        epub_forge::extract::extract_from_reader(Cursor::new(epub), &ConvertConfig::default(), &recorder).unwrap();

    assert_eq!(book.chapters.len(), 1);
    let Chapter::Text(text) = &book.chapters[0] else {
        panic!("Expected text chapter");
    };
    assert!(text.starts_with("Café"), "got {text:?}");
    assert!(recorder
        .0
        .borrow()
        .iter()
        .any(|e| matches!(e, ConversionEvent::ParserFallback { href, .. } if href == "OEBPS/c1.xhtml")));
}

#[test]
fn scripts_and_styles_never_reach_the_pdf() {
    let body = format!(
        "<script>var secret = 1;</script><style>p {{ color: red; }}</style><p>Visible.</p>{}",
        filler(30)
    );
    let epub = build_epub(Some("Clean"), None, &[item("c1", xhtml(&body))], &["c1"]);
    let out = convert_bytes(&epub, &ConvertConfig::default(), &NullObserver).unwrap();
    let all: Vec<&str> = (0..out.page_count()).flat_map(|p| out.layout.page_text(p)).collect();
    assert!(all.iter().all(|l| !l.contains("secret") && !l.contains("color")));
    assert!(all.contains(&"Visible."));
}

// =====================================================================
// HTML layout
// =====================================================================

#[test]
fn html_layout_end_to_end() {
    let epub = build_epub(
        Some("Styled"),
        Some("A. Writer"),
        &[
            item("c1", xhtml(&format!("<h1>Opening</h1><p>First &amp; foremost.</p>{}", filler(30)))),
            item("c2", xhtml(&format!("<ul><li>Point</li></ul>{}", filler(30)))),
        ],
        &["c1", "c2"],
    );
    let out = convert_bytes(&epub, &ConvertConfig::html(), &NullObserver).unwrap();
    assert_valid_pdf(&out.pdf);
    assert_eq!(out.chapters, 2);
    assert!(out.page_count() >= 3);
    assert_eq!(out.layout.page_text(0), vec!["Styled", "by A. Writer"]);

    let page1 = out.layout.page_text(1);
    assert_eq!(&page1[..3], &["Chapter 1", "Opening", "First & foremost."]);
    let all: Vec<&str> = (0..out.page_count()).flat_map(|p| out.layout.page_text(p)).collect();
    assert!(all.contains(&"\u{2022} Point"));
}

#[test]
fn layout_json_survives_a_round_trip() {
    let epub = build_epub(Some("Json"), None, &[item("c1", xhtml(&filler(60)))], &["c1"]);
    let out = convert_bytes(&epub, &ConvertConfig::default(), &NullObserver).unwrap();
    let json = out.layout.to_json().unwrap();
    let back = epub_forge::layout_config::LayoutConfig::from_json(&json).unwrap();
    assert_eq!(back.page_count(), out.page_count());
    assert_eq!(back.title, "Json");
    assert_valid_pdf(&epub_forge::render::render_pdf(&back).unwrap());
}

// =====================================================================
// Upload service
// =====================================================================

const BOUNDARY: &str = "XEPUBFORGEBOUNDARY";

fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/epub+zip\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_route() {
    let app = router(&ServerConfig::default());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "EPUB to PDF Converter");
}

#[tokio::test]
async fn index_route_lists_endpoints() {
    let app = router(&ServerConfig::default());
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["endpoints"]["POST /convert"].is_string());
}

#[tokio::test]
async fn convert_route_returns_pdf_attachment() {
    let epub = build_epub(
        Some("Served"),
        Some("A. Writer"),
        &[item("c1", xhtml(&format!("<p>Over the wire.</p>{}", filler(30))))],
        &["c1"],
    );
    let app = router(&ServerConfig::default());
    let response = app
        .oneshot(multipart_request("file", "My Book.epub", &epub))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"My_Book.pdf\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_valid_pdf(&bytes);
}

#[tokio::test]
async fn convert_route_rejects_bad_requests() {
    let cases = [
        ("upload", "book.epub", "No file provided"),
        ("file", "", "No file selected"),
        ("file", "book.pdf", "Invalid file type. Only EPUB files are allowed"),
    ];
    for (field, filename, message) in cases {
        let app = router(&ServerConfig::default());
        let response = app
            .oneshot(multipart_request(field, filename, b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "case {message}");
        assert_eq!(json_body(response).await["error"], message);
    }
}

#[tokio::test]
async fn convert_route_reports_conversion_failures() {
    let app = router(&ServerConfig::default());
    let response = app
        .oneshot(multipart_request("file", "broken.epub", b"not a zip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.starts_with("Conversion failed: "), "got {message:?}");
}
