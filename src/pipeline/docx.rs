//! Minimal WordprocessingML (`.docx`) writer.
//!
//! A `.docx` is a zip archive of XML parts. We emit the smallest set Word,
//! LibreOffice and Google Docs all open without repair:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! docProps/core.xml           title, author, language
//! docProps/app.xml
//! word/document.xml           one paragraph per line, page breaks between pages
//! word/styles.xml             document defaults: Kannada font, size, kn-IN
//! word/_rels/document.xml.rels
//! ```
//!
//! The font is declared twice: in the style defaults and on every run. Word
//! picks the complex-script slot (`w:cs`) for Kannada, other editors look at
//! `w:ascii`/`w:hAnsi`, so all four slots carry the same family.

use crate::error::ConversionError;
use crate::output::RecognizedText;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ARTIFACT: &str = "docx";
const LANGUAGE: &str = "kn-IN";

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// Typography and document properties for the generated file.
#[derive(Debug, Clone)]
pub struct DocxOptions {
    pub font_family: String,
    pub font_size_pt: u32,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Serialise `text` as a `.docx` archive.
pub fn write_docx(text: &RecognizedText, options: &DocxOptions) -> Result<Vec<u8>, ConversionError> {
    let document = document_xml(text, options)?;
    let styles = styles_xml(options)?;
    let core = core_xml(options)?;
    let app = app_xml(text.len())?;

    let parts: [(&str, &[u8]); 7] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", PACKAGE_RELS.as_bytes()),
        ("docProps/core.xml", &core),
        ("docProps/app.xml", &app),
        ("word/document.xml", &document),
        ("word/styles.xml", &styles),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name, file_options)
            .map_err(|e| ConversionError::artifact_write(ARTIFACT, format!("{name}: {e}")))?;
        zip.write_all(bytes)
            .map_err(|e| ConversionError::artifact_write(ARTIFACT, format!("{name}: {e}")))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| ConversionError::artifact_write(ARTIFACT, e))?;
    Ok(cursor.into_inner())
}

// ── XML helpers ──────────────────────────────────────────────────────────

struct Part {
    writer: Writer<Vec<u8>>,
    name: &'static str,
}

impl Part {
    fn new(name: &'static str) -> Result<Self, ConversionError> {
        let mut part = Self {
            writer: Writer::new(Vec::new()),
            name,
        };
        part.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        part.raw_newline()?;
        Ok(part)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ConversionError> {
        let name = self.name;
        self.writer
            .write_event(event)
            .map_err(|e| ConversionError::artifact_write(ARTIFACT, format!("{name}: {e}")))
    }

    fn raw_newline(&mut self) -> Result<(), ConversionError> {
        let name = self.name;
        self.writer
            .get_mut()
            .write_all(b"\n")
            .map_err(|e| ConversionError::artifact_write(ARTIFACT, format!("{name}: {e}")))
    }

    fn start(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ConversionError> {
        let mut el = BytesStart::new(tag);
        for (key, value) in attrs {
            el.push_attribute((*key, &*xml_chars(value)));
        }
        self.event(Event::Start(el))
    }

    fn end(&mut self, tag: &str) -> Result<(), ConversionError> {
        self.event(Event::End(BytesEnd::new(tag)))
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ConversionError> {
        let mut el = BytesStart::new(tag);
        for (key, value) in attrs {
            el.push_attribute((*key, &*xml_chars(value)));
        }
        self.event(Event::Empty(el))
    }

    fn text(&mut self, text: &str) -> Result<(), ConversionError> {
        self.event(Event::Text(BytesText::new(&xml_chars(text))))
    }

    fn element(&mut self, tag: &str, text: &str) -> Result<(), ConversionError> {
        self.start(tag, &[])?;
        self.text(text)?;
        self.end(tag)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// `<w:rFonts>`, `<w:sz>` and `<w:lang>` shared by the style defaults and
/// every run.
fn run_properties(part: &mut Part, options: &DocxOptions) -> Result<(), ConversionError> {
    let font = options.font_family.as_str();
    let half_points = (options.font_size_pt * 2).to_string();
    part.empty(
        "w:rFonts",
        &[
            ("w:ascii", font),
            ("w:hAnsi", font),
            ("w:cs", font),
            ("w:eastAsia", font),
        ],
    )?;
    part.empty("w:sz", &[("w:val", half_points.as_str())])?;
    part.empty("w:szCs", &[("w:val", half_points.as_str())])?;
    part.empty("w:lang", &[("w:val", LANGUAGE), ("w:bidi", LANGUAGE)])
}

// ── Parts ────────────────────────────────────────────────────────────────

fn document_xml(text: &RecognizedText, options: &DocxOptions) -> Result<Vec<u8>, ConversionError> {
    let mut part = Part::new("word/document.xml")?;
    part.start("w:document", &[("xmlns:w", NS_W), ("xmlns:r", NS_R)])?;
    part.start("w:body", &[])?;

    for (i, page) in text.pages().iter().enumerate() {
        if i > 0 {
            part.start("w:p", &[])?;
            part.start("w:r", &[])?;
            part.empty("w:br", &[("w:type", "page")])?;
            part.end("w:r")?;
            part.end("w:p")?;
        }
        for line in page.text.lines() {
            paragraph(&mut part, line, options)?;
        }
    }

    // A4, one-inch margins.
    part.start("w:sectPr", &[])?;
    part.empty("w:pgSz", &[("w:w", "11906"), ("w:h", "16838")])?;
    part.empty(
        "w:pgMar",
        &[
            ("w:top", "1440"),
            ("w:right", "1440"),
            ("w:bottom", "1440"),
            ("w:left", "1440"),
            ("w:header", "708"),
            ("w:footer", "708"),
            ("w:gutter", "0"),
        ],
    )?;
    part.end("w:sectPr")?;

    part.end("w:body")?;
    part.end("w:document")?;
    Ok(part.finish())
}

fn paragraph(part: &mut Part, line: &str, options: &DocxOptions) -> Result<(), ConversionError> {
    if line.is_empty() {
        return part.empty("w:p", &[]);
    }
    part.start("w:p", &[])?;
    part.start("w:r", &[])?;
    part.start("w:rPr", &[])?;
    run_properties(part, options)?;
    part.end("w:rPr")?;
    for (i, segment) in line.split('\t').enumerate() {
        if i > 0 {
            part.empty("w:tab", &[])?;
        }
        if !segment.is_empty() {
            part.start("w:t", &[("xml:space", "preserve")])?;
            part.text(segment)?;
            part.end("w:t")?;
        }
    }
    part.end("w:r")?;
    part.end("w:p")
}

fn styles_xml(options: &DocxOptions) -> Result<Vec<u8>, ConversionError> {
    let mut part = Part::new("word/styles.xml")?;
    part.start("w:styles", &[("xmlns:w", NS_W)])?;

    part.start("w:docDefaults", &[])?;
    part.start("w:rPrDefault", &[])?;
    part.start("w:rPr", &[])?;
    run_properties(&mut part, options)?;
    part.end("w:rPr")?;
    part.end("w:rPrDefault")?;
    part.start("w:pPrDefault", &[])?;
    part.start("w:pPr", &[])?;
    part.empty("w:spacing", &[("w:after", "120"), ("w:line", "276"), ("w:lineRule", "auto")])?;
    part.end("w:pPr")?;
    part.end("w:pPrDefault")?;
    part.end("w:docDefaults")?;

    part.start(
        "w:style",
        &[("w:type", "paragraph"), ("w:default", "1"), ("w:styleId", "Normal")],
    )?;
    part.empty("w:name", &[("w:val", "Normal")])?;
    part.empty("w:qFormat", &[])?;
    part.end("w:style")?;

    part.end("w:styles")?;
    Ok(part.finish())
}

/// Drop characters XML 1.0 forbids outright (C0 controls other than tab,
/// LF and CR, plus U+FFFE/U+FFFF). Escaping cannot make them legal.
fn xml_chars(text: &str) -> Cow<'_, str> {
    let legal = |c: char| matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{FFFD}' | '\u{10000}'..);
    if text.chars().all(legal) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| legal(c)).collect())
    }
}

/// A core property value with forbidden characters removed, if anything
/// visible is left.
fn property(value: &Option<String>) -> Option<Cow<'_, str>> {
    value
        .as_deref()
        .map(xml_chars)
        .filter(|s| !s.trim().is_empty())
}

fn core_xml(options: &DocxOptions) -> Result<Vec<u8>, ConversionError> {
    let mut part = Part::new("docProps/core.xml")?;
    part.start(
        "cp:coreProperties",
        &[
            (
                "xmlns:cp",
                "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
            ),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:dcterms", "http://purl.org/dc/terms/"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ],
    )?;
    if let Some(title) = property(&options.title) {
        part.element("dc:title", &title)?;
    }
    if let Some(author) = property(&options.author) {
        part.element("dc:creator", &author)?;
    }
    part.element("dc:language", LANGUAGE)?;
    part.end("cp:coreProperties")?;
    Ok(part.finish())
}

fn app_xml(pages: usize) -> Result<Vec<u8>, ConversionError> {
    let mut part = Part::new("docProps/app.xml")?;
    part.start(
        "Properties",
        &[(
            "xmlns",
            "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties",
        )],
    )?;
    part.element("Application", concat!("kannada-pdf2word ", env!("CARGO_PKG_VERSION")))?;
    part.element("Pages", &pages.to_string())?;
    part.end("Properties")?;
    Ok(part.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::TextOrigin;
    use std::io::Read;
    use zip::ZipArchive;

    fn options() -> DocxOptions {
        DocxOptions {
            font_family: "Noto Sans Kannada".into(),
            font_size_pt: 12,
            title: Some("ಕಥೆ".into()),
            author: Some("Lekhaka".into()),
        }
    }

    fn read_part(docx: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    fn sample() -> RecognizedText {
        RecognizedText::from_ordered(
            vec!["ಕನ್ನಡ ಸಾಹಿತ್ಯ\nಎರಡನೇ ಸಾಲು".into(), "ಮುಂದಿನ ಪುಟ".into()],
            TextOrigin::Embedded,
        )
    }

    #[test]
    fn archive_has_every_part() {
        let bytes = write_docx(&sample(), &options()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
        let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/app.xml",
                "docProps/core.xml",
                "word/_rels/document.xml.rels",
                "word/document.xml",
                "word/styles.xml",
            ]
        );
    }

    #[test]
    fn kannada_text_is_stored_verbatim() {
        let bytes = write_docx(&sample(), &options()).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains(r#"<w:t xml:space="preserve">ಕನ್ನಡ ಸಾಹಿತ್ಯ</w:t>"#));
        assert!(doc.contains(r#"<w:t xml:space="preserve">ಎರಡನೇ ಸಾಲು</w:t>"#));
        assert!(doc.contains(r#"<w:t xml:space="preserve">ಮುಂದಿನ ಪುಟ</w:t>"#));
    }

    #[test]
    fn pages_are_separated_by_page_breaks() {
        let bytes = write_docx(&sample(), &options()).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert_eq!(doc.matches(r#"<w:br w:type="page"/>"#).count(), 1);
    }

    #[test]
    fn font_declared_in_styles_and_runs() {
        let bytes = write_docx(&sample(), &options()).unwrap();
        let styles = read_part(&bytes, "word/styles.xml");
        assert!(styles.contains(r#"w:cs="Noto Sans Kannada""#));
        assert!(styles.contains(r#"w:ascii="Noto Sans Kannada""#));
        assert!(styles.contains(r#"<w:sz w:val="24"/>"#));
        assert!(styles.contains(r#"w:bidi="kn-IN""#));

        let doc = read_part(&bytes, "word/document.xml");
        assert_eq!(doc.matches(r#"w:cs="Noto Sans Kannada""#).count(), 3);
    }

    #[test]
    fn markup_characters_are_escaped() {
        let text = RecognizedText::from_ordered(vec!["a < b & c".into()], TextOrigin::Ocr);
        let bytes = write_docx(&text, &options()).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn tabs_and_blank_lines() {
        let text = RecognizedText::from_ordered(vec!["ಒಂದು\tಎರಡು\n\nಮೂರು".into()], TextOrigin::Ocr);
        let bytes = write_docx(&text, &options()).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("<w:tab/>"));
        assert!(doc.contains("<w:p/>"));
    }

    #[test]
    fn core_properties_carry_title_author_language() {
        let bytes = write_docx(&sample(), &options()).unwrap();
        let core = read_part(&bytes, "docProps/core.xml");
        assert!(core.contains("<dc:title>ಕಥೆ</dc:title>"));
        assert!(core.contains("<dc:creator>Lekhaka</dc:creator>"));
        assert!(core.contains("<dc:language>kn-IN</dc:language>"));

        let app = read_part(&bytes, "docProps/app.xml");
        assert!(app.contains("<Pages>2</Pages>"));
    }

    #[test]
    fn control_characters_never_reach_the_xml() {
        let options = DocxOptions {
            title: Some("ಕಥೆ\u{1}\u{0}".into()),
            author: Some("\u{0}\u{1b}".into()),
            ..options()
        };
        let text = RecognizedText::from_ordered(vec!["ಸಾಲು\u{7}\u{FFFE}".into()], TextOrigin::Ocr);
        let bytes = write_docx(&text, &options).unwrap();

        let core = read_part(&bytes, "docProps/core.xml");
        assert!(core.contains("<dc:title>ಕಥೆ</dc:title>"));
        assert!(!core.contains("dc:creator"), "an all-control author is dropped");
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains(">ಸಾಲು</w:t>"));

        for part in [core, doc] {
            assert!(
                !part.chars().any(|c| matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{FFFE}' | '\u{FFFF}')),
                "forbidden character in {part:?}"
            );
        }
    }

    #[test]
    fn legal_text_is_borrowed() {
        assert!(matches!(xml_chars("ಕನ್ನಡ\ttext\r\n"), Cow::Borrowed(_)));
        assert_eq!(xml_chars("a\u{0}b\u{FFFF}c"), "abc");
        assert_eq!(xml_chars("😀"), "😀");
    }

    #[test]
    fn empty_document_is_still_valid() {
        let text = RecognizedText::from_ordered(vec![String::new()], TextOrigin::Embedded);
        let bytes = write_docx(&text, &options()).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("<w:body>"));
        assert!(doc.contains("<w:sectPr>"));
    }
}
