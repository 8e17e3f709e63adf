use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::{debug, info};

pub const PDF_MIME: &str = "application/pdf";

/// An uploaded document as received from the user.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { name, bytes }
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

pub fn load_document(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read document: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    Ok(Document { name, bytes })
}

/// Concatenate the text of every page of every document, documents in the
/// given order and pages in page order. Pages without extractable text
/// (scanned images, blank pages) add nothing.
pub fn extract_text(documents: &[Document]) -> Result<String> {
    let mut text = String::new();
    for document in documents {
        text.push_str(&extract_document_text(document)?);
    }
    Ok(text)
}

fn extract_document_text(document: &Document) -> Result<String> {
    let mime = infer::get(&document.bytes).map(|kind| kind.mime_type());
    if mime != Some(PDF_MIME) {
        return Err(anyhow!(
            "{} is not a PDF (detected: {})",
            document.display_name(),
            mime.unwrap_or("unknown")
        ));
    }
    let pdf = lopdf::Document::load_mem(&document.bytes)
        .with_context(|| format!("failed to open PDF: {}", document.display_name()))?;

    let mut text = String::new();
    let pages = pdf.get_pages();
    for page_number in pages.keys() {
        match pdf.extract_text(&[*page_number]) {
            Ok(page) if !page.trim().is_empty() => text.push_str(&page),
            Ok(_) => debug!(page = page_number, "page has no extractable text"),
            Err(err) => debug!(page = page_number, "skipping page: {}", err),
        }
    }
    info!(
        document = document.display_name(),
        pages = pages.len(),
        chars = text.chars().count(),
        "extracted document text"
    );
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Build a PDF with one page per entry; `None` makes a page without text.
    pub(crate) fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        build(pages, 0)
    }

    /// One-page PDF carrying an unreferenced stream of `padding` bytes, for
    /// tests that need a large file.
    pub(crate) fn build_padded_pdf(text: &str, padding: usize) -> Vec<u8> {
        build(&[Some(text)], padding)
    }

    fn build(pages: &[Option<&str>], padding: usize) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let operations = match page {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => Vec::new(),
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if padding > 0 {
            doc.add_object(Stream::new(dictionary! {}, vec![b'0'; padding]));
        }

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn concatenates_pages_and_documents_in_order() {
        let first = Document::new(
            Some("a.pdf".to_string()),
            build_pdf(&[Some("Pagina uno"), None, Some("Pagina tre")]),
        );
        let second = Document::new(Some("b.pdf".to_string()), build_pdf(&[Some("Secondo file")]));
        let text = extract_text(&[first, second]).unwrap();

        let one = text.find("Pagina uno").unwrap();
        let three = text.find("Pagina tre").unwrap();
        let other = text.find("Secondo file").unwrap();
        assert!(one < three && three < other, "{:?}", text);
    }

    #[test]
    fn page_without_text_yields_empty_string() {
        let document = Document::new(None, build_pdf(&[None]));
        assert_eq!(extract_text(&[document]).unwrap(), "");
    }

    #[test]
    fn rejects_non_pdf_upload() {
        let document = Document::new(Some("notes.txt".to_string()), b"just text".to_vec());
        let err = extract_text(&[document]).unwrap_err();
        assert_eq!(err.to_string(), "notes.txt is not a PDF (detected: unknown)");
    }

    #[test]
    fn rejects_broken_pdf() {
        let document = Document::new(Some("broken.pdf".to_string()), b"%PDF-1.5\ngarbage".to_vec());
        let err = extract_text(&[document]).unwrap_err();
        assert!(err.to_string().starts_with("failed to open PDF: broken.pdf"));
    }

    #[test]
    fn large_pdf_with_extra_objects_extracts() {
        let bytes = build_padded_pdf("Pagina unica", 2 * 1024 * 1024);
        let text = extract_text(&[Document::new(None, bytes)]).unwrap();
        assert!(text.contains("Pagina unica"));
    }

    #[test]
    fn loads_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, build_pdf(&[Some("Ciao")])).unwrap();
        let document = load_document(&path).unwrap();
        assert_eq!(document.name.as_deref(), Some("doc.pdf"));
        assert!(extract_text(&[document]).unwrap().contains("Ciao"));
    }
}
