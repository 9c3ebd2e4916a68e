//! Document loader: turns the files in the upload directory into plain-text
//! [`Document`]s.
//!
//! PDFs yield one document per page; every other format yields one document
//! per file. A file that fails to parse is logged and skipped, it never aborts
//! the batch.
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Reader, Xlsx, open_workbook};
use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, TableCellContent, TableChild,
    TableRowChild,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LoadError;

/// Recognised source formats, in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Txt,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [Self::Pdf, Self::Docx, Self::Xlsx, Self::Txt];

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Txt => "txt",
        }
    }

    /// Format for a path, matching the extension case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| ext.eq_ignore_ascii_case(f.extension()))
    }
}

/// Extracted text of one file (or one PDF page).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    /// File name inside the upload directory.
    pub source: String,
    pub format: DocumentFormat,
    /// 1-based page number, PDFs only.
    pub page: Option<u32>,
}

/// List the recognised files directly inside `dir`.
///
/// Files are grouped by format (pdf, docx, xlsx, txt) and sorted by name
/// within each group. A missing directory yields nothing.
pub fn discover(dir: &Path) -> Vec<PathBuf> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let base = glob::Pattern::escape(&dir.to_string_lossy());

    let mut files = Vec::new();
    for format in DocumentFormat::ALL {
        let pattern = format!("{base}/*.{}", format.extension());
        let matches = match glob::glob_with(&pattern, options) {
            Ok(m) => m,
            Err(e) => {
                warn!("Invalid glob pattern {pattern}: {e}");
                continue;
            }
        };

        let mut group: Vec<PathBuf> = matches
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to read directory entry: {e}");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        group.sort();
        files.extend(group);
    }

    files
}

/// Lazily load every recognised file in `dir`.
pub fn load_dir(dir: &Path) -> impl Iterator<Item = Document> + use<> {
    load_files(discover(dir))
}

/// Lazily load the given files, skipping (and logging) the ones that fail.
///
/// Documents without any non-whitespace text are dropped.
pub fn load_files<I>(paths: I) -> impl Iterator<Item = Document>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths
        .into_iter()
        .flat_map(|path| match load_file(&path) {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Skipping file: {e}");
                Vec::new()
            }
        })
        .filter(|doc| {
            let keep = !doc.text.trim().is_empty();
            if !keep {
                debug!("Dropping empty document from {}", doc.source);
            }
            keep
        })
}

/// Load a single file. Unrecognised extensions yield no documents.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoadError> {
    let Some(format) = DocumentFormat::from_path(path) else {
        return Ok(Vec::new());
    };
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let whole = |text: String| {
        vec![Document {
            text,
            source: source.clone(),
            format,
            page: None,
        }]
    };

    match format {
        DocumentFormat::Txt => read_text(path).map(whole),
        DocumentFormat::Docx => read_docx(path).map(whole),
        DocumentFormat::Xlsx => read_xlsx(path).map(whole),
        DocumentFormat::Pdf => Ok(read_pdf_pages(path)?
            .into_iter()
            .map(|(page, text)| Document {
                text,
                source: source.clone(),
                format,
                page: Some(page),
            })
            .collect()),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    String::from_utf8(read_bytes(path)?).map_err(|_| LoadError::Encoding {
        path: path.to_path_buf(),
    })
}

/// Text of every page, keyed by 1-based page number. Pages that fail to
/// extract are skipped.
fn read_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>, LoadError> {
    let doc = lopdf::Document::load(path).map_err(|e| LoadError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut pages = Vec::new();
    for page_num in doc.get_pages().into_keys() {
        match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => pages.push((page_num, text)),
            Ok(_) => debug!("Page {page_num} of {} has no text", path.display()),
            Err(e) => warn!(
                "Failed to extract page {page_num} of {}: {e}",
                path.display()
            ),
        }
    }

    Ok(pages)
}

fn read_docx(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| LoadError::Docx {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            DocumentChild::Table(table) => {
                for row in &table.rows {
                    let TableChild::TableRow(row) = row;
                    let cells: Vec<String> = row
                        .cells
                        .iter()
                        .map(|cell| {
                            let TableRowChild::TableCell(cell) = cell;
                            cell.children
                                .iter()
                                .filter_map(|content| match content {
                                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    lines.push(cells.join("\t"));
                }
            }
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// Every sheet as a `=== Sheet: name ===` header followed by one
/// tab-separated line per non-empty row.
fn read_xlsx(path: &Path) -> Result<String, LoadError> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| {
        LoadError::Xlsx {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let mut content = String::new();
    for sheet_name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!(
                    "Failed to read sheet {sheet_name} of {}: {e}",
                    path.display()
                );
                continue;
            }
        };

        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(&format!("=== Sheet: {sheet_name} ===\n"));

        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            content.push_str(&cells.join("\t"));
            content.push('\n');
        }
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("b.docx")),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("c.md")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_discover_orders_by_format_then_name() {
        let dir = tempdir().unwrap();
        for name in ["b.txt", "a.txt", "z.pdf", "notes.md", "sheet.xlsx"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let names: Vec<String> = discover(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["z.pdf", "sheet.xlsx", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(discover(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_load_text_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello world").unwrap();

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "hello world");
        assert_eq!(docs[0].source, "hello.txt");
        assert_eq!(docs[0].format, DocumentFormat::Txt);
        assert_eq!(docs[0].page, None);
    }

    #[test]
    fn test_invalid_utf8_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        assert!(matches!(
            load_file(&path),
            Err(LoadError::Encoding { .. })
        ));
    }

    #[test]
    fn test_broken_files_do_not_abort_batch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), "not a pdf").unwrap();
        fs::write(dir.path().join("broken.docx"), "not a zip").unwrap();
        fs::write(dir.path().join("broken.xlsx"), "not a workbook").unwrap();
        fs::write(dir.path().join("good.txt"), "still loaded").unwrap();
        fs::write(dir.path().join("ignored.csv"), "a,b").unwrap();

        let docs: Vec<Document> = load_dir(dir.path()).collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.txt");
    }

    #[test]
    fn test_blank_documents_are_dropped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blank.txt"), "  \n\t ").unwrap();
        fs::write(dir.path().join("full.txt"), "content").unwrap();

        let docs: Vec<Document> = load_dir(dir.path()).collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "full.txt");
    }

    fn write_pdf(path: &Path, pages: &[&str]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Object, Stream, dictionary};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
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
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_pdf_yields_one_document_per_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        write_pdf(&path, &["Revenue grew", "Costs fell"]);

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page, Some(1));
        assert_eq!(docs[1].page, Some(2));
        assert!(docs[0].text.contains("Revenue grew"));
        assert!(docs[1].text.contains("Costs fell"));
        assert!(
            docs.iter()
                .all(|d| d.source == "report.pdf" && d.format == DocumentFormat::Pdf)
        );
    }

    #[test]
    fn test_xlsx_renders_every_sheet() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/inventory.xlsx");

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].format, DocumentFormat::Xlsx);
        assert_eq!(docs[0].page, None);
        assert_eq!(
            docs[0].text,
            "=== Sheet: Stock ===\nItem\tCount\nbolts\t12\n\n\
             === Sheet: Prices ===\nItem\tPrice\nbolts\t2.5\n"
        );
    }

    #[test]
    fn test_unrecognised_extension_yields_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, [1, 2, 3]).unwrap();
        assert!(load_file(&path).unwrap().is_empty());
    }
}
