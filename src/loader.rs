//! Document loading: directory scan, extension registry, text extraction.
//!
//! Each registered extension maps to an extraction routine producing plain
//! text segments. A per-file extraction failure is logged and skips that
//! file only; it never aborts a scan. Files are visited in lexicographic
//! path order so repeated scans are deterministic.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::DocumentInfo;

/// Extensions with a registered extraction routine. Everything else is
/// skipped silently during a scan.
pub const REGISTERED_EXTENSIONS: [&str; 4] = ["txt", "pdf", "csv", "md"];

/// Extracted text for one source file.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub filename: String,
    pub file_type: String,
    /// Modification time, ISO-8601.
    pub created_at: String,
    pub segments: Vec<Segment>,
}

/// One extracted text segment. PDFs yield a segment per page; other formats
/// yield a single segment with no explicit page.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    pub page: Option<i64>,
}

impl LoadedDocument {
    /// Concatenated text across segments, used for metadata inference.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_registered(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| REGISTERED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// List regular files with a registered extension, sorted by path.
/// A missing directory is logged and yields an empty scan.
pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        tracing::warn!("Data directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_registered(path))
        .collect();

    files.sort();
    files
}

/// Listing of loadable files with size and modification time.
pub fn list_documents(dir: &Path) -> Vec<DocumentInfo> {
    scan_directory(dir)
        .into_iter()
        .filter_map(|path| {
            let meta = std::fs::metadata(&path).ok()?;
            let filename = path.file_name()?.to_string_lossy().to_string();
            Some(DocumentInfo {
                filename,
                size_bytes: meta.len(),
                updated_at: modified_iso(&meta),
                file_type: extension_of(&path).map(|e| format!(".{}", e)).unwrap_or_default(),
            })
        })
        .collect()
}

/// Extract the full text of one file via its registered routine.
pub fn load_file(path: &Path) -> Result<LoadedDocument> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::load(path.display().to_string(), "not a file path"))?;

    let ext = extension_of(path)
        .ok_or_else(|| Error::load(&filename, "missing file extension"))?;

    let meta = std::fs::metadata(path)
        .map_err(|e| Error::load(&filename, e.to_string()))?;

    let segments = match ext.as_str() {
        "txt" => extract_plain_text(path)?,
        "md" => extract_markdown(path)?,
        "csv" => extract_csv(path)?,
        "pdf" => extract_pdf(path)?,
        other => return Err(Error::load(&filename, format!("unregistered extension: {}", other))),
    };

    Ok(LoadedDocument {
        filename,
        file_type: format!(".{}", ext),
        created_at: modified_iso(&meta),
        segments,
    })
}

fn modified_iso(meta: &std::fs::Metadata) -> String {
    let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified)
        .format("%Y-%m-%dT%H:%M:%S%z")
        .to_string()
}

fn extract_plain_text(path: &Path) -> Result<Vec<Segment>> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::load(path.display().to_string(), e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(vec![Segment { text, page: None }])
}

/// Walk markdown events and keep the textual content, dropping formatting.
fn extract_markdown(path: &Path) -> Result<Vec<Segment>> {
    use pulldown_cmark::{Event, Parser, TagEnd};

    let bytes = std::fs::read(path)
        .map_err(|e| Error::load(path.display().to_string(), e.to_string()))?;
    let raw = String::from_utf8_lossy(&bytes);

    let mut text = String::new();
    for event in Parser::new(&raw) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => text.push_str("\n\n"),
            _ => {}
        }
    }

    Ok(vec![Segment {
        text: text.trim_end().to_string(),
        page: None,
    }])
}

/// Render each CSV record as "header: value" pairs on one line.
fn extract_csv(path: &Path) -> Result<Vec<Segment>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::load(path.display().to_string(), e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::load(path.display().to_string(), e.to_string()))?
        .clone();

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::load(path.display().to_string(), e.to_string()))?;
        let line = record
            .iter()
            .enumerate()
            .map(|(i, field)| match headers.get(i) {
                Some(h) if !h.is_empty() => format!("{}: {}", h, field),
                _ => field.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(line);
    }

    Ok(vec![Segment {
        text: lines.join("\n"),
        page: None,
    }])
}

/// PDF text extraction. Page breaks in the extractor output become segment
/// boundaries with 0-indexed page numbers.
fn extract_pdf(path: &Path) -> Result<Vec<Segment>> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| Error::load(path.display().to_string(), e.to_string()))?;

    let segments: Vec<Segment> = text
        .split('\u{c}')
        .enumerate()
        .filter(|(_, page_text)| !page_text.trim().is_empty())
        .map(|(page, page_text)| Segment {
            text: page_text.to_string(),
            page: Some(page as i64),
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::write(tmp.path().join("c.exe"), "c").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("d.txt"), "d").unwrap();

        let files = scan_directory(tmp.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(scan_directory(&missing).is_empty());
    }

    #[test]
    fn test_load_plain_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.txt");
        fs::write(&path, "remote work policy").unwrap();

        let doc = load_file(&path).unwrap();
        assert_eq!(doc.filename, "note.txt");
        assert_eq!(doc.file_type, ".txt");
        assert_eq!(doc.segments.len(), 1);
        assert_eq!(doc.segments[0].text, "remote work policy");
        assert_eq!(doc.segments[0].page, None);
        assert!(!doc.created_at.is_empty());
    }

    #[test]
    fn test_load_markdown_strips_formatting() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("guide.md");
        fs::write(&path, "# Title\n\nSome **bold** text with `code`.\n").unwrap();

        let doc = load_file(&path).unwrap();
        let text = &doc.segments[0].text;
        assert!(text.contains("Title"));
        assert!(text.contains("Some bold text with code."));
        assert!(!text.contains('#'));
        assert!(!text.contains("**"));
    }

    #[test]
    fn test_load_csv_uses_headers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("staff.csv");
        fs::write(&path, "name,team\nalice,platform\nbob,support\n").unwrap();

        let doc = load_file(&path).unwrap();
        let text = &doc.segments[0].text;
        assert!(text.contains("name: alice, team: platform"));
        assert!(text.contains("name: bob, team: support"));
    }

    #[test]
    fn test_load_unregistered_extension_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        fs::write(&path, [0u8, 1, 2]).unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn test_list_documents() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("p.txt"), "policy text").unwrap();

        let docs = list_documents(tmp.path());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "p.txt");
        assert_eq!(docs[0].file_type, ".txt");
        assert_eq!(docs[0].size_bytes, 11);
    }
}
