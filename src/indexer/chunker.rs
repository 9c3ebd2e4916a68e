use serde::{Deserialize, Serialize};

use super::loader::{Document, DocumentFormat};

/// A retrievable window of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// File name of the source document.
    pub source: String,
    pub format: DocumentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Ordinal of this chunk within its document.
    pub position: usize,
    /// Offset of the first character within the document text.
    pub start: usize,
}

/// Splits documents into overlapping windows of at most `chunk_size`
/// characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` is clamped below `chunk_size`.
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk every document in order.
    pub fn split_documents<I>(&self, docs: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = Document>,
    {
        docs.into_iter()
            .flat_map(|doc| self.split_document(&doc))
            .collect()
    }

    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(position, (start, text))| Chunk {
                text,
                source: doc.source.clone(),
                format: doc.format,
                page: doc.page,
                position,
                start,
            })
            .collect()
    }

    /// Splits text into `(char offset, window)` pairs.
    ///
    /// Text of at most `chunk_size` characters comes back whole. Longer text is
    /// cut at the last sentence or line break in the second half of each
    /// window (or hard at `chunk_size`), and every window after the first
    /// starts exactly `chunk_overlap` characters before the previous one ended.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total == 0 {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![(0, text.to_string())];
        }

        // end - overlap must move past start, or the loop never advances
        let min_len = (self.chunk_size / 2).max(self.chunk_overlap + 1);

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                windows.push((start, chars[start..].iter().collect()));
                break;
            }

            let end = (start + min_len..=hard_end)
                .rev()
                .find(|&end| is_break(chars[end - 1]))
                .unwrap_or(hard_end);

            windows.push((start, chars[start..end].iter().collect()));
            start = end - self.chunk_overlap;
        }

        windows
    }
}

fn is_break(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n' | '。')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            text: text.to_string(),
            source: "doc.txt".to_string(),
            format: DocumentFormat::Txt,
            page: None,
        }
    }

    fn assert_constant_overlap(chunks: &[(usize, String)], overlap: usize) {
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].1.chars().collect();
            let next: Vec<char> = pair[1].1.chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = next[..overlap].iter().collect();
            assert_eq!(tail, head, "consecutive chunks must share {overlap} chars");
        }
    }

    #[test]
    fn test_short_document_is_single_chunk() {
        let chunker = Chunker::new(1000, 200);
        let text = "  Paragraph 1\n\nParagraph 2  ";
        let chunks = chunker.split_document(&doc(text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text, "no trimming or padding");
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn test_exactly_chunk_size_is_single_chunk() {
        let chunker = Chunker::new(10, 3);
        let chunks = chunker.split_text("abcdefghij");
        assert_eq!(chunks, vec![(0, "abcdefghij".to_string())]);
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(1000, 200);
        assert!(chunker.split_text("").is_empty());
    }

    #[test]
    fn test_long_text_respects_size_and_overlap() {
        let chunker = Chunker::new(500, 100);
        let text = "Test sentence number one. ".repeat(100);
        let chunks = chunker.split_text(&text);

        assert!(chunks.len() >= 5);
        for (_, chunk) in &chunks {
            assert!(chunk.chars().count() <= 500);
            assert!(!chunk.is_empty());
        }
        assert_constant_overlap(&chunks, 100);
    }

    #[test]
    fn test_hard_cut_without_breaks() {
        let chunker = Chunker::new(100, 20);
        let text = "a".repeat(250);
        let chunks = chunker.split_text(&text);

        let starts: Vec<usize> = chunks.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 80, 160]);
        assert_eq!(chunks[0].1.len(), 100);
        assert_eq!(chunks[1].1.len(), 100);
        assert_eq!(chunks[2].1.len(), 90);
        assert_constant_overlap(&chunks, 20);
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let chunker = Chunker::new(40, 5);
        let text = format!("{}. {}", "x".repeat(29), "y".repeat(40));
        let chunks = chunker.split_text(&text);
        // The first window ends right after the period
        assert!(chunks[0].1.ends_with('.'), "got {:?}", chunks[0].1);
        assert_eq!(chunks[0].1.chars().count(), 30);
    }

    #[test]
    fn test_chunks_reassemble_document() {
        let chunker = Chunker::new(64, 16);
        let text = "Line one.\nLine two is longer!\nWhy? Because.\n".repeat(12);
        let chunks = chunker.split_text(&text);

        let mut rebuilt: String = chunks[0].1.clone();
        for (_, chunk) in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(16));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_offsets_point_into_document() {
        let chunker = Chunker::new(50, 10);
        let text = "Ünïcödé text, with accents. ".repeat(10);
        let chars: Vec<char> = text.chars().collect();
        for (start, chunk) in chunker.split_text(&text) {
            let expected: String = chars[start..start + chunk.chars().count()].iter().collect();
            assert_eq!(chunk, expected);
        }
    }

    #[test]
    fn test_deterministic() {
        let chunker = Chunker::new(120, 30);
        let text = "これは日本語のテストです。".repeat(40);
        assert_eq!(chunker.split_text(&text), chunker.split_text(&text));
    }

    #[test]
    fn test_split_documents_keeps_provenance() {
        let chunker = Chunker::new(20, 5);
        let mut page = doc(&"word ".repeat(10));
        page.source = "report.pdf".to_string();
        page.format = DocumentFormat::Pdf;
        page.page = Some(3);

        let chunks = chunker.split_documents(vec![page, doc("tiny")]);
        let (pdf, txt): (Vec<_>, Vec<_>) = chunks.iter().partition(|c| c.source == "report.pdf");
        assert!(pdf.len() > 1);
        assert!(pdf.iter().all(|c| c.page == Some(3)));
        assert_eq!(
            pdf.iter().map(|c| c.position).collect::<Vec<_>>(),
            (0..pdf.len()).collect::<Vec<_>>()
        );
        assert_eq!(txt.len(), 1);
        assert_eq!(txt[0].text, "tiny");
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(10, 50);
        assert_eq!(chunker.chunk_overlap(), 9);
        let chunks = chunker.split_text(&"z".repeat(30));
        assert!(chunks.len() > 1);
    }
}
