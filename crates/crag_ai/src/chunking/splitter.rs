use std::collections::VecDeque;
use std::ops::Range;

use crag_core::config::ChunkingConfig;
use crag_core::error::{AppError, ErrorKind};

/// Paragraph, line, sentence, word, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Deterministic recursive splitter with character-counted windows.
///
/// Every window is a contiguous span of the input. Windows are at most `chunk_size`
/// characters, consecutive windows share at most `chunk_overlap` characters, and
/// concatenating each window minus its overlap with the previous one yields the input.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "RAG_CONFIG_INVALID",
                "chunk_overlap must be smaller than a non-zero chunk_size",
            )
            .with_details(format!("chunk_size={chunk_size}; chunk_overlap={chunk_overlap}")));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(cfg: &ChunkingConfig) -> Result<Self, AppError> {
        Self::new(cfg.chunk_size, cfg.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.split_spans(text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    /// Byte ranges of each window, in document order.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut pieces = Vec::new();
        let seps: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.atomize(text, 0, text.len(), &seps, &mut pieces);
        self.merge(&pieces)
    }

    fn atomize(&self, text: &str, start: usize, end: usize, seps: &[&str], out: &mut Vec<Piece>) {
        if start >= end {
            return;
        }
        let segment = &text[start..end];
        let pos = seps
            .iter()
            .position(|s| s.is_empty() || segment.contains(s))
            .unwrap_or(seps.len());
        let sep = seps.get(pos).copied().unwrap_or("");
        let finer = seps.get(pos + 1..).unwrap_or(&[]);

        if sep.is_empty() {
            for (offset, ch) in segment.char_indices() {
                let s = start + offset;
                out.push(Piece {
                    start: s,
                    end: s + ch.len_utf8(),
                    chars: 1,
                });
            }
            return;
        }

        // Separator stays attached to the end of the piece before it.
        let mut cursor = start;
        let mut bounds = Vec::new();
        for (offset, m) in segment.match_indices(sep) {
            let piece_end = start + offset + m.len();
            bounds.push((cursor, piece_end));
            cursor = piece_end;
        }
        if cursor < end {
            bounds.push((cursor, end));
        }

        for (s, e) in bounds {
            let chars = text[s..e].chars().count();
            if chars <= self.chunk_size {
                out.push(Piece { start: s, end: e, chars });
            } else {
                self.atomize(text, s, e, finer, out);
            }
        }
    }

    fn merge(&self, pieces: &[Piece]) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        let mut current: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            if total + piece.chars > self.chunk_size && !current.is_empty() {
                windows.push(span(&current));
                while total > self.chunk_overlap || (total + piece.chars > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }
            current.push_back(*piece);
            total += piece.chars;
        }
        if !current.is_empty() {
            windows.push(span(&current));
        }
        windows
    }
}

fn span(pieces: &VecDeque<Piece>) -> Range<usize> {
    let start = pieces.front().map(|p| p.start).unwrap_or(0);
    let end = pieces.back().map(|p| p.end).unwrap_or(start);
    start..end
}

/// Rebuild the source text from windows by dropping each window's leading overlap.
pub fn reassemble(text: &str, spans: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut covered = 0usize;
    for r in spans {
        if r.end > covered {
            out.push_str(&text[covered.max(r.start)..r.end]);
            covered = r.end;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "Admissions\n\nApplications open in August. Early decision closes Nov 1. \
        Regular decision closes Jan 15.\n\nTuition\nResident tuition is $12,000 per year. \
        Non-resident tuition is $40,000 per year. Fees vary by college; see the bursar.\n\n\
        Housing\nAll first-year students live on campus. Ünïcödé résidence halls included.";

    #[test]
    fn character_windows_for_unbroken_text() {
        let splitter = TextSplitter::new(4, 2).unwrap();
        assert_eq!(splitter.split("ABCDEFGHIJ"), vec!["ABCD", "CDEF", "EFGH", "GHIJ"]);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let splitter = TextSplitter::new(20, 0).unwrap();
        let windows = splitter.split("first para\n\nsecond para");
        assert_eq!(windows, vec!["first para\n\n", "second para"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert_eq!(TextSplitter::new(10, 10).unwrap_err().kind, ErrorKind::Configuration);
        assert_eq!(TextSplitter::new(0, 0).unwrap_err().kind, ErrorKind::Configuration);
    }

    #[test]
    fn empty_document_has_no_windows() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        assert!(splitter.split("").is_empty());
    }

    #[test]
    fn windows_cover_text_exactly_within_bounds() {
        for (size, overlap) in [(1, 0), (3, 1), (8, 0), (16, 5), (40, 10), (64, 63), (500, 50)] {
            let splitter = TextSplitter::new(size, overlap).unwrap();
            let spans = splitter.split_spans(SAMPLE);
            assert_eq!(reassemble(SAMPLE, &spans), SAMPLE, "size={size} overlap={overlap}");
            assert_eq!(spans.first().map(|r| r.start), Some(0));
            assert_eq!(spans.last().map(|r| r.end), Some(SAMPLE.len()));

            for r in &spans {
                assert!(SAMPLE[r.clone()].chars().count() <= size);
            }
            for pair in spans.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                assert!(next.start <= prev.end, "gap between windows");
                assert!(next.end > prev.end, "window adds no new text");
                let shared = SAMPLE[next.start..prev.end].chars().count();
                assert!(shared <= overlap, "overlap {shared} > {overlap}");
            }
        }
    }

    #[test]
    fn is_deterministic() {
        let splitter = TextSplitter::new(30, 7).unwrap();
        assert_eq!(splitter.split(SAMPLE), splitter.split(SAMPLE));
    }
}
