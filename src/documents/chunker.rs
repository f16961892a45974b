//! Document Chunking
//!
//! Splits page-numbered documents into overlapping windows of
//! whitespace-delimited words. Windows never cross a page boundary, so
//! every chunk cites exactly one page.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loader::Document;

/// Default window size in words
pub const CHUNK_SIZE: usize = 400;
/// Default number of words shared by consecutive windows
pub const CHUNK_OVERLAP: usize = 150;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be positive")]
    ZeroSize,
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Provenance stored alongside every chunk in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    /// 1-based; `None` only when read back from an index entry that lacks it
    pub page_number: Option<u32>,
}

impl ChunkMetadata {
    /// Citation label, `"{source_file} p.{page_number}"`
    pub fn label(&self) -> String {
        match self.page_number {
            Some(page) => format!("{} p.{}", self.source_file, page),
            None => format!("{} p.?", self.source_file),
        }
    }
}

/// A page-scoped window of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_file: String,
    pub page_number: u32,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source_file: self.source_file.clone(),
            page_number: Some(self.page_number),
        }
    }
}

/// Sliding word-window policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if size == 0 {
            return Err(ChunkerError::ZeroSize);
        }
        if overlap >= size {
            return Err(ChunkerError::OverlapTooLarge { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// Distance between the starts of consecutive windows
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Lazily chunk a document. Calling this again restarts from page 1.
    pub fn chunks<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks {
            document,
            size: self.size,
            step: self.step(),
            page: 0,
            words: Vec::new(),
            start: 0,
        }
    }
}

/// Iterator over the chunks of one document
pub struct Chunks<'a> {
    document: &'a Document,
    size: usize,
    step: usize,
    /// Index of the next page to load
    page: usize,
    /// Words of the page currently being windowed
    words: Vec<&'a str>,
    start: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if self.start >= self.words.len() {
                let document = self.document;
                let page_text = document.pages.get(self.page)?;
                self.page += 1;
                self.words = page_text.split_whitespace().collect();
                self.start = 0;
                continue;
            }

            let end = (self.start + self.size).min(self.words.len());
            let text = self.words[self.start..end].join(" ");
            self.start += self.step;

            if text.trim().is_empty() {
                continue;
            }

            return Some(Chunk {
                text,
                source_file: self.document.source_file.clone(),
                page_number: self.page as u32,
            });
        }
    }
}
