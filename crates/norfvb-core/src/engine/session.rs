//! Programming session - chunking of one write request

/// Page buffer size of the chip; the largest single page program
pub const PAGE_SIZE: usize = 256;

/// Width of one store into the flash window
pub const WORD_SIZE: usize = 4;

/// One page program worth of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Flash address the chunk lands at
    pub address: usize,
    /// Data of the chunk, at most [`PAGE_SIZE`] bytes
    pub data: &'a [u8],
}

/// Transient state of one write request
///
/// Splits the request into full [`PAGE_SIZE`] chunks followed by one
/// remainder chunk, in increasing address order. Created per call and
/// dropped on return.
#[derive(Debug, Clone)]
pub struct ProgramSession<'a> {
    address: usize,
    cursor: &'a [u8],
}

impl<'a> ProgramSession<'a> {
    /// Start a session writing `data` at `address`
    pub fn new(address: usize, data: &'a [u8]) -> Self {
        Self {
            address,
            cursor: data,
        }
    }

    /// Address the next chunk will land at
    pub fn address(&self) -> usize {
        self.address
    }

    /// Bytes not yet handed out
    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }
}

impl<'a> Iterator for ProgramSession<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.cursor.is_empty() {
            return None;
        }
        let len = self.cursor.len().min(PAGE_SIZE);
        let (data, rest) = self.cursor.split_at(len);
        let chunk = Chunk {
            address: self.address,
            data,
        };
        self.cursor = rest;
        self.address = self.address.wrapping_add(len);
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.cursor.len().div_ceil(PAGE_SIZE);
        (n, Some(n))
    }
}

impl ExactSizeIterator for ProgramSession<'_> {}
