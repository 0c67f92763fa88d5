//! # Page Bitmap
//!
//! A simple bitmap of guest pages (1 = used, 0 = free).

use alloc::vec;
use alloc::vec::Vec;

/// Page bitmap
#[derive(Debug, Clone)]
pub struct PageBitmap {
    /// Bitmap data
    words: Vec<u64>,
    /// Total number of pages
    total: usize,
    /// Free page count
    free: usize,
}

impl PageBitmap {
    /// Create a bitmap with every page free
    pub fn new(total: usize) -> Self {
        Self {
            words: vec![0; total.div_ceil(64)],
            total,
            free: total,
        }
    }

    /// Total number of pages
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of free pages
    pub fn free(&self) -> usize {
        self.free
    }

    /// Check whether a page is used
    pub fn is_used(&self, page: usize) -> bool {
        self.words[page / 64] & (1 << (page % 64)) != 0
    }

    /// Find the first run of `count` free pages
    pub fn find_contiguous(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.free {
            return None;
        }

        let mut start = 0;
        let mut found = 0;

        for page in 0..self.total {
            if self.is_used(page) {
                found = 0;
                continue;
            }
            if found == 0 {
                start = page;
            }
            found += 1;
            if found >= count {
                return Some(start);
            }
        }

        None
    }

    /// Mark a run of pages as used
    pub fn set_used(&mut self, start: usize, count: usize) {
        for page in start..start + count {
            if !self.is_used(page) {
                self.words[page / 64] |= 1 << (page % 64);
                self.free -= 1;
            }
        }
    }

    /// Mark a run of pages as free
    pub fn set_free(&mut self, start: usize, count: usize) {
        for page in start..start + count {
            if self.is_used(page) {
                self.words[page / 64] &= !(1 << (page % 64));
                self.free += 1;
            }
        }
    }
}
