//! Free-space page index: buckets pages by free space so `insert` can find
//! a page with enough room without scanning the whole file.

use crate::config::PAGE_INDEX_BUCKETS;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct PageInfo {
    pub page_no: u64,
    pub free_space: usize,
}

pub struct PageIndex {
    buckets: Mutex<Vec<VecDeque<PageInfo>>>,
    interval_size: usize,
}

impl PageIndex {
    pub fn new(page_size: usize) -> Self {
        let interval_size = page_size / PAGE_INDEX_BUCKETS;
        PageIndex {
            buckets: Mutex::new((0..=PAGE_INDEX_BUCKETS).map(|_| VecDeque::new()).collect()),
            interval_size,
        }
    }

    fn bucket_for(&self, free_space: usize) -> usize {
        (free_space / self.interval_size).min(PAGE_INDEX_BUCKETS)
    }

    pub fn add(&self, page_no: u64, free_space: usize) {
        let bucket = self.bucket_for(free_space);
        self.buckets.lock().unwrap()[bucket].push_back(PageInfo { page_no, free_space });
    }

    /// Finds and removes a page whose free space is at least `needed`,
    /// preferring the smallest bucket that can still fit it.
    pub fn select(&self, needed: usize) -> Option<PageInfo> {
        let mut bucket = needed / self.interval_size;
        if bucket < PAGE_INDEX_BUCKETS {
            bucket += 1;
        }
        let mut buckets = self.buckets.lock().unwrap();
        for b in bucket..=PAGE_INDEX_BUCKETS {
            if let Some(info) = buckets[b].pop_front() {
                return Some(info);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_returns_none_when_empty() {
        let index = PageIndex::new(4096);
        assert!(index.select(100).is_none());
    }

    #[test]
    fn add_then_select_round_trips() {
        let index = PageIndex::new(4096);
        index.add(3, 4000);
        let info = index.select(100).unwrap();
        assert_eq!(info.page_no, 3);
        assert!(index.select(100).is_none());
    }

    #[test]
    fn select_skips_pages_without_enough_space() {
        let index = PageIndex::new(4096);
        index.add(1, 10);
        index.add(2, 4000);
        let info = index.select(3000).unwrap();
        assert_eq!(info.page_no, 2);
    }
}
