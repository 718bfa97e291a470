//! The page arena: every loaded page by number, plus the per-magazine
//! selection queues.
//!
//! The loader inserts and removes pages here and may block. The scheduler
//! thread only uses the `try_` accessors and the queue mutexes via
//! `try_lock`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use vbit_packet::PageNumber;

use super::handle::{PageCell, PageHandle, QueueTag};
use super::model::{Page, PageKind};
use super::queues::MagazineQueues;

#[derive(Debug, Default)]
struct Index {
    pages: BTreeMap<PageNumber, PageHandle>,
    files: HashMap<PathBuf, PageNumber>,
}

#[derive(Debug)]
pub struct PageList {
    index: RwLock<Index>,
    magazines: [Mutex<MagazineQueues>; 8],
}

impl Default for PageList {
    fn default() -> Self {
        Self::new()
    }
}

impl PageList {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            magazines: std::array::from_fn(|_| Mutex::new(MagazineQueues::new())),
        }
    }

    /// Add a page, or replace the content of the page with the same number.
    ///
    /// A replaced page joins the updated queue; when its kind changed it
    /// also moves to the matching rotation queue.
    pub fn insert(&self, page: Page) -> PageHandle {
        let number = page.number();
        let kind = page.kind();
        let tag = QueueTag::for_kind(kind);
        let filename = page.filename.clone();

        let mut index = self.index.write();
        let existing = index.pages.get(&number).cloned();
        let handle = match existing {
            Some(handle) => {
                *handle.content() = page;
                let previous = handle.set_tag(tag);
                let mut queues = self.magazines[number.magazine() as usize].lock();
                if previous != tag {
                    queues.push(handle.clone());
                }
                if kind != PageKind::Magazine {
                    queues.updated.push(handle.clone());
                }
                debug!("Updated page {} ({:?})", number, kind);
                handle
            }
            None => {
                let handle = PageCell::new(page);
                handle.set_tag(tag);
                self.magazines[number.magazine() as usize].lock().push(handle.clone());
                index.pages.insert(number, handle.clone());
                debug!("Added page {} ({:?})", number, kind);
                handle
            }
        };

        index.files.retain(|_, n| *n != number);
        if let Some(path) = filename {
            index.files.insert(path, number);
        }
        handle
    }

    /// Remove a page. Queues drop it on their next pass.
    pub fn remove(&self, number: PageNumber) -> Option<PageHandle> {
        let mut index = self.index.write();
        let handle = index.pages.remove(&number)?;
        index.files.retain(|_, n| *n != number);
        handle.mark_deleted();
        info!("Removed page {}", number);
        Some(handle)
    }

    /// Remove the page loaded from `path`.
    pub fn remove_file(&self, path: &Path) -> Option<PageHandle> {
        let number = *self.index.read().files.get(path)?;
        self.remove(number)
    }

    pub fn get(&self, number: PageNumber) -> Option<PageHandle> {
        self.index.read().pages.get(&number).cloned()
    }

    /// Lookup without waiting; `None` also while the loader holds the index.
    pub fn try_get(&self, number: PageNumber) -> Option<PageHandle> {
        self.index.try_read()?.pages.get(&number).cloned()
    }

    pub fn find_by_filename(&self, path: &Path) -> Option<PageHandle> {
        let index = self.index.read();
        let number = index.files.get(path)?;
        index.pages.get(number).cloned()
    }

    pub fn len(&self) -> usize {
        self.index.read().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn numbers(&self) -> Vec<PageNumber> {
        self.index.read().pages.keys().copied().collect()
    }

    /// Queues of magazine 0..=7.
    pub fn queues(&self, magazine: u8) -> &Mutex<MagazineQueues> {
        &self.magazines[(magazine & 0x07) as usize]
    }

    /// Page mFF of magazine 0..=7, if loaded.
    pub fn magazine_page(&self, magazine: u8) -> Option<PageHandle> {
        self.try_get(PageNumber::new(magazine, 0xFF))
    }

    /// True when the magazine has a page other than mFF. Reads as true while
    /// the index is being written.
    pub fn has_pages(&self, magazine: u8) -> bool {
        let Some(index) = self.index.try_read() else {
            return true;
        };
        let first = PageNumber::new(magazine, 0x00);
        let last = PageNumber::new(magazine, 0xFE);
        index.pages.range(first..=last).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::model::Subpage;
    use vbit_packet::PageFunction;

    fn page(number: u16) -> Page {
        let mut sub = Subpage::new();
        sub.set_row(1, b"text");
        Page::new(PageNumber::from_raw(number), sub)
    }

    #[test]
    fn test_insert_and_lookup() {
        let list = PageList::new();
        let mut p = page(0x100);
        p.filename = Some(PathBuf::from("pages/P100.tti"));
        let handle = list.insert(p);
        assert_eq!(handle.tag(), QueueTag::Normal);
        assert_eq!(list.len(), 1);
        assert!(list.get(PageNumber::new(1, 0x00)).is_some());
        assert!(list.try_get(PageNumber::new(1, 0x00)).is_some());
        assert!(list.find_by_filename(Path::new("pages/P100.tti")).is_some());
        assert!(list.has_pages(1));
        assert!(!list.has_pages(2));
        assert_eq!(list.queues(1).lock().normal.len(), 1);
    }

    #[test]
    fn test_magazine_page_not_in_rotation() {
        let list = PageList::new();
        list.insert(page(0x2FF));
        assert!(!list.has_pages(2));
        assert!(list.magazine_page(2).is_some());
        assert!(!list.queues(2).lock().has_pages());
    }

    #[test]
    fn test_replace_marks_updated() {
        let list = PageList::new();
        let first = list.insert(page(0x300));
        let second = list.insert(page(0x300));
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert_eq!(list.len(), 1);
        let queues = list.queues(3).lock();
        assert_eq!(queues.updated.len(), 1);
        assert_eq!(queues.normal.len(), 1);
    }

    #[test]
    fn test_replace_with_new_kind_moves_queue() {
        let list = PageList::new();
        list.insert(page(0x400));
        let mut special = page(0x400);
        special.subpages_mut()[0].function = PageFunction::BasicTopTable;
        let handle = list.insert(special);
        assert_eq!(handle.tag(), QueueTag::Special);
        let mut queues = list.queues(4).lock();
        assert_eq!(queues.special.len(), 1);
        // The stale normal entry is dropped on the next pass.
        assert!(queues.normal.next().is_none());
        assert_eq!(queues.normal.len(), 0);
    }

    #[test]
    fn test_remove() {
        let list = PageList::new();
        let mut p = page(0x800);
        p.filename = Some(PathBuf::from("a.tti"));
        let handle = list.insert(p);
        assert_eq!(handle.number().magazine(), 0);
        assert!(list.has_pages(0));

        assert!(list.remove_file(Path::new("a.tti")).is_some());
        assert!(handle.is_deleted());
        assert!(list.is_empty());
        assert!(!list.has_pages(0));
        assert!(list.remove(PageNumber::new(8, 0x00)).is_none());
        assert!(list.queues(0).lock().normal.next().is_none());
    }
}
