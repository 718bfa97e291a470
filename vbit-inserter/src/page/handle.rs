//! Shared page handles.
//!
//! A [`PageCell`] is the unit the queues pass around. It carries the queue
//! membership tags as atomics so a queue can drop a stale entry without
//! locking the content, and the content itself behind a mutex that the
//! scheduler thread only ever try-locks.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use vbit_packet::PageNumber;

use super::model::{Page, PageKind};

pub type PageHandle = Arc<PageCell>;

/// The rotation queue a page belongs to. A page is in at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueTag {
    None = 0,
    Normal = 1,
    Special = 2,
    Carousel = 3,
}

impl QueueTag {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => QueueTag::Normal,
            2 => QueueTag::Special,
            3 => QueueTag::Carousel,
            _ => QueueTag::None,
        }
    }

    /// Queue for a page of this kind.
    pub fn for_kind(kind: PageKind) -> Self {
        match kind {
            PageKind::Magazine => QueueTag::None,
            PageKind::Special => QueueTag::Special,
            PageKind::Carousel => QueueTag::Carousel,
            PageKind::Normal => QueueTag::Normal,
        }
    }
}

/// Result of a non-blocking content lock.
pub enum LockAttempt<'a> {
    Locked(MutexGuard<'a, Page>),
    /// Another thread holds the page; try again next pass.
    Busy,
}

#[derive(Debug)]
pub struct PageCell {
    number: PageNumber,
    tag: AtomicU8,
    updated_pending: AtomicBool,
    deleted: AtomicBool,
    content: Mutex<Page>,
}

impl PageCell {
    pub fn new(page: Page) -> PageHandle {
        Arc::new(Self {
            number: page.number(),
            tag: AtomicU8::new(QueueTag::None as u8),
            updated_pending: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            content: Mutex::new(page),
        })
    }

    pub fn number(&self) -> PageNumber {
        self.number
    }

    pub fn tag(&self) -> QueueTag {
        QueueTag::from_u8(self.tag.load(Ordering::Acquire))
    }

    /// Set the queue tag and return the previous one.
    pub fn set_tag(&self, tag: QueueTag) -> QueueTag {
        QueueTag::from_u8(self.tag.swap(tag as u8, Ordering::AcqRel))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Mark for removal; queues drop the entry on their next pass.
    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        self.set_tag(QueueTag::None);
    }

    pub fn is_updated_pending(&self) -> bool {
        self.updated_pending.load(Ordering::Acquire)
    }

    /// Set the updated flag and return its previous value.
    pub fn set_updated_pending(&self, pending: bool) -> bool {
        self.updated_pending.swap(pending, Ordering::AcqRel)
    }

    /// Lock the content without waiting.
    pub fn try_content(&self) -> LockAttempt<'_> {
        match self.content.try_lock() {
            Some(guard) => LockAttempt::Locked(guard),
            None => LockAttempt::Busy,
        }
    }

    /// Lock the content, waiting if needed. Not for the scheduler thread.
    pub fn content(&self) -> MutexGuard<'_, Page> {
        self.content.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::model::Subpage;

    #[test]
    fn test_tags_and_flags() {
        let handle = PageCell::new(Page::new(PageNumber::new(1, 0x23), Subpage::new()));
        assert_eq!(handle.number(), PageNumber::new(1, 0x23));
        assert_eq!(handle.tag(), QueueTag::None);
        assert_eq!(handle.set_tag(QueueTag::Carousel), QueueTag::None);
        assert_eq!(handle.tag(), QueueTag::Carousel);

        assert!(!handle.set_updated_pending(true));
        assert!(handle.set_updated_pending(true));
        assert!(handle.is_updated_pending());

        handle.mark_deleted();
        assert!(handle.is_deleted());
        assert_eq!(handle.tag(), QueueTag::None);
    }

    #[test]
    fn test_try_content_busy_while_locked() {
        let handle = PageCell::new(Page::new(PageNumber::new(1, 0x00), Subpage::new()));
        let guard = handle.content();
        assert!(matches!(handle.try_content(), LockAttempt::Busy));
        drop(guard);
        assert!(matches!(handle.try_content(), LockAttempt::Locked(_)));
    }
}
