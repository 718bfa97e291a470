//! Rotation of single pages in page number order.

use std::sync::Arc;

use log::trace;

use super::{is_member, Selection};
use crate::page::handle::{LockAttempt, PageHandle, QueueTag};

#[derive(Debug, Default)]
pub struct NormalQueue {
    pages: Vec<PageHandle>,
    position: usize,
    needs_sort: bool,
    pass_complete: bool,
}

impl NormalQueue {
    /// Add a page. The list is re-sorted at the start of the next pass.
    pub fn push(&mut self, handle: PageHandle) {
        if !self.pages.iter().any(|h| Arc::ptr_eq(h, &handle)) {
            self.pages.push(handle);
            self.needs_sort = true;
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// True once after the rotation wrapped back to its first page.
    pub fn take_pass_complete(&mut self) -> bool {
        std::mem::take(&mut self.pass_complete)
    }

    fn start_pass(&mut self) {
        self.pages.retain(|h| !h.is_deleted() && h.tag() == QueueTag::Normal);
        if self.needs_sort {
            self.pages.sort_by_key(|h| h.number());
            self.needs_sort = false;
        }
        self.position = 0;
    }

    /// The next page of the rotation, skipping pages that are busy, not on
    /// air or no longer in this queue. `None` when nothing is sendable.
    pub fn next(&mut self) -> Option<Selection> {
        if self.position == 0 {
            self.start_pass();
        }

        let mut attempts = self.pages.len();
        while attempts > 0 {
            if self.position >= self.pages.len() {
                self.pass_complete = true;
                self.start_pass();
                if self.pages.is_empty() {
                    return None;
                }
            }
            let handle = self.pages[self.position].clone();
            self.position += 1;
            attempts -= 1;
            if let Some(selection) = select(&handle) {
                return Some(selection);
            }
        }
        None
    }
}

fn select(handle: &PageHandle) -> Option<Selection> {
    if !is_member(handle, QueueTag::Normal) {
        return None;
    }
    let mut page = match handle.try_content() {
        LockAttempt::Locked(page) => page,
        LockAttempt::Busy => {
            trace!("Page {} busy, skipped this pass", handle.number());
            return None;
        }
    };
    if !page.current().is_transmitted() {
        return None;
    }
    let selection = Selection {
        handle: handle.clone(),
        subpage: page.current().clone(),
        subpage_index: page.current_index(),
        carousel_step: false,
    };
    page.count_transmission();
    Some(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::queues::test_support::{count_mode, handle, page};
    use vbit_packet::{status, PageNumber};

    #[test]
    fn test_pass_is_sorted() {
        let mut queue = NormalQueue::default();
        for number in [0x105, 0x101, 0x1FF, 0x103] {
            queue.push(handle(page(number, 1, 0)));
        }

        let pass: Vec<_> = (0..3).map(|_| queue.next().unwrap().number().raw()).collect();
        assert_eq!(pass, vec![0x101, 0x103, 0x105]);
        assert!(!queue.take_pass_complete());

        assert_eq!(queue.next().unwrap().number().raw(), 0x101);
        assert!(queue.take_pass_complete());
        assert!(!queue.take_pass_complete());
    }

    #[test]
    fn test_insert_mid_pass_sorted_next_pass() {
        let mut queue = NormalQueue::default();
        queue.push(handle(page(0x110, 1, 0)));
        queue.push(handle(page(0x120, 1, 0)));
        assert_eq!(queue.next().unwrap().number().raw(), 0x110);
        queue.push(handle(page(0x100, 1, 0)));
        assert_eq!(queue.next().unwrap().number().raw(), 0x120);
        // The new page is sent this pass, in arrival order.
        assert_eq!(queue.next().unwrap().number().raw(), 0x100);
        assert_eq!(queue.next().unwrap().number().raw(), 0x100);
        assert_eq!(queue.next().unwrap().number().raw(), 0x110);
    }

    #[test]
    fn test_removes_deleted_and_retagged() {
        let mut queue = NormalQueue::default();
        let a = handle(page(0x100, 1, 0));
        let b = handle(page(0x101, 1, 0));
        let c = handle(page(0x102, 1, 0));
        queue.push(a.clone());
        queue.push(b.clone());
        queue.push(c.clone());

        b.mark_deleted();
        c.set_tag(QueueTag::Carousel);
        assert_eq!(queue.next().unwrap().number(), a.number());
        assert_eq!(queue.next().unwrap().number(), a.number());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_skips_busy_and_not_transmitted() {
        let mut queue = NormalQueue::default();
        let busy = handle(page(0x100, 1, 0));
        let hidden = handle(page(0x101, 1, 0));
        let shown = handle(page(0x102, 1, 0));
        hidden.content().subpages_mut()[0].status &= !status::TRANSMIT;
        queue.push(busy.clone());
        queue.push(hidden);
        queue.push(shown.clone());

        let guard = busy.content();
        assert_eq!(queue.next().unwrap().number(), shown.number());
        assert_eq!(queue.next().unwrap().number(), shown.number());
        drop(guard);
        assert_eq!(queue.next().unwrap().number(), busy.number());
    }

    #[test]
    fn test_nothing_sendable() {
        let mut queue = NormalQueue::default();
        assert!(queue.next().is_none());
        let meta = handle(page(0x1FF, 1, 0));
        meta.set_tag(QueueTag::Normal);
        queue.push(meta);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_count_mode_carousel_steps() {
        let mut queue = NormalQueue::default();
        let carousel = handle(count_mode(page(0x100, 2, 2)));
        assert_eq!(carousel.tag(), QueueTag::Normal);
        queue.push(carousel);
        let subcodes: Vec<_> = (0..5).map(|_| queue.next().unwrap().subpage.subcode).collect();
        assert_eq!(subcodes, vec![0, 0, 1, 1, 0]);
        assert_eq!(PageNumber::from_raw(0x100), queue.next().unwrap().number());
    }
}
