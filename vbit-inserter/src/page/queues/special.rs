//! Special pages (page function other than LOP).
//!
//! A pass sends every subpage of every special page once, then `next()`
//! returns `None` and the following call starts a new pass.

use std::sync::Arc;

use log::trace;

use super::{is_member, Selection};
use crate::page::handle::{LockAttempt, PageHandle, QueueTag};

#[derive(Debug, Default)]
pub struct SpecialQueue {
    pages: Vec<PageHandle>,
    position: usize,
    subpage: usize,
    needs_sort: bool,
}

impl SpecialQueue {
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

    fn start_pass(&mut self) {
        self.pages.retain(|h| !h.is_deleted() && h.tag() == QueueTag::Special);
        if self.needs_sort {
            self.pages.sort_by_key(|h| h.number());
            self.needs_sort = false;
        }
    }

    fn advance_page(&mut self) {
        self.position += 1;
        self.subpage = 0;
    }

    pub fn next(&mut self) -> Option<Selection> {
        if self.position == 0 && self.subpage == 0 {
            self.start_pass();
        }

        while self.position < self.pages.len() {
            let handle = self.pages[self.position].clone();
            if !is_member(&handle, QueueTag::Special) {
                self.advance_page();
                continue;
            }
            let page = match handle.try_content() {
                LockAttempt::Locked(page) => page,
                LockAttempt::Busy => {
                    trace!("Special page {} busy, skipped this pass", handle.number());
                    self.advance_page();
                    continue;
                }
            };

            let index = self.subpage;
            let Some(subpage) = page.subpages().get(index) else {
                self.advance_page();
                continue;
            };
            self.subpage += 1;
            if self.subpage >= page.subpages().len() {
                self.advance_page();
            }
            if !subpage.is_transmitted() {
                continue;
            }
            return Some(Selection {
                handle: handle.clone(),
                subpage: subpage.clone(),
                subpage_index: index,
                carousel_step: false,
            });
        }

        self.position = 0;
        self.subpage = 0;
        None
    }
}
