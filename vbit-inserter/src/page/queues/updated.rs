//! Pages changed since their last transmission, oldest first.

use std::collections::VecDeque;

use log::trace;

use super::Selection;
use crate::page::handle::{LockAttempt, PageHandle};

#[derive(Debug, Default)]
pub struct UpdatedQueue {
    pages: VecDeque<PageHandle>,
}

impl UpdatedQueue {
    /// Queue a page unless it is already waiting.
    pub fn push(&mut self, handle: PageHandle) {
        if !handle.set_updated_pending(true) {
            self.pages.push_back(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Take the oldest updated page. A busy page stays at the front.
    pub fn next(&mut self) -> Option<Selection> {
        while let Some(handle) = self.pages.front().cloned() {
            if handle.is_deleted() || handle.number().is_magazine_page() {
                self.pages.pop_front();
                handle.set_updated_pending(false);
                continue;
            }
            let page = match handle.try_content() {
                LockAttempt::Locked(page) => page,
                LockAttempt::Busy => {
                    trace!("Updated page {} busy", handle.number());
                    return None;
                }
            };
            self.pages.pop_front();
            handle.set_updated_pending(false);
            if !page.current().is_transmitted() {
                continue;
            }
            return Some(Selection {
                handle: handle.clone(),
                subpage: page.current().clone(),
                subpage_index: page.current_index(),
                carousel_step: false,
            });
        }
        None
    }
}
