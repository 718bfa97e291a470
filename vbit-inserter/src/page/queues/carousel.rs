//! Timed carousel queue.

use std::sync::Arc;

use log::trace;

use super::{is_member, Selection};
use crate::page::handle::{LockAttempt, PageHandle, QueueTag};

#[derive(Debug)]
struct Entry {
    handle: PageHandle,
    /// Field count at which the next subpage is due; `None` until first sent.
    deadline: Option<u64>,
}

#[derive(Debug, Default)]
pub struct CarouselQueue {
    entries: Vec<Entry>,
}

impl CarouselQueue {
    pub fn push(&mut self, handle: PageHandle) {
        if !self.entries.iter().any(|e| Arc::ptr_eq(&e.handle, &handle)) {
            self.entries.push(Entry { handle, deadline: None });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first carousel whose cycle time has run out at field `now`.
    ///
    /// A carousel sent before moves to its next subpage; either way its next
    /// deadline is `now` plus the cycle time of the subpage now current.
    pub fn next(&mut self, now: u64, fields_per_second: u32) -> Option<Selection> {
        self.entries.retain(|e| is_member(&e.handle, QueueTag::Carousel));

        for entry in self.entries.iter_mut() {
            if entry.deadline.is_some_and(|deadline| now < deadline) {
                continue;
            }
            let mut page = match entry.handle.try_content() {
                LockAttempt::Locked(page) => page,
                LockAttempt::Busy => {
                    trace!("Carousel {} busy, retrying next pass", entry.handle.number());
                    continue;
                }
            };

            let step = entry.deadline.is_some();
            if step {
                page.step_subpage();
            }
            let subpage = page.current();
            let cycle = (subpage.cycle_time as u64 * fields_per_second as u64).max(1);
            entry.deadline = Some(now + cycle);
            if !subpage.is_transmitted() {
                continue;
            }

            return Some(Selection {
                handle: entry.handle.clone(),
                subpage: subpage.clone(),
                subpage_index: page.current_index(),
                carousel_step: step,
            });
        }
        None
    }
}
