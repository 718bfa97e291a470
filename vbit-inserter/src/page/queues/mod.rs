//! Page selection queues of one magazine.
//!
//! - [`CarouselQueue`]: timed carousels, sent when their cycle time runs out
//! - [`NormalQueue`]: the sorted rotation of single pages
//! - [`SpecialQueue`]: non-LOP pages, sent as a burst on the special page cue
//! - [`UpdatedQueue`]: pages changed since they were last sent
//!
//! Each `next()` returns a [`Selection`] holding a copy of the subpage to
//! send, so the page lock is released before any packet is built.

pub mod carousel;
pub mod normal;
pub mod special;
pub mod updated;

use vbit_packet::PageNumber;

pub use carousel::CarouselQueue;
pub use normal::NormalQueue;
pub use special::SpecialQueue;
pub use updated::UpdatedQueue;

use super::handle::{PageHandle, QueueTag};
use super::model::Subpage;

/// A page picked for transmission.
#[derive(Debug, Clone)]
pub struct Selection {
    pub handle: PageHandle,
    pub subpage: Subpage,
    pub subpage_index: usize,
    /// The carousel moved to a new subpage for this transmission.
    pub carousel_step: bool,
}

impl Selection {
    pub fn number(&self) -> PageNumber {
        self.handle.number()
    }
}

/// The four queues of one magazine.
#[derive(Debug, Default)]
pub struct MagazineQueues {
    pub normal: NormalQueue,
    pub special: SpecialQueue,
    pub carousel: CarouselQueue,
    pub updated: UpdatedQueue,
}

impl MagazineQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page to the rotation queue matching its tag.
    pub fn push(&mut self, handle: PageHandle) {
        match handle.tag() {
            QueueTag::Normal => self.normal.push(handle),
            QueueTag::Special => self.special.push(handle),
            QueueTag::Carousel => self.carousel.push(handle),
            QueueTag::None => {}
        }
    }

    /// True when any rotation queue has an entry.
    pub fn has_pages(&self) -> bool {
        !self.normal.is_empty() || !self.special.is_empty() || !self.carousel.is_empty()
    }
}

/// An entry that a rotation queue with `tag` should still send.
fn is_member(handle: &PageHandle, tag: QueueTag) -> bool {
    !handle.is_deleted() && handle.tag() == tag && !handle.number().is_magazine_page()
}

#[cfg(test)]
pub(crate) mod test_support {
    use vbit_packet::{PageNumber, PageFunction};

    use crate::page::handle::{PageCell, PageHandle, QueueTag};
    use crate::page::model::{CycleMode, Page, Subpage};

    /// A page with `subpages` subpages whose subcodes are 0, 1, ...
    pub fn page(number: u16, subpages: usize, cycle_time: u32) -> Page {
        let mut first = Subpage::new();
        first.cycle_time = cycle_time;
        first.set_row(1, format!("Page {:03X}", number).as_bytes());
        let mut page = Page::new(PageNumber::from_raw(number), first.clone());
        for i in 1..subpages {
            let mut sub = first.clone();
            sub.set_subcode(i as u16);
            page.add_subpage(sub);
        }
        page
    }

    pub fn count_mode(mut page: Page) -> Page {
        for sub in page.subpages_mut() {
            sub.cycle_mode = CycleMode::Count;
        }
        page
    }

    pub fn special(mut page: Page) -> Page {
        for sub in page.subpages_mut() {
            sub.function = PageFunction::MagazineOrganisation;
        }
        page
    }

    pub fn handle(page: Page) -> PageHandle {
        let handle = PageCell::new(page);
        let tag = QueueTag::for_kind(handle.content().kind());
        handle.set_tag(tag);
        handle
    }
}
