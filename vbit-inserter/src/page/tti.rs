//! TTI page files.
//!
//! A TTI file is a list of `XX,value` lines describing one page. Each `PN`
//! line after the first starts a new subpage.
//!
//! | Command | Meaning |
//! |---|---|
//! | `DE` | description |
//! | `CT,n,T` / `CT,n,C` | cycle time in seconds or transmissions |
//! | `PN,mppss` | page number (`mpp` also accepted) |
//! | `SC,ssss` | subcode, hex |
//! | `PS,ssss` | page status word, hex |
//! | `RE,n` | character set region |
//! | `PF,f,c` | page function and coding, hex nibbles |
//! | `OL,n,text` | output line `n` |
//! | `FL,l1,...,l6` | fastext links, hex |
//! | `DS`, `SP` | editor metadata, ignored |
//!
//! In `OL` text, ESC (0x1B) followed by a character stands for that
//! character minus 0x40. Lines 26..=29 hold enhancement packets as six bits
//! per character.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, error, info, warn};
use vbit_packet::packet::{PAYLOAD_SIZE, TRIPLETS};
use vbit_packet::{Coding, PageFunction, PageNumber};

use super::list::PageList;
use super::model::{CycleMode, EnhancementLine, Page, Subpage, LAST_TEXT_ROW};
use super::PageError;

const ESCAPE: u8 = 0x1B;
const LAST_ENHANCEMENT_ROW: u8 = 29;

/// Read and parse one TTI file.
pub fn load(path: &Path) -> Result<Page, PageError> {
    let data = std::fs::read(path).map_err(|source| PageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut page = parse(&data)?;
    page.filename = Some(path.to_path_buf());
    Ok(page)
}

/// Parse TTI file contents.
pub fn parse(data: &[u8]) -> Result<Page, PageError> {
    let mut number: Option<PageNumber> = None;
    let mut description = String::new();
    let mut done: Vec<Subpage> = Vec::new();
    let mut current = Subpage::new();

    for (i, raw) in data.split(|&b| b == b'\n').enumerate() {
        let line_no = i + 1;
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if line.len() < 2 {
            continue;
        }
        let (command, rest) = line.split_at(2);
        let value = rest.strip_prefix(b",").unwrap_or(rest);

        match command {
            b"DE" => description = String::from_utf8_lossy(value).trim().to_string(),
            b"CT" => {
                let text = ascii(value);
                let mut fields = text.split(',');
                let seconds = fields.next().unwrap_or("").trim();
                current.cycle_time = seconds
                    .parse()
                    .map_err(|_| invalid(line_no, "cycle time", seconds))?;
                current.cycle_mode = match fields.next().map(str::trim) {
                    Some("C") | Some("c") => CycleMode::Count,
                    _ => CycleMode::Timed,
                };
            }
            b"PN" => {
                let text = ascii(value);
                let text = text.trim();
                let parsed = u32::from_str_radix(text, 16).map_err(|_| invalid(line_no, "page number", text))?;
                let parsed = match text.len() {
                    3 => PageNumber::from_raw(parsed as u16),
                    5 => PageNumber::from_mppss(parsed),
                    _ => return Err(invalid(line_no, "page number", text)),
                };
                if number.is_some() {
                    let next = next_subpage(&current);
                    done.push(std::mem::replace(&mut current, next));
                }
                number = Some(parsed);
            }
            b"SC" => current.set_subcode(hex_u16(value, line_no, "subcode")?),
            b"PS" => current.status = hex_u16(value, line_no, "page status")?,
            b"RE" => {
                let text = ascii(value);
                let text = text.trim();
                let region = u8::from_str_radix(text, 16).map_err(|_| invalid(line_no, "region", text))?;
                current.set_region(region);
            }
            b"PF" => {
                let text = ascii(value);
                let mut fields = text.split(',').map(str::trim);
                let function = fields.next().unwrap_or("");
                let function = u8::from_str_radix(function, 16).map_err(|_| invalid(line_no, "page function", function))?;
                current.function = PageFunction::from_nibble(function);
                if let Some(coding) = fields.next() {
                    let coding = u8::from_str_radix(coding, 16).map_err(|_| invalid(line_no, "page coding", coding))?;
                    current.coding = Coding::from_nibble(coding);
                }
            }
            b"FL" => {
                let text = ascii(value);
                for (slot, field) in current.links.iter_mut().zip(text.split(',')) {
                    let field = field.trim();
                    let raw = u16::from_str_radix(field, 16).map_err(|_| invalid(line_no, "fastext link", field))?;
                    *slot = PageNumber::from_raw(raw);
                }
            }
            b"OL" => output_line(&mut current, value, line_no)?,
            // Destination and source path are editor metadata.
            b"DS" | b"SP" => {}
            _ => debug!("TTI line {}: unknown command {}", line_no, String::from_utf8_lossy(command)),
        }
    }

    let number = number.ok_or(PageError::MissingPageNumber)?;
    let mut subpages = done.into_iter().chain(std::iter::once(current));
    let first = subpages.next().unwrap_or_default();
    let mut page = Page::new(number, first);
    for subpage in subpages {
        page.add_subpage(subpage);
    }
    page.description = description;
    Ok(page)
}

/// A fresh subpage carrying over the attributes that usually apply to the
/// whole page.
fn next_subpage(previous: &Subpage) -> Subpage {
    let mut next = Subpage::new();
    next.cycle_time = previous.cycle_time;
    next.cycle_mode = previous.cycle_mode;
    next.status = previous.status;
    next.region = previous.region;
    next.function = previous.function;
    next.coding = previous.coding;
    next
}

fn output_line(subpage: &mut Subpage, value: &[u8], line_no: usize) -> Result<(), PageError> {
    let comma = value.iter().position(|&b| b == b',').unwrap_or(value.len());
    let row_text = ascii(&value[..comma]);
    let row: u8 = row_text
        .trim()
        .parse()
        .map_err(|_| invalid(line_no, "row", row_text.trim()))?;
    let text = unescape(value.get(comma + 1..).unwrap_or(&[]));

    if row <= LAST_TEXT_ROW {
        subpage.set_row(row, &text);
    } else if row <= LAST_ENHANCEMENT_ROW {
        subpage.enhancements.push(enhancement_line(row, &text));
    } else {
        debug!("Line {}: ignoring output line {}", line_no, row);
    }
    Ok(())
}

/// Resolve escapes and strip the high bit; the result is cut to one row.
fn unescape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PAYLOAD_SIZE);
    let mut bytes = text.iter();
    while let Some(&b) = bytes.next() {
        if out.len() == PAYLOAD_SIZE {
            break;
        }
        let b = if b == ESCAPE {
            match bytes.next() {
                Some(&next) => next.wrapping_sub(0x40),
                None => break,
            }
        } else {
            b
        };
        out.push(b & 0x7F);
    }
    out
}

/// Decode a six-bits-per-character enhancement row.
fn enhancement_line(row: u8, text: &[u8]) -> EnhancementLine {
    let mut chars = [0u8; PAYLOAD_SIZE];
    for (c, t) in chars.iter_mut().zip(text) {
        *c = t & 0x3F;
    }
    let mut triplets = [0u32; TRIPLETS];
    for (i, t) in triplets.iter_mut().enumerate() {
        let c = &chars[1 + i * 3..4 + i * 3];
        *t = c[0] as u32 | (c[1] as u32) << 6 | (c[2] as u32) << 12;
    }
    EnhancementLine {
        row,
        designation: chars[0] & 0x0F,
        triplets,
    }
}

fn ascii(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

fn hex_u16(value: &[u8], line_no: usize, field: &'static str) -> Result<u16, PageError> {
    let text = ascii(value);
    let text = text.trim();
    u16::from_str_radix(text, 16).map_err(|_| invalid(line_no, field, text))
}

fn invalid(line: usize, field: &'static str, value: &str) -> PageError {
    PageError::InvalidField {
        line,
        field,
        value: value.to_string(),
    }
}

/// Outcome of one directory scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub loaded: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Keeps a [`PageList`] in step with a directory of TTI files.
///
/// Each [`PageDirectory::refresh`] loads new files, reloads files whose
/// modification time changed and removes pages whose file is gone.
#[derive(Debug)]
pub struct PageDirectory {
    dir: PathBuf,
    known: HashMap<PathBuf, SystemTime>,
}

impl PageDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            known: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn refresh(&mut self, list: &PageList) -> Result<RefreshSummary, PageError> {
        let io_error = |source| PageError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut summary = RefreshSummary::default();
        let mut seen = HashSet::new();

        for entry in std::fs::read_dir(&self.dir).map_err(io_error)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !is_page_file(&path) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            seen.insert(path.clone());
            if self.known.get(&path) == Some(&modified) {
                continue;
            }
            self.known.insert(path.clone(), modified);

            match load(&path) {
                Ok(page) => {
                    if let Some(old) = list.find_by_filename(&path) {
                        if old.number() != page.number() {
                            list.remove(old.number());
                        }
                    }
                    debug!("Loaded {} from {}", page.number(), path.display());
                    list.insert(page);
                    summary.loaded += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }

        let gone: Vec<PathBuf> = self.known.keys().filter(|p| !seen.contains(*p)).cloned().collect();
        for path in gone {
            self.known.remove(&path);
            if list.remove_file(&path).is_some() {
                summary.removed += 1;
            }
        }

        if summary != RefreshSummary::default() {
            info!(
                "Page directory {}: {} loaded, {} removed, {} failed",
                self.dir.display(),
                summary.loaded,
                summary.removed,
                summary.failed
            );
        }
        Ok(summary)
    }

    /// Rescan every `every` on the blocking pool until the task is aborted.
    pub fn spawn_reloader(self, pages: Arc<PageList>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut directory = self;
            loop {
                interval.tick().await;
                let pages = pages.clone();
                let scan = tokio::task::spawn_blocking(move || {
                    if let Err(e) = directory.refresh(&pages) {
                        warn!("Page reload failed: {}", e);
                    }
                    directory
                });
                directory = match scan.await {
                    Ok(directory) => directory,
                    Err(e) => {
                        error!("Page reload task failed: {}", e);
                        return;
                    }
                };
            }
        })
    }
}

fn is_page_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tti") || e.eq_ignore_ascii_case("ttix"))
        .unwrap_or(false)
}
