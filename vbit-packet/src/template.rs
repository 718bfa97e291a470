//! Header and row template substitution.
//!
//! Captions may carry tokens that are replaced just before a packet goes on
//! air. Every token is replaced by text of the same width so the layout of
//! the row never shifts.
//!
//! | Token | Replacement |
//! |---|---|
//! | `%%#` | page number `mpp` |
//! | `%%a` | abbreviated day name |
//! | `%%b` | abbreviated month name |
//! | `%d` / `%e` | day of month, zero / space padded |
//! | `%m` / `%y` | month / two-digit year |
//! | `%H` `%M` `%S` | time of day |
//! | `%%%V` | software version |
//! | `%%%%%%%%%%%%%%I` | host network address, 15 columns |

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use crate::types::PageNumber;

const ADDRESS_TOKEN: &[u8] = b"%%%%%%%%%%%%%%I";
const VERSION_TOKEN: &[u8] = b"%%%V";

/// Values substituted into templates.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// Local time shown in the caption.
    pub now: NaiveDateTime,
    /// Version text, truncated or padded to four columns.
    pub version: String,
    /// Network address text, truncated or padded to fifteen columns.
    pub address: String,
}

impl TemplateContext {
    pub fn new(now: NaiveDateTime, version: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            now,
            version: version.into(),
            address: address.into(),
        }
    }

    /// Context stamped with the current local time.
    pub fn now(version: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(Local::now().naive_local(), version, address)
    }

    /// Replace every token found in `text`.
    ///
    /// `page` fills `%%#`; without it the token is left alone.
    pub fn substitute(&self, text: &mut [u8], page: Option<PageNumber>) {
        replace_all(text, ADDRESS_TOKEN, &fit(&self.address, ADDRESS_TOKEN.len()));
        replace_all(text, VERSION_TOKEN, &fit(&self.version, VERSION_TOKEN.len()));
        if let Some(page) = page {
            replace_all(text, b"%%#", page.to_string().as_bytes());
        }

        let now = &self.now;
        replace_all(text, b"%%a", now.format("%a").to_string().as_bytes());
        replace_all(text, b"%%b", now.format("%b").to_string().as_bytes());
        replace_all(text, b"%d", format!("{:02}", now.day()).as_bytes());
        replace_all(text, b"%e", format!("{:>2}", now.day()).as_bytes());
        replace_all(text, b"%m", format!("{:02}", now.month()).as_bytes());
        replace_all(text, b"%y", format!("{:02}", now.year().rem_euclid(100)).as_bytes());
        replace_all(text, b"%H", format!("{:02}", now.hour()).as_bytes());
        replace_all(text, b"%M", format!("{:02}", now.minute()).as_bytes());
        replace_all(text, b"%S", format!("{:02}", now.second()).as_bytes());
    }
}

/// Left-align `value` in exactly `width` columns.
fn fit(value: &str, width: usize) -> Vec<u8> {
    let mut out: Vec<u8> = value.bytes().filter(|b| b.is_ascii()).take(width).collect();
    out.resize(width, b' ');
    out
}

/// Overwrite each occurrence of `token` with `replacement` (same length).
fn replace_all(text: &mut [u8], token: &[u8], replacement: &[u8]) {
    if token.len() != replacement.len() || token.len() > text.len() {
        return;
    }
    let mut i = 0;
    while i + token.len() <= text.len() {
        if &text[i..i + token.len()] == token {
            text[i..i + token.len()].copy_from_slice(replacement);
            i += token.len();
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn context() -> TemplateContext {
        let now = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        TemplateContext::new(now, "0.1", "192.168.1.20")
    }

    #[test]
    fn test_date_time_tokens() {
        let mut text = *b"%%a %d %%b %y %H:%M/%S [%e]";
        context().substitute(&mut text, None);
        assert_eq!(&text, b"Tue 05 Mar 24 07:08/09 [ 5]");
    }

    #[test]
    fn test_page_and_version_tokens() {
        let mut text = *b"P%%# v%%%V";
        context().substitute(&mut text, Some(PageNumber::new(1, 0x23)));
        assert_eq!(&text, b"P123 v0.1 ");
    }

    #[test]
    fn test_page_token_kept_without_page() {
        let mut text = *b"P%%#";
        context().substitute(&mut text, None);
        assert_eq!(&text, b"P%%#");
    }

    #[test]
    fn test_address_token() {
        let mut text = [b' '; 20];
        text[..ADDRESS_TOKEN.len()].copy_from_slice(ADDRESS_TOKEN);
        context().substitute(&mut text, None);
        assert_eq!(&text[..15], b"192.168.1.20   ");
    }
}
