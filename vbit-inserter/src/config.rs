//! Service configuration.
//!
//! Settings come from a TOML file with one table per concern:
//!
//! ```toml
//! [service]
//! page_dir = "pages"
//! output = "pes"
//! magazine_priority = [9, 3, 3, 6, 3, 3, 5, 6]
//!
//! [header]
//! caption = "VBIT %%# %%a %d %%b     %H:%M/%S"
//!
//! [control]
//! initial_page = "100"
//! network_id = 0x2C2F
//!
//! [[control.pdc_labels]]
//! lci = 0
//! pil = 0x12345
//! ```
//!
//! Every key has a default, so an empty file is valid. The running service
//! shares one [`SharedConfig`]; the scheduler thread only ever uses
//! `try_read` on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::Deserialize;
use thiserror::Error;
use vbit_packet::framing::OutputFormat;
use vbit_packet::packet::CAPTION_SIZE;
use vbit_packet::{PageNumber, PdcLabel, MAX_SUBCODE, STATUS_SIZE};

/// Number of PDC labels 8/30 format 2 can rotate through.
pub const MAX_PDC_LABELS: usize = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceSection,
    pub header: HeaderSection,
    pub control: ControlSection,
    pub datacast: DatacastSection,
    pub subtitle: SubtitleSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Directory scanned for TTI page files.
    pub page_dir: PathBuf,
    pub output: OutputFormat,
    /// Bit-reverse T42 output bytes.
    pub reverse_bits: bool,
    /// Packets per field.
    pub lines_per_field: usize,
    pub fields_per_second: u32,
    /// Leave out blank rows of text pages.
    pub row_adaptive: bool,
    /// Per-magazine priority 1..=9 for magazines 1..8; lower is sent more often.
    pub magazine_priority: [u8; 8],
    /// Diagnostic packet level; 0 disables them.
    pub debug_level: u8,
    /// Seconds between page directory scans.
    pub reload_interval_secs: u64,
    /// Network address shown by the header address token. Looked up from the
    /// host name when unset.
    pub address: Option<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            page_dir: PathBuf::from("pages"),
            output: OutputFormat::Raw,
            reverse_bits: false,
            lines_per_field: 16,
            fields_per_second: 50,
            row_adaptive: false,
            magazine_priority: [9, 3, 3, 6, 3, 3, 5, 6],
            debug_level: 0,
            reload_interval_secs: 1,
            address: None,
        }
    }
}

impl ServiceSection {
    /// Priority of internal magazine 0..=7 (0 is magazine 8).
    pub fn priority_of(&self, magazine: u8) -> u8 {
        let index = match magazine & 0x07 {
            0 => 7,
            m => m as usize - 1,
        };
        self.magazine_priority[index]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeaderSection {
    /// Caption template for columns 8..39 of every header.
    pub caption: String,
}

impl Default for HeaderSection {
    fn default() -> Self {
        Self {
            caption: "VBIT %%# %%a %d %%b     %H:%M/%S".to_string(),
        }
    }
}

impl HeaderSection {
    /// Caption as 32 columns, padded with spaces.
    pub fn caption_bytes(&self) -> [u8; CAPTION_SIZE] {
        fixed_width(&self.caption)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub initial_page: PageNumber,
    pub initial_subcode: u16,
    /// Network identification code for 8/30 format 1.
    pub network_id: u16,
    /// CNI used by PDC labels that do not set their own.
    pub cni: u16,
    pub multiplexed: bool,
    pub reserved: [u8; 4],
    /// Status display text, up to 20 characters.
    pub status: String,
    /// Local time offset in half hours; taken from the host when unset.
    pub time_offset_half_hours: Option<i8>,
    pub pdc_labels: Vec<PdcLabel>,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            initial_page: PageNumber::new(1, 0x00),
            initial_subcode: MAX_SUBCODE,
            network_id: 0,
            cni: 0,
            multiplexed: false,
            reserved: [0x15; 4],
            status: "VBIT-RS".to_string(),
            time_offset_half_hours: None,
            pdc_labels: Vec::new(),
        }
    }
}

impl ControlSection {
    pub fn status_bytes(&self) -> [u8; STATUS_SIZE] {
        fixed_width(&self.status)
    }

    /// Label `index` with the default CNI filled in.
    pub fn pdc_label(&self, index: usize) -> Option<PdcLabel> {
        self.pdc_labels.get(index).map(|label| {
            let mut label = *label;
            if label.cni == 0 {
                label.cni = self.cni;
            }
            label
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatacastSection {
    /// Datacast packets allowed per field.
    pub lines_per_field: usize,
    /// Packets buffered per datachannel.
    pub buffer_size: usize,
}

impl Default for DatacastSection {
    fn default() -> Self {
        Self {
            lines_per_field: 1,
            buffer_size: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubtitleSection {
    /// Times each subtitle page is sent.
    pub repeats: u8,
}

impl Default for SubtitleSection {
    fn default() -> Self {
        Self { repeats: 1 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub log_dir: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let service = &self.service;
        if service.lines_per_field == 0 {
            return Err(ConfigError::Invalid("service.lines_per_field must be at least 1".into()));
        }
        if service.fields_per_second == 0 {
            return Err(ConfigError::Invalid("service.fields_per_second must be at least 1".into()));
        }
        if let Some(p) = service.magazine_priority.iter().find(|p| !(1..=9).contains(*p)) {
            return Err(ConfigError::Invalid(format!("magazine priority {} is not in 1..=9", p)));
        }
        if self.control.pdc_labels.len() > MAX_PDC_LABELS {
            return Err(ConfigError::Invalid(format!(
                "at most {} PDC labels, got {}",
                MAX_PDC_LABELS,
                self.control.pdc_labels.len()
            )));
        }
        if self.control.status.len() > STATUS_SIZE {
            return Err(ConfigError::Invalid(format!("control.status is longer than {} characters", STATUS_SIZE)));
        }
        if self.header.caption.len() > CAPTION_SIZE {
            return Err(ConfigError::Invalid(format!("header.caption is longer than {} characters", CAPTION_SIZE)));
        }
        Ok(())
    }
}

/// Thread-safe handle to the running configuration.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.inner.read()
    }

    /// Read access without waiting; `None` while a writer holds the lock.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Config>> {
        self.inner.try_read()
    }

    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    /// Apply a change. The change is validated first and dropped when invalid.
    pub fn update<F>(&self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        let mut next = self.snapshot();
        change(&mut next);
        next.validate()?;
        *self.inner.write() = next;
        Ok(())
    }

    pub fn header_caption(&self) -> String {
        self.inner.read().header.caption.clone()
    }

    pub fn set_header_caption(&self, caption: &str) -> Result<(), ConfigError> {
        self.update(|c| c.header.caption = caption.to_string())
    }

    pub fn set_row_adaptive(&self, enabled: bool) -> Result<(), ConfigError> {
        self.update(|c| c.service.row_adaptive = enabled)
    }

    /// Set the priority of magazine 1..=8.
    pub fn set_magazine_priority(&self, magazine: u8, priority: u8) -> Result<(), ConfigError> {
        let index = (magazine as usize).wrapping_sub(1);
        if index >= 8 {
            return Err(ConfigError::Invalid(format!("magazine {} is not in 1..=8", magazine)));
        }
        self.update(|c| c.service.magazine_priority[index] = priority)
    }
}

/// Left-align ASCII text in a fixed-width field padded with spaces.
fn fixed_width<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (o, b) in out.iter_mut().zip(text.bytes()) {
        *o = b;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.service.lines_per_field, 16);
        assert_eq!(config.service.fields_per_second, 50);
        assert_eq!(config.service.output, OutputFormat::Raw);
        assert_eq!(config.control.initial_page, PageNumber::new(1, 0x00));
        assert_eq!(config.subtitle.repeats, 1);
        assert_eq!(config.header.caption.len(), CAPTION_SIZE);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_toml(
            r#"
            [service]
            output = "pes"
            row_adaptive = true
            magazine_priority = [1, 2, 3, 4, 5, 6, 7, 8]

            [control]
            initial_page = "1A0"
            network_id = 0x2C2F
            cni = 0x1234
            status = "Test service"

            [[control.pdc_labels]]
            lci = 1
            pil = 0x12345

            [[control.pdc_labels]]
            cni = 0x5678

            [datacast]
            lines_per_field = 4

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.output, OutputFormat::Pes);
        assert!(config.service.row_adaptive);
        assert_eq!(config.service.magazine_priority[7], 8);
        assert_eq!(config.control.initial_page, PageNumber::new(1, 0xA0));
        assert_eq!(config.control.network_id, 0x2C2F);
        assert_eq!(&config.control.status_bytes()[..12], b"Test service");
        assert_eq!(config.control.pdc_label(0).unwrap().cni, 0x1234);
        assert_eq!(config.control.pdc_label(0).unwrap().pil, 0x12345);
        assert_eq!(config.control.pdc_label(1).unwrap().cni, 0x5678);
        assert!(config.control.pdc_label(2).is_none());
        assert_eq!(config.datacast.lines_per_field, 4);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_toml("[service]\nmagazine_priority = [0, 1, 1, 1, 1, 1, 1, 1]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[service]\nlines_per_field = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[control]\ninitial_page = \"900\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(Config::from_toml("[service"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_shared_config_update() {
        let shared = SharedConfig::new(Config::default());
        shared.set_header_caption("NEW %%#").unwrap();
        assert_eq!(shared.header_caption(), "NEW %%#");
        assert_eq!(&shared.read().header.caption_bytes()[..8], b"NEW %%# ");

        shared.set_magazine_priority(8, 2).unwrap();
        assert_eq!(shared.read().service.magazine_priority[7], 2);
        assert_eq!(shared.read().service.priority_of(0), 2);
        assert_eq!(shared.read().service.priority_of(1), 9);
        assert!(shared.set_magazine_priority(9, 2).is_err());
        assert!(shared.set_magazine_priority(1, 10).is_err());
        assert_eq!(shared.read().service.magazine_priority[0], 9);

        let guard = shared.try_read();
        assert!(guard.is_some());
    }
}
