//! Open options, flag parsing and the offset cache policy.
//!
//! `OpenOptions` is a plain builder. With the `config` feature enabled, defaults
//! can also be loaded from a TOML file (see [`FileArrayConfig`]).

use crate::error::{FileArrayError, Result};
use std::fs::File;
use std::str::FromStr;
use std::time::Duration;

/// Default scan chunk size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Default permission bits used when the open flags create the file
pub const DEFAULT_MODE: u32 = 0o666;

/// Default capacity of the line channels between scanners and streams
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// How the descriptor is opened, using the conventional `r`/`r+`/`w`/`w+`/`a`/`a+` modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenFlags {
    /// `r`: read only, file must exist
    #[default]
    Read,
    /// `r+`: read and write, file must exist
    ReadWrite,
    /// `w`: write only, create or truncate
    Write,
    /// `w+`: read and write, create or truncate
    WriteRead,
    /// `a`: append only, create if missing
    Append,
    /// `a+`: read and append, create if missing
    AppendRead,
}

impl OpenFlags {
    /// Conventional string form of the flags
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::ReadWrite => "r+",
            Self::Write => "w",
            Self::WriteRead => "w+",
            Self::Append => "a",
            Self::AppendRead => "a+",
        }
    }

    /// Whether opening with these flags may create the file
    pub fn creates(&self) -> bool {
        matches!(
            self,
            Self::Write | Self::WriteRead | Self::Append | Self::AppendRead
        )
    }

    /// Translate into `std::fs::OpenOptions`, applying `mode` on unix
    pub fn to_std(&self, mode: u32) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        match self {
            Self::Read => {
                options.read(true);
            }
            Self::ReadWrite => {
                options.read(true).write(true);
            }
            Self::Write => {
                options.write(true).create(true).truncate(true);
            }
            Self::WriteRead => {
                options.read(true).write(true).create(true).truncate(true);
            }
            Self::Append => {
                options.append(true).create(true);
            }
            Self::AppendRead => {
                options.read(true).append(true).create(true);
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        options
    }
}

impl FromStr for OpenFlags {
    type Err = FileArrayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::Read),
            "r+" => Ok(Self::ReadWrite),
            "w" => Ok(Self::Write),
            "w+" => Ok(Self::WriteRead),
            "a" => Ok(Self::Append),
            "a+" => Ok(Self::AppendRead),
            other => Err(FileArrayError::config(format!(
                "unsupported open flags '{other}'"
            ))),
        }
    }
}

/// Retention policy for the offset index
///
/// The default records every observed terminator and never evicts. Setting
/// `max_entries` bounds the index: when it would be exceeded the sampling
/// interval doubles and entries off the new interval are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct CachePolicy {
    /// Only ordinals whose magnitude is a multiple of this are recorded
    pub sample_interval: u64,
    /// Upper bound on stored entries; `None` means unbounded
    pub max_entries: Option<usize>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            sample_interval: 1,
            max_entries: None,
        }
    }
}

impl CachePolicy {
    /// Unbounded policy recording every line start
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bounded policy starting at interval 1
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            sample_interval: 1,
            max_entries: Some(max_entries.max(2)),
        }
    }
}

/// Options recognized by [`FileArray::open`](crate::FileArray::open)
#[derive(Debug)]
pub struct OpenOptions {
    /// Open mode, read-only by default
    pub flags: OpenFlags,
    /// Permission bits used when the file is created
    pub mode: u32,
    /// Scan chunk size in bytes
    pub buffer_size: usize,
    /// Pre-opened descriptor; when present the path is not opened again
    pub fd: Option<File>,
    /// Offset index retention
    pub cache_policy: CachePolicy,
    /// Re-stat interval used by follow streams in addition to change notification
    pub poll_interval: Option<Duration>,
    /// Capacity of the bounded line channels
    pub channel_capacity: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::Read,
            mode: DEFAULT_MODE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            fd: None,
            cache_policy: CachePolicy::default(),
            poll_interval: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Scan chunk size; zero is bumped to one byte
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn fd(mut self, file: File) -> Self {
        self.fd = Some(file);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// On-disk configuration, loaded with the `config` feature
///
/// ```toml
/// flags = "r"
/// buffer_size = 65536
/// poll_interval_ms = 250
///
/// [cache]
/// max_entries = 100000
/// ```
#[cfg(feature = "config")]
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct FileArrayConfig {
    pub flags: Option<String>,
    pub mode: Option<u32>,
    pub buffer_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub cache: Option<CachePolicy>,
}

#[cfg(feature = "config")]
impl FileArrayConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FileArrayError::config(e.to_string()))
    }

    /// Load `<config dir>/file-array/config.toml`, or defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        let Some(path) = dirs::config_dir().map(|dir| dir.join("file-array").join("config.toml"))
        else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| FileArrayError::file_error(format!("Failed to read {}", path.display()), e))?;
        Self::from_toml_str(&text)
    }

    /// Build `OpenOptions` from this configuration
    pub fn into_options(self) -> Result<OpenOptions> {
        let mut options = OpenOptions::new();
        if let Some(flags) = self.flags {
            options = options.flags(flags.parse()?);
        }
        if let Some(mode) = self.mode {
            options = options.mode(mode);
        }
        if let Some(size) = self.buffer_size {
            options = options.buffer_size(size);
        }
        if let Some(ms) = self.poll_interval_ms {
            options = options.poll_interval(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.channel_capacity {
            options = options.channel_capacity(capacity);
        }
        if let Some(policy) = self.cache {
            options = options.cache_policy(policy);
        }
        Ok(options)
    }
}
