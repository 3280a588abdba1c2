//! Settings structures
//!
//! Every structure deserialises with defaults for missing fields, so a
//! config file only needs to name what differs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Router-wide behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Warn when a non-broadcast message leaves a worker with no receivers
    pub warn_no_receivers: bool,
    /// Allow a worker to be its own consumer
    pub allow_self_connect: bool,
    /// Accept producer/consumer names not declared in the same config
    pub allow_external_refs: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            warn_no_receivers: true,
            allow_self_connect: false,
            allow_external_refs: false,
        }
    }
}

/// Per-worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub name: String,
    pub producers: Vec<String>,
    pub consumers: Vec<String>,
    /// Log every message entering or leaving the worker
    pub print_msgs: bool,
    /// Level of the worker's own log span
    pub log_level: String,
    /// Stop the worker on protocol violations instead of logging them
    pub strict: bool,
    /// Capacity of the control lane of the worker's mailbox
    pub mailbox_capacity: usize,
    pub journal: Option<JournalSettings>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            print_msgs: false,
            log_level: "debug".to_string(),
            strict: false,
            mailbox_capacity: 1024,
            journal: None,
        }
    }
}

impl WorkerSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_consumers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_producers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.producers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn print_msgs(mut self, on: bool) -> Self {
        self.print_msgs = on;
        self
    }

    pub fn strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }

    pub fn with_journal(mut self, journal: JournalSettings) -> Self {
        self.journal = Some(journal);
        self
    }
}

/// Which message categories a journal records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalFilter {
    #[default]
    All,
    /// Messages carrying neither a command nor a reply
    Normal,
    Command,
    Reply,
}

/// Message journal written by the logging interceptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    pub path: PathBuf,
    pub filter: JournalFilter,
    /// Size limit in bytes, 0 for unlimited
    pub max_size: u64,
    /// Rotate to `<path>.1` when the limit is hit instead of stopping
    pub rotate: bool,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logs/journal.jsonl"),
            filter: JournalFilter::All,
            max_size: 0,
            rotate: false,
        }
    }
}

/// Priority channel settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub name: String,
    /// Minimum delay between two consecutive triggers
    pub frame_gap_ms: u64,
}

impl ChannelSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn frame_gap(&self) -> Duration {
        Duration::from_millis(self.frame_gap_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives
    pub directives: Vec<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directives: Vec::new(),
        }
    }
}
