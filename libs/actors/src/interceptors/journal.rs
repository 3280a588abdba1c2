//! Message journal
//!
//! Appends one JSON line per outgoing message to a file. Journal I/O never
//! fails the pipeline: errors are logged and the message moves on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use router_config::{JournalFilter, JournalSettings};
use serde_json::json;
use tracing::{debug, warn};
use types::Message;

use crate::interceptor::{Interceptor, Outlet};

pub struct LoggingInterceptor {
    settings: JournalSettings,
    worker: String,
    file: Option<File>,
    written: u64,
    full: bool,
}

impl LoggingInterceptor {
    pub fn new(settings: JournalSettings) -> Self {
        Self {
            settings,
            worker: String::new(),
            file: None,
            written: 0,
            full: false,
        }
    }

    fn accepts(&self, msg: &Message) -> bool {
        match self.settings.filter {
            JournalFilter::All => true,
            JournalFilter::Normal => !msg.is_command() && !msg.is_reply(),
            JournalFilter::Command => msg.is_command() && !msg.is_reply(),
            JournalFilter::Reply => msg.is_reply(),
        }
    }

    fn record(&self, msg: &Message) -> String {
        let receivers: Vec<String> = msg.receivers().iter().map(ToString::to_string).collect();
        let entry = json!({
            "meta": {
                "id": msg.id().get(),
                "worker": self.worker,
                "sender": msg.sender().map(|id| id.to_string()),
                "receivers": receivers,
                "flags": msg.flags_string(),
                "command": msg.command().map(|c| c.type_name()),
                "reply": msg.reply().map(|r| r.type_name()),
                "request_id": msg.request_id().map(|id| id.get()),
            },
            "payload": msg.payload(),
        });
        let mut line = entry.to_string();
        line.push('\n');
        line
    }

    fn open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(dir) = self.settings.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.settings.path)?;
            self.written = file.metadata()?.len();
            debug!(worker = %self.worker, path = %self.settings.path.display(), "Journal opened");
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::other("journal not open")),
        }
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self.settings.path.clone().into_os_string();
        name.push(".1");
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        fs::rename(&self.settings.path, self.rotated_path())?;
        self.written = 0;
        Ok(())
    }

    fn write(&mut self, line: &str) -> io::Result<()> {
        self.open()?;
        let len = line.len() as u64;
        let limit = self.settings.max_size;
        if limit > 0 && self.written + len > limit {
            if !self.settings.rotate {
                if !self.full {
                    warn!(worker = %self.worker, path = %self.settings.path.display(), limit, "Journal full");
                    self.full = true;
                }
                return Ok(());
            }
            self.rotate()?;
        }
        self.open()?.write_all(line.as_bytes())?;
        self.written += len;
        Ok(())
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "journal"
    }

    fn attach(&mut self, worker: &str) {
        self.worker = worker.to_string();
    }

    fn on_msg_from_worker(&mut self, msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        if self.accepts(&msg) {
            let line = self.record(&msg);
            if let Err(e) = self.write(&line) {
                warn!(worker = %self.worker, path = %self.settings.path.display(), error = %e, "Journal write failed");
            }
        }
        out.push(msg);
        Ok(())
    }
}
