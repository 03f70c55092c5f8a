use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Local, SecondsFormat};
use thiserror::Error;

use crate::config::SinkConfig;

/// One accepted recognition, as written to the attendance log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub display_name: String,
    pub timestamp: String,
}

impl AttendanceEvent {
    pub fn new(display_name: &str, at: DateTime<Local>) -> Self {
        Self {
            display_name: display_name.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

#[derive(Debug, Error)]
#[error("attendance log unavailable: {message}")]
pub struct SinkUnavailable {
    pub message: String,
}

impl SinkUnavailable {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Where attendance rows end up.
pub trait AttendanceSink {
    fn append(&mut self, display_name: &str, timestamp: &str) -> Result<(), SinkUnavailable>;
}

impl<T: AttendanceSink + ?Sized> AttendanceSink for Box<T> {
    fn append(&mut self, display_name: &str, timestamp: &str) -> Result<(), SinkUnavailable> {
        (**self).append(display_name, timestamp)
    }
}

pub fn sink_from_config(cfg: &SinkConfig) -> Box<dyn AttendanceSink> {
    match cfg {
        SinkConfig::Csv { path } => Box::new(CsvFileSink::new(path.clone())),
        SinkConfig::Command { command, args } => {
            Box::new(CommandSink::new(command.clone(), args.clone()))
        }
    }
}

/// Appends `name,timestamp` rows to a local file.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AttendanceSink for CsvFileSink {
    fn append(&mut self, display_name: &str, timestamp: &str) -> Result<(), SinkUnavailable> {
        let unavailable =
            |e: std::io::Error| SinkUnavailable::new(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(unavailable)?;
        let row = format!("{},{}\n", csv_field(display_name), csv_field(timestamp));
        file.write_all(row.as_bytes()).map_err(unavailable)?;
        file.sync_data().map_err(unavailable)?;
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Hands each row to an external uploader, e.g. a spreadsheet client.
#[derive(Debug, Clone)]
pub struct CommandSink {
    command: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

impl AttendanceSink for CommandSink {
    fn append(&mut self, display_name: &str, timestamp: &str) -> Result<(), SinkUnavailable> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(display_name)
            .arg(timestamp)
            .output()
            .map_err(|e| SinkUnavailable::new(format!("spawn {}: {}", self.command, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkUnavailable::new(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
