use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::control::{Control, Feedback};
use crate::face::{FaceSource, FeatureVector};
use crate::fingerprint::{
    CaptureStage, FingerprintScan, FingerprintSensor, SampleStatus, SensorSlot, TemplateStatus,
};

/// Talks to the hardware driver process (camera, fingerprint sensor, button
/// and display) over line-delimited JSON on its stdin/stdout.
pub struct DriverBridge {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl DriverBridge {
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn driver {}", command))?;
        let stdin = child.stdin.take().context("driver stdin")?;
        let stdout = child.stdout.take().context("driver stdout")?;
        log::debug!("driver {} started with pid {}", command, child.id());
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn call(&mut self, request: &Request) -> Result<Reply> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .and_then(|_| self.stdin.flush())
            .context("write driver request")?;

        let mut buf = String::new();
        let read = self
            .stdout
            .read_line(&mut buf)
            .context("read driver reply")?;
        if read == 0 {
            bail!("driver closed its output");
        }
        log::trace!("driver {:?} -> {}", request, buf.trim_end());
        parse_reply(&buf)
    }
}

impl Drop for DriverBridge {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FaceSource for DriverBridge {
    fn detect_faces(&mut self) -> Result<Vec<FeatureVector>> {
        match self.call(&Request::CaptureFace)? {
            Reply::Faces { vectors } => Ok(vectors.into_iter().map(FeatureVector::new).collect()),
            other => Err(unexpected("capture_face", other)),
        }
    }
}

impl FingerprintSensor for DriverBridge {
    fn capture_and_search(&mut self) -> Result<FingerprintScan> {
        match self.call(&Request::SearchFinger)? {
            Reply::Match { slot } => Ok(FingerprintScan::Matched(slot)),
            Reply::NoMatch => Ok(FingerprintScan::NoMatch),
            Reply::CaptureFailed => Ok(FingerprintScan::CaptureFailed),
            other => Err(unexpected("search_finger", other)),
        }
    }

    fn capture_sample(&mut self, stage: CaptureStage) -> Result<SampleStatus> {
        let request = Request::CaptureFinger {
            stage: stage.number(),
        };
        match self.call(&request)? {
            Reply::Captured => Ok(SampleStatus::Captured),
            Reply::CaptureFailed => Ok(SampleStatus::CaptureFailed),
            other => Err(unexpected("capture_finger", other)),
        }
    }

    fn create_template(&mut self) -> Result<TemplateStatus> {
        match self.call(&Request::CreateTemplate)? {
            Reply::Created => Ok(TemplateStatus::Created),
            Reply::Mismatch => Ok(TemplateStatus::Mismatch),
            other => Err(unexpected("create_template", other)),
        }
    }

    fn store_template(&mut self, preferred: Option<SensorSlot>) -> Result<SensorSlot> {
        match self.call(&Request::StoreTemplate { slot: preferred })? {
            Reply::Stored { slot } => Ok(slot),
            other => Err(unexpected("store_template", other)),
        }
    }
}

impl Control for DriverBridge {
    fn wait_for_start(&mut self) -> Result<()> {
        match self.call(&Request::WaitStart)? {
            Reply::Ok => Ok(()),
            other => Err(unexpected("wait_start", other)),
        }
    }

    fn stop_requested(&mut self) -> Result<bool> {
        match self.call(&Request::StopRequested)? {
            Reply::Stop { requested } => Ok(requested),
            other => Err(unexpected("stop_requested", other)),
        }
    }
}

impl Feedback for DriverBridge {
    fn show(&mut self, line1: &str, line2: &str) {
        log::info!("[display] {} | {}", line1, line2);
        let request = Request::Show {
            line1: line1.to_string(),
            line2: line2.to_string(),
        };
        if let Err(e) = self.call(&request) {
            log::warn!("display update failed: {:#}", e);
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    CaptureFace,
    SearchFinger,
    CaptureFinger {
        stage: u8,
    },
    CreateTemplate,
    StoreTemplate {
        #[serde(skip_serializing_if = "Option::is_none")]
        slot: Option<SensorSlot>,
    },
    WaitStart,
    StopRequested,
    Show {
        line1: String,
        line2: String,
    },
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply {
    Ok,
    Faces { vectors: Vec<Vec<f32>> },
    Match { slot: SensorSlot },
    NoMatch,
    CaptureFailed,
    Captured,
    Created,
    Mismatch,
    Stored { slot: SensorSlot },
    Stop { requested: bool },
    Error { message: String },
}

fn parse_reply(line: &str) -> Result<Reply> {
    let reply: Reply = serde_json::from_str(line.trim())
        .with_context(|| format!("malformed driver reply: {}", line.trim()))?;
    match reply {
        Reply::Error { message } => Err(anyhow!("driver error: {}", message)),
        reply => Ok(reply),
    }
}

fn unexpected(op: &str, reply: Reply) -> anyhow::Error {
    anyhow!("unexpected driver reply to {}: {:?}", op, reply)
}
