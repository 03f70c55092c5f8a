use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Local};
use rollcall_devices::{Control, FaceSource, Feedback, FingerprintSensor};
use thiserror::Error;

use crate::config::Modality;
use crate::fingerprint;
use crate::matcher::{FaceMatcher, MatchOutcome};
use crate::sink::{AttendanceEvent, AttendanceSink, SinkUnavailable};
use crate::storage::IdentityStore;

/// Everything the session drives at the kiosk.
pub trait Kiosk: FaceSource + FingerprintSensor + Control + Feedback {}

impl<T: FaceSource + FingerprintSensor + Control + Feedback> Kiosk for T {}

pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingTitle,
    AwaitingStart,
    Scanning,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("class title must not be empty")]
    EmptyTitle,

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("at least one scanning modality is required")]
    NoModalities,

    #[error(transparent)]
    Device(#[from] anyhow::Error),
}

/// What one scanning cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Stopped,
    /// First accepted recognition of this identity in the session; an event was queued.
    Credited(String),
    /// Recognized again; no new event.
    AlreadyCredited(String),
    Scanned(MatchOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub class_title: Option<String>,
    pub credited: usize,
    pub delivered: usize,
    pub undelivered: Vec<AttendanceEvent>,
}

/// One attendance run: title, start, scan until stopped.
pub struct Session<'s, K, S, C = SystemClock> {
    store: &'s IdentityStore,
    kiosk: K,
    sink: S,
    clock: C,
    face: FaceMatcher,
    modalities: Vec<Modality>,
    state: SessionState,
    class_title: Option<String>,
    credited: HashSet<String>,
    pending: VecDeque<AttendanceEvent>,
    delivered: usize,
    cycle: usize,
    sink_degraded: bool,
}

impl<'s, K: Kiosk, S: AttendanceSink> Session<'s, K, S, SystemClock> {
    pub fn new(
        store: &'s IdentityStore,
        kiosk: K,
        sink: S,
        face: FaceMatcher,
        modalities: Vec<Modality>,
    ) -> Result<Self, SessionError> {
        Session::with_clock(store, kiosk, sink, face, modalities, SystemClock)
    }
}

impl<'s, K: Kiosk, S: AttendanceSink, C: Clock> Session<'s, K, S, C> {
    pub fn with_clock(
        store: &'s IdentityStore,
        kiosk: K,
        sink: S,
        face: FaceMatcher,
        modalities: Vec<Modality>,
        clock: C,
    ) -> Result<Self, SessionError> {
        if modalities.is_empty() {
            return Err(SessionError::NoModalities);
        }
        Ok(Self {
            store,
            kiosk,
            sink,
            clock,
            face,
            modalities,
            state: SessionState::AwaitingTitle,
            class_title: None,
            credited: HashSet::new(),
            pending: VecDeque::new(),
            delivered: 0,
            cycle: 0,
            sink_degraded: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn class_title(&self) -> Option<&str> {
        self.class_title.as_deref()
    }

    pub fn credited(&self) -> &HashSet<String> {
        &self.credited
    }

    pub fn pending(&self) -> impl Iterator<Item = &AttendanceEvent> {
        self.pending.iter()
    }

    pub fn kiosk(&self) -> &K {
        &self.kiosk
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Asks the operator for the class title on the display.
    pub fn prompt_title(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::AwaitingTitle, "prompt for the class title")?;
        self.kiosk.show("Enter Class Title", "");
        Ok(())
    }

    pub fn submit_title(&mut self, input: &str) -> Result<(), SessionError> {
        self.expect_state(SessionState::AwaitingTitle, "set the class title")?;
        let title = input.trim();
        if title.is_empty() {
            self.kiosk.show("Enter Class Title", "Title required");
            return Err(SessionError::EmptyTitle);
        }
        log::info!("class title: {}", title);
        self.class_title = Some(title.to_string());
        self.state = SessionState::AwaitingStart;
        self.kiosk
            .show(&format!("Class: {}", title), "Press button to start");
        Ok(())
    }

    /// Blocks on the start control, then enters scanning with an empty credited set.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::AwaitingStart, "start scanning")?;
        self.kiosk.wait_for_start()?;
        self.credited.clear();
        self.cycle = 0;
        self.state = SessionState::Scanning;
        log::info!("scanning started");
        self.kiosk.show("Scan Face or Finger", "Press button to quit");
        Ok(())
    }

    /// Stop check, then one acquisition and match.
    pub fn scan_cycle(&mut self) -> Result<CycleOutcome, SessionError> {
        self.expect_state(SessionState::Scanning, "scan")?;

        if self.kiosk.stop_requested()? {
            self.stop();
            return Ok(CycleOutcome::Stopped);
        }

        // On failure the events stay queued for the next cycle.
        if !self.pending.is_empty() && self.flush_pending().is_err() {
            log::debug!("{} event(s) still queued", self.pending.len());
        }

        let modality = self.modalities[self.cycle % self.modalities.len()];
        self.cycle += 1;

        let outcome = match modality {
            Modality::Face => {
                let probe = self.kiosk.capture_face_probe()?;
                self.face.match_probe(self.store, &probe)
            }
            Modality::Fingerprint => fingerprint::capture_and_match(&mut self.kiosk, self.store)?,
        };

        Ok(self.handle_outcome(modality, outcome))
    }

    /// Starts if needed and scans until the stop control fires.
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        if self.state == SessionState::AwaitingStart {
            self.start()?;
        }
        while self.scan_cycle()? != CycleOutcome::Stopped {}
        Ok(self.summary())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            class_title: self.class_title.clone(),
            credited: self.credited.len(),
            delivered: self.delivered,
            undelivered: self.pending.iter().cloned().collect(),
        }
    }

    fn handle_outcome(&mut self, modality: Modality, outcome: MatchOutcome) -> CycleOutcome {
        match outcome {
            MatchOutcome::Accepted(identity_id) => self.credit(identity_id),
            MatchOutcome::Rejected => {
                let line = match modality {
                    Modality::Face => "Face not recognized",
                    Modality::Fingerprint => "Fingerprint not recognized",
                };
                log::info!("{}", line);
                self.kiosk.show(line, "");
                CycleOutcome::Scanned(MatchOutcome::Rejected)
            }
            MatchOutcome::NoFaceDetected => CycleOutcome::Scanned(MatchOutcome::NoFaceDetected),
            MatchOutcome::CaptureFailed => {
                self.kiosk.show("Capture failed", "Place finger again");
                CycleOutcome::Scanned(MatchOutcome::CaptureFailed)
            }
            MatchOutcome::InconsistentState { slot } => {
                log::warn!(
                    "sensor matched slot {} but no identity owns it; re-enroll that finger",
                    slot
                );
                self.kiosk.show("User not found", "See operator");
                CycleOutcome::Scanned(MatchOutcome::InconsistentState { slot })
            }
        }
    }

    fn credit(&mut self, identity_id: String) -> CycleOutcome {
        let store = self.store;
        let Some(identity) = store.get(&identity_id) else {
            log::warn!("matcher accepted unknown identity {}", identity_id);
            return CycleOutcome::Scanned(MatchOutcome::Rejected);
        };
        let welcome = format!("Welcome {}", identity.display_name);

        if self.credited.contains(&identity_id) {
            log::debug!("{} already credited this session", identity_id);
            self.kiosk.show(&welcome, "Already recorded");
            return CycleOutcome::AlreadyCredited(identity_id);
        }

        log::info!("{} recognized", identity.display_name);
        self.credited.insert(identity_id.clone());
        self.pending
            .push_back(AttendanceEvent::new(&identity.display_name, self.clock.now()));

        match self.flush_pending() {
            Ok(_) => self.kiosk.show(&welcome, "Attendance recorded"),
            Err(_) => {
                let queued = format!("Log offline, {} queued", self.pending.len());
                self.kiosk.show(&welcome, &queued);
            }
        }
        CycleOutcome::Credited(identity_id)
    }

    /// Delivers queued events in order, stopping at the first failure.
    fn flush_pending(&mut self) -> Result<usize, SinkUnavailable> {
        let mut sent = 0;
        while let Some(event) = self.pending.front() {
            match self.sink.append(&event.display_name, &event.timestamp) {
                Ok(()) => {
                    self.pending.pop_front();
                    self.delivered += 1;
                    sent += 1;
                }
                Err(err) => {
                    if self.sink_degraded {
                        log::debug!("{}", err);
                    } else {
                        log::warn!("{}; {} event(s) queued", err, self.pending.len());
                    }
                    self.sink_degraded = true;
                    return Err(err);
                }
            }
        }
        if self.sink_degraded {
            log::info!("attendance log reachable again");
            self.sink_degraded = false;
        }
        Ok(sent)
    }

    fn stop(&mut self) {
        log::info!("stop requested");
        self.state = SessionState::Stopped;
        if !self.pending.is_empty() && self.flush_pending().is_err() {
            let line = format!("{} not logged", self.pending.len());
            self.kiosk.show("Attendance stopped", &line);
            return;
        }
        let line = format!("{} recorded", self.credited.len());
        self.kiosk.show("Attendance stopped", &line);
    }

    fn expect_state(
        &self,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }
}
