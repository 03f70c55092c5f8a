#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use rollcall::identity::IdentityUpdate;
use rollcall::session::Clock;
use rollcall::sink::{AttendanceSink, SinkUnavailable};
use rollcall::storage::IdentityStore;
use rollcall_devices::{
    CaptureStage, Control, FaceSource, FeatureVector, Feedback, FingerprintScan,
    FingerprintSensor, SampleStatus, SensorSlot, TemplateStatus,
};

/// Scripted camera, sensor, button and display.
pub struct FakeKiosk {
    pub frames: VecDeque<Vec<FeatureVector>>,
    pub scans: VecDeque<FingerprintScan>,
    pub samples: VecDeque<SampleStatus>,
    pub template: TemplateStatus,
    pub next_slot: SensorSlot,
    pub stored: Vec<Option<SensorSlot>>,
    pub stop_after: usize,
    pub polls: usize,
    pub starts: usize,
    pub face_captures: usize,
    pub finger_captures: usize,
    pub shown: Vec<(String, String)>,
}

impl FakeKiosk {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            scans: VecDeque::new(),
            samples: VecDeque::new(),
            template: TemplateStatus::Created,
            next_slot: 1,
            stored: Vec::new(),
            stop_after: usize::MAX,
            polls: 0,
            starts: 0,
            face_captures: 0,
            finger_captures: 0,
            shown: Vec::new(),
        }
    }

    pub fn with_faces(mut self, frames: Vec<Vec<f32>>) -> Self {
        self.frames = frames
            .into_iter()
            .map(|values| vec![FeatureVector::new(values)])
            .collect();
        self
    }

    pub fn last_shown(&self) -> &(String, String) {
        self.shown.last().expect("nothing shown")
    }
}

impl FaceSource for FakeKiosk {
    fn detect_faces(&mut self) -> Result<Vec<FeatureVector>> {
        self.face_captures += 1;
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

impl FingerprintSensor for FakeKiosk {
    fn capture_and_search(&mut self) -> Result<FingerprintScan> {
        self.finger_captures += 1;
        Ok(self.scans.pop_front().unwrap_or(FingerprintScan::CaptureFailed))
    }

    fn capture_sample(&mut self, _stage: CaptureStage) -> Result<SampleStatus> {
        Ok(self.samples.pop_front().unwrap_or(SampleStatus::CaptureFailed))
    }

    fn create_template(&mut self) -> Result<TemplateStatus> {
        Ok(self.template)
    }

    fn store_template(&mut self, preferred: Option<SensorSlot>) -> Result<SensorSlot> {
        self.stored.push(preferred);
        Ok(preferred.unwrap_or(self.next_slot))
    }
}

impl Control for FakeKiosk {
    fn wait_for_start(&mut self) -> Result<()> {
        self.starts += 1;
        Ok(())
    }

    fn stop_requested(&mut self) -> Result<bool> {
        self.polls += 1;
        Ok(self.polls > self.stop_after)
    }
}

impl Feedback for FakeKiosk {
    fn show(&mut self, line1: &str, line2: &str) {
        self.shown.push((line1.to_string(), line2.to_string()));
    }
}

/// Records rows; can be switched offline.
pub struct RecordingSink {
    pub rows: Vec<(String, String)>,
    pub available: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            available: true,
        }
    }
}

impl AttendanceSink for RecordingSink {
    fn append(&mut self, display_name: &str, timestamp: &str) -> Result<(), SinkUnavailable> {
        if !self.available {
            return Err(SinkUnavailable::new("offline"));
        }
        self.rows
            .push((display_name.to_string(), timestamp.to_string()));
        Ok(())
    }
}

pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    pub fn morning() -> Self {
        FixedClock(Local.with_ymd_and_hms(2024, 9, 2, 8, 30, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

pub fn face_store(dir: &Path, faces: &[(&str, &str, Vec<f32>)]) -> IdentityStore {
    let mut store = IdentityStore::load(&dir.join("identities.bin")).unwrap();
    for (id, name, face) in faces {
        store.upsert(id, IdentityUpdate::name(name)).unwrap();
        store
            .upsert(id, IdentityUpdate::face(FeatureVector::new(face.clone())))
            .unwrap();
    }
    store
}
