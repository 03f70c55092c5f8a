use anyhow::Result;
use rollcall_devices::{
    CaptureStage, FingerprintScan, FingerprintSensor, SampleStatus, SensorSlot, TemplateStatus,
};

use crate::matcher::MatchOutcome;
use crate::storage::IdentityStore;

/// Attempts per capture stage during enrollment before giving up.
pub const STAGE_ATTEMPTS: usize = 2;

/// Maps a sensor search result back onto the identity store.
pub fn match_scan(store: &IdentityStore, scan: FingerprintScan) -> MatchOutcome {
    match scan {
        FingerprintScan::CaptureFailed => MatchOutcome::CaptureFailed,
        FingerprintScan::NoMatch => MatchOutcome::Rejected,
        FingerprintScan::Matched(slot) => match store.find_by_slot(slot) {
            Some(identity) => MatchOutcome::Accepted(identity.identity_id.clone()),
            None => MatchOutcome::InconsistentState { slot },
        },
    }
}

pub fn capture_and_match<S: FingerprintSensor + ?Sized>(
    sensor: &mut S,
    store: &IdentityStore,
) -> Result<MatchOutcome> {
    let scan = sensor.capture_and_search()?;
    log::debug!("fingerprint scan: {:?}", scan);
    Ok(match_scan(store, scan))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintEnrollment {
    /// The sensor created and stored a template in this slot.
    Enrolled(SensorSlot),
    CaptureFailed(CaptureStage),
    Mismatch,
}

/// Two captures of the same finger, combined and stored on the sensor. Nothing
/// is stored unless both captures agree.
pub fn enroll_fingerprint<S, F>(
    sensor: &mut S,
    preferred: Option<SensorSlot>,
    mut prompt: F,
) -> Result<FingerprintEnrollment>
where
    S: FingerprintSensor + ?Sized,
    F: FnMut(&str),
{
    for stage in [CaptureStage::First, CaptureStage::Second] {
        match stage {
            CaptureStage::First => prompt("Place finger on the sensor"),
            CaptureStage::Second => prompt("Place the same finger again"),
        }
        if !capture_stage(sensor, stage, &mut prompt)? {
            return Ok(FingerprintEnrollment::CaptureFailed(stage));
        }
    }

    if sensor.create_template()? == TemplateStatus::Mismatch {
        return Ok(FingerprintEnrollment::Mismatch);
    }

    let slot = sensor.store_template(preferred)?;
    Ok(FingerprintEnrollment::Enrolled(slot))
}

fn capture_stage<S, F>(sensor: &mut S, stage: CaptureStage, prompt: &mut F) -> Result<bool>
where
    S: FingerprintSensor + ?Sized,
    F: FnMut(&str),
{
    for attempt in 1..=STAGE_ATTEMPTS {
        match sensor.capture_sample(stage)? {
            SampleStatus::Captured => return Ok(true),
            SampleStatus::CaptureFailed => {
                log::warn!(
                    "fingerprint capture {} failed (attempt {}/{})",
                    stage.number(),
                    attempt,
                    STAGE_ATTEMPTS
                );
                if attempt < STAGE_ATTEMPTS {
                    prompt("Capture failed, try again");
                }
            }
        }
    }
    Ok(false)
}
