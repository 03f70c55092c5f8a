use std::fmt;
use std::io::{BufRead, Write};

use anyhow::Result;
use rollcall_devices::{FaceSource, FingerprintSensor};

use crate::fingerprint::{enroll_fingerprint, FingerprintEnrollment};
use crate::identity::IdentityUpdate;
use crate::storage::{IdentityStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub identity_id: String,
    pub display_name: String,
    pub fingerprint: bool,
    pub face: bool,
}

impl EnrollmentRequest {
    pub fn new(identity_id: &str, display_name: &str) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            display_name: display_name.to_string(),
            fingerprint: true,
            face: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Enrolled,
    Skipped,
    Failed(String),
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepResult::Enrolled => write!(f, "enrolled"),
            StepResult::Skipped => write!(f, "skipped"),
            StepResult::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentReport {
    pub identity_id: String,
    pub fingerprint: StepResult,
    pub face: StepResult,
}

/// Name, then fingerprint, then face. A failed modality leaves that template
/// as it was; only store write failures abort the whole enrollment.
pub fn enroll_identity<D, F>(
    store: &mut IdentityStore,
    devices: &mut D,
    request: &EnrollmentRequest,
    mut prompt: F,
) -> Result<EnrollmentReport, StoreError>
where
    D: FaceSource + FingerprintSensor + ?Sized,
    F: FnMut(&str),
{
    let id = request.identity_id.as_str();
    let existing_slot = store.get(id).and_then(|identity| identity.fingerprint_slot);
    store.upsert(id, IdentityUpdate::name(&request.display_name))?;

    let fingerprint = if request.fingerprint {
        prompt("Starting fingerprint enrollment");
        match enroll_fingerprint(devices, existing_slot, &mut prompt) {
            Ok(FingerprintEnrollment::Enrolled(slot)) => {
                store.upsert(id, IdentityUpdate::fingerprint(slot))?;
                log::info!("fingerprint for {} stored in sensor slot {}", id, slot);
                StepResult::Enrolled
            }
            Ok(FingerprintEnrollment::CaptureFailed(stage)) => StepResult::Failed(format!(
                "capture {} failed twice",
                stage.number()
            )),
            Ok(FingerprintEnrollment::Mismatch) => {
                StepResult::Failed("the two captures did not match".to_string())
            }
            Err(e) => StepResult::Failed(format!("{:#}", e)),
        }
    } else {
        StepResult::Skipped
    };

    let face = if request.face {
        prompt("Look at the camera");
        match devices.detect_faces() {
            Ok(mut faces) if faces.len() == 1 => {
                match store.upsert(id, IdentityUpdate::face(faces.remove(0))) {
                    Ok(_) => {
                        log::info!("face template stored for {}", id);
                        StepResult::Enrolled
                    }
                    Err(e @ StoreError::InvalidTemplate(_)) => StepResult::Failed(e.to_string()),
                    Err(e) => return Err(e),
                }
            }
            Ok(faces) if faces.is_empty() => StepResult::Failed("no face detected".to_string()),
            Ok(faces) => StepResult::Failed(format!(
                "{} faces detected, need exactly one",
                faces.len()
            )),
            Err(e) => StepResult::Failed(format!("{:#}", e)),
        }
    } else {
        StepResult::Skipped
    };

    if fingerprint != StepResult::Enrolled {
        log::warn!("fingerprint enrollment for {}: {}", id, fingerprint);
    }
    if face != StepResult::Enrolled {
        log::warn!("face enrollment for {}: {}", id, face);
    }

    Ok(EnrollmentReport {
        identity_id: id.to_string(),
        fingerprint,
        face,
    })
}

/// Interactive operator loop: id, name, enroll; repeat until the exit keyword
/// or end of input.
pub fn run_enrollment_loop<D, R, W>(
    store: &mut IdentityStore,
    devices: &mut D,
    exit_keyword: &str,
    input: &mut R,
    output: &mut W,
) -> Result<Vec<EnrollmentReport>>
where
    D: FaceSource + FingerprintSensor + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut reports = Vec::new();
    loop {
        let Some(identity_id) = ask(
            input,
            output,
            &format!("Enter user ID for enrollment (or '{}' to stop): ", exit_keyword),
        )?
        else {
            break;
        };
        if identity_id.eq_ignore_ascii_case(exit_keyword) {
            break;
        }
        if identity_id.is_empty() {
            continue;
        }

        let Some(name) = ask(input, output, &format!("Enter name for user ID {}: ", identity_id))?
        else {
            break;
        };
        let name = if name.is_empty() {
            identity_id.clone()
        } else {
            name
        };

        let request = EnrollmentRequest::new(&identity_id, &name);
        let report = enroll_identity(store, devices, &request, |line| {
            let _ = writeln!(output, "{}", line);
        })?;
        writeln!(output, "  fingerprint: {}", report.fingerprint)?;
        writeln!(output, "  face: {}", report.face)?;
        reports.push(report);
    }
    Ok(reports)
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<Option<String>> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
