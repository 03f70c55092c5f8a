use rollcall_devices::{FeatureVector, SensorSlot};
use serde::{Deserialize, Serialize};

/// An enrolled person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub identity_id: String,
    pub display_name: String,
    pub face_template: Option<FeatureVector>,
    pub fingerprint_slot: Option<SensorSlot>,
}

impl Identity {
    pub fn new(identity_id: &str, display_name: &str) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            display_name: display_name.to_string(),
            face_template: None,
            fingerprint_slot: None,
        }
    }

    /// No template of either kind yet; never matchable.
    pub fn is_pending(&self) -> bool {
        self.face_template.is_none() && self.fingerprint_slot.is_none()
    }

    pub(crate) fn merge(&mut self, update: IdentityUpdate) {
        if let Some(name) = update.display_name {
            self.display_name = name;
        }
        if let Some(face) = update.face_template {
            self.face_template = Some(face);
        }
        if let Some(slot) = update.fingerprint_slot {
            self.fingerprint_slot = Some(slot);
        }
    }
}

/// Fields to merge into an identity. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityUpdate {
    pub display_name: Option<String>,
    pub face_template: Option<FeatureVector>,
    pub fingerprint_slot: Option<SensorSlot>,
}

impl IdentityUpdate {
    pub fn name(display_name: &str) -> Self {
        Self {
            display_name: Some(display_name.to_string()),
            ..Self::default()
        }
    }

    pub fn face(template: FeatureVector) -> Self {
        Self {
            face_template: Some(template),
            ..Self::default()
        }
    }

    pub fn fingerprint(slot: SensorSlot) -> Self {
        Self {
            fingerprint_slot: Some(slot),
            ..Self::default()
        }
    }
}
