use anyhow::Result;

/// Handle into the sensor's onboard template library.
pub type SensorSlot = u16;

/// Outcome of a capture-and-search against the sensor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintScan {
    Matched(SensorSlot),
    NoMatch,
    CaptureFailed,
}

/// Which of the sensor's two character buffers a sample lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    First,
    Second,
}

impl CaptureStage {
    pub fn number(self) -> u8 {
        match self {
            CaptureStage::First => 1,
            CaptureStage::Second => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    Captured,
    CaptureFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStatus {
    Created,
    /// The two buffered samples did not come from the same finger.
    Mismatch,
}

pub trait FingerprintSensor {
    fn capture_and_search(&mut self) -> Result<FingerprintScan>;

    fn capture_sample(&mut self, stage: CaptureStage) -> Result<SampleStatus>;

    /// Combines both buffered samples into one template, kept on the sensor side
    /// until `store_template`.
    fn create_template(&mut self) -> Result<TemplateStatus>;

    /// Writes the created template into the library and returns the slot the
    /// sensor used. `preferred` asks the sensor to overwrite that slot.
    fn store_template(&mut self, preferred: Option<SensorSlot>) -> Result<SensorSlot>;
}
