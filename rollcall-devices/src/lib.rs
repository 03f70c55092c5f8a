pub mod bridge;
pub mod control;
pub mod face;
pub mod fingerprint;

// Re-export commonly used types
pub use bridge::DriverBridge;
pub use control::{Control, Feedback};
pub use face::{FaceProbe, FaceSource, FeatureVector};
pub use fingerprint::{
    CaptureStage, FingerprintScan, FingerprintSensor, SampleStatus, SensorSlot, TemplateStatus,
};
