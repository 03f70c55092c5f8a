pub mod config;
pub mod enroll;
pub mod fingerprint;
pub mod identity;
pub mod matcher;
pub mod session;
pub mod sink;
pub mod storage;

// Re-export device types for convenience
pub use rollcall_devices::{
    Control, DriverBridge, FaceProbe, FaceSource, Feedback, FeatureVector, FingerprintScan,
    FingerprintSensor, SensorSlot,
};
