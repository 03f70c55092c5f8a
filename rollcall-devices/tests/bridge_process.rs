#![cfg(unix)]

use anyhow::Result;
use rollcall_devices::{
    CaptureStage, Control, FaceProbe, FaceSource, FingerprintScan, FingerprintSensor,
    SampleStatus, TemplateStatus,
};
use rollcall_devices::DriverBridge;

/// Spawns a shell driver that answers each request line with the next canned reply.
fn scripted_driver(replies: &[&str]) -> Result<DriverBridge> {
    let mut script = String::new();
    for reply in replies {
        script.push_str(&format!("read _line; echo '{}'\n", reply));
    }
    script.push_str("while read _line; do echo '{\"status\":\"error\",\"message\":\"script exhausted\"}'; done\n");
    DriverBridge::spawn("sh", &["-c".to_string(), script])
}

#[test]
fn test_attendance_round_trip() -> Result<()> {
    env_logger::try_init().ok();
    let mut bridge = scripted_driver(&[
        r#"{"status":"faces","vectors":[[0.1,0.2],[0.3,0.4]]}"#,
        r#"{"status":"faces","vectors":[]}"#,
        r#"{"status":"match","slot":12}"#,
        r#"{"status":"capture_failed"}"#,
        r#"{"status":"stop","requested":true}"#,
    ])?;

    match bridge.capture_face_probe()? {
        FaceProbe::Features(v) => assert_eq!(v.values, vec![0.1, 0.2]),
        other => panic!("expected features, got {:?}", other),
    }
    assert_eq!(bridge.capture_face_probe()?, FaceProbe::NoFaceDetected);
    assert_eq!(bridge.capture_and_search()?, FingerprintScan::Matched(12));
    assert_eq!(bridge.capture_and_search()?, FingerprintScan::CaptureFailed);
    assert!(bridge.stop_requested()?);
    Ok(())
}

#[test]
fn test_enrollment_round_trip() -> Result<()> {
    let mut bridge = scripted_driver(&[
        r#"{"status":"captured"}"#,
        r#"{"status":"captured"}"#,
        r#"{"status":"created"}"#,
        r#"{"status":"stored","slot":4}"#,
    ])?;

    assert_eq!(bridge.capture_sample(CaptureStage::First)?, SampleStatus::Captured);
    assert_eq!(bridge.capture_sample(CaptureStage::Second)?, SampleStatus::Captured);
    assert_eq!(bridge.create_template()?, TemplateStatus::Created);
    assert_eq!(bridge.store_template(None)?, 4);
    Ok(())
}

#[test]
fn test_wrong_reply_kind_is_error() -> Result<()> {
    let mut bridge = scripted_driver(&[r#"{"status":"captured"}"#])?;
    assert!(bridge.wait_for_start().is_err());
    Ok(())
}

#[test]
fn test_driver_exit_is_error() -> Result<()> {
    let mut bridge = DriverBridge::spawn("sh", &["-c".to_string(), "exit 0".to_string()])?;
    assert!(bridge.capture_and_search().is_err());
    Ok(())
}
