//! Exercises the wiring between `ScannerAppConfig` and the discovery core
//! without standing up a live Modbus device — the engine's own test suite
//! already drives full scans against an in-process stub server. What's
//! worth covering here is that a config loaded the way the binary loads it
//! actually produces a constructible engine, and that the clear-state /
//! state-info code paths `main.rs` dispatches on behave as the binary
//! expects against a real checkpoint on disk.

use std::path::PathBuf;

use scan_state::ScanStateManager;
use scanner_app::ScannerAppConfig;
use scanner_engine::{EngineState, ScannerEngine};
use types::{DiscoveryRecord, FunctionCode, RegisterValue, ScanState};

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}

#[test]
fn config_loaded_from_file_builds_a_constructible_engine() {
    let config = ScannerAppConfig::load_with_path(Some(fixture_path("config-valid.toml"))).expect("load config");
    config.validate().expect("validate config");

    let dir = tempfile::tempdir().unwrap();
    let engine = ScannerEngine::new(
        config.to_scan_config(),
        config.to_scan_options().expect("scan options"),
        dir.path(),
        config.to_engine_params(),
    )
    .expect("engine constructs from app config");

    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn invalid_config_is_rejected_before_an_engine_is_built() {
    let config = ScannerAppConfig::load_with_path(Some(fixture_path("config-invalid.toml"))).expect("load config");
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn state_info_reports_none_until_a_checkpoint_exists_then_reflects_it() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ScanStateManager::new(dir.path());

    assert!(manager.info().await.unwrap().is_none());

    let config = ScannerAppConfig::load_with_path(Some(fixture_path("config-valid.toml")))
        .expect("load config")
        .to_scan_config();
    let options = ScannerAppConfig::load_with_path(Some(fixture_path("config-valid.toml")))
        .expect("load config")
        .to_scan_options()
        .expect("scan options");

    let mut state = ScanState::new(options.total_units());
    state.record_unit(0, FunctionCode::HoldingRegisters, true);
    let records = vec![DiscoveryRecord::accessible(0, FunctionCode::HoldingRegisters, RegisterValue::U16(42))];

    manager.save(&config, &options, &state, &records).await.expect("save checkpoint");

    let info = manager.info().await.unwrap().expect("checkpoint present");
    assert_eq!(info.record_count, 1);
    assert_eq!(info.discovered_count, 1);

    manager.clear().await.expect("clear checkpoint");
    assert!(manager.info().await.unwrap().is_none());
}
