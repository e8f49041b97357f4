use anyhow::Result;
use tracing::info;

use scan_state::ScanStateManager;
use scanner_app::ScannerAppConfig;
use scanner_engine::{EngineCallbacks, EngineState, ScanStatus, ScannerEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1);
    let app_config = ScannerAppConfig::load_with_path(config_path)?;
    app_config.validate()?;

    let state_manager = ScanStateManager::new(app_config.state_dir.clone());

    if app_config.clear_state {
        state_manager.clear().await?;
        info!("checkpoint cleared");
        return Ok(());
    }

    if app_config.state_info {
        match state_manager.info().await? {
            Some(checkpoint_info) => println!(
                "schema={} saved_at={} records={} discovered={} progress={:.1}%",
                checkpoint_info.schema_version,
                checkpoint_info.saved_at,
                checkpoint_info.record_count,
                checkpoint_info.discovered_count,
                checkpoint_info.progress_percent
            ),
            None => println!("no saved checkpoint"),
        }
        return Ok(());
    }

    let engine = ScannerEngine::new(
        app_config.to_scan_config(),
        app_config.to_scan_options()?,
        app_config.state_dir.clone(),
        app_config.to_engine_params(),
    )?;

    let callbacks = EngineCallbacks {
        on_progress: Some(Box::new(|progress| {
            info!(
                processed = progress.processed,
                total = progress.total,
                accessible = progress.accessible,
                percent = format!("{:.1}", progress.percent),
                "scan progress"
            );
        })),
        on_record: None,
        on_error: Some(Box::new(|err| {
            tracing::warn!(
                function_code = ?err.function_code,
                start = err.start_address,
                end = err.end_address,
                "chunk reported an error"
            );
        })),
        stream_consumer: None,
    };

    let outcome = if app_config.resume {
        info!("resuming scan from saved checkpoint");
        engine.resume_from_saved(callbacks).await?
    } else {
        info!("starting new scan");
        engine.start(callbacks).await?
    };

    match outcome.status {
        ScanStatus::Completed => {
            info!(
                records = outcome.records.len(),
                accessible = outcome.state.accessible,
                "scan completed"
            );
        }
        ScanStatus::Stopped => {
            info!(
                processed = outcome.state.processed,
                total = outcome.state.total_units,
                "scan stopped; resumable via --resume"
            );
        }
        ScanStatus::Failed => {
            info!(processed = outcome.state.processed, "scan failed");
        }
    }

    debug_assert_ne!(engine.state(), EngineState::Running);
    Ok(())
}
