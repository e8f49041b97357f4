use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use scanner_engine::EngineParams;
use types::{AddressRange, FunctionCode, ScanConfig, ScanOptions};

const DEFAULT_STATE_DIR: &str = "modscan-state";

/// Everything the binary needs to build a [`ScanConfig`]/[`ScanOptions`]/
/// [`EngineParams`] triple and decide which of start/resume/clear-state/
/// state-info the user asked for. Loaded defaults -> config file -> env
/// overrides, in that order, mirroring how the rest of this workspace's
/// ambient config layers are built.
#[derive(Clone, Debug)]
pub struct ScannerAppConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout_ms: u64,
    pub retries: usize,
    pub batch_size_cap: u16,
    pub start_address: u16,
    pub end_address: u16,
    pub function_codes: Vec<FunctionCode>,
    pub enable_batching: bool,
    pub enable_streaming: bool,
    pub streaming_threshold: usize,
    pub enable_memory_optimization: bool,
    pub enable_network_optimization: bool,
    pub request_delay_ms: u64,
    pub auto_save_interval_ms: u64,
    pub state_dir: PathBuf,
    pub resume: bool,
    pub clear_state: bool,
    pub state_info: bool,
}

impl ScannerAppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("modbus.port must be between 1 and 65535");
        }
        if self.slave_id == 0 || self.slave_id > 247 {
            anyhow::bail!("modbus.slave_id must be between 1 and 247");
        }
        if self.timeout_ms < 1_000 {
            anyhow::bail!("modbus.timeout_ms must be >= 1000");
        }
        if self.batch_size_cap == 0 || self.batch_size_cap > 125 {
            anyhow::bail!("scan.batch_size_cap must be >= 1 and <= 125");
        }
        if self.start_address > self.end_address {
            anyhow::bail!("scan.start_address must be <= scan.end_address");
        }
        if self.function_codes.is_empty() {
            anyhow::bail!("scan.function_codes must not be empty");
        }
        if self.streaming_threshold == 0 {
            anyhow::bail!("scan.streaming_threshold must be >= 1");
        }
        Ok(())
    }

    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig {
            host: self.host.clone(),
            port: self.port,
            slave_id: self.slave_id,
            timeout_ms: self.timeout_ms,
            retry_count: self.retries,
            max_units_per_request: self.batch_size_cap,
        }
    }

    pub fn to_scan_options(&self) -> Result<ScanOptions> {
        let address_range = AddressRange::new(self.start_address, self.end_address)
            .context("scan.start_address/end_address")?;
        Ok(ScanOptions {
            address_range,
            function_codes: self.function_codes.clone(),
            enable_batching: self.enable_batching,
            enable_streaming: self.enable_streaming,
            streaming_threshold: self.streaming_threshold,
            enable_memory_optimization: self.enable_memory_optimization,
            enable_network_optimization: self.enable_network_optimization,
        })
    }

    pub fn to_engine_params(&self) -> EngineParams {
        let mut params = EngineParams::default();
        params.pacing.baseline_delay_ms = self.request_delay_ms;
        params.auto_save_interval = Duration::from_millis(self.auto_save_interval_ms);
        params
    }
}

impl Default for ScannerAppConfig {
    fn default() -> Self {
        let defaults = ScanConfig::default();
        let options = ScanOptions::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            slave_id: defaults.slave_id,
            timeout_ms: defaults.timeout_ms,
            retries: defaults.retry_count,
            batch_size_cap: defaults.max_units_per_request,
            start_address: options.address_range.lo,
            end_address: options.address_range.hi,
            function_codes: options.function_codes,
            enable_batching: options.enable_batching,
            enable_streaming: options.enable_streaming,
            streaming_threshold: options.streaming_threshold,
            enable_memory_optimization: options.enable_memory_optimization,
            enable_network_optimization: options.enable_network_optimization,
            request_delay_ms: 0,
            auto_save_interval_ms: 30_000,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            resume: false,
            clear_state: false,
            state_info: false,
        }
    }
}

fn apply_env_overrides(config: &mut ScannerAppConfig) {
    if let Ok(value) = env::var("MODSCAN_HOST") {
        config.host = value;
    }
    config.port = parse_env_u16("MODSCAN_PORT").unwrap_or(config.port);
    config.slave_id = parse_env_u8("MODSCAN_SLAVE_ID").unwrap_or(config.slave_id);
    config.timeout_ms = parse_env_u64("MODSCAN_TIMEOUT_MS").unwrap_or(config.timeout_ms);
    config.retries = parse_env_usize("MODSCAN_RETRIES").unwrap_or(config.retries);
    config.batch_size_cap = parse_env_u16("MODSCAN_BATCH_SIZE_CAP").unwrap_or(config.batch_size_cap);
    config.start_address = parse_env_u16("MODSCAN_START_ADDRESS").unwrap_or(config.start_address);
    config.end_address = parse_env_u16("MODSCAN_END_ADDRESS").unwrap_or(config.end_address);

    if let Ok(value) = env::var("MODSCAN_FUNCTION_CODES") {
        config.function_codes = parse_function_codes(&value);
    }

    config.enable_batching = parse_env_bool("MODSCAN_ENABLE_BATCHING").unwrap_or(config.enable_batching);
    config.enable_streaming = parse_env_bool("MODSCAN_ENABLE_STREAMING").unwrap_or(config.enable_streaming);
    config.streaming_threshold =
        parse_env_usize("MODSCAN_STREAMING_THRESHOLD").unwrap_or(config.streaming_threshold);
    config.enable_memory_optimization =
        parse_env_bool("MODSCAN_ENABLE_MEMORY_OPTIMIZATION").unwrap_or(config.enable_memory_optimization);
    config.enable_network_optimization =
        parse_env_bool("MODSCAN_ENABLE_NETWORK_OPTIMIZATION").unwrap_or(config.enable_network_optimization);
    config.request_delay_ms = parse_env_u64("MODSCAN_REQUEST_DELAY_MS").unwrap_or(config.request_delay_ms);
    config.auto_save_interval_ms =
        parse_env_u64("MODSCAN_AUTO_SAVE_INTERVAL_MS").unwrap_or(config.auto_save_interval_ms);

    if let Ok(value) = env::var("MODSCAN_STATE_DIR") {
        config.state_dir = PathBuf::from(value);
    }

    config.resume = parse_env_bool("MODSCAN_RESUME").unwrap_or(config.resume);
    config.clear_state = parse_env_bool("MODSCAN_CLEAR_STATE").unwrap_or(config.clear_state);
    config.state_info = parse_env_bool("MODSCAN_STATE_INFO").unwrap_or(config.state_info);
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    modbus: Option<FileModbusConfig>,
    scan: Option<FileScanConfig>,
    engine: Option<FileEngineConfig>,
}

#[derive(Debug, Deserialize)]
struct FileModbusConfig {
    host: Option<String>,
    port: Option<u16>,
    slave_id: Option<u8>,
    timeout_ms: Option<u64>,
    retries: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FileScanConfig {
    batch_size_cap: Option<u16>,
    start_address: Option<u16>,
    end_address: Option<u16>,
    function_codes: Option<Vec<String>>,
    enable_batching: Option<bool>,
    enable_streaming: Option<bool>,
    streaming_threshold: Option<usize>,
    enable_memory_optimization: Option<bool>,
    enable_network_optimization: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileEngineConfig {
    request_delay_ms: Option<u64>,
    auto_save_interval_ms: Option<u64>,
    state_dir: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("MODSCAN_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path).with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut ScannerAppConfig, file: FileConfig) {
    if let Some(modbus) = file.modbus {
        if let Some(host) = modbus.host {
            config.host = host;
        }
        if let Some(port) = modbus.port {
            config.port = port;
        }
        if let Some(slave_id) = modbus.slave_id {
            config.slave_id = slave_id;
        }
        if let Some(timeout_ms) = modbus.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(retries) = modbus.retries {
            config.retries = retries;
        }
    }

    if let Some(scan) = file.scan {
        if let Some(cap) = scan.batch_size_cap {
            config.batch_size_cap = cap;
        }
        if let Some(start) = scan.start_address {
            config.start_address = start;
        }
        if let Some(end) = scan.end_address {
            config.end_address = end;
        }
        if let Some(codes) = scan.function_codes {
            config.function_codes = codes.iter().filter_map(|code| parse_function_code(code)).collect();
        }
        if let Some(value) = scan.enable_batching {
            config.enable_batching = value;
        }
        if let Some(value) = scan.enable_streaming {
            config.enable_streaming = value;
        }
        if let Some(value) = scan.streaming_threshold {
            config.streaming_threshold = value;
        }
        if let Some(value) = scan.enable_memory_optimization {
            config.enable_memory_optimization = value;
        }
        if let Some(value) = scan.enable_network_optimization {
            config.enable_network_optimization = value;
        }
    }

    if let Some(engine) = file.engine {
        if let Some(value) = engine.request_delay_ms {
            config.request_delay_ms = value;
        }
        if let Some(value) = engine.auto_save_interval_ms {
            config.auto_save_interval_ms = value;
        }
        if let Some(value) = engine.state_dir {
            config.state_dir = PathBuf::from(value);
        }
    }
}

fn parse_function_codes(value: &str) -> Vec<FunctionCode> {
    value.split(',').filter_map(parse_function_code).collect()
}

/// Accepts either the protocol code ("1".."4") or its name ("coils",
/// "holding-registers", ...).
fn parse_function_code(value: &str) -> Option<FunctionCode> {
    let trimmed = value.trim();
    if let Ok(code) = trimmed.parse::<u8>() {
        return FunctionCode::from_code(code);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "coils" | "coil" => Some(FunctionCode::Coils),
        "discrete-inputs" | "discrete_inputs" | "discrete" => Some(FunctionCode::DiscreteInputs),
        "holding-registers" | "holding_registers" | "holding" => Some(FunctionCode::HoldingRegisters),
        "input-registers" | "input_registers" | "input" => Some(FunctionCode::InputRegisters),
        _ => None,
    }
}

fn parse_env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ScannerAppConfig::default().validate().expect("default valid");
    }

    #[test]
    fn rejects_inverted_address_range() {
        let mut config = ScannerAppConfig::default();
        config.start_address = 100;
        config.end_address = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_function_code_accepts_numeric_and_named_forms() {
        assert_eq!(parse_function_code("1"), Some(FunctionCode::Coils));
        assert_eq!(parse_function_code("holding-registers"), Some(FunctionCode::HoldingRegisters));
        assert_eq!(parse_function_code("bogus"), None);
    }

    #[test]
    fn parse_function_codes_splits_on_comma() {
        assert_eq!(
            parse_function_codes("1, 3"),
            vec![FunctionCode::Coils, FunctionCode::HoldingRegisters]
        );
    }
}
