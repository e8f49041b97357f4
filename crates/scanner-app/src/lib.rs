//! Peripheral scaffolding around the discovery core: typed configuration
//! loading (defaults -> config file -> environment overrides, mirroring
//! `collector-app::config::CollectorConfig`) and nothing else. The CLI
//! parser, human-readable progress rendering, and export formatting stay
//! genuinely out of scope; `main.rs` wires this config into `scanner-engine`
//! just enough to exercise the core end to end.

mod config;

pub use config::ScannerAppConfig;
