//! Configuration discovery and holder start-up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ae_archive::{build_holder, ArchiveHolder, FaultSink, TracingFaultSink};
use ae_common::{Error, Result};
use ae_config::{load_config, resolve_config, validate_config, ArchiveConfig, ConfigSource};

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Archive configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ArchiveConfig,
    pub source: ConfigSource,
    /// File the configuration was read from; `None` for the built-in default.
    pub path: Option<PathBuf>,
}

/// Resolve, read and validate the archive configuration.
///
/// An explicit `cli_path` must exist; otherwise the usual discovery order
/// applies and ends with the built-in default.
pub fn load_archive_config(cli_path: Option<&Path>, log: &LogContext) -> Result<LoadedConfig> {
    if let Some(path) = cli_path {
        if !path.exists() {
            let err = Error::Config(format!("config file not found: {}", path.display()));
            log_event!(log, ERROR, event_names::CONFIG_ERROR, Stage::Init, err.to_string());
            return Err(err);
        }
    }

    let paths = resolve_config(cli_path);
    match paths.archives {
        Some(path) => match load_config(&path) {
            Ok(config) => {
                log_event!(
                    log,
                    INFO,
                    event_names::CONFIG_LOADED,
                    Stage::Init,
                    "archive configuration loaded",
                    path = display(path.display()),
                    source = display(&paths.archives_source),
                    archives = config.archives.len()
                );
                Ok(LoadedConfig {
                    config,
                    source: paths.archives_source,
                    path: Some(path),
                })
            }
            Err(err) => {
                log_event!(
                    log,
                    ERROR,
                    event_names::CONFIG_ERROR,
                    Stage::Init,
                    err.to_string(),
                    path = display(path.display())
                );
                Err(err.into())
            }
        },
        None => {
            let config = ArchiveConfig::default();
            validate_config(&config)?;
            log_event!(
                log,
                INFO,
                event_names::CONFIG_DEFAULT_USED,
                Stage::Init,
                "no archives.json found, using built-in archives"
            );
            Ok(LoadedConfig {
                config,
                source: ConfigSource::BuiltinDefault,
                path: None,
            })
        }
    }
}

/// Build the holder for `config`, reporting faults through `tracing`.
pub fn start_holder(config: &ArchiveConfig, log: &LogContext) -> Result<ArchiveHolder> {
    let sink: Arc<dyn FaultSink> = Arc::new(TracingFaultSink::new().with_run_id(log.run_id.clone()));
    build_holder(config, sink).inspect_err(|err| {
        log_event!(
            log,
            ERROR,
            event_names::CONFIG_ERROR,
            Stage::Init,
            err.to_string(),
            code = err.code()
        );
    })
}
