use crate::config::types::{
    Config, DownloadConfig, FetchConfig, SiteConfig, StorageConfig, WorkerConfig,
};
use crate::ConfigError;
use url::Url;

/// Maximum number of workers for a single stage
const MAX_WORKERS: usize = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_fetch_config(&config.fetch)?;
    validate_worker_config(&config.workers)?;
    validate_download_config(&config.download)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.tag_index_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "tag-index-path must be relative to base-url, got '{}'",
            config.tag_index_path
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.connection_limit < 1 || config.connection_limit > 64 {
        return Err(ConfigError::Validation(format!(
            "connection-limit must be between 1 and 64, got {}",
            config.connection_limit
        )));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be at least one second".to_string(),
        ));
    }

    if config.jitter_min_ms > config.jitter_max_ms {
        return Err(ConfigError::Validation(format!(
            "jitter-min-ms ({}) exceeds jitter-max-ms ({})",
            config.jitter_min_ms, config.jitter_max_ms
        )));
    }

    if config.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk-size cannot be zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    for (stage, count) in [
        ("number", config.number),
        ("info", config.info),
        ("download", config.download),
    ] {
        if count < 1 || count > MAX_WORKERS {
            return Err(ConfigError::Validation(format!(
                "workers.{} must be between 1 and {}, got {}",
                stage, MAX_WORKERS, count
            )));
        }
    }
    Ok(())
}

fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "download root cannot be empty".to_string(),
        ));
    }

    if config.image_delay_min_ms > config.image_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "image-delay-min-ms ({}) exceeds image-delay-max-ms ({})",
            config.image_delay_min_ms, config.image_delay_max_ms
        )));
    }

    if config.failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "failure-threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}
