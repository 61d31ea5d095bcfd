use super::LoggerConfig;
use anyhow::Result;

pub fn validate_config(config: &LoggerConfig) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if config.filename.as_os_str().is_empty() {
        warnings.push("[X] filename is empty. The sink has nowhere to write.".to_string());
    }

    if config.max_size == 0 {
        warnings.push("[!] max_size is 0. It will default to 100MB.".to_string());
    }

    if config.max_body_size > 16 * 1024 * 1024 {
        warnings.push(format!(
            "[!] max_body_size ({} bytes) is over 16MB. Every captured request holds up to this much memory twice (request and response).",
            config.max_body_size
        ));
    }

    for path in &config.skip_paths {
        if !path.starts_with('/') {
            warnings.push(format!(
                "[!] skip path '{}' does not start with '/'. Prefix matching is literal and will likely never match.",
                path
            ));
        }
    }

    if config.compress && config.max_backups == 0 && config.max_age == 0 {
        warnings.push(
            "[!] compress is enabled but max_backups and max_age are both 0. Compressed archives will accumulate unbounded.".to_string(),
        );
    }

    if config.request_id_header.is_empty() {
        warnings.push("[i] request_id_header is empty. It will default to X-Request-ID.".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        let config = LoggerConfig::new("logs/access.log");
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn test_empty_filename_warns() {
        let config = LoggerConfig::new("");
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.contains("filename")));
    }

    #[test]
    fn test_relative_skip_path_warns() {
        let mut config = LoggerConfig::new("logs/access.log");
        config.skip_paths = vec!["health".to_string()];
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.contains("skip path")));
    }

    #[test]
    fn test_unbounded_compressed_archives_warn() {
        let mut config = LoggerConfig::new("logs/access.log");
        config.compress = true;
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.contains("unbounded")));
    }
}
