//! 配置校验模块
//!
//! 校验规则：
//! - batch_size、flush_interval_ms、shutdown_timeout_ms、route_cache.max_entries > 0
//! - output id 非空，且在 default / filtered / stream outputs 之间全局唯一
//! - stream id 非空且唯一
//! - stream 引用的 output_ids 必须已声明
//! - 至少存在一个 sink (default 或 filtered)

use std::collections::HashSet;

use contracts::{ContractError, ServerConfig};

/// 校验 ServerConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ServerConfig) -> Result<(), ContractError> {
    validate_output_buffer(config)?;
    validate_route_cache(config)?;
    validate_output_ids(config)?;
    validate_streams(config)?;
    validate_sink_presence(config)?;
    Ok(())
}

/// 校验批处理参数
fn validate_output_buffer(config: &ServerConfig) -> Result<(), ContractError> {
    let buffer = &config.output_buffer;

    if buffer.batch_size == 0 {
        return Err(ContractError::config_validation(
            "output_buffer.batch_size",
            "batch_size must be > 0",
        ));
    }
    if buffer.flush_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "output_buffer.flush_interval_ms",
            "flush_interval_ms must be > 0",
        ));
    }
    if buffer.shutdown_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "output_buffer.shutdown_timeout_ms",
            "shutdown_timeout_ms must be > 0",
        ));
    }
    if buffer.output_module_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "output_buffer.output_module_timeout_ms",
            "output_module_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_route_cache(config: &ServerConfig) -> Result<(), ContractError> {
    if config.route_cache.max_entries == 0 {
        return Err(ContractError::config_validation(
            "route_cache.max_entries",
            "max_entries must be > 0",
        ));
    }
    Ok(())
}

/// 校验 output id 非空及唯一性 (全局)
fn validate_output_ids(config: &ServerConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    let all = config
        .default_output
        .iter()
        .map(|o| ("default_output", o))
        .chain(config.filtered_outputs.iter().map(|o| ("filtered_outputs", o)))
        .chain(config.outputs.iter().map(|o| ("outputs", o)));

    for (section, output) in all {
        if output.id.is_empty() {
            return Err(ContractError::config_validation(
                format!("{section}.id"),
                "output id cannot be empty",
            ));
        }
        if output.output_type.is_empty() {
            return Err(ContractError::config_validation(
                format!("{section}[id={}].output_type", output.id),
                "output_type cannot be empty",
            ));
        }
        if !seen.insert(output.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("{section}[id={}]", output.id),
                "duplicate output id",
            ));
        }
    }
    Ok(())
}

/// 校验 stream id 及其 output 引用
fn validate_streams(config: &ServerConfig) -> Result<(), ContractError> {
    let stream_outputs: HashSet<_> = config.outputs.iter().map(|o| o.id.as_str()).collect();
    let mut seen = HashSet::new();

    for (idx, stream) in config.streams.iter().enumerate() {
        if stream.id.is_empty() {
            return Err(ContractError::config_validation(
                format!("streams[{idx}].id"),
                "stream id cannot be empty",
            ));
        }
        if !seen.insert(stream.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("streams[id={}]", stream.id),
                "duplicate stream id",
            ));
        }
        for output_id in &stream.output_ids {
            if !stream_outputs.contains(output_id.as_str()) {
                return Err(ContractError::config_validation(
                    format!("streams[{}].output_ids", stream.id),
                    format!("output '{output_id}' not found in outputs"),
                ));
            }
        }
    }
    Ok(())
}

/// 至少需要一个 sink
fn validate_sink_presence(config: &ServerConfig) -> Result<(), ContractError> {
    if config.sink_count() == 0 {
        return Err(ContractError::config_validation(
            "default_output / filtered_outputs",
            "at least one sink must be configured",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutputConfig, StreamConfig};

    fn minimal_config() -> ServerConfig {
        ServerConfig {
            default_output: Some(OutputConfig::new("default", "log")),
            filtered_outputs: vec![OutputConfig::new("index", "log")],
            outputs: vec![OutputConfig::new("gelf-1", "gelf")
                .with_param("host", "127.0.0.1")
                .with_param("port", "12201")],
            streams: vec![StreamConfig {
                id: "errors".into(),
                title: "Errors".into(),
                output_ids: vec!["gelf-1".into()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = minimal_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = minimal_config();
        config.output_buffer.batch_size = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("batch_size must be > 0"), "got: {err}");
    }

    #[test]
    fn test_zero_flush_interval() {
        let mut config = minimal_config();
        config.output_buffer.flush_interval_ms = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("flush_interval_ms"), "got: {err}");
    }

    #[test]
    fn test_duplicate_output_id_across_sections() {
        let mut config = minimal_config();
        config.outputs.push(OutputConfig::new("index", "log"));
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate output id"), "got: {err}");
    }

    #[test]
    fn test_duplicate_stream_id() {
        let mut config = minimal_config();
        config.streams.push(config.streams[0].clone());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate stream id"), "got: {err}");
    }

    #[test]
    fn test_stream_references_unknown_output() {
        let mut config = minimal_config();
        config.streams[0].output_ids.push("missing".into());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("'missing' not found"), "got: {err}");
    }

    #[test]
    fn test_no_sinks() {
        let mut config = minimal_config();
        config.default_output = None;
        config.filtered_outputs.clear();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("at least one sink"), "got: {err}");
    }

    #[test]
    fn test_empty_output_type() {
        let mut config = minimal_config();
        config.filtered_outputs[0].output_type = String::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }
}
