//! Mutable plugin state.

use crate::config::schema::{LoggerConfig, ProxyOptions, TargetMap, LOCAL_ENV};

/// Process-wide state of one plugin instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginState {
    /// Active environment key.
    pub env: String,
    pub targets: TargetMap,
    pub logger: LoggerConfig,
    /// When false, configuration passes produce no routes.
    pub enabled: bool,
}

impl PluginState {
    /// Derive fresh state from options.
    pub fn from_options(options: &ProxyOptions) -> Self {
        let logger = options
            .logger
            .as_ref()
            .map(|overrides| overrides.overlay(LoggerConfig::default()))
            .unwrap_or_default();

        Self {
            env: options
                .env
                .clone()
                .filter(|env| !env.is_empty())
                .unwrap_or_else(|| LOCAL_ENV.to_string()),
            targets: options.targets.clone().unwrap_or_default(),
            logger,
            enabled: options.enabled != Some(false),
        }
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::from_options(&ProxyOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, LoggerOverrides};

    #[test]
    fn defaults_to_local_and_enabled() {
        let state = PluginState::default();
        assert_eq!(state.env, "local");
        assert!(state.enabled);
        assert!(state.targets.is_empty());
        assert_eq!(state.logger, LoggerConfig::default());
    }

    #[test]
    fn options_flow_into_state() {
        let options = ProxyOptions {
            env: Some("staging".into()),
            enabled: Some(false),
            logger: Some(LoggerOverrides {
                level: Some(LogLevel::Debug),
                show_status: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let state = PluginState::from_options(&options);
        assert_eq!(state.env, "staging");
        assert!(!state.enabled);
        assert_eq!(state.logger.level, LogLevel::Debug);
        assert!(!state.logger.show_status);
        assert!(state.logger.show_method);
    }

    #[test]
    fn verbosity_overrides_reach_logger_state() {
        let options = ProxyOptions {
            logger: Some(LoggerOverrides {
                show_request_headers: Some(true),
                show_response_body: Some(true),
                max_body_length: Some(200),
                show_ws_messages: Some(true),
                max_ws_message_length: Some(80),
                show_ws_connections: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let logger = PluginState::from_options(&options).logger;
        assert!(logger.show_request_headers);
        assert!(!logger.show_response_headers);
        assert!(!logger.show_request_body);
        assert!(logger.show_response_body);
        assert_eq!(logger.max_body_length, 200);
        assert!(logger.prettify_json);
        assert!(logger.show_ws_messages);
        assert_eq!(logger.max_ws_message_length, 80);
        assert!(!logger.show_ws_connections);
    }
}
