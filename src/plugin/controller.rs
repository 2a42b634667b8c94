//! Plugin state controller.
//!
//! Owns the options, the derived state and the derived collaborators
//! (logger, middleware, filters), and turns them into a `RouteTable` on every
//! configuration pass.

use std::sync::Arc;

use crate::config::loader::ExternalConfigSource;
use crate::config::schema::{LoggerConfig, ProxyOptions, TargetMap};
use crate::observability::{create_logger, ProxyLogger};
use crate::plugin::host::{Command, DevServerConfig};
use crate::plugin::state::PluginState;
use crate::proxy::{Filters, Instrumenter, LifecycleHooks};
use crate::routing::{compile, resolve, CompileOptions, RouteTable};

/// Name the plugin registers under.
pub const PLUGIN_NAME: &str = "dev-proxy";

/// Builds the logger for a resolved logger configuration.
pub type LoggerFactory = Arc<dyn Fn(&LoggerConfig) -> Arc<dyn ProxyLogger> + Send + Sync>;

/// Environment-aware proxy route provider for a dev server.
pub struct ProxyPlugin {
    options: ProxyOptions,
    state: PluginState,
    hooks: LifecycleHooks,
    logger_factory: LoggerFactory,
    external_merged: bool,
}

impl ProxyPlugin {
    pub fn new(options: ProxyOptions) -> Self {
        Self::with_logger_factory(options, Arc::new(create_logger))
    }

    /// Use `factory` instead of the tracing logger, now and after every
    /// rebuild.
    pub fn with_logger_factory(options: ProxyOptions, factory: LoggerFactory) -> Self {
        let state = PluginState::from_options(&options);
        let hooks = Self::derive_hooks(&options, &state, &factory);
        Self {
            options,
            state,
            hooks,
            logger_factory: factory,
            external_merged: false,
        }
    }

    fn derive_hooks(
        options: &ProxyOptions,
        state: &PluginState,
        factory: &LoggerFactory,
    ) -> LifecycleHooks {
        LifecycleHooks {
            logger: factory(&state.logger),
            middleware: Arc::new(options.middleware.clone().unwrap_or_default()),
            ws_middleware: Arc::new(options.ws_middleware.clone().unwrap_or_default()),
            filters: Filters {
                request: options.request_filter.clone(),
                response: options.response_filter.clone(),
                websocket: options.websocket_filter.clone(),
            },
            correlation: options.correlation.unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    pub fn state(&self) -> &PluginState {
        &self.state
    }

    pub fn options(&self) -> &ProxyOptions {
        &self.options
    }

    fn logger(&self) -> &dyn ProxyLogger {
        self.hooks.logger.as_ref()
    }

    /// Make `env` the environment of subsequent configuration passes.
    pub fn switch_environment(&mut self, env: impl Into<String>) {
        self.state.env = env.into();
        self.logger()
            .info(&format!("Environment switched to: {}", self.state.env));
    }

    /// Replace the target maps of the environments present in `targets`;
    /// other environments are kept.
    pub fn patch_targets(&mut self, targets: TargetMap) {
        self.state.targets.extend(targets);
        self.logger().info("Proxy targets updated");
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
        if enabled {
            self.logger().info("Proxy enabled");
        } else {
            self.logger().info("Proxy disabled");
        }
    }

    pub fn enable(&mut self) {
        self.set_enabled(true);
    }

    pub fn disable(&mut self) {
        self.set_enabled(false);
    }

    /// Merge externally loaded options over the current ones and rebuild
    /// state, logger, middleware and filters from the result.
    ///
    /// Only the first call has an effect; returns whether this call merged.
    pub fn merge_external_config(&mut self, external: ProxyOptions) -> bool {
        if self.external_merged {
            self.logger()
                .debug("External proxy config already merged; ignoring");
            return false;
        }

        let current = std::mem::take(&mut self.options);
        self.options = current.merge(external);
        self.state = PluginState::from_options(&self.options);
        self.hooks = Self::derive_hooks(&self.options, &self.state, &self.logger_factory);
        self.external_merged = true;
        self.logger().info("External proxy config loaded");
        true
    }

    /// Build the route table for the current state.
    pub fn generate_routes(&self) -> RouteTable {
        let mut table = RouteTable::new();
        if !self.state.enabled {
            self.logger().info("Proxy disabled");
            return table;
        }

        let entries = resolve(&self.state.env, &self.state.targets);
        self.logger().debug(&format!(
            "Generating proxy routes for env '{}' ({} entries)",
            self.state.env,
            entries.len()
        ));

        let compile_options = CompileOptions {
            rewrite_rules: self.options.rewrite_rules.as_ref(),
            web_socket: self.options.web_socket.as_ref(),
            passthrough: self.options.custom_proxy_config.as_ref(),
        };
        for (path, descriptor) in compile(entries, &compile_options) {
            self.logger().debug(&format!(
                "Route added: {} -> {} => {} (rewrite: {}) [WebSocket: {}]",
                descriptor.key,
                path,
                descriptor.target,
                descriptor.rewrite.prefix(),
                if descriptor.ws.enabled { "on" } else { "off" },
            ));
            table.insert(Arc::new(Instrumenter::new(descriptor, self.hooks.clone())));
        }
        table
    }

    /// Whether a configuration pass for `command` contributes routes.
    pub fn applies_to(&self, command: Command) -> bool {
        match command {
            Command::Serve => true,
            Command::Preview => self.options.dev_only == Some(false),
            Command::Build => false,
        }
    }

    /// Host configuration hook.
    ///
    /// Loads external options on the first pass, generates routes and merges
    /// them under the routes already configured on the host.
    pub async fn configure(
        &mut self,
        command: Command,
        host: &mut DevServerConfig,
        source: &dyn ExternalConfigSource,
    ) {
        if !self.applies_to(command) {
            self.logger()
                .info(&format!("Skipping proxy configuration for {command:?}"));
            return;
        }

        if !self.external_merged {
            if let Some(external) = source.load().await {
                self.merge_external_config(external);
            }
        }

        let generated = self.generate_routes();
        if generated.is_empty() {
            return;
        }

        let count = generated.len();
        host.proxy = generated.merged_with(&host.proxy);
        self.logger()
            .info(&format!("Proxy configuration applied - {count} routes"));
    }

    /// Host hook run once the dev server is up.
    pub fn configure_server(&self) {
        self.logger().info(&format!(
            "Proxy plugin initialized - environment: {}",
            self.state.env
        ));
    }
}
