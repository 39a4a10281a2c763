use hashbrown::DefaultHashBuilder;
use indexmap::IndexMap;
use serde_json::Value;

use log::{info, warn};

/// Reserved command key triggering a restart.
pub const RESTART_KEY: &str = "restart";

/// A configuration handler.
///
/// It receives every configuration payload as a whole.
pub trait ConfigHandler: Send {
    /// Handles a configuration payload.
    fn on_config(&mut self, payload: &Value);
}

impl<F: FnMut(&Value) + Send> ConfigHandler for F {
    fn on_config(&mut self, payload: &Value) {
        self(payload);
    }
}

/// A command handler.
///
/// It receives every command payload as a whole, reserved keys included.
pub trait CommandHandler: Send {
    /// Handles a command payload.
    fn on_command(&mut self, payload: &Value);
}

impl<F: FnMut(&Value) + Send> CommandHandler for F {
    fn on_command(&mut self, payload: &Value) {
        self(payload);
    }
}

/// A feature module.
///
/// A module contributes schema fragments and reacts to the inbound
/// payloads, independently of the firmware and of the other modules.
pub trait FeatureModule: Send {
    /// Returns the module name.
    ///
    /// Names are unique among the modules of a device.
    fn name(&self) -> &'static str;

    /// Returns the configuration schema fragment of the module.
    fn config_schema(&self) -> Option<Value> {
        None
    }

    /// Returns the command schema fragment of the module.
    fn command_schema(&self) -> Option<Value> {
        None
    }

    /// Handles a configuration payload.
    fn on_config(&mut self, _payload: &Value) {}

    /// Handles a command payload.
    fn on_command(&mut self, _payload: &Value) {}
}

/// A restart trigger.
pub trait Restart: Send {
    /// Restarts the device.
    fn restart(&mut self);
}

/// A [`Restart`] trigger terminating the current process.
///
/// The process supervisor is expected to start it again.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitRestart;

impl Restart for ExitRestart {
    fn restart(&mut self) {
        warn!("Restarting the controller");
        std::process::exit(0);
    }
}

/// Whether a command payload requests a restart.
///
/// Only a boolean `true` under the reserved key counts.
#[must_use]
pub fn is_restart_requested(payload: &Value) -> bool {
    matches!(payload.get(RESTART_KEY), Some(Value::Bool(true)))
}

/// Routes inbound payloads.
///
/// Configuration payloads reach the firmware handler first, then every
/// feature module in registration order.
///
/// Command payloads follow the same order, but the reserved restart key is
/// evaluated right after the firmware handler and the restart fires only
/// after every module has run.
pub struct CallbackRouter {
    config_handler: Option<Box<dyn ConfigHandler>>,
    command_handler: Option<Box<dyn CommandHandler>>,
    modules: IndexMap<&'static str, Box<dyn FeatureModule>, DefaultHashBuilder>,
    restart: Box<dyn Restart>,
}

impl Default for CallbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRouter")
            .field("config_handler", &self.config_handler.is_some())
            .field("command_handler", &self.command_handler.is_some())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CallbackRouter {
    /// Creates a [`CallbackRouter`] with no handlers and an
    /// [`ExitRestart`] trigger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_handler: None,
            command_handler: None,
            modules: IndexMap::with_hasher(DefaultHashBuilder::default()),
            restart: Box::new(ExitRestart),
        }
    }

    /// Sets the firmware configuration handler.
    pub fn set_config_handler(&mut self, handler: impl ConfigHandler + 'static) {
        self.config_handler = Some(Box::new(handler));
    }

    /// Sets the firmware command handler.
    pub fn set_command_handler(&mut self, handler: impl CommandHandler + 'static) {
        self.command_handler = Some(Box::new(handler));
    }

    /// Sets the restart trigger.
    pub fn set_restart(&mut self, restart: impl Restart + 'static) {
        self.restart = Box::new(restart);
    }

    /// Registers a feature module.
    ///
    /// A module named as an already registered one is discarded, and
    /// `false` is returned.
    pub fn register(&mut self, module: Box<dyn FeatureModule>) -> bool {
        let name = module.name();
        if self.modules.contains_key(name) {
            info!("Discard the `{name}` module: a module with the same name is already registered");
            return false;
        }
        self.modules.insert(name, module);
        true
    }

    /// Returns the registered feature modules, in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &(dyn FeatureModule + 'static)> {
        self.modules.values().map(Box::as_ref)
    }

    /// Routes a configuration payload.
    pub fn route_config(&mut self, payload: &Value) {
        if let Some(handler) = self.config_handler.as_mut() {
            handler.on_config(payload);
        }
        for module in self.modules.values_mut() {
            module.on_config(payload);
        }
    }

    /// Routes a command payload.
    pub fn route_command(&mut self, payload: &Value) {
        if let Some(handler) = self.command_handler.as_mut() {
            handler.on_command(payload);
        }

        let restart = is_restart_requested(payload);

        for module in self.modules.values_mut() {
            module.on_command(payload);
        }

        if restart {
            self.restart.restart();
        }
    }
}
