//! Device lifecycle and administrative operations

use std::path::PathBuf;
use std::sync::Arc;

use pirblaster_shared::state_machine::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
use pirblaster_shared::{DeviceConfig, DeviceError, DeviceId, Presence};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{run_dispatch, run_session, DispatchTarget, SessionContext};
use super::{CommandSetSource, DeviceContext};
use crate::command::{BurstReport, CommandExecutor};
use crate::ir::{Codec, CommandSet, IrCommand};
use crate::transport::{BrokerSession, SessionOptions, WillMessage};

/// Tasks of a started broker session
struct ActiveSession {
    ctx: Arc<SessionContext>,
    event_task: JoinHandle<()>,
}

/// One IR-controlled appliance bridged to the broker
pub struct Device {
    config: RwLock<DeviceConfig>,
    commands: Arc<Mutex<CommandSet>>,
    dispatch: Arc<RwLock<DispatchTarget>>,
    state: Arc<RwLock<ConnectionStateMachine>>,
    context: DeviceContext,
    session: Mutex<Option<ActiveSession>>,
    last_burst: Arc<RwLock<Option<BurstReport>>>,
}

impl Device {
    /// Build a device; the broker session is opened by [`Device::start`]
    pub fn new(
        config: DeviceConfig,
        context: &DeviceContext,
        source: CommandSetSource,
    ) -> Result<Self, DeviceError> {
        let id = config.id();
        let dispatch = dispatch_target(&config, context)?;
        let path = asset_path(&config, context)?;

        let commands = match source {
            CommandSetSource::Load => {
                info!("[{}] Loading command set {}", id, path.display());
                CommandSet::load(&path)?
            }
            CommandSetSource::Create => {
                info!("[{}] Creating command set", id);
                CommandSet::from_config(&config.command_set)
            }
        };

        Ok(Self {
            config: RwLock::new(config),
            commands: Arc::new(Mutex::new(commands)),
            dispatch: Arc::new(RwLock::new(dispatch)),
            state: Arc::new(RwLock::new(ConnectionStateMachine::new())),
            context: context.clone(),
            session: Mutex::new(None),
            last_burst: Arc::new(RwLock::new(None)),
        })
    }

    /// Open the broker session and start handling its events
    ///
    /// The `OFFLINE` will is registered with the connection request. Starting
    /// an already running device does nothing.
    pub async fn start(&self) {
        let mut session = self.session.lock().await;
        let config = self.config.read().await.clone();
        let id = config.id();

        if session.is_some() {
            warn!("[{}] Already started", id);
            return;
        }

        let topics = config.topics();
        let options = SessionOptions {
            client_id: id.to_string(),
            broker: self.context.broker.clone(),
            last_will: WillMessage {
                topic: topics.status.clone(),
                payload: Presence::Offline.payload().to_string(),
                qos: config.last_will.qos,
                retain: config.last_will.retain,
            },
            policy: self.context.policy.clone(),
        };

        info!(
            "[{}] Connecting to {}:{} ({})",
            id,
            self.context.broker.hostname,
            self.context.broker.port,
            self.context.connector.name()
        );
        let BrokerSession { link, events } = self.context.connector.open(options);

        let ctx = Arc::new(SessionContext {
            scope: id.to_string(),
            topics,
            link,
            state: self.state.clone(),
            commands: self.commands.clone(),
            dispatch: self.dispatch.clone(),
            last_burst: self.last_burst.clone(),
        });
        ctx.transition(ConnectionEvent::ConnectStarted).await;

        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.context.policy.channel_capacity);
        let event_task = tokio::spawn(run_session(ctx.clone(), events, dispatch_tx));
        // Exits once the session task drops its sender, after the burst in flight
        tokio::spawn(run_dispatch(ctx.clone(), dispatch_rx));

        *session = Some(ActiveSession { ctx, event_task });
    }

    /// Announce `OFFLINE` and close the broker session cleanly
    ///
    /// The session is torn down even when the disconnect request fails; the
    /// failure is still returned.
    pub async fn stop(&self) -> Result<(), DeviceError> {
        let Some(active) = self.session.lock().await.take() else {
            debug!("[{}] Not running", self.id().await);
            return Ok(());
        };
        let ctx = active.ctx;
        let will = self.config.read().await.last_will;

        if let Err(e) = ctx
            .link
            .publish(
                &ctx.topics.status,
                Presence::Offline.payload().as_bytes(),
                will.qos,
                will.retain,
            )
            .await
        {
            warn!("[{}] Failed to publish presence: {:#}", ctx.scope, e);
        }

        let result = ctx
            .link
            .disconnect()
            .await
            .map_err(|e| DeviceError::Broker(format!("{e:#}")));
        if let Err(e) = &result {
            error!("[{}] Disconnect failed: {}", ctx.scope, e);
        }

        active.event_task.abort();
        let _ = active.event_task.await;

        ctx.transition(ConnectionEvent::ConnectionLost {
            reason: "stopped".into(),
        })
        .await;
        info!("[{}] Stopped", ctx.scope);

        result
    }

    pub async fn id(&self) -> DeviceId {
        self.config.read().await.id()
    }

    pub async fn name(&self) -> String {
        self.config.read().await.name.clone()
    }

    pub async fn location(&self) -> String {
        self.config.read().await.location.clone()
    }

    /// Snapshot of the device configuration
    pub async fn config(&self) -> DeviceConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration
    ///
    /// The linked emitter and the burst gap apply from the next burst, also
    /// on a running session. Topics, identity and will take effect on the
    /// next start; the loaded command set is kept and is saved under the new
    /// manufacturer/model.
    pub async fn set_config(&self, config: DeviceConfig) -> Result<(), DeviceError> {
        let dispatch = dispatch_target(&config, &self.context)?;
        asset_path(&config, &self.context)?;

        let mut current = self.config.write().await;
        info!("[{}] Configuration replaced (now {})", current.id(), config.id());
        *self.dispatch.write().await = dispatch;
        *current = config;
        Ok(())
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.state()
    }

    pub async fn presence(&self) -> Presence {
        self.state.read().await.presence()
    }

    /// Accepted broker connections since construction
    pub async fn connect_count(&self) -> u32 {
        self.state.read().await.connect_count()
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.is_ready()
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Report of the most recent command burst
    pub async fn last_burst(&self) -> Option<BurstReport> {
        self.last_burst.read().await.clone()
    }

    /// JSON view of the command set
    pub async fn command_list(&self) -> serde_json::Value {
        self.commands.lock().await.to_json()
    }

    /// Insert or replace a learned command
    pub async fn add_command(&self, label: &str, command: IrCommand) {
        debug!("[{}] Adding command {}", self.id().await, label);
        self.commands.lock().await.add_command(label, command);
    }

    pub async fn delete_command(&self, label: &str) -> Result<IrCommand, DeviceError> {
        let removed = self.commands.lock().await.remove_command(label);
        match removed {
            Some(command) => {
                debug!("[{}] Deleted command {}", self.id().await, label);
                Ok(command)
            }
            None => Err(DeviceError::CommandNotFound(label.to_string())),
        }
    }

    /// Write the command set to `<assets>/<manufacturer>/<model>.json`
    pub async fn save_command_set(&self) -> Result<PathBuf, DeviceError> {
        let (id, path) = {
            let config = self.config.read().await;
            (config.id(), asset_path(&config, &self.context)?)
        };

        self.commands
            .lock()
            .await
            .save(&path)
            .inspect_err(|e| error!("[{}] Saving command set failed: {}", id, e))?;

        info!("[{}] Command set saved to {}", id, path.display());
        Ok(path)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.config.try_read().map(|c| c.id().to_string());
        f.debug_struct("Device")
            .field("id", &id.as_deref().unwrap_or("<busy>"))
            .finish_non_exhaustive()
    }
}

fn dispatch_target(
    config: &DeviceConfig,
    context: &DeviceContext,
) -> Result<DispatchTarget, DeviceError> {
    let channel = context
        .hardware
        .resolve(&config.linked_emitter)
        .ok_or_else(|| DeviceError::UnknownEmitter(config.linked_emitter.clone()))?;
    Ok(DispatchTarget {
        executor: Arc::new(CommandExecutor::new(config.id(), channel)),
        gap: config.command_set.gap(),
    })
}

/// Command set file of a configuration; names must stay inside the catalog
fn asset_path(config: &DeviceConfig, context: &DeviceContext) -> Result<PathBuf, DeviceError> {
    let set = &config.command_set;
    context
        .catalog
        .asset_path(&set.manufacturer, &set.model)
        .ok_or_else(|| DeviceError::InvalidAssetName {
            manufacturer: set.manufacturer.clone(),
            model: set.model.clone(),
        })
}
