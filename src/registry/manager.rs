//! Registry manager for all bridged devices

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use pirblaster_shared::{DeviceConfig, DeviceId, RegistryError, StorageError};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::catalog::AssetCatalog;
use crate::config::{AppConfig, SessionPolicy};
use crate::device::{CommandSetSource, Device, DeviceContext};
use crate::hardware::{HardwareBus, Transmitter};
use crate::storage::{read_json, write_json_atomic};
use crate::transport::BrokerConnector;

/// Manages every device known to the bridge
pub struct DeviceRegistry {
    /// Devices in insertion order
    devices: Arc<RwLock<Vec<Arc<Device>>>>,
    app_config: Arc<RwLock<AppConfig>>,
    policy: SessionPolicy,
    hardware: Arc<HardwareBus>,
    catalog: AssetCatalog,
    connector: Arc<dyn BrokerConnector>,
    devices_file: PathBuf,
    /// Set between `start_all` and `stop_all`
    running: AtomicBool,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new(
        app_config: AppConfig,
        transmitter: Arc<dyn Transmitter>,
        catalog: AssetCatalog,
        connector: Arc<dyn BrokerConnector>,
        devices_file: impl Into<PathBuf>,
    ) -> Self {
        let hardware = Arc::new(HardwareBus::new(app_config.hardware(), transmitter));

        Self {
            devices: Arc::new(RwLock::new(Vec::new())),
            app_config: Arc::new(RwLock::new(app_config)),
            policy: SessionPolicy::default(),
            hardware,
            catalog,
            connector,
            devices_file: devices_file.into(),
            running: AtomicBool::new(false),
        }
    }

    /// Override the broker session policy of devices built from now on
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shared application configuration (broker, hardware)
    pub fn app_config(&self) -> Arc<RwLock<AppConfig>> {
        self.app_config.clone()
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn devices_file(&self) -> &Path {
        &self.devices_file
    }

    /// Template for a new device configuration
    pub fn default_config(&self) -> DeviceConfig {
        DeviceConfig::default()
    }

    async fn context(&self) -> DeviceContext {
        DeviceContext {
            broker: self.app_config.read().await.broker_settings(),
            policy: self.policy.clone(),
            hardware: self.hardware.clone(),
            catalog: self.catalog.clone(),
            connector: self.connector.clone(),
        }
    }

    /// Load the devices file and register every device it lists
    ///
    /// A missing file yields an empty registry; a malformed one is an error.
    /// Returns the number of devices registered.
    pub async fn load(&self) -> Result<usize, RegistryError> {
        info!("Loading devices from {}", self.devices_file.display());

        let configs: Vec<DeviceConfig> = match read_json(&self.devices_file) {
            Ok(configs) => configs,
            Err(StorageError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                warn!("No devices file at {}", self.devices_file.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let failures = self.initialize(configs).await;
        if !failures.is_empty() {
            warn!("{} device(s) could not be registered", failures.len());
        }
        Ok(self.count().await)
    }

    /// Register one device per configuration, loading each command set
    ///
    /// A failing entry is logged and skipped; the others are still
    /// registered. The failures are returned. Command sets are read before
    /// the device list is locked.
    pub async fn initialize(&self, configs: Vec<DeviceConfig>) -> Vec<RegistryError> {
        let context = self.context().await;
        let built: Vec<_> = configs
            .into_iter()
            .map(|config| {
                let id = config.id();
                (id, Device::new(config, &context, CommandSetSource::Load))
            })
            .collect();

        let mut devices = self.devices.write().await;
        let mut failures = Vec::new();

        for (id, device) in built {
            if find_index(&devices, &id).await.is_some() {
                error!("[{}] Duplicate device entry skipped", id);
                failures.push(RegistryError::Conflict(id));
                continue;
            }

            match device {
                Ok(device) => {
                    debug!("[{}] Registered", id);
                    devices.push(Arc::new(device));
                }
                Err(source) => {
                    error!("[{}] Cannot create device: {}", id, source);
                    failures.push(RegistryError::Device { id, source });
                }
            }
        }

        info!("Registered {} device(s)", devices.len());
        failures
    }

    /// Open the broker session of every device
    pub async fn start_all(&self) {
        info!("Starting device loops");
        let devices = self.devices.read().await;
        self.running.store(true, Ordering::SeqCst);

        for device in devices.iter() {
            device.start().await;
        }
    }

    /// Stop every device, even when some fail, and report the ones that did
    pub async fn stop_all(&self) -> Result<(), RegistryError> {
        info!("Stopping device loops");
        let devices = self.devices.read().await;
        self.running.store(false, Ordering::SeqCst);

        let results = join_all(devices.iter().map(|device| async move {
            let result = device.stop().await;
            (device.id().await, result)
        }))
        .await;

        let failed: Vec<DeviceId> = results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|_| id))
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            let err = RegistryError::StopFailed(failed);
            error!("{}", err);
            Err(err)
        }
    }

    /// Find a device by identity
    pub async fn get(&self, name: &str, location: &str) -> Option<Arc<Device>> {
        let devices = self.devices.read().await;
        for device in devices.iter() {
            if device.id().await.matches(name, location) {
                return Some(device.clone());
            }
        }
        None
    }

    /// Device at position `index`, in insertion order
    pub async fn get_by_index(&self, index: usize) -> Option<Arc<Device>> {
        self.devices.read().await.get(index).cloned()
    }

    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Snapshot of the registered devices
    pub async fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().await.clone()
    }

    /// Register a new device with an empty command set
    ///
    /// The identity check and the insertion happen under one write lock,
    /// which is held until the device is started when the registry is
    /// running, so `stop_all` always sees it.
    pub async fn add(&self, config: DeviceConfig) -> Result<Arc<Device>, RegistryError> {
        let context = self.context().await;
        let id = config.id();

        let device = Device::new(config, &context, CommandSetSource::Create)
            .map(Arc::new)
            .map_err(|source| RegistryError::Device {
                id: id.clone(),
                source,
            })?;

        let mut devices = self.devices.write().await;
        if find_index(&devices, &id).await.is_some() {
            warn!("[{}] Device already exists", id);
            return Err(RegistryError::Conflict(id));
        }
        devices.push(device.clone());
        info!("[{}] Device added", id);

        if self.running.load(Ordering::SeqCst) {
            device.start().await;
        }
        Ok(device)
    }

    /// Unregister a device, stopping its session first
    pub async fn remove(&self, name: &str, location: &str) -> Result<(), RegistryError> {
        let id = DeviceId::new(name, location);

        let device = {
            let mut devices = self.devices.write().await;
            let index = find_index(&devices, &id)
                .await
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            devices.remove(index)
        };

        info!("[{}] Device removed", id);
        device
            .stop()
            .await
            .map_err(|source| RegistryError::Device { id, source })
    }

    /// Replace a device's configuration
    ///
    /// Rejected with a conflict when the new identity belongs to another
    /// registered device.
    pub async fn update_config(
        &self,
        name: &str,
        location: &str,
        config: DeviceConfig,
    ) -> Result<(), RegistryError> {
        let current = DeviceId::new(name, location);
        let target = config.id();

        let devices = self.devices.write().await;
        let index = find_index(&devices, &current)
            .await
            .ok_or_else(|| RegistryError::NotFound(current.clone()))?;

        if target != current && find_index(&devices, &target).await.is_some() {
            return Err(RegistryError::Conflict(target));
        }

        devices[index]
            .set_config(config)
            .await
            .map_err(|source| RegistryError::Device {
                id: current,
                source,
            })
    }

    /// Configuration of every device, in order
    pub async fn list_configs(&self) -> Vec<DeviceConfig> {
        let devices = self.devices.read().await;
        let mut configs = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            configs.push(device.config().await);
        }
        configs
    }

    /// Write every device configuration to the devices file in one step
    pub async fn persist_all(&self) -> Result<(), RegistryError> {
        let configs = self.list_configs().await;

        info!("Saving devices");
        write_json_atomic(&self.devices_file, &configs)
            .inspect_err(|e| error!("Saving devices failed: {}", e))?;
        Ok(())
    }

    pub fn list_manufacturers(&self) -> Vec<String> {
        self.catalog.list_manufacturers()
    }

    pub fn list_models(&self, manufacturer: &str) -> Vec<String> {
        self.catalog.list_models(manufacturer)
    }
}

async fn find_index(devices: &[Arc<Device>], id: &DeviceId) -> Option<usize> {
    for (index, device) in devices.iter().enumerate() {
        if device.id().await == *id {
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerAddress, HardwareConfig, MqttConfig, PinConfig, UserConfig};
    use crate::hardware::LogTransmitter;
    use crate::ir::{Codec, CommandSet, IrCommand};
    use crate::transport::{MemoryConnector, SessionEvent};
    use pirblaster_shared::state_machine::ConnectionState;
    use pirblaster_shared::{DeviceError, QualityOfService};
    use std::time::Duration;

    struct Fixture {
        dir: tempfile::TempDir,
        registry: DeviceRegistry,
        connector: Arc<MemoryConnector>,
    }

    fn app_config(dir: &Path) -> AppConfig {
        AppConfig::new(
            dir,
            MqttConfig {
                broker: BrokerAddress {
                    hostname: "localhost".into(),
                    port: 1883,
                },
                user: UserConfig {
                    name: String::new(),
                    password: String::new(),
                },
            },
            HardwareConfig {
                input: PinConfig {
                    name: "IN0".into(),
                    gpio_id: 11,
                },
                outputs: vec![PinConfig {
                    name: "OUT0".into(),
                    gpio_id: 22,
                }],
            },
        )
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MemoryConnector::new());
        let registry = DeviceRegistry::new(
            app_config(dir.path()),
            Arc::new(LogTransmitter),
            AssetCatalog::new(dir.path().join("commandSets")),
            connector.clone(),
            dir.path().join("devices.json"),
        );
        Fixture {
            dir,
            registry,
            connector,
        }
    }

    fn config(name: &str, location: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.into(),
            location: location.into(),
            topic_prefix: "home".into(),
            ..DeviceConfig::default()
        }
    }

    fn install_asset(fx: &Fixture, manufacturer: &str, model: &str) {
        let mut set = CommandSet::new(22, 11, "Test remote");
        set.add_command("power", IrCommand::new("Power", vec![9000, 4500]));
        let path = fx.registry.catalog().asset_path(manufacturer, model).unwrap();
        set.save(&path).unwrap();
    }

    #[tokio::test]
    async fn test_add_conflict_keeps_single_device() {
        let fx = fixture();
        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        fx.registry.add(config("fan", "livingroom")).await.unwrap();

        let err = fx.registry.add(config("tv", "livingroom")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fx.registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_adds_of_same_identity() {
        let fx = fixture();
        let (a, b) = tokio::join!(
            fx.registry.add(config("tv", "livingroom")),
            fx.registry.add(config("tv", "livingroom"))
        );
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(fx.registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_before_and_after_add() {
        let fx = fixture();
        assert!(fx.registry.get("tv", "livingroom").await.is_none());
        assert!(fx.registry.get_by_index(0).await.is_none());

        let added = fx.registry.add(config("tv", "livingroom")).await.unwrap();

        let found = fx.registry.get("tv", "livingroom").await.unwrap();
        assert!(Arc::ptr_eq(&added, &found));
        assert!(Arc::ptr_eq(&added, &fx.registry.get_by_index(0).await.unwrap()));
        assert!(fx.registry.get_by_index(1).await.is_none());
        assert!(fx.registry.get("livingroom", "tv").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_emitter_is_reported() {
        let fx = fixture();
        let bad = DeviceConfig {
            linked_emitter: "OUT5".into(),
            ..config("tv", "livingroom")
        };

        let err = fx.registry.add(bad).await.unwrap_err();
        assert!(matches!(err, RegistryError::Device { .. }));
        assert_eq!(fx.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_add_rejects_asset_name_outside_catalog() {
        let fx = fixture();
        let mut escaping = config("tv", "livingroom");
        escaping.command_set.manufacturer = "..".into();
        escaping.command_set.model = "devices".into();

        let err = fx.registry.add(escaping).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Device {
                source: DeviceError::InvalidAssetName { .. },
                ..
            }
        ));
        assert_eq!(fx.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_persist_then_initialize_round_trip() {
        let fx = fixture();
        install_asset(&fx, "sony", "rm-s103");

        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        let fan = DeviceConfig {
            last_will: pirblaster_shared::LastWillConfig {
                qos: QualityOfService::ExactlyOnce,
                retain: false,
            },
            ..config("fan", "bedroom")
        };
        fx.registry.add(fan).await.unwrap();
        fx.registry.persist_all().await.unwrap();

        let reloaded = DeviceRegistry::new(
            app_config(fx.dir.path()),
            Arc::new(LogTransmitter),
            AssetCatalog::new(fx.dir.path().join("commandSets")),
            fx.connector.clone(),
            fx.dir.path().join("devices.json"),
        );
        assert_eq!(reloaded.load().await.unwrap(), 2);
        assert_eq!(reloaded.list_configs().await, fx.registry.list_configs().await);

        let tv = reloaded.get("tv", "livingroom").await.unwrap();
        assert!(tv.command_list().await["commands"]["power"].is_object());
    }

    #[tokio::test]
    async fn test_initialize_isolates_failures() {
        let fx = fixture();
        install_asset(&fx, "sony", "rm-s103");

        let missing_asset = DeviceConfig {
            command_set: pirblaster_shared::CommandSetConfig {
                model: "unknown".into(),
                ..Default::default()
            },
            ..config("fan", "bedroom")
        };
        let failures = fx
            .registry
            .initialize(vec![
                config("tv", "livingroom"),
                missing_asset,
                config("tv", "livingroom"),
                config("radio", "kitchen"),
            ])
            .await;

        assert_eq!(failures.len(), 2);
        assert_eq!(fx.registry.count().await, 2);
        assert!(fx.registry.get("radio", "kitchen").await.is_some());
    }

    #[tokio::test]
    async fn test_load_missing_and_malformed_file() {
        let fx = fixture();
        assert_eq!(fx.registry.load().await.unwrap(), 0);

        std::fs::write(fx.registry.devices_file(), "[{\"name\": ").unwrap();
        let err = fx.registry.load().await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(StorageError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_start_all_then_stop_all() {
        let fx = fixture();
        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        fx.registry.add(config("fan", "livingroom")).await.unwrap();
        fx.registry.start_all().await;

        let session = fx.connector.session("livingroom.tv").unwrap();
        session
            .inject(SessionEvent::Connected {
                session_present: false,
            })
            .await
            .unwrap();
        session
            .inject(SessionEvent::Subscribed {
                granted: vec![Some(QualityOfService::AtMostOnce)],
            })
            .await
            .unwrap();

        let tv = fx.registry.get("tv", "livingroom").await.unwrap();
        for _ in 0..200 {
            if tv.is_ready().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(tv.state().await, ConnectionState::Subscribed);

        // Devices added while running are started at once
        fx.registry.add(config("radio", "kitchen")).await.unwrap();
        assert!(fx.connector.session("kitchen.radio").is_some());

        fx.registry.stop_all().await.unwrap();
        for device in fx.registry.devices().await {
            assert!(!device.is_running().await);
        }
    }

    #[tokio::test]
    async fn test_add_racing_stop_all_leaves_nothing_running() {
        let fx = fixture();
        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        fx.registry.start_all().await;

        let (added, stopped) = tokio::join!(
            fx.registry.add(config("radio", "kitchen")),
            fx.registry.stop_all()
        );
        added.unwrap();
        stopped.unwrap();

        assert_eq!(fx.registry.count().await, 2);
        for device in fx.registry.devices().await {
            assert!(!device.is_running().await);
        }
    }

    #[tokio::test]
    async fn test_stop_all_reports_every_failure() {
        let fx = fixture();
        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        fx.registry.add(config("fan", "livingroom")).await.unwrap();
        fx.registry.add(config("radio", "kitchen")).await.unwrap();
        fx.registry.start_all().await;

        fx.connector.session("livingroom.tv").unwrap().fail_disconnect(true);
        fx.connector.session("kitchen.radio").unwrap().fail_disconnect(true);

        let err = fx.registry.stop_all().await.unwrap_err();
        match err {
            RegistryError::StopFailed(ids) => {
                assert_eq!(
                    ids,
                    vec![
                        DeviceId::new("tv", "livingroom"),
                        DeviceId::new("radio", "kitchen")
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        let fan = fx.registry.get("fan", "livingroom").await.unwrap();
        assert!(!fan.is_running().await);
    }

    #[tokio::test]
    async fn test_remove_and_update_config() {
        let fx = fixture();
        fx.registry.add(config("tv", "livingroom")).await.unwrap();
        fx.registry.add(config("fan", "livingroom")).await.unwrap();

        let err = fx
            .registry
            .update_config("fan", "livingroom", config("tv", "livingroom"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));

        fx.registry
            .update_config("fan", "livingroom", config("fan", "bedroom"))
            .await
            .unwrap();
        assert!(fx.registry.get("fan", "bedroom").await.is_some());

        fx.registry.remove("tv", "livingroom").await.unwrap();
        assert_eq!(fx.registry.count().await, 1);
        assert!(matches!(
            fx.registry.remove("tv", "livingroom").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_discovery() {
        let fx = fixture();
        install_asset(&fx, "sony", "rm-s103");

        assert_eq!(fx.registry.list_manufacturers(), vec!["sony"]);
        assert_eq!(fx.registry.list_models("sony"), vec!["rm-s103"]);
        assert!(fx.registry.list_models("lg").is_empty());
        assert_eq!(fx.registry.default_config().name, "myDevice");
    }
}
