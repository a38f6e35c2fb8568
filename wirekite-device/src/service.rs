//! Tracks the boards that come and go while the application runs.
//!
//! Device discovery is platform specific. The platform layer forwards its hot-plug
//! notifications to a [Service], which opens and closes the [Device]s and tells the
//! application about them through [DeviceNotification].
use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::{Arc, Mutex},
};

use crate::{Config, Device, Result, Transport, sync::lock};

/// Receives connect and disconnect notifications from a [Service].
pub trait DeviceNotification: Send + Sync {
    /// A board has been connected and is ready for use.
    fn on_connected(&self, device: &Arc<Device>);

    /// A board has been disconnected. The device is already closed.
    fn on_disconnected(&self, device: &Arc<Device>);
}

/// The set of connected devices, keyed by a platform handle `K`.
pub struct Service<K> {
    config: Config,
    devices: Mutex<HashMap<K, Arc<Device>>>,
    notification: Option<Box<dyn DeviceNotification>>,
}

impl<K: Eq + Hash + Debug> Service<K> {
    pub fn new(config: Config) -> Service<K> {
        Service {
            config,
            devices: Mutex::new(HashMap::new()),
            notification: None,
        }
    }

    pub fn with_notification(
        config: Config,
        notification: impl DeviceNotification + 'static,
    ) -> Service<K> {
        Service {
            config,
            devices: Mutex::new(HashMap::new()),
            notification: Some(Box::new(notification)),
        }
    }

    /// Opens the device behind `transport` and registers it under `key`.
    ///
    /// A device already registered under the same key is considered gone and closed first.
    pub fn device_connected<T: Transport>(&self, key: K, transport: T) -> Result<Arc<Device>> {
        log::info!("Device {:?} connected", key);
        let device = Arc::new(Device::open(transport, self.config.clone())?);
        let previous = lock(&self.devices).insert(key, device.clone());
        if let Some(previous) = previous {
            self.retire(&previous);
        }
        if let Some(notification) = &self.notification {
            notification.on_connected(&device);
        }
        Ok(device)
    }

    /// Closes and forgets the device registered under `key`.
    pub fn device_disconnected(&self, key: &K) -> Option<Arc<Device>> {
        let device = lock(&self.devices).remove(key);
        match &device {
            Some(device) => {
                log::info!("Device {:?} disconnected", key);
                self.retire(device);
            }
            None => log::debug!("Disconnect of unknown device {:?}", key),
        }
        device
    }

    pub fn device(&self, key: &K) -> Option<Arc<Device>> {
        lock(&self.devices).get(key).cloned()
    }

    /// All currently connected devices.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        lock(&self.devices).values().cloned().collect()
    }
}

impl<K> Service<K> {
    fn retire(&self, device: &Arc<Device>) {
        device.close();
        if let Some(notification) = &self.notification {
            notification.on_disconnected(device);
        }
    }

    /// Closes all devices.
    pub fn close(&self) {
        let devices: Vec<_> = lock(&self.devices).drain().map(|(_, device)| device).collect();
        for device in &devices {
            self.retire(device);
        }
    }
}

impl<K> Drop for Service<K> {
    fn drop(&mut self) {
        self.close();
    }
}
