//! # Load and unload
//!
//! [`HugePageModule::load`] brings the service up in order: validate the
//! region, map it, install it into a fresh device, and publish the device
//! node. A failure at any step undoes the steps before it.
//! [`HugePageModule::unload`] runs the same sequence backwards.

use crate::{DeviceError, Errno, HugePageDevice, Session};
use alloc::format;
use alloc::string::String;
use core::fmt;
use hugemem_info::device::{CLASS_NAME, DEVICE_NAME};
use hugemem_region::{ActiveMapping, IoRemap, MapError, RegionConfig, RegionError};
use log::{error, info, warn};

/// Name and class under which the device is published.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceNode {
    pub name: &'static str,
    pub class: &'static str,
}

impl DeviceNode {
    /// Where clients find the node.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/dev/{}", self.name)
    }
}

impl Default for DeviceNode {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME,
            class: CLASS_NAME,
        }
    }
}

/// Why a device node could not be published.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no device numbers left")]
    NumbersExhausted,
    #[error("device class {0:?} already exists")]
    ClassExists(&'static str),
    #[error("device node {0:?} already exists")]
    NodeExists(&'static str),
}

/// Publishes character device nodes.
pub trait CharDevRegistry {
    /// Token identifying a published node.
    type Handle: fmt::Debug;

    /// Publish `node`.
    ///
    /// # Errors
    /// [`RegistryError`] if the node cannot be created.
    fn register(&mut self, node: &DeviceNode) -> Result<Self::Handle, RegistryError>;

    /// Remove a node published by [`register`](Self::register).
    fn unregister(&mut self, handle: Self::Handle);
}

/// A load or unload step failed.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("invalid region configuration: {0}")]
    Region(#[from] RegionError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("failed to publish device node: {0}")]
    Registry(#[from] RegistryError),
}

impl ModuleError {
    /// The errno a failed module init returns.
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::Region(_) => Errno::EINVAL,
            Self::Map(_) => Errno::ENOMEM,
            Self::Device(err) => err.errno(),
            Self::Registry(RegistryError::NumbersExhausted) => Errno::EBUSY,
            Self::Registry(_) => Errno::EEXIST,
        }
    }
}

/// The loaded service: a device with the region installed and its node
/// published.
pub struct HugePageModule<R: IoRemap, G: CharDevRegistry> {
    device: HugePageDevice<R>,
    registry: G,
    node: DeviceNode,
    handle: Option<G::Handle>,
}

impl<R: IoRemap, G: CharDevRegistry> HugePageModule<R, G> {
    /// Bring the service up.
    ///
    /// # Errors
    /// [`ModuleError`] naming the step that failed; earlier steps are undone.
    pub fn load(remap: R, config: RegionConfig, mut registry: G) -> Result<Self, ModuleError> {
        let region = config.region().inspect_err(|err| {
            error!("rejecting region configuration {config:?}: {err}");
        })?;

        let mapping = ActiveMapping::initialize(remap, region)?;
        let device = HugePageDevice::from_mapping(mapping);

        let node = DeviceNode::default();
        let handle = match registry.register(&node) {
            Ok(handle) => handle,
            Err(err) => {
                error!("failed to create {}: {err}", node.path());
                // the device was never published, so nothing can be using it
                device.teardown()?;
                return Err(err.into());
            }
        };

        info!("module loaded, device {} created", node.path());
        Ok(Self {
            device,
            registry,
            node,
            handle: Some(handle),
        })
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &HugePageDevice<R> {
        &self.device
    }

    #[inline]
    #[must_use]
    pub const fn node(&self) -> &DeviceNode {
        &self.node
    }

    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &G {
        &self.registry
    }

    /// Open a session on the module's device.
    #[must_use]
    pub fn open(&self) -> Session<'_, R> {
        self.device.open()
    }

    /// Tear the region down and remove the device node.
    ///
    /// Sessions borrow the module, so none can be open here; live user
    /// mappings still refuse the unload.
    ///
    /// # Errors
    /// [`ModuleError::Device`] with [`DeviceError::Busy`] while user mappings
    /// are alive. The module stays loaded.
    pub fn unload(&mut self) -> Result<(), ModuleError> {
        match self.device.teardown() {
            Ok(()) | Err(DeviceError::NotReady) => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(handle) = self.handle.take() {
            self.registry.unregister(handle);
            info!("module unloaded, device {} removed", self.node.path());
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }
}

impl<R: IoRemap, G: CharDevRegistry> Drop for HugePageModule<R, G> {
    fn drop(&mut self) {
        if self.handle.is_some()
            && let Err(err) = self.unload()
        {
            warn!("module dropped while loaded: {err}");
            if let Some(handle) = self.handle.take() {
                self.registry.unregister(handle);
            }
        }
    }
}

impl<R: IoRemap, G: CharDevRegistry> fmt::Debug for HugePageModule<R, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HugePageModule")
            .field("device", &self.device)
            .field("node", &self.node)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
