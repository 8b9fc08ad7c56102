//! In-memory character device registry.

use hugemem_device::{CharDevRegistry, DeviceNode, RegistryError};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;

/// Major number handed out to dynamically registered devices.
pub const DYNAMIC_MAJOR: u32 = 240;

/// Device number of a registered node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DevNumber {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for DevNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Keeps published nodes in a table instead of `/dev`.
#[derive(Debug, Default)]
pub struct SimRegistry {
    nodes: BTreeMap<DevNumber, DeviceNode>,
    next_minor: u32,
    max_minors: Option<u32>,
}

impl SimRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that runs out of device numbers after `count` nodes.
    #[must_use]
    pub fn with_capacity(count: u32) -> Self {
        Self {
            max_minors: Some(count),
            ..Self::default()
        }
    }

    /// Published node called `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(DevNumber, &DeviceNode)> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(number, node)| (*number, node))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl CharDevRegistry for SimRegistry {
    type Handle = DevNumber;

    fn register(&mut self, node: &DeviceNode) -> Result<DevNumber, RegistryError> {
        if self.max_minors.is_some_and(|max| self.next_minor >= max) {
            return Err(RegistryError::NumbersExhausted);
        }
        if self.nodes.values().any(|existing| existing.name == node.name) {
            return Err(RegistryError::NodeExists(node.name));
        }

        let number = DevNumber {
            major: DYNAMIC_MAJOR,
            minor: self.next_minor,
        };
        self.next_minor += 1;
        self.nodes.insert(number, *node);
        debug!("registered {} as {number} (class {})", node.path(), node.class);
        Ok(number)
    }

    fn unregister(&mut self, handle: DevNumber) {
        if let Some(node) = self.nodes.remove(&handle) {
            debug!("unregistered {} ({handle})", node.path());
        }
    }
}
