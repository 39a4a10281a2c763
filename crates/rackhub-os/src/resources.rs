use std::path::PathBuf;
use std::sync::Mutex;

use rackhub::adoption::{SystemInfo, SystemResources};

use sysinfo::{Disks, System};

use tracing::warn;

// Default mount point of the file system reported by the device.
const DEFAULT_MOUNT_POINT: &str = "/";

/// A system resources reader backed by the host.
///
/// Memory counters are reported as heap counters, the storage holding the
/// running executable as program space, and the disk mounted at the
/// configured mount point as file system.
#[derive(Debug)]
pub struct HostResources {
    mount_point: PathBuf,
    system: Mutex<System>,
}

impl Default for HostResources {
    fn default() -> Self {
        Self::new()
    }
}

impl HostResources {
    /// Creates a [`HostResources`] reader for the root file system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            system: Mutex::new(System::new()),
        }
    }

    /// Sets the mount point of the reported file system.
    #[must_use]
    #[inline]
    pub fn mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = mount_point.into();
        self
    }
}

impl SystemResources for HostResources {
    fn snapshot(&self) -> SystemInfo {
        let mut info = SystemInfo::default();

        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                info.heap_free_bytes = system.free_memory();
                info.heap_used_bytes = system.used_memory();
                info.heap_max_alloc_bytes = system.available_memory();
            }
            Err(_) => warn!("Memory counters unavailable"),
        }

        let disks = Disks::new_with_refreshed_list();
        info.flash_chip_size_bytes = disks.list().iter().map(sysinfo::Disk::total_space).sum();

        if let Some(disk) = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == self.mount_point)
        {
            info.file_system_total_bytes = disk.total_space();
            info.file_system_used_bytes = disk.total_space().saturating_sub(disk.available_space());
            info.sketch_space_total_bytes = disk.available_space();
        }

        info.sketch_space_used_bytes = std::env::current_exe()
            .and_then(std::fs::metadata)
            .map(|metadata| metadata.len())
            .unwrap_or_default();
        info.sketch_space_total_bytes += info.sketch_space_used_bytes;

        info
    }
}
