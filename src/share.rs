//! Exported shares and the registry that resolves handle share ids.
//!
//! A [`Share`] pairs a name with the [`DiskDriver`] that backs it, the
//! per-share file-id cache, and a static [`DeviceContext`] used when
//! the driver does not report live disk usage. Share ids are a stable
//! hash of the share name, so the id baked into a file handle keeps
//! resolving across reconnects of the same server instance.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::cache::FileIdCache;
use crate::driver::{DiskDriver, FileTimeMs};

/// Static fallback sizes reported by FSSTAT when the driver has no
/// live usage interface.
#[derive(Copy, Clone, Debug)]
pub struct DeviceContext {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self { total_bytes: 64 * 1024 * 1024 * 1024, free_bytes: 32 * 1024 * 1024 * 1024 }
    }
}

/// FNV-1a hash of the share name; the 32-bit share id carried inside
/// every file handle.
pub fn share_id_for_name(name: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// One exported filesystem root.
pub struct Share {
    id: u32,
    name: String,
    writable: bool,
    file_id_support: bool,
    file_ids: FileIdCache,
    driver: Arc<dyn DiskDriver>,
    device: DeviceContext,
}

impl Share {
    pub fn new(name: impl Into<String>, driver: Arc<dyn DiskDriver>, writable: bool) -> Self {
        Self::with_device(name, driver, writable, DeviceContext::default())
    }

    pub fn with_device(
        name: impl Into<String>,
        driver: Arc<dyn DiskDriver>,
        writable: bool,
        device: DeviceContext,
    ) -> Self {
        let name = name.into();
        let file_id_support = driver.supports_file_id_lookup();
        Self {
            id: share_id_for_name(&name),
            name,
            writable,
            file_id_support,
            file_ids: FileIdCache::default(),
            driver,
            device,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template writability; new tree connections start from this.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Whether the driver can rebuild paths from file ids, making
    /// handles survive file-id cache eviction.
    pub fn has_file_id_support(&self) -> bool {
        self.file_id_support
    }

    pub fn file_ids(&self) -> &FileIdCache {
        &self.file_ids
    }

    pub fn driver(&self) -> &Arc<dyn DiskDriver> {
        &self.driver
    }

    pub fn device(&self) -> DeviceContext {
        self.device
    }
}

/// All shares exported by this server instance, plus the instance-wide
/// write verifier clients use to detect restarts between WRITE and
/// COMMIT.
pub struct ShareRegistry {
    shares: RwLock<HashMap<u32, Arc<Share>>>,
    write_verf: [u8; 8],
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self {
            shares: RwLock::new(HashMap::new()),
            write_verf: FileTimeMs::now().as_millis().to_be_bytes(),
        }
    }

    /// Registers a share, returning its shared descriptor. A share with
    /// the same name replaces the previous registration.
    pub fn register(&self, share: Share) -> Arc<Share> {
        let share = Arc::new(share);
        self.shares
            .write()
            .expect("share registry poisoned")
            .insert(share.id(), share.clone());
        share
    }

    /// Share descriptor for a handle's share id.
    pub fn find(&self, share_id: u32) -> Option<Arc<Share>> {
        self.shares.read().expect("share registry poisoned").get(&share_id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Share>> {
        self.find(share_id_for_name(name))
    }

    /// Verifier returned by WRITE and COMMIT; stable for the lifetime
    /// of this server instance.
    pub fn write_verifier(&self) -> [u8; 8] {
        self.write_verf
    }
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new()
    }
}
