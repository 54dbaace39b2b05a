//! Kernel-object seam: shared memory and mutex creation.

use std::collections::HashMap;
use std::sync::Arc;

use csnd_engine::{HeapSharedMemory, SharedMemory};
use tracing::debug;

/// Opaque kernel handle handed to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("handle table exhausted")]
    HandleTableFull,
}

/// Creates the kernel objects a session hands to the guest.
pub trait KernelObjects {
    fn create_shared_memory(
        &mut self,
        name: &str,
        size: usize,
    ) -> Result<(Handle, Arc<dyn SharedMemory>), KernelError>;

    fn create_mutex(&mut self, name: &str) -> Result<Handle, KernelError>;
}

/// In-process kernel backed by heap memory.
///
/// Objects are keyed by name: creating an object under a name that is
/// already taken releases the previous object and its handle.
#[derive(Default)]
pub struct LocalKernel {
    next: u32,
    by_name: HashMap<String, Handle>,
    names: HashMap<Handle, String>,
    shared: HashMap<Handle, Arc<dyn SharedMemory>>,
}

impl LocalKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared memory created under `handle`.
    pub fn shared_memory(&self, handle: Handle) -> Option<Arc<dyn SharedMemory>> {
        self.shared.get(&handle).cloned()
    }

    pub fn name_of(&self, handle: Handle) -> Option<&str> {
        self.names.get(&handle).map(String::as_str)
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.names.len()
    }

    fn allocate(&mut self, name: &str) -> Result<Handle, KernelError> {
        // Handle 0 is reserved as invalid.
        let raw = self.next.checked_add(1).ok_or(KernelError::HandleTableFull)?;
        self.next = raw;
        let handle = Handle(raw);
        if let Some(stale) = self.by_name.insert(name.to_string(), handle) {
            self.names.remove(&stale);
            self.shared.remove(&stale);
            debug!(name, handle = stale.0, "previous object released");
        }
        self.names.insert(handle, name.to_string());
        Ok(handle)
    }
}

impl KernelObjects for LocalKernel {
    fn create_shared_memory(
        &mut self,
        name: &str,
        size: usize,
    ) -> Result<(Handle, Arc<dyn SharedMemory>), KernelError> {
        let handle = self.allocate(name)?;
        let memory: Arc<dyn SharedMemory> = Arc::new(HeapSharedMemory::new(size));
        self.shared.insert(handle, memory.clone());
        debug!(name, size, handle = handle.0, "shared memory created");
        Ok((handle, memory))
    }

    fn create_mutex(&mut self, name: &str) -> Result<Handle, KernelError> {
        let handle = self.allocate(name)?;
        debug!(name, handle = handle.0, "mutex created");
        Ok(handle)
    }
}
