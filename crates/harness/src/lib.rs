//! Test harness: a [`Console`] wired to an in-memory directory and record
//! store, with seeding shortcuts. Integration tests live in `tests/`.

use std::sync::Arc;

use opsdeck_client::MockDirectory;
use opsdeck_core::{FieldValue, ResourceRef};
use opsdeck_engine::{Console, ConsoleConfig};
use opsdeck_storage::SqliteRecordStore;

pub struct TestConsole {
    pub remote: Arc<MockDirectory>,
    pub console: Console,
}

impl TestConsole {
    pub fn new() -> Self {
        Self::with_config(ConsoleConfig::default())
    }

    pub fn with_config(config: ConsoleConfig) -> Self {
        let remote = Arc::new(MockDirectory::new());
        let store = SqliteRecordStore::open_in_memory().expect("in-memory record store");
        let console = Console::new(remote.clone(), Box::new(store), config);
        Self { remote, console }
    }

    pub fn seed_user(
        &self,
        id: &str,
        name: &str,
        fields: impl IntoIterator<Item = (&'static str, FieldValue)>,
    ) -> ResourceRef {
        let target = ResourceRef::user(id);
        self.remote.insert(target.clone(), name, fields);
        target
    }

    pub fn seed_group(&self, id: &str, name: &str) -> ResourceRef {
        let target = ResourceRef::group(id);
        self.remote.insert(target.clone(), name, []);
        target
    }

    pub fn seed_queue(&self, id: &str, name: &str) -> ResourceRef {
        let target = ResourceRef::queue(id);
        self.remote.insert(target.clone(), name, []);
        target
    }

    pub fn seed_skill(&self, id: &str, name: &str) -> ResourceRef {
        let target = ResourceRef::skill(id);
        self.remote.insert(target.clone(), name, []);
        target
    }

    pub fn set_members(&self, container: &ResourceRef, members: Vec<ResourceRef>) {
        self.remote.set_members(container.clone(), members);
    }

    pub fn members(&self, container: &ResourceRef) -> Vec<ResourceRef> {
        self.remote.members(container)
    }
}

impl Default for TestConsole {
    fn default() -> Self {
        Self::new()
    }
}
