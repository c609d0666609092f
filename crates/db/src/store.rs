use std::collections::BTreeMap;

use helmsman_core::types::DbId;
use tokio::sync::RwLock;

use crate::models::group::Group;
use crate::models::history::History;
use crate::models::hook::{Hook, HookDelivery};
use crate::models::host::Host;
use crate::models::inventory::Inventory;
use crate::models::periodic_task::PeriodicTask;
use crate::models::playbook::Playbook;
use crate::models::project::Project;
use crate::models::template::Template;

/// Rows of one entity keyed by id, with its own id sequence.
#[derive(Debug)]
pub(crate) struct Table<T> {
    pub(crate) rows: BTreeMap<DbId, T>,
    next_id: DbId,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    /// Allocate the next id, build the row with it and insert it.
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(DbId) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) projects: Table<Project>,
    pub(crate) hosts: Table<Host>,
    pub(crate) groups: Table<Group>,
    pub(crate) inventories: Table<Inventory>,
    pub(crate) templates: Table<Template>,
    pub(crate) periodic_tasks: Table<PeriodicTask>,
    pub(crate) playbooks: Table<Playbook>,
    pub(crate) histories: Table<History>,
    pub(crate) hooks: Table<Hook>,
    pub(crate) hook_deliveries: Table<HookDelivery>,
}

/// Process-local entity store.
///
/// A single lock guards all tables so multi-row checks (membership cycles,
/// compare-and-set transitions) see a consistent snapshot.
#[derive(Debug, Default)]
pub struct Store {
    pub(crate) tables: RwLock<Tables>,
}
