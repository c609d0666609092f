//! Repository for inventories, their members and graph snapshots.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use helmsman_core::inventory::InventoryGraph;
use helmsman_core::types::DbId;

use super::{validate_name, validate_vars};
use crate::models::group::Group;
use crate::models::host::Host;
use crate::models::inventory::{CreateInventory, Inventory, UpdateInventory};
use crate::store::Tables;
use crate::{DbError, DbPool};

pub struct InventoryRepo;

impl InventoryRepo {
    pub async fn create(
        pool: &DbPool,
        project_id: DbId,
        input: &CreateInventory,
    ) -> Result<Inventory, DbError> {
        validate_name("Inventory", &input.name)?;
        validate_vars(&input.vars)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        Ok(tables.inventories.insert_with(|id| Inventory {
            id,
            project_id,
            name: input.name.clone(),
            vars: input.vars.clone(),
            hosts: Vec::new(),
            groups: Vec::new(),
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Inventory>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.inventories.rows.get(&id).cloned())
    }

    pub async fn list_by_project(
        pool: &DbPool,
        project_id: DbId,
    ) -> Result<Vec<Inventory>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .inventories
            .rows
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect())
    }

    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateInventory,
    ) -> Result<Option<Inventory>, DbError> {
        if let Some(name) = &input.name {
            validate_name("Inventory", name)?;
        }
        if let Some(vars) = &input.vars {
            validate_vars(vars)?;
        }
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.inventories.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            row.name = name.clone();
        }
        if let Some(vars) = &input.vars {
            row.vars = vars.clone();
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        Ok(tables.inventories.rows.remove(&id).is_some())
    }

    pub async fn add_host(pool: &DbPool, id: DbId, host_id: DbId) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        if !tables.hosts.rows.contains_key(&host_id) {
            return Err(DbError::NotFound {
                entity: "host",
                id: host_id,
            });
        }
        let row = inventory_mut(&mut tables, id)?;
        if !row.hosts.contains(&host_id) {
            row.hosts.push(host_id);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    pub async fn remove_host(pool: &DbPool, id: DbId, host_id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        let row = inventory_mut(&mut tables, id)?;
        let before = row.hosts.len();
        row.hosts.retain(|h| *h != host_id);
        Ok(row.hosts.len() != before)
    }

    pub async fn add_group(pool: &DbPool, id: DbId, group_id: DbId) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        if !tables.groups.rows.contains_key(&group_id) {
            return Err(DbError::NotFound {
                entity: "group",
                id: group_id,
            });
        }
        let row = inventory_mut(&mut tables, id)?;
        if !row.groups.contains(&group_id) {
            row.groups.push(group_id);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    pub async fn remove_group(pool: &DbPool, id: DbId, group_id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        let row = inventory_mut(&mut tables, id)?;
        let before = row.groups.len();
        row.groups.retain(|g| *g != group_id);
        Ok(row.groups.len() != before)
    }

    /// Snapshot of the inventory and every node reachable from it.
    pub async fn load_graph(pool: &DbPool, id: DbId) -> Result<Option<InventoryGraph>, DbError> {
        let tables = pool.tables.read().await;
        let Some(inventory) = tables.inventories.rows.get(&id) else {
            return Ok(None);
        };
        let (host_ids, group_ids) = reachable(&tables, inventory);
        let host_nodes: HashMap<_, _> = host_ids
            .iter()
            .filter_map(|hid| tables.hosts.rows.get(hid))
            .map(|h| (h.id, h.to_node()))
            .collect();
        let group_nodes: HashMap<_, _> = group_ids
            .iter()
            .filter_map(|gid| tables.groups.rows.get(gid))
            .map(|g| (g.id, g.to_node()))
            .collect();
        Ok(Some(InventoryGraph {
            vars: inventory.vars.clone(),
            hosts: inventory.hosts.clone(),
            groups: inventory.groups.clone(),
            host_nodes,
            group_nodes,
        }))
    }

    /// Every host reachable from the inventory, each object once.
    pub async fn all_hosts(pool: &DbPool, id: DbId) -> Result<Vec<Host>, DbError> {
        let tables = pool.tables.read().await;
        let inventory = tables.inventories.rows.get(&id).ok_or(DbError::NotFound {
            entity: "inventory",
            id,
        })?;
        let (host_ids, _) = reachable(&tables, inventory);
        Ok(host_ids
            .iter()
            .filter_map(|hid| tables.hosts.rows.get(hid).cloned())
            .collect())
    }

    /// Every group reachable from the inventory, each object once.
    pub async fn all_groups(pool: &DbPool, id: DbId) -> Result<Vec<Group>, DbError> {
        let tables = pool.tables.read().await;
        let inventory = tables.inventories.rows.get(&id).ok_or(DbError::NotFound {
            entity: "inventory",
            id,
        })?;
        let (_, group_ids) = reachable(&tables, inventory);
        Ok(group_ids
            .iter()
            .filter_map(|gid| tables.groups.rows.get(gid).cloned())
            .collect())
    }
}

fn inventory_mut(tables: &mut Tables, id: DbId) -> Result<&mut Inventory, DbError> {
    tables.inventories.rows.get_mut(&id).ok_or(DbError::NotFound {
        entity: "inventory",
        id,
    })
}

/// Ids of hosts and groups reachable from `inventory`.
fn reachable(tables: &Tables, inventory: &Inventory) -> (BTreeSet<DbId>, BTreeSet<DbId>) {
    let mut hosts: BTreeSet<DbId> = inventory.hosts.iter().copied().collect();
    let mut groups = BTreeSet::new();
    let mut stack = inventory.groups.clone();
    while let Some(gid) = stack.pop() {
        if !groups.insert(gid) {
            continue;
        }
        let Some(group) = tables.groups.rows.get(&gid) else {
            continue;
        };
        if group.children {
            stack.extend(group.groups.iter().copied());
        } else {
            hosts.extend(group.hosts.iter().copied());
        }
    }
    (hosts, groups)
}
