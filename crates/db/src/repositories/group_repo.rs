//! Repository for groups and group membership.
//!
//! Membership edges are checked at link time: hosts only join groups with
//! `children = false`, sub-groups only join groups with `children = true`,
//! and a link that would close a cycle is rejected with the graph left
//! unchanged.

use std::collections::HashMap;

use chrono::Utc;
use helmsman_core::error::CoreError;
use helmsman_core::inventory;
use helmsman_core::types::DbId;

use super::{validate_name, validate_vars};
use crate::models::group::{CreateGroup, Group, UpdateGroup};
use crate::store::Tables;
use crate::{DbError, DbPool};

pub struct GroupRepo;

impl GroupRepo {
    pub async fn create(
        pool: &DbPool,
        project_id: DbId,
        input: &CreateGroup,
    ) -> Result<Group, DbError> {
        validate_name("Group", &input.name)?;
        if input.name == inventory::ALL_GROUP || input.name.contains(char::is_whitespace) {
            return Err(DbError::validation(format!(
                "Invalid group name: '{}'",
                input.name
            )));
        }
        validate_vars(&input.vars)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        if tables
            .groups
            .rows
            .values()
            .any(|g| g.project_id == project_id && g.name == input.name)
        {
            return Err(DbError::UniqueViolation(format!(
                "Group '{}' already exists in project {project_id}",
                input.name
            )));
        }
        Ok(tables.groups.insert_with(|id| Group {
            id,
            project_id,
            name: input.name.clone(),
            children: input.children,
            vars: input.vars.clone(),
            hosts: Vec::new(),
            groups: Vec::new(),
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Group>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.groups.rows.get(&id).cloned())
    }

    pub async fn list_by_project(pool: &DbPool, project_id: DbId) -> Result<Vec<Group>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .groups
            .rows
            .values()
            .filter(|g| g.project_id == project_id)
            .cloned()
            .collect())
    }

    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateGroup,
    ) -> Result<Option<Group>, DbError> {
        if let Some(name) = &input.name {
            validate_name("Group", name)?;
        }
        if let Some(vars) = &input.vars {
            validate_vars(vars)?;
        }
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.groups.rows.get_mut(&id) else {
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

    /// Delete a group and unlink it from parent groups and inventories.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        if tables.groups.rows.remove(&id).is_none() {
            return Ok(false);
        }
        for group in tables.groups.rows.values_mut() {
            group.groups.retain(|g| *g != id);
        }
        for inventory in tables.inventories.rows.values_mut() {
            inventory.groups.retain(|g| *g != id);
        }
        Ok(true)
    }

    /// Put a host into a host-holding group.
    pub async fn add_host(pool: &DbPool, group_id: DbId, host_id: DbId) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        if !tables.hosts.rows.contains_key(&host_id) {
            return Err(DbError::NotFound {
                entity: "host",
                id: host_id,
            });
        }
        let group = group_mut(&mut tables, group_id)?;
        if group.children {
            return Err(DbError::validation(format!(
                "Group '{}' holds sub-groups and cannot contain hosts",
                group.name
            )));
        }
        if !group.hosts.contains(&host_id) {
            group.hosts.push(host_id);
            group.updated_at = Utc::now();
        }
        Ok(())
    }

    pub async fn remove_host(pool: &DbPool, group_id: DbId, host_id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        let group = group_mut(&mut tables, group_id)?;
        let before = group.hosts.len();
        group.hosts.retain(|h| *h != host_id);
        Ok(group.hosts.len() != before)
    }

    /// Link `child_id` under `parent_id`.
    ///
    /// Fails with a conflict if the link would make the membership graph
    /// cyclic.
    pub async fn add_child(pool: &DbPool, parent_id: DbId, child_id: DbId) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        if !tables.groups.rows.contains_key(&child_id) {
            return Err(DbError::NotFound {
                entity: "group",
                id: child_id,
            });
        }
        let edges: HashMap<DbId, Vec<DbId>> = tables
            .groups
            .rows
            .values()
            .map(|g| (g.id, g.groups.clone()))
            .collect();
        let parent = group_mut(&mut tables, parent_id)?;
        if !parent.children {
            return Err(DbError::validation(format!(
                "Group '{}' holds hosts and cannot contain sub-groups",
                parent.name
            )));
        }
        if parent.groups.contains(&child_id) {
            return Ok(());
        }
        if inventory::would_create_cycle(&edges, parent_id, child_id) {
            tracing::debug!(parent_id, child_id, "Rejected cyclic group link");
            return Err(DbError::Core(CoreError::Conflict(format!(
                "Adding group {child_id} to group {parent_id} would create a cycle"
            ))));
        }
        parent.groups.push(child_id);
        parent.updated_at = Utc::now();
        Ok(())
    }

    pub async fn remove_child(
        pool: &DbPool,
        parent_id: DbId,
        child_id: DbId,
    ) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        let parent = group_mut(&mut tables, parent_id)?;
        let before = parent.groups.len();
        parent.groups.retain(|g| *g != child_id);
        Ok(parent.groups.len() != before)
    }
}

fn group_mut(tables: &mut Tables, id: DbId) -> Result<&mut Group, DbError> {
    tables
        .groups
        .rows
        .get_mut(&id)
        .ok_or(DbError::NotFound { entity: "group", id })
}
