// src/sync/agencies.rs
//! Government organization import from the regulatory-document API's agency
//! list.
//!
//! First pass: match each agency to a stored organization (Federal Register id,
//! then acronym, then official name) and either fill in what is missing or
//! create a new level-1 executive organization. Curated fields are never
//! overwritten; only the Federal Register reference is refreshed.
//!
//! Second pass: link children to parents from upstream `parent_id`, shallowest
//! first, and only where the child has no parent yet. A link that would close a
//! cycle with the stored hierarchy is refused; an accepted link re-levels the
//! child's stored subtree.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{record_counts, try_start, SyncKind};
use crate::error::{StoreError, SyncError};
use crate::model::{FederalRegisterRef, GovernmentBranch, GovernmentOrganization, OrganizationType};
use crate::sources::{FederalRegisterAgency, FederalRegisterClient};
use crate::store::OrganizationStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgencySyncResult {
    pub success: bool,
    /// Another run of this source held the slot; nothing was done.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_running: bool,
    pub fetched: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub parents_linked: usize,
    pub errors: usize,
    pub error_messages: Vec<String>,
    pub message: String,
}

impl AgencySyncResult {
    fn add_error(&mut self, message: String) {
        warn!(target: "sync", source = "agencies", "{message}");
        self.errors += 1;
        self.error_messages.push(message);
    }
}

enum Action {
    Added,
    Updated,
    Skipped,
}

pub struct AgencySync {
    client: Arc<FederalRegisterClient>,
    organizations: Arc<dyn OrganizationStore>,
    running: Mutex<()>,
}

impl AgencySync {
    pub fn new(client: Arc<FederalRegisterClient>, organizations: Arc<dyn OrganizationStore>) -> Self {
        Self {
            client,
            organizations,
            running: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    pub async fn run(&self, cancel: &CancellationToken) -> AgencySyncResult {
        match self.run_inner(cancel).await {
            Ok(r) => r,
            Err(e) => AgencySyncResult {
                success: false,
                already_running: matches!(e, SyncError::AlreadyRunning(_)),
                message: e.to_string(),
                ..AgencySyncResult::default()
            },
        }
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> Result<AgencySyncResult, SyncError> {
        let _running = try_start(&self.running, SyncKind::Agencies)?;
        let agencies = self.client.fetch_agencies(cancel).await?;

        let mut result = AgencySyncResult {
            fetched: agencies.len(),
            ..AgencySyncResult::default()
        };
        if agencies.is_empty() {
            result.add_error("no agencies returned upstream".into());
            result.message = "no agencies returned upstream".into();
            return Ok(result);
        }

        let mut by_fr_id: HashMap<u32, Uuid> = self
            .organizations
            .all_organizations()
            .await?
            .into_iter()
            .filter_map(|o| o.federal_register.as_ref().map(|r| (r.agency_id, o.id)))
            .collect();

        for agency in &agencies {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.sync_agency(agency, &by_fr_id).await {
                Ok((action, org_id)) => {
                    match action {
                        Action::Added => result.added += 1,
                        Action::Updated => result.updated += 1,
                        Action::Skipped => result.skipped += 1,
                    }
                    by_fr_id.insert(agency.id, org_id);
                }
                Err(e) => result.add_error(format!("failed to sync '{}': {e}", agency.name)),
            }
        }

        self.link_parents(&agencies, &by_fr_id, &mut result, cancel).await?;

        result.success = true;
        result.message = format!(
            "{} added, {} updated, {} skipped, {} parents linked, {} errors",
            result.added, result.updated, result.skipped, result.parents_linked, result.errors
        );
        record_counts(
            SyncKind::Agencies,
            &[
                ("added", result.added),
                ("updated", result.updated),
                ("skipped", result.skipped),
                ("error", result.errors),
            ],
        );
        info!(
            target: "sync",
            source = "agencies",
            fetched = result.fetched,
            added = result.added,
            updated = result.updated,
            skipped = result.skipped,
            parents_linked = result.parents_linked,
            errors = result.errors,
            "agency sync finished"
        );
        Ok(result)
    }

    async fn find_existing(
        &self,
        agency: &FederalRegisterAgency,
        by_fr_id: &HashMap<u32, Uuid>,
    ) -> Result<Option<GovernmentOrganization>, StoreError> {
        if let Some(id) = by_fr_id.get(&agency.id) {
            if let Some(org) = self.organizations.find_organization(id).await? {
                return Ok(Some(org));
            }
        }
        if let Some(short) = agency.short_name.as_deref().filter(|s| !s.trim().is_empty()) {
            if let Some(org) = self.organizations.find_organization_by_acronym(short).await? {
                return Ok(Some(org));
            }
        }
        self.organizations.find_organization_by_name(&agency.name).await
    }

    async fn sync_agency(
        &self,
        agency: &FederalRegisterAgency,
        by_fr_id: &HashMap<u32, Uuid>,
    ) -> Result<(Action, Uuid), StoreError> {
        let fr_ref = FederalRegisterRef {
            agency_id: agency.id,
            slug: agency.slug.clone(),
            url: agency.url.clone(),
        };

        let Some(mut org) = self.find_existing(agency, by_fr_id).await? else {
            let mut org = GovernmentOrganization::new_root(
                agency.name.trim(),
                agency.short_name.clone(),
                OrganizationType::infer_from_name(&agency.name),
                GovernmentBranch::Executive,
            );
            org.description = agency.description.clone().filter(|d| !d.trim().is_empty());
            org.website_url = agency.agency_url.clone().filter(|u| !u.trim().is_empty());
            org.federal_register = Some(fr_ref);
            let id = org.id;
            debug!(target: "sync", name = %agency.name, "adding organization");
            self.organizations.save_organization(org).await?;
            return Ok((Action::Added, id));
        };

        let mut changed = false;
        changed |= fill_if_absent(&mut org.description, &agency.description);
        changed |= fill_if_absent(&mut org.acronym, &agency.short_name);
        changed |= fill_if_absent(&mut org.website_url, &agency.agency_url);
        if org.federal_register.as_ref() != Some(&fr_ref) {
            org.federal_register = Some(fr_ref);
            changed = true;
        }

        let id = org.id;
        if !changed {
            return Ok((Action::Skipped, id));
        }
        self.organizations.save_organization(org).await?;
        Ok((Action::Updated, id))
    }

    async fn link_parents(
        &self,
        agencies: &[FederalRegisterAgency],
        by_fr_id: &HashMap<u32, Uuid>,
        result: &mut AgencySyncResult,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let upstream: HashMap<u32, &FederalRegisterAgency> = agencies.iter().map(|a| (a.id, a)).collect();

        let mut ordered: Vec<(usize, &FederalRegisterAgency)> = Vec::new();
        for agency in agencies.iter().filter(|a| a.parent_id.is_some()) {
            match upstream_depth(agency, &upstream) {
                Some(depth) => ordered.push((depth, agency)),
                None => result.add_error(format!("parent cycle upstream at '{}'", agency.name)),
            }
        }
        ordered.sort_by_key(|(depth, a)| (*depth, a.id));

        for (_, agency) in ordered {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let (Some(child_id), Some(parent_id)) = (
                by_fr_id.get(&agency.id),
                agency.parent_id.and_then(|p| by_fr_id.get(&p)),
            ) else {
                continue;
            };
            match self.link_parent(child_id, parent_id).await {
                Ok(ParentLink::Linked) => result.parents_linked += 1,
                Ok(ParentLink::Unchanged) => {}
                Ok(ParentLink::WouldCycle) => result.add_error(format!(
                    "parent link for '{}' would create a cycle in the stored hierarchy",
                    agency.name
                )),
                Err(e) => result.add_error(format!("failed to link parent for '{}': {e}", agency.name)),
            }
        }
        Ok(())
    }

    async fn link_parent(&self, child_id: &Uuid, parent_id: &Uuid) -> Result<ParentLink, StoreError> {
        if child_id == parent_id {
            return Ok(ParentLink::Unchanged);
        }
        let mut stored: HashMap<Uuid, GovernmentOrganization> = self
            .organizations
            .all_organizations()
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        let (Some(child), Some(parent)) = (stored.get(child_id), stored.get(parent_id)) else {
            return Ok(ParentLink::Unchanged);
        };
        if child.parent_id.is_some() {
            return Ok(ParentLink::Unchanged);
        }
        if stored_ancestors(parent_id, &stored).contains(child_id) {
            return Ok(ParentLink::WouldCycle);
        }
        let level = parent.org_level + 1;

        if let Some(child) = stored.get_mut(child_id) {
            child.parent_id = Some(*parent_id);
            child.org_level = level;
        }
        for id in relevel_subtree(child_id, &mut stored) {
            if let Some(org) = stored.remove(&id) {
                self.organizations.save_organization(org).await?;
            }
        }
        Ok(ParentLink::Linked)
    }
}

enum ParentLink {
    Linked,
    Unchanged,
    WouldCycle,
}

/// Stored ancestors of `id`, nearest first. Stops at a stored cycle.
fn stored_ancestors(id: &Uuid, stored: &HashMap<Uuid, GovernmentOrganization>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut cursor = stored.get(id).and_then(|o| o.parent_id);
    while let Some(pid) = cursor {
        if !seen.insert(pid) {
            break;
        }
        out.push(pid);
        cursor = stored.get(&pid).and_then(|o| o.parent_id);
    }
    out
}

/// Sets every descendant of `root` to its parent's level + 1 (breadth first) and
/// returns the ids whose level changed, `root` included.
fn relevel_subtree(root: &Uuid, stored: &mut HashMap<Uuid, GovernmentOrganization>) -> Vec<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for org in stored.values() {
        if let Some(pid) = org.parent_id {
            children.entry(pid).or_default().push(org.id);
        }
    }

    let mut changed = vec![*root];
    let mut visited = HashSet::from([*root]);
    let mut queue = VecDeque::from([*root]);
    while let Some(id) = queue.pop_front() {
        let Some(level) = stored.get(&id).map(|o| o.org_level) else {
            continue;
        };
        for child in children.get(&id).into_iter().flatten() {
            if !visited.insert(*child) {
                continue;
            }
            if let Some(org) = stored.get_mut(child) {
                if org.org_level != level + 1 {
                    org.org_level = level + 1;
                    changed.push(*child);
                }
            }
            queue.push_back(*child);
        }
    }
    changed
}

fn fill_if_absent(slot: &mut Option<String>, incoming: &Option<String>) -> bool {
    let vacant = slot.as_deref().map_or(true, |s| s.trim().is_empty());
    match incoming.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(v) if vacant => {
            *slot = Some(v.to_string());
            true
        }
        _ => false,
    }
}

/// Number of upstream ancestors, or `None` on a parent cycle. A parent missing
/// from the list ends the chain.
fn upstream_depth(agency: &FederalRegisterAgency, upstream: &HashMap<u32, &FederalRegisterAgency>) -> Option<usize> {
    let mut depth = 0;
    let mut cursor = agency.parent_id;
    while let Some(pid) = cursor {
        if pid == agency.id || depth > upstream.len() {
            return None;
        }
        let Some(parent) = upstream.get(&pid) else {
            break;
        };
        depth += 1;
        cursor = parent.parent_id;
    }
    Some(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agency(id: u32, parent: Option<u32>) -> FederalRegisterAgency {
        FederalRegisterAgency {
            id,
            name: format!("Agency {id}"),
            short_name: None,
            url: None,
            agency_url: None,
            parent_id: parent,
            description: None,
            slug: None,
        }
    }

    #[test]
    fn depth_follows_parents_and_detects_cycles() {
        let list = vec![agency(1, None), agency(2, Some(1)), agency(3, Some(2)), agency(4, Some(5)), agency(5, Some(4))];
        let map: HashMap<u32, &FederalRegisterAgency> = list.iter().map(|a| (a.id, a)).collect();
        assert_eq!(upstream_depth(&list[0], &map), Some(0));
        assert_eq!(upstream_depth(&list[2], &map), Some(2));
        assert_eq!(upstream_depth(&list[3], &map), None);
        assert_eq!(upstream_depth(&agency(9, Some(77)), &map), Some(0));
    }

    #[test]
    fn relevel_walks_the_whole_subtree() {
        let root = GovernmentOrganization::new_root("Dept", None, OrganizationType::Department, GovernmentBranch::Executive);
        let mut mid = GovernmentOrganization::new_root("Bureau", None, OrganizationType::Bureau, GovernmentBranch::Executive);
        let leaf = GovernmentOrganization::new_child(&mid, "Office", None, OrganizationType::Office);
        mid.parent_id = Some(root.id);
        mid.org_level = 2;
        let mut stored: HashMap<Uuid, GovernmentOrganization> =
            [root.clone(), mid.clone(), leaf.clone()].into_iter().map(|o| (o.id, o)).collect();

        assert_eq!(stored_ancestors(&leaf.id, &stored), vec![mid.id, root.id]);
        let changed = relevel_subtree(&mid.id, &mut stored);
        assert_eq!(changed, vec![mid.id, leaf.id]);
        assert_eq!(stored[&leaf.id].org_level, 3);
    }

    #[test]
    fn fill_only_vacant_slots() {
        let mut slot = None;
        assert!(fill_if_absent(&mut slot, &Some(" EPA ".into())));
        assert_eq!(slot.as_deref(), Some("EPA"));
        assert!(!fill_if_absent(&mut slot, &Some("OTHER".into())));
        let mut blank = Some("  ".to_string());
        assert!(fill_if_absent(&mut blank, &Some("x".into())));
        assert!(!fill_if_absent(&mut blank, &None));
    }
}
