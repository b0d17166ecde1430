// src/store.rs
//! Persistence collaborator: key-value upsert of persons, organizations and
//! regulations.
//!
//! Per-record atomicity only. `InMemoryStore` backs the binary (with a JSON
//! snapshot on disk) and the tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tokio::fs;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{GovernmentOrganization, Person, Regulation};
use crate::normalize::{normalize_acronym, normalize_name};

#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn find_person(&self, bioguide_id: &str) -> Result<Option<Person>, StoreError>;
    async fn save_person(&self, person: Person) -> Result<(), StoreError>;
    async fn all_persons(&self) -> Result<Vec<Person>, StoreError>;

    /// Read-modify-write of one person with no other writer in between.
    /// `update` sees the stored record (if any) and returns the replacement, or
    /// `None` to leave it as is. Returns what is stored afterwards.
    async fn update_person(
        &self,
        bioguide_id: &str,
        update: &mut (dyn for<'p> FnMut(Option<&'p Person>) -> Option<Person> + Send),
    ) -> Result<Option<Person>, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn find_organization(&self, id: &Uuid) -> Result<Option<GovernmentOrganization>, StoreError>;
    /// Case-insensitive; dots ignored.
    async fn find_organization_by_acronym(
        &self,
        acronym: &str,
    ) -> Result<Option<GovernmentOrganization>, StoreError>;
    /// Compared in normalized form.
    async fn find_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GovernmentOrganization>, StoreError>;
    async fn save_organization(&self, org: GovernmentOrganization) -> Result<(), StoreError>;
    async fn all_organizations(&self) -> Result<Vec<GovernmentOrganization>, StoreError>;
}

#[async_trait]
pub trait RegulationStore: Send + Sync {
    async fn find_regulation(&self, document_number: &str) -> Result<Option<Regulation>, StoreError>;
    async fn save_regulation(&self, regulation: Regulation) -> Result<(), StoreError>;
    async fn regulation_count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    persons: Vec<Person>,
    #[serde(default)]
    organizations: Vec<GovernmentOrganization>,
    #[serde(default)]
    regulations: Vec<Regulation>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    persons: RwLock<BTreeMap<String, Person>>,
    organizations: RwLock<BTreeMap<Uuid, GovernmentOrganization>>,
    regulations: RwLock<BTreeMap<String, Regulation>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Backend("store lock poisoned".into())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(persons: Vec<Person>, organizations: Vec<GovernmentOrganization>) -> Self {
        Self {
            persons: RwLock::new(persons.into_iter().map(|p| (p.bioguide_id.clone(), p)).collect()),
            organizations: RwLock::new(organizations.into_iter().map(|o| (o.id, o)).collect()),
            regulations: RwLock::default(),
        }
    }

    /// Missing file → empty store. Unreadable or malformed file → error, so a
    /// bad snapshot is never silently overwritten.
    pub async fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let data = match fs::read(path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(StoreError::Snapshot(format!("{}: {e}", path.display()))),
        };
        let snap: Snapshot = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        let store = Self::with_records(snap.persons, snap.organizations);
        *store.regulations.write().map_err(poisoned)? = snap
            .regulations
            .into_iter()
            .map(|r| (r.document_number.clone(), r))
            .collect();
        Ok(store)
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let snap = Snapshot {
            persons: self.persons.read().map_err(poisoned)?.values().cloned().collect(),
            organizations: self
                .organizations
                .read()
                .map_err(poisoned)?
                .values()
                .cloned()
                .collect(),
            regulations: self.regulations.read().map_err(poisoned)?.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snap).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::Snapshot(format!("{}: {e}", dir.display())))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl PersonStore for InMemoryStore {
    async fn find_person(&self, bioguide_id: &str) -> Result<Option<Person>, StoreError> {
        Ok(self.persons.read().map_err(poisoned)?.get(bioguide_id).cloned())
    }

    async fn save_person(&self, person: Person) -> Result<(), StoreError> {
        self.persons
            .write()
            .map_err(poisoned)?
            .insert(person.bioguide_id.clone(), person);
        Ok(())
    }

    async fn all_persons(&self) -> Result<Vec<Person>, StoreError> {
        Ok(self.persons.read().map_err(poisoned)?.values().cloned().collect())
    }

    async fn update_person(
        &self,
        bioguide_id: &str,
        update: &mut (dyn for<'p> FnMut(Option<&'p Person>) -> Option<Person> + Send),
    ) -> Result<Option<Person>, StoreError> {
        let mut persons = self.persons.write().map_err(poisoned)?;
        if let Some(next) = update(persons.get(bioguide_id)) {
            persons.insert(bioguide_id.to_string(), next);
        }
        Ok(persons.get(bioguide_id).cloned())
    }
}

#[async_trait]
impl OrganizationStore for InMemoryStore {
    async fn find_organization(&self, id: &Uuid) -> Result<Option<GovernmentOrganization>, StoreError> {
        Ok(self.organizations.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn find_organization_by_acronym(
        &self,
        acronym: &str,
    ) -> Result<Option<GovernmentOrganization>, StoreError> {
        let wanted = normalize_acronym(acronym);
        if wanted.is_empty() {
            return Ok(None);
        }
        let orgs = self.organizations.read().map_err(poisoned)?;
        Ok(orgs
            .values()
            .find(|o| o.acronym.as_deref().map(normalize_acronym).as_deref() == Some(wanted.as_str()))
            .cloned())
    }

    async fn find_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GovernmentOrganization>, StoreError> {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return Ok(None);
        }
        let orgs = self.organizations.read().map_err(poisoned)?;
        Ok(orgs
            .values()
            .find(|o| normalize_name(&o.official_name) == wanted)
            .cloned())
    }

    async fn save_organization(&self, org: GovernmentOrganization) -> Result<(), StoreError> {
        self.organizations.write().map_err(poisoned)?.insert(org.id, org);
        Ok(())
    }

    async fn all_organizations(&self) -> Result<Vec<GovernmentOrganization>, StoreError> {
        Ok(self
            .organizations
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RegulationStore for InMemoryStore {
    async fn find_regulation(&self, document_number: &str) -> Result<Option<Regulation>, StoreError> {
        Ok(self.regulations.read().map_err(poisoned)?.get(document_number).cloned())
    }

    async fn save_regulation(&self, regulation: Regulation) -> Result<(), StoreError> {
        self.regulations
            .write()
            .map_err(poisoned)?
            .insert(regulation.document_number.clone(), regulation);
        Ok(())
    }

    async fn regulation_count(&self) -> Result<usize, StoreError> {
        Ok(self.regulations.read().map_err(poisoned)?.len())
    }
}
