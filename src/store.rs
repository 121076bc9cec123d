//! Record store handed to the persistence layer.
//!
//! Holds only [`WireRecord`]s; sensitive fields are opaque envelope strings
//! and are never inspected here.

use crate::error::StoreError;
use crate::gate::TwoFactorEnrollment;
use crate::record::WireRecord;
use crate::throttle::AttemptLimiter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Version of the store file layout.
pub const STORE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    version: u32,
    creation_date: DateTime<Utc>,
    #[serde(default)]
    records: HashMap<String, WireRecord>,
    #[serde(default)]
    accounts: HashMap<String, Account>,
}

/// Per-owner state that is not part of any item.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Envelope of a fixed marker, sealed with the master password on first
    /// login and used to check it on later ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_check: Option<String>,
    #[serde(default)]
    pub two_factor: TwoFactorEnrollment,
    #[serde(default)]
    pub attempts: AttemptLimiter,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            version: STORE_VERSION,
            creation_date: Utc::now(),
            records: HashMap::new(),
            accounts: HashMap::new(),
        }
    }

    pub fn insert(&mut self, record: WireRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.id) {
            Err(StoreError::RecordAlreadyExists(record.id))
        } else {
            self.records.insert(record.id.clone(), record);
            Ok(())
        }
    }

    /// Looks up a record by id, visible only to its owner.
    pub fn get(&self, id: &str, owner_id: &str) -> Option<&WireRecord> {
        self.records.get(id).filter(|r| r.owner_id == owner_id)
    }

    /// Replaces an existing record. The owner cannot change.
    pub fn replace(&mut self, record: WireRecord) -> Result<(), StoreError> {
        match self.records.get_mut(&record.id) {
            Some(existing) if existing.owner_id == record.owner_id => {
                *existing = record;
                Ok(())
            }
            _ => Err(StoreError::RecordNotFound(record.id)),
        }
    }

    pub fn remove(&mut self, id: &str, owner_id: &str) -> Result<(), StoreError> {
        if self.get(id, owner_id).is_none() {
            return Err(StoreError::RecordNotFound(id.to_string()));
        }
        self.records.remove(id);
        Ok(())
    }

    pub fn records_for<'a>(&'a self, owner_id: &'a str) -> impl Iterator<Item = &'a WireRecord> {
        self.records.values().filter(move |r| r.owner_id == owner_id)
    }

    pub fn account(&self, owner_id: &str) -> Option<&Account> {
        self.accounts.get(owner_id)
    }

    pub fn account_mut(&mut self, owner_id: &str) -> &mut Account {
        self.accounts.entry(owner_id.to_string()).or_default()
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(id: &str, owner: &str) -> WireRecord {
        let now = Utc::now();
        WireRecord {
            id: id.into(),
            owner_id: owner.into(),
            title: "s:c".into(),
            username: "s:c".into(),
            secret: "s:c".into(),
            url: String::new(),
            notes: String::new(),
            category: "General".into(),
            is_favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_new_store_works() {
        let store = Store::new();
        assert!(store.is_empty());
        assert_eq!(store.version, STORE_VERSION);
    }

    #[test]
    fn insert_and_get_works() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        assert_eq!(store.get("A", "alice").unwrap().id, "A");
    }

    #[test]
    fn insert_existing_id_fails() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        match store.insert(wire("A", "alice")) {
            Err(StoreError::RecordAlreadyExists(k)) => assert_eq!(k, "A"),
            other => panic!("expected RecordAlreadyExists, got: {other:?}"),
        }
    }

    #[test]
    fn records_are_invisible_to_other_owners() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        store.insert(wire("B", "bob")).unwrap();

        assert!(store.get("A", "bob").is_none());
        let ids: Vec<_> = store.records_for("alice").map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["A"]);
    }

    #[test]
    fn replace_cannot_change_owner() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        assert_eq!(
            store.replace(wire("A", "mallory")),
            Err(StoreError::RecordNotFound("A".into()))
        );
        assert_eq!(store.get("A", "alice").unwrap().owner_id, "alice");
    }

    #[test]
    fn replace_not_existing_record_fails() {
        let mut store = Store::new();
        match store.replace(wire("A", "alice")) {
            Err(StoreError::RecordNotFound(k)) => assert_eq!(k, "A"),
            other => panic!("expected RecordNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn remove_checks_owner() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        assert!(store.remove("A", "bob").is_err());
        store.remove("A", "alice").unwrap();
        assert!(store.get("A", "alice").is_none());
    }

    #[test]
    fn accounts_are_created_on_demand() {
        let mut store = Store::new();
        assert!(store.account("alice").is_none());
        store.account_mut("alice").attempts.record_success();
        assert!(!store.account("alice").unwrap().two_factor.is_enabled());
    }

    #[test]
    fn store_survives_json_roundtrip() {
        let mut store = Store::new();
        store.insert(wire("A", "alice")).unwrap();
        store.account_mut("alice");

        let json = serde_json::to_vec(&store).unwrap();
        let back: Store = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.get("A", "alice"), store.get("A", "alice"));
        assert!(back.account("alice").is_some());
    }
}
