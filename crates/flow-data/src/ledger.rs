//! Immutable ledger snapshot for one analysis run.
//!
//! The snapshot keeps the registry of businesses and users alongside the
//! ordered event list. Business lookups by owner, brand, and token are
//! case-insensitive because producers mix checksummed and lowercase hex.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Account, Business, Event, Role};

/// Raw on-disk layout of a ledger: `{ businesses, users, events }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub businesses: Vec<Business>,
    #[serde(default)]
    pub users: Vec<Account>,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Read-only ledger with registry indexes.
#[derive(Clone, Debug)]
pub struct EventLedger {
    businesses: Vec<Business>,
    users: Vec<Account>,
    events: Vec<Event>,
    by_owner: HashMap<String, usize>,
    by_brand: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
}

impl From<LedgerSnapshot> for EventLedger {
    fn from(snapshot: LedgerSnapshot) -> Self {
        Self::new(snapshot.businesses, snapshot.users, snapshot.events)
    }
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }
}

impl EventLedger {
    /// Builds a ledger and its lookup indexes.
    ///
    /// When two businesses share an owner, brand, or token, the first
    /// registration wins the index slot.
    pub fn new(businesses: Vec<Business>, users: Vec<Account>, events: Vec<Event>) -> Self {
        let mut by_owner = HashMap::new();
        let mut by_brand = HashMap::new();
        let mut by_token = HashMap::new();

        for (ix, biz) in businesses.iter().enumerate() {
            by_owner.entry(biz.owner.to_lowercase()).or_insert(ix);
            by_token.entry(biz.token.to_lowercase()).or_insert(ix);
            if !biz.brand.is_empty() {
                by_brand.entry(biz.brand.to_lowercase()).or_insert(ix);
            }
        }

        Self {
            businesses,
            users,
            events,
            by_owner,
            by_brand,
            by_token,
        }
    }

    pub fn businesses(&self) -> &[Business] {
        &self.businesses
    }

    pub fn users(&self) -> &[Account] {
        &self.users
    }

    /// Events in ledger order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// True when there is nothing to analyze.
    pub fn is_empty(&self) -> bool {
        self.businesses.is_empty() || self.events.is_empty()
    }

    pub fn business_by_owner(&self, owner: &str) -> Option<&Business> {
        self.by_owner
            .get(&owner.to_lowercase())
            .map(|&ix| &self.businesses[ix])
    }

    pub fn business_by_brand(&self, brand: &str) -> Option<&Business> {
        self.by_brand
            .get(&brand.to_lowercase())
            .map(|&ix| &self.businesses[ix])
    }

    pub fn business_by_token(&self, token: &str) -> Option<&Business> {
        self.by_token
            .get(&token.to_lowercase())
            .map(|&ix| &self.businesses[ix])
    }

    /// Registry role of an address. Business ownership takes precedence
    /// over a user registration of the same address.
    pub fn role_of(&self, address: &str) -> Option<Role> {
        if self.business_by_owner(address).is_some() {
            Some(Role::BusinessOwner)
        } else if self.users.iter().any(|u| u.address.eq_ignore_ascii_case(address)) {
            Some(Role::User)
        } else {
            None
        }
    }

    /// Clones the ledger back into its serializable layout.
    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            businesses: self.businesses.clone(),
            users: self.users.clone(),
            events: self.events.clone(),
        }
    }
}
