//! Shared test helpers and utilities.
//!
//! Factory functions for ledger fixtures with sensible defaults, plus a
//! small builder so each test only spells out the events it cares about.

#![allow(dead_code)]

use flow_data::store::Store;
use flow_data::{Account, Business, Event, EventLedger, Swap, TokenAction, Transfer};

/// Creates an in-memory SQLite Store with all migrations applied.
///
/// # Panics
/// Panics if the in-memory database cannot be created (should never happen).
pub fn test_store() -> Store {
    Store::new(":memory:").expect("in-memory store should always open")
}

/// Creates a business whose routers are derived from the owner address.
///
/// # Example
/// ```ignore
/// let b = sample_business("B", "X");
/// assert_eq!(b.redeem_router, "B-redeem");
/// ```
pub fn sample_business(owner: &str, token: &str) -> Business {
    Business {
        owner: owner.to_string(),
        token: token.to_string(),
        reward_router: format!("{owner}-reward"),
        redeem_router: format!("{owner}-redeem"),
        brand: format!("{owner} Brand"),
        token_name: format!("{token} Points"),
        token_price: Some(1.0),
    }
}

pub fn reward(business: &str, user: &str, token: &str, amount: f64) -> Event {
    Event::Reward(TokenAction {
        business: business.to_string(),
        user: user.to_string(),
        token: token.to_string(),
        amount,
    })
}

pub fn redeem(business: &str, user: &str, token: &str, amount: f64) -> Event {
    Event::Redeem(TokenAction {
        business: business.to_string(),
        user: user.to_string(),
        token: token.to_string(),
        amount,
    })
}

pub fn transfer(from: &str, to: &str, token: &str, amount: f64) -> Event {
    Event::Transfer(Transfer {
        from: from.to_string(),
        to: to.to_string(),
        token: token.to_string(),
        amount,
        business: None,
    })
}

/// Swap of `from_amount` of `from_token` against `to_amount` of `to_token`.
pub fn swap(
    from_user: &str,
    (from_business, from_token, from_amount): (&str, &str, f64),
    to_user: &str,
    (to_business, to_token, to_amount): (&str, &str, f64),
) -> Event {
    Event::Swap(Swap {
        from_user: from_user.to_string(),
        from_token: from_token.to_string(),
        from_business: from_business.to_string(),
        from_amount,
        to_user: to_user.to_string(),
        to_token: to_token.to_string(),
        to_business: to_business.to_string(),
        to_amount,
    })
}

/// Incremental ledger fixture.
#[derive(Default)]
pub struct LedgerBuilder {
    businesses: Vec<Business>,
    users: Vec<Account>,
    events: Vec<Event>,
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn business(mut self, owner: &str, token: &str) -> Self {
        self.businesses.push(sample_business(owner, token));
        self
    }

    pub fn users(mut self, addrs: &[&str]) -> Self {
        self.users.extend(addrs.iter().map(|a| Account::new(*a)));
        self
    }

    pub fn event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn build(self) -> EventLedger {
        EventLedger::new(self.businesses, self.users, self.events)
    }
}

/// Deterministic pseudo-random ledger: two businesses, `users` users and
/// `events` mixed events (rewards, redeems, transfers, swaps).
pub fn mixed_ledger(users: usize, events: usize, seed: u64) -> EventLedger {
    let names: Vec<String> = (0..users).map(|i| format!("U{i}")).collect();
    let mut state = seed.max(1);
    let mut next = move |bound: usize| {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % bound as u64) as usize
    };

    let biz = [("B1", "X"), ("B2", "Y")];
    let mut out = Vec::with_capacity(events);
    for _ in 0..events {
        let (owner, token) = biz[next(2)];
        let a = &names[next(users)];
        let b = &names[next(users)];
        let amount = next(100) as f64 + 1.0;
        let event = match next(4) {
            0 => reward(owner, a, token, amount),
            1 => redeem(owner, a, token, amount),
            2 => transfer(a, b, token, amount),
            _ => swap(a, ("B1", "X", amount), b, ("B2", "Y", (amount / 2.0).floor() + 1.0)),
        };
        out.push(event);
    }

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    LedgerBuilder::new()
        .business("B1", "X")
        .business("B2", "Y")
        .users(&refs)
        .events(out)
        .build()
}

/// Every user rewarded in `token`, then a transfer between every ordered pair.
pub fn complete_ledger(n: usize, token: &str) -> EventLedger {
    let names: Vec<String> = (0..n).map(|i| format!("N{i}")).collect();
    let mut events: Vec<Event> = names.iter().map(|u| reward("B", u, token, 10.0)).collect();
    for from in &names {
        for to in &names {
            if from != to {
                events.push(transfer(from, to, token, 1.0));
            }
        }
    }
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    LedgerBuilder::new()
        .business("B", token)
        .users(&refs)
        .events(events)
        .build()
}
