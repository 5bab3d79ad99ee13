//! Ledger-based activity reports.
//!
//! Everything here folds [`Event::legs`] straight from the ledger, so
//! repeated movements on one pair are summed rather than collapsed the way
//! the graph collapses them.

use std::collections::HashMap;

use flow_data::{Amount, Business, Event, EventKind, EventLedger, Role};
use serde::Serialize;

use crate::rank::{top_desc, Ranked};

/// Brand shown for tokens that resolve to no registered business.
pub const UNKNOWN_BUSINESS: &str = "Unknown Business";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ActivityKey {
    participant: String,
    token: String,
}

/// Per-participant totals for one token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenActivity {
    pub rewarded: Amount,
    pub redeemed: Amount,
    pub transferred_in: Amount,
    pub transferred_out: Amount,
    pub swapped_in: Amount,
    pub swapped_out: Amount,
}

/// How a user engages with a business token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Behaviour {
    /// Swaps the token.
    MarketParticipant,
    /// Transfers the token peer to peer but never swaps it.
    EcosystemParticipant,
    /// Only rewards and redemptions.
    DirectCustomer,
}

/// Sign of the on-hand balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Holding {
    Holder,
    Empty,
    /// More left than came in: activity predates the data window.
    Negative,
}

impl TokenActivity {
    pub fn total_in(&self) -> Amount {
        self.rewarded + self.transferred_in + self.swapped_in
    }

    pub fn total_out(&self) -> Amount {
        self.redeemed + self.transferred_out + self.swapped_out
    }

    /// On-hand balance, `total_in - total_out`.
    pub fn balance(&self) -> Amount {
        self.total_in() - self.total_out()
    }

    pub fn behaviour(&self) -> Behaviour {
        if self.swapped_in > 0.0 || self.swapped_out > 0.0 {
            Behaviour::MarketParticipant
        } else if self.transferred_in > 0.0 || self.transferred_out > 0.0 {
            Behaviour::EcosystemParticipant
        } else {
            Behaviour::DirectCustomer
        }
    }

    pub fn holding(&self) -> Holding {
        let balance = self.balance();
        if balance > 0.0 {
            Holding::Holder
        } else if balance == 0.0 {
            Holding::Empty
        } else {
            Holding::Negative
        }
    }

    /// True when any counter is non-zero.
    pub fn is_active(&self) -> bool {
        self.total_in() > 0.0 || self.total_out() > 0.0
    }
}

/// Activity of every participant, per token.
#[derive(Clone, Debug, Default)]
pub struct ActivityLedger {
    entries: HashMap<ActivityKey, TokenActivity>,
}

impl ActivityLedger {
    pub fn from_ledger(ledger: &EventLedger) -> Self {
        let mut this = Self::default();
        for leg in ledger.events().iter().flat_map(Event::legs) {
            let amount = leg.amount;
            match leg.kind {
                EventKind::Reward => this.slot(leg.to, leg.token).rewarded += amount,
                EventKind::Redeem => this.slot(leg.from, leg.token).redeemed += amount,
                EventKind::Transfer => {
                    this.slot(leg.from, leg.token).transferred_out += amount;
                    this.slot(leg.to, leg.token).transferred_in += amount;
                }
                EventKind::Swap => {
                    this.slot(leg.from, leg.token).swapped_out += amount;
                    this.slot(leg.to, leg.token).swapped_in += amount;
                }
            }
        }
        this
    }

    fn slot(&mut self, participant: &str, token: &str) -> &mut TokenActivity {
        self.entries
            .entry(ActivityKey {
                participant: participant.to_string(),
                token: token.to_string(),
            })
            .or_default()
    }

    pub fn get(&self, participant: &str, token: &str) -> Option<&TokenActivity> {
        self.entries.get(&ActivityKey {
            participant: participant.to_string(),
            token: token.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(participant, token, activity)` sorted by participant then token.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &TokenActivity)> {
        let mut keys: Vec<&ActivityKey> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(move |k| (k.participant.as_str(), k.token.as_str(), &self.entries[k]))
    }
}

/// One user's line in a business activity report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserActivity {
    pub user: String,
    pub activity: TokenActivity,
    pub balance: Amount,
    pub behaviour: Behaviour,
    pub holding: Holding,
}

/// Users active in one business's token.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusinessActivity {
    pub owner: String,
    pub brand: String,
    pub token: String,
    /// Empty when nobody touched the token.
    pub users: Vec<UserActivity>,
}

fn activity_for(
    business: &Business,
    ledger: &EventLedger,
    activity: &ActivityLedger,
) -> BusinessActivity {
    let users = activity
        .iter()
        .filter(|(participant, token, a)| {
            token.eq_ignore_ascii_case(&business.token)
                && a.is_active()
                && ledger.role_of(participant) != Some(Role::BusinessOwner)
        })
        .map(|(participant, _, a)| UserActivity {
            user: participant.to_string(),
            activity: *a,
            balance: a.balance(),
            behaviour: a.behaviour(),
            holding: a.holding(),
        })
        .collect();

    BusinessActivity {
        owner: business.owner.clone(),
        brand: business.brand.clone(),
        token: business.token.clone(),
        users,
    }
}

/// Activity report for every registered business, in registry order.
pub fn business_activity(ledger: &EventLedger) -> Vec<BusinessActivity> {
    let activity = ActivityLedger::from_ledger(ledger);
    ledger
        .businesses()
        .iter()
        .map(|b| activity_for(b, ledger, &activity))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PairKey {
    from: String,
    to: String,
    token: String,
}

/// Summed movements on one `(from, to, token)` triple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PairFlow {
    pub amount: Amount,
    pub count: usize,
}

/// Ledger totals per ordered pair and token.
#[derive(Clone, Debug, Default)]
pub struct PairFlows {
    flows: HashMap<PairKey, PairFlow>,
}

impl PairFlows {
    pub fn from_ledger(ledger: &EventLedger) -> Self {
        let mut flows: HashMap<PairKey, PairFlow> = HashMap::new();
        for leg in ledger.events().iter().flat_map(Event::legs) {
            let flow = flows
                .entry(PairKey {
                    from: leg.from.to_string(),
                    to: leg.to.to_string(),
                    token: leg.token.to_string(),
                })
                .or_default();
            flow.amount += leg.amount;
            flow.count += 1;
        }
        Self { flows }
    }

    pub fn get(&self, from: &str, to: &str, token: &str) -> Option<PairFlow> {
        self.flows
            .get(&PairKey {
                from: from.to_string(),
                to: to.to_string(),
                token: token.to_string(),
            })
            .copied()
    }

    /// Amount moved from `from` to `to` in `token`.
    pub fn total_for(&self, from: &str, to: &str, token: &str) -> Amount {
        self.get(from, to, token).map_or(0.0, |f| f.amount)
    }

    /// Amount moved from `from` to `to` across every token.
    pub fn total(&self, from: &str, to: &str) -> Amount {
        self.flows
            .iter()
            .filter(|(k, _)| k.from == from && k.to == to)
            .map(|(_, f)| f.amount)
            .sum()
    }

    /// Everything received minus everything sent in `token`.
    pub fn net_position(&self, participant: &str, token: &str) -> Amount {
        self.flows
            .iter()
            .filter(|(k, _)| k.token == token)
            .map(|(k, f)| match (k.to == participant, k.from == participant) {
                (true, false) => f.amount,
                (false, true) => -f.amount,
                _ => 0.0,
            })
            .sum()
    }

    /// `(from, to, token, flow)` rows, largest amount first.
    pub fn rows(&self) -> Vec<(&str, &str, &str, PairFlow)> {
        let mut rows: Vec<_> = self
            .flows
            .iter()
            .map(|(k, f)| (k.from.as_str(), k.to.as_str(), k.token.as_str(), *f))
            .collect();
        rows.sort_by(|a, b| {
            b.3.amount
                .total_cmp(&a.3.amount)
                .then_with(|| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)))
        });
        rows
    }
}

/// Most active participants, read from the ledger.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MostActive {
    /// Total amount received through rewards.
    pub reward_receivers: Vec<Ranked<Amount>>,
    /// Total amount redeemed.
    pub redeemers: Vec<Ranked<Amount>>,
    /// Number of transfers sent.
    pub transfer_senders: Vec<Ranked<usize>>,
}

pub fn most_active(ledger: &EventLedger, top: usize) -> MostActive {
    let mut rewarded: HashMap<&str, Amount> = HashMap::new();
    let mut redeemed: HashMap<&str, Amount> = HashMap::new();
    let mut sent: HashMap<&str, usize> = HashMap::new();

    for event in ledger.events() {
        match event {
            Event::Reward(r) => *rewarded.entry(&r.user).or_default() += r.amount,
            Event::Redeem(r) => *redeemed.entry(&r.user).or_default() += r.amount,
            Event::Transfer(t) => *sent.entry(&t.from).or_default() += 1,
            Event::Swap(_) | Event::Unknown => {}
        }
    }

    fn owned<'a, V: 'a>(m: HashMap<&'a str, V>) -> impl Iterator<Item = (String, V)> + 'a {
        m.into_iter().map(|(k, v)| (k.to_string(), v))
    }

    MostActive {
        reward_receivers: top_desc(owned(rewarded), top),
        redeemers: top_desc(owned(redeemed), top),
        transfer_senders: top_desc(owned(sent), top),
    }
}

/// A participant that redeemed more of a token than it was rewarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RedemptionAnomaly {
    pub user: String,
    pub token: String,
    pub brand: String,
    pub rewarded: Amount,
    pub redeemed: Amount,
    pub excess: Amount,
}

/// Every `(participant, token)` with `redeemed > rewarded`, largest excess first.
pub fn redemption_anomalies(ledger: &EventLedger) -> Vec<RedemptionAnomaly> {
    let activity = ActivityLedger::from_ledger(ledger);
    let mut anomalies: Vec<RedemptionAnomaly> = activity
        .iter()
        .filter(|(_, _, a)| a.redeemed > a.rewarded)
        .map(|(user, token, a)| RedemptionAnomaly {
            user: user.to_string(),
            token: token.to_string(),
            brand: ledger
                .business_by_token(token)
                .map_or_else(|| UNKNOWN_BUSINESS.to_string(), |b| b.brand.clone()),
            rewarded: a.rewarded,
            redeemed: a.redeemed,
            excess: a.redeemed - a.rewarded,
        })
        .collect();
    // iter() is already ordered by (user, token); stable sort keeps that for ties
    anomalies.sort_by(|a, b| b.excess.total_cmp(&a.excess));
    anomalies
}
