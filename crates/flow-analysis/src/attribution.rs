//! Direct vs indirect redemption attribution.
//!
//! One pass over the ledger in ledger order keeps, per `(user, token)`, a
//! count of reward credits not yet matched by a redemption. A redemption that
//! finds an unspent credit is **direct** and consumes it; otherwise it is
//! **indirect** (the user got the tokens some other way). Transfers and
//! swaps never create credits, so tokens that reached a user second-hand
//! always redeem as indirect.
//!
//! The pass reads the ledger, not the graph: the graph keeps one edge per
//! pair and would undercount repeated rewards.

use std::collections::HashMap;

use flow_data::{Event, EventLedger, TokenAction};
use serde::Serialize;

use crate::rank::{top_desc, Ranked};

/// Router bucket used when a redeem references an unregistered business.
pub const UNKNOWN_ROUTER: &str = "unknown";

/// Outcome for one redemption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribution {
    Direct,
    Indirect,
}

/// Classification of one redeem event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RedeemDecision {
    /// Position of the event in the ledger.
    pub position: usize,
    pub user: String,
    pub token: String,
    pub attribution: Attribution,
}

/// Direct/indirect split for one token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenSplit {
    pub direct: u64,
    pub indirect: u64,
}

impl TokenSplit {
    pub fn total(&self) -> u64 {
        self.direct + self.indirect
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CreditKey {
    user: String,
    token: String,
}

impl CreditKey {
    fn of(action: &TokenAction) -> Self {
        Self {
            user: action.user.clone(),
            token: action.token.clone(),
        }
    }
}

/// Result of the attribution pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RedemptionAttribution {
    /// Direct redemptions per user.
    pub direct: HashMap<String, u64>,
    /// Indirect redemptions per user.
    pub indirect: HashMap<String, u64>,
    /// Redemptions per redeem-router address.
    pub router_usage: HashMap<String, u64>,
    /// Direct/indirect split per token.
    pub by_token: HashMap<String, TokenSplit>,
    /// Every redemption in ledger order.
    pub decisions: Vec<RedeemDecision>,
}

impl RedemptionAttribution {
    pub fn total_direct(&self) -> u64 {
        self.direct.values().sum()
    }

    pub fn total_indirect(&self) -> u64 {
        self.indirect.values().sum()
    }

    pub fn direct_for(&self, user: &str) -> u64 {
        self.direct.get(user).copied().unwrap_or(0)
    }

    pub fn indirect_for(&self, user: &str) -> u64 {
        self.indirect.get(user).copied().unwrap_or(0)
    }

    pub fn top_direct(&self, top: usize) -> Vec<Ranked<u64>> {
        top_desc(self.direct.iter().map(|(k, &v)| (k.clone(), v)), top)
    }

    pub fn top_indirect(&self, top: usize) -> Vec<Ranked<u64>> {
        top_desc(self.indirect.iter().map(|(k, &v)| (k.clone(), v)), top)
    }

    /// Every router with its usage count, busiest first.
    pub fn router_table(&self) -> Vec<Ranked<u64>> {
        top_desc(
            self.router_usage.iter().map(|(k, &v)| (k.clone(), v)),
            self.router_usage.len(),
        )
    }
}

/// Stateful classifier fed one event at a time, in ledger order.
pub struct AttributionEngine<'l> {
    ledger: &'l EventLedger,
    credits: HashMap<CreditKey, u64>,
    report: RedemptionAttribution,
}

impl<'l> AttributionEngine<'l> {
    pub fn new(ledger: &'l EventLedger) -> Self {
        Self {
            ledger,
            credits: HashMap::new(),
            report: RedemptionAttribution::default(),
        }
    }

    /// Applies one event.
    pub fn observe(&mut self, position: usize, event: &Event) {
        match event {
            Event::Reward(reward) => {
                *self.credits.entry(CreditKey::of(reward)).or_default() += 1;
            }
            Event::Redeem(redeem) => self.redeem(position, redeem),
            Event::Transfer(_) | Event::Swap(_) | Event::Unknown => {}
        }
    }

    fn redeem(&mut self, position: usize, redeem: &TokenAction) {
        let attribution = match self.credits.get_mut(&CreditKey::of(redeem)) {
            Some(credits) if *credits > 0 => {
                *credits -= 1;
                Attribution::Direct
            }
            _ => Attribution::Indirect,
        };

        let split = self
            .report
            .by_token
            .entry(redeem.token.clone())
            .or_default();
        let per_user = match attribution {
            Attribution::Direct => {
                split.direct += 1;
                &mut self.report.direct
            }
            Attribution::Indirect => {
                split.indirect += 1;
                &mut self.report.indirect
            }
        };
        *per_user.entry(redeem.user.clone()).or_default() += 1;

        let router = self
            .ledger
            .business_by_owner(&redeem.business)
            .map(|b| b.redeem_router.clone())
            .unwrap_or_else(|| UNKNOWN_ROUTER.to_string());
        *self.report.router_usage.entry(router).or_default() += 1;

        self.report.decisions.push(RedeemDecision {
            position,
            user: redeem.user.clone(),
            token: redeem.token.clone(),
            attribution,
        });
    }

    /// Unspent credits still held for a user/token pair.
    pub fn outstanding(&self, user: &str, token: &str) -> u64 {
        self.credits
            .get(&CreditKey {
                user: user.to_string(),
                token: token.to_string(),
            })
            .copied()
            .unwrap_or(0)
    }

    pub fn finish(self) -> RedemptionAttribution {
        self.report
    }
}

/// Classifies every redemption in the ledger.
pub fn attribute_redemptions(ledger: &EventLedger) -> RedemptionAttribution {
    let mut engine = AttributionEngine::new(ledger);
    for (position, event) in ledger.events().iter().enumerate() {
        engine.observe(position, event);
    }
    let report = engine.finish();
    tracing::debug!(
        direct = report.total_direct(),
        indirect = report.total_indirect(),
        routers = report.router_usage.len(),
        "redemption attribution complete"
    );
    report
}
