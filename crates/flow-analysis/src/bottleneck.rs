//! Flow bottlenecks: routers that absorb more than they release, tokens
//! that never circulate, and participants who only receive.

use std::collections::{HashMap, HashSet};

use flow_data::{Amount, Event, EventLedger};
use serde::Serialize;

use crate::attribution::UNKNOWN_ROUTER;
use crate::centrality::degrees;
use crate::config::AnalysisConfig;
use crate::graph::TokenFlowGraph;

/// Amount flowing through one router address.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouterFlow {
    pub router: String,
    pub inbound: Amount,
    pub outbound: Amount,
    /// `outbound / inbound`, or 0 when nothing came in.
    pub ratio: f64,
}

/// A business token never moved by a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StagnantToken {
    pub token: String,
    pub brand: String,
}

/// A participant with incoming edges and no outgoing ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TerminalHolder {
    pub address: String,
    pub incoming_edges: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BottleneckReport {
    pub routers: Vec<RouterFlow>,
    pub stagnant_tokens: Vec<StagnantToken>,
    pub terminal_holders: Vec<TerminalHolder>,
}

impl BottleneckReport {
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.stagnant_tokens.is_empty() && self.terminal_holders.is_empty()
    }
}

/// Insertion-ordered router table.
#[derive(Default)]
struct RouterBook {
    index: HashMap<String, usize>,
    rows: Vec<(String, Amount, Amount)>,
}

impl RouterBook {
    fn slot(&mut self, router: &str) -> &mut (String, Amount, Amount) {
        let next = self.rows.len();
        let ix = *self.index.entry(router.to_string()).or_insert(next);
        if ix == next {
            self.rows.push((router.to_string(), 0.0, 0.0));
        }
        &mut self.rows[ix]
    }
}

/// Inbound (redeemed) and outbound (rewarded) amounts per router, lowest
/// `outbound / inbound` first, truncated to `top`.
///
/// Every business's redeem router is listed even without traffic. Reward
/// routers join the table on their first reward.
pub fn router_flows(ledger: &EventLedger, top: usize) -> Vec<RouterFlow> {
    let mut book = RouterBook::default();
    for biz in ledger.businesses() {
        book.slot(&biz.redeem_router);
    }

    for event in ledger.events() {
        match event {
            Event::Redeem(redeem) => {
                let router = ledger
                    .business_by_owner(&redeem.business)
                    .map_or(UNKNOWN_ROUTER, |b| b.redeem_router.as_str());
                book.slot(router).1 += redeem.amount;
            }
            Event::Reward(reward) => {
                let router = ledger
                    .business_by_owner(&reward.business)
                    .map_or(UNKNOWN_ROUTER, |b| b.reward_router.as_str());
                book.slot(router).2 += reward.amount;
            }
            _ => {}
        }
    }

    let mut flows: Vec<RouterFlow> = book
        .rows
        .into_iter()
        .map(|(router, inbound, outbound)| RouterFlow {
            ratio: if inbound == 0.0 {
                0.0
            } else {
                outbound / inbound
            },
            router,
            inbound,
            outbound,
        })
        .collect();
    // stable: equal ratios keep table order
    flows.sort_by(|a, b| a.ratio.total_cmp(&b.ratio));
    flows.truncate(top);
    flows
}

/// Businesses whose token is never the token of a transfer, in registry order.
pub fn stagnant_tokens(ledger: &EventLedger) -> Vec<StagnantToken> {
    let moved: HashSet<String> = ledger
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Transfer(t) => Some(t.token.to_lowercase()),
            _ => None,
        })
        .collect();

    ledger
        .businesses()
        .iter()
        .filter(|b| !moved.contains(&b.token.to_lowercase()))
        .map(|b| StagnantToken {
            token: b.token.clone(),
            brand: b.brand.clone(),
        })
        .collect()
}

/// Nodes with `in_degree > 0` and `out_degree == 0`, most incoming edges
/// first, truncated to `top`.
pub fn terminal_holders(graph: &TokenFlowGraph, top: usize) -> Vec<TerminalHolder> {
    let mut holders: Vec<TerminalHolder> = degrees(graph)
        .into_iter()
        .filter(|d| d.in_degree > 0 && d.out_degree == 0)
        .map(|d| TerminalHolder {
            address: d.address,
            incoming_edges: d.in_degree,
        })
        .collect();
    holders.sort_by(|a, b| {
        b.incoming_edges
            .cmp(&a.incoming_edges)
            .then_with(|| a.address.cmp(&b.address))
    });
    holders.truncate(top);
    holders
}

/// All three bottleneck tables.
pub fn bottlenecks(
    ledger: &EventLedger,
    graph: &TokenFlowGraph,
    config: &AnalysisConfig,
) -> BottleneckReport {
    let report = BottleneckReport {
        routers: router_flows(ledger, config.top),
        stagnant_tokens: stagnant_tokens(ledger),
        terminal_holders: terminal_holders(graph, config.top),
    };
    tracing::debug!(
        routers = report.routers.len(),
        stagnant = report.stagnant_tokens.len(),
        holders = report.terminal_holders.len(),
        "bottleneck report complete"
    );
    report
}
