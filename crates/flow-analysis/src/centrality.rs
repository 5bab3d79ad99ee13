//! Degree centrality and amount-weighted PageRank.
//!
//! Both read the collapsed graph, so degrees count distinct channels rather
//! than transactions, and PageRank weights use the last amount seen on a
//! channel. Scores are a ranking signal for reports, not a converged
//! stationary distribution: the iteration count is fixed.

use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::graph::TokenFlowGraph;
use crate::rank::{top_desc, Ranked};

/// In/out edge counts for one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Degree {
    pub address: String,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// Degree of every node, indexed like the graph's nodes.
pub fn degrees(graph: &TokenFlowGraph) -> Vec<Degree> {
    let mut out: Vec<Degree> = graph
        .graph
        .node_weights()
        .map(|p| Degree {
            address: p.address.clone(),
            in_degree: 0,
            out_degree: 0,
        })
        .collect();

    for edge in graph.graph.edge_references() {
        out[edge.source().index()].out_degree += 1;
        out[edge.target().index()].in_degree += 1;
    }
    out
}

/// Iterative PageRank state.
///
/// Each step starts every node at `(1 - d) / N`, pushes
/// `d * score[v] * amount / out_degree(v)` along every edge `v -> w`, then
/// renormalizes so the scores sum to one. Nodes without outgoing edges use
/// an out-degree of one.
pub struct PageRank<'g> {
    graph: &'g TokenFlowGraph,
    damping: f64,
    out_degree: Vec<f64>,
    scores: Vec<f64>,
    iterations: usize,
}

impl<'g> PageRank<'g> {
    pub fn new(graph: &'g TokenFlowGraph, damping: f64) -> Self {
        let n = graph.node_count();
        let mut out_degree = vec![0.0_f64; n];
        for edge in graph.graph.edge_references() {
            out_degree[edge.source().index()] += 1.0;
        }
        for d in &mut out_degree {
            if *d == 0.0 {
                *d = 1.0;
            }
        }

        Self {
            graph,
            damping,
            out_degree,
            scores: vec![1.0 / n.max(1) as f64; n],
            iterations: 0,
        }
    }

    /// Runs one iteration.
    pub fn step(&mut self) {
        let n = self.scores.len();
        if n == 0 {
            return;
        }

        let base = (1.0 - self.damping) / n as f64;
        let mut next = vec![base; n];
        for edge in self.graph.graph.edge_references() {
            let v = edge.source().index();
            let w = edge.target().index();
            let weight = edge.weight().amount;
            next[w] += self.damping * self.scores[v] * weight / self.out_degree[v];
        }

        let norm: f64 = next.iter().sum();
        if norm > 0.0 && norm.is_finite() {
            for score in &mut next {
                *score /= norm;
            }
        } else {
            // Nothing flowed (damping 1 over zero-amount edges): fall back to uniform.
            next.fill(1.0 / n as f64);
        }

        self.scores = next;
        self.iterations += 1;
    }

    /// Runs `iterations` steps.
    pub fn run(mut self, iterations: usize) -> Self {
        for _ in 0..iterations {
            self.step();
        }
        self
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Address/score pairs in node order.
    pub fn by_address(&self) -> Vec<(String, f64)> {
        self.graph
            .graph
            .node_weights()
            .zip(&self.scores)
            .map(|(p, &s)| (p.address.clone(), s))
            .collect()
    }
}

/// Influence tables for the report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InfluenceReport {
    pub page_rank: Vec<Ranked<f64>>,
    pub in_degree: Vec<Ranked<usize>>,
    pub out_degree: Vec<Ranked<usize>>,
}

/// PageRank plus in/out degree rankings, `config.top` rows each.
pub fn influence(graph: &TokenFlowGraph, config: &AnalysisConfig) -> InfluenceReport {
    let ranks = PageRank::new(graph, config.damping).run(config.iterations);
    let degree = degrees(graph);

    InfluenceReport {
        page_rank: top_desc(ranks.by_address(), config.top),
        in_degree: top_desc(
            degree.iter().map(|d| (d.address.clone(), d.in_degree)),
            config.top,
        ),
        out_degree: top_desc(
            degree.iter().map(|d| (d.address.clone(), d.out_degree)),
            config.top,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_data::{Account, Business, Event, EventLedger, TokenAction, Transfer};

    fn biz(owner: &str, token: &str) -> Business {
        Business {
            owner: owner.to_string(),
            token: token.to_string(),
            reward_router: format!("{owner}-rw"),
            redeem_router: format!("{owner}-rd"),
            brand: owner.to_string(),
            token_name: String::new(),
            token_price: None,
        }
    }

    fn transfer(from: &str, to: &str, amount: f64) -> Event {
        Event::Transfer(Transfer {
            from: from.to_string(),
            to: to.to_string(),
            token: "X".to_string(),
            amount,
            business: None,
        })
    }

    fn star_ledger() -> EventLedger {
        // B rewards U1..U3; everyone forwards to HUB; LONER never trades.
        let mut events = Vec::new();
        for u in ["U1", "U2", "U3"] {
            events.push(Event::Reward(TokenAction {
                business: "B".into(),
                user: u.into(),
                token: "X".into(),
                amount: 10.0,
            }));
            events.push(transfer(u, "HUB", 10.0));
        }
        EventLedger::new(
            vec![biz("B", "X")],
            ["U1", "U2", "U3", "HUB", "LONER"]
                .iter()
                .map(|a| Account::new(*a))
                .collect(),
            events,
        )
    }

    #[test]
    fn degrees_include_isolated_nodes() {
        let graph = TokenFlowGraph::from_ledger(&star_ledger());
        let degree = degrees(&graph);

        let hub = degree.iter().find(|d| d.address == "HUB").expect("hub");
        assert_eq!((hub.in_degree, hub.out_degree), (3, 0));
        let b = degree.iter().find(|d| d.address == "B").expect("business");
        assert_eq!((b.in_degree, b.out_degree), (0, 3));
        let loner = degree.iter().find(|d| d.address == "LONER").expect("loner");
        assert_eq!((loner.in_degree, loner.out_degree), (0, 0));
    }

    #[test]
    fn scores_sum_to_one_after_every_iteration() {
        let graph = TokenFlowGraph::from_ledger(&star_ledger());
        let mut pr = PageRank::new(&graph, 0.85);

        let initial: f64 = pr.scores().iter().sum();
        assert!((initial - 1.0).abs() < 1e-9);
        for _ in 0..25 {
            pr.step();
            let total: f64 = pr.scores().iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "sum drifted to {total}");
        }
        assert_eq!(pr.iterations(), 25);
    }

    #[test]
    fn hub_ranks_first() {
        let graph = TokenFlowGraph::from_ledger(&star_ledger());
        let report = influence(&graph, &AnalysisConfig::default());

        assert_eq!(report.page_rank[0].address, "HUB");
        assert_eq!(report.in_degree[0].address, "HUB");
        assert_eq!(report.out_degree[0].address, "B");
    }

    #[test]
    fn larger_amounts_carry_more_weight() {
        let ledger = EventLedger::new(
            vec![biz("B", "X")],
            ["S", "BIG", "SMALL"].iter().map(|a| Account::new(*a)).collect(),
            vec![transfer("S", "BIG", 90.0), transfer("S", "SMALL", 10.0)],
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);
        let pr = PageRank::new(&graph, 0.85).run(25);

        let big = graph.node_index("BIG").expect("big").index();
        let small = graph.node_index("SMALL").expect("small").index();
        assert!(pr.scores()[big] > pr.scores()[small]);
    }

    #[test]
    fn empty_graph_has_no_scores() {
        let graph = TokenFlowGraph::from_ledger(&EventLedger::default());
        let pr = PageRank::new(&graph, 0.85).run(25);
        assert!(pr.scores().is_empty());
    }

    #[test]
    fn edgeless_graph_is_uniform() {
        let ledger = EventLedger::new(
            vec![biz("B", "X")],
            vec![Account::new("U")],
            Vec::new(),
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);
        let pr = PageRank::new(&graph, 0.85).run(3);
        assert!(pr.scores().iter().all(|s| (s - 0.5).abs() < 1e-12));
    }
}
