//! Token-flow graph construction from a loyalty ledger.
//!
//! Nodes are registered participants (business owners and users). Edges are
//! token movements derived from ledger events (see [`flow_data::Event::legs`]).
//!
//! ## Last write wins
//!
//! The graph holds at most one edge per ordered `(from, to)` pair: inserting
//! a later movement overwrites the attributes of the earlier one. The graph
//! answers topology questions (is there a channel from A to B) and nothing
//! else. Any quantity (flow totals, balances, attribution) must be folded
//! from the ledger, never from edge attributes.

use std::collections::HashMap;

use flow_data::{Amount, EventKind, EventLedger, Role};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

/// Node weight: one registered participant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Participant {
    pub address: String,
    pub role: Role,
    /// Brand name for business owners.
    pub label: Option<String>,
}

/// Edge weight: the most recent movement on an ordered pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowEdge {
    pub kind: EventKind,
    pub token: String,
    pub amount: Amount,
}

/// Counters collected while folding the ledger into the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Recognized events processed.
    pub events_seen: usize,
    /// Events with an unrecognized type, ignored.
    pub unknown_events: usize,
    /// Movements written to the graph (including overwrites).
    pub edges_written: usize,
    /// Movements that replaced an existing edge on the same pair.
    pub edges_overwritten: usize,
    /// Movements dropped because an endpoint is not registered.
    pub edges_skipped: usize,
}

/// Directed participant graph for one analysis run.
pub struct TokenFlowGraph {
    /// The underlying petgraph directed graph.
    pub graph: DiGraph<Participant, FlowEdge>,
    /// Lookup from address to node index.
    pub addr_to_ix: HashMap<String, NodeIndex>,
    stats: BuildStats,
}

impl TokenFlowGraph {
    /// Build the graph from a ledger snapshot.
    ///
    /// Every registered business owner and user becomes a node, with or
    /// without edges. Uses `update_edge` (not `add_edge`) so a pair keeps
    /// only its latest movement.
    #[tracing::instrument(skip_all)]
    pub fn from_ledger(ledger: &EventLedger) -> Self {
        let mut graph = DiGraph::new();
        let mut addr_to_ix: HashMap<String, NodeIndex> = HashMap::new();

        for biz in ledger.businesses() {
            addr_to_ix.entry(biz.owner.clone()).or_insert_with(|| {
                graph.add_node(Participant {
                    address: biz.owner.clone(),
                    role: Role::BusinessOwner,
                    label: Some(biz.brand.clone()),
                })
            });
        }
        for user in ledger.users() {
            addr_to_ix.entry(user.address.clone()).or_insert_with(|| {
                graph.add_node(Participant {
                    address: user.address.clone(),
                    role: Role::User,
                    label: None,
                })
            });
        }

        let mut stats = BuildStats::default();
        for (position, event) in ledger.events().iter().enumerate() {
            if event.kind().is_none() {
                stats.unknown_events += 1;
                continue;
            }
            stats.events_seen += 1;

            for leg in event.legs() {
                let (Some(&from_ix), Some(&to_ix)) =
                    (addr_to_ix.get(leg.from), addr_to_ix.get(leg.to))
                else {
                    stats.edges_skipped += 1;
                    tracing::debug!(
                        position,
                        kind = %leg.kind,
                        from = leg.from,
                        to = leg.to,
                        "skipping movement with unregistered endpoint"
                    );
                    continue;
                };

                if graph.find_edge(from_ix, to_ix).is_some() {
                    stats.edges_overwritten += 1;
                }
                graph.update_edge(
                    from_ix,
                    to_ix,
                    FlowEdge {
                        kind: leg.kind,
                        token: leg.token.to_string(),
                        amount: leg.amount,
                    },
                );
                stats.edges_written += 1;
            }
        }

        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            written = stats.edges_written,
            overwritten = stats.edges_overwritten,
            skipped = stats.edges_skipped,
            unknown = stats.unknown_events,
            "token-flow graph built"
        );

        Self {
            graph,
            addr_to_ix,
            stats,
        }
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_index(&self, address: &str) -> Option<NodeIndex> {
        self.addr_to_ix.get(address).copied()
    }

    /// Address of a node. Panics on an index from another graph.
    pub fn address(&self, ix: NodeIndex) -> &str {
        &self.graph[ix].address
    }

    /// Current edge attributes for an ordered pair.
    pub fn edge(&self, from: &str, to: &str) -> Option<&FlowEdge> {
        let from_ix = self.node_index(from)?;
        let to_ix = self.node_index(to)?;
        self.graph
            .find_edge(from_ix, to_ix)
            .map(|e| &self.graph[e])
    }

    /// Outgoing neighbours of a node together with the connecting edge.
    pub fn successors(&self, ix: NodeIndex) -> impl Iterator<Item = (NodeIndex, &FlowEdge)> {
        self.graph
            .edges_directed(ix, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
    }

    /// Converts a node-index path into addresses.
    pub fn addresses(&self, path: &[NodeIndex]) -> Vec<String> {
        path.iter().map(|&ix| self.address(ix).to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_data::{Account, Business, Event, Swap, TokenAction, Transfer};

    fn biz(owner: &str, token: &str) -> Business {
        Business {
            owner: owner.to_string(),
            token: token.to_string(),
            reward_router: format!("{owner}-rw"),
            redeem_router: format!("{owner}-rd"),
            brand: format!("{owner}-brand"),
            token_name: String::new(),
            token_price: None,
        }
    }

    fn reward(business: &str, user: &str, token: &str, amount: f64) -> Event {
        Event::Reward(TokenAction {
            business: business.to_string(),
            user: user.to_string(),
            token: token.to_string(),
            amount,
        })
    }

    fn transfer(from: &str, to: &str, token: &str, amount: f64) -> Event {
        Event::Transfer(Transfer {
            from: from.to_string(),
            to: to.to_string(),
            token: token.to_string(),
            amount,
            business: None,
        })
    }

    fn users(addrs: &[&str]) -> Vec<Account> {
        addrs.iter().map(|a| Account::new(*a)).collect()
    }

    #[test]
    fn every_registered_participant_is_a_node() {
        let ledger = EventLedger::new(vec![biz("B", "X")], users(&["U", "V"]), Vec::new());
        let graph = TokenFlowGraph::from_ledger(&ledger);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 0);
        let b = graph.node_index("B").expect("business node");
        assert_eq!(graph.graph[b].role, Role::BusinessOwner);
        assert_eq!(graph.graph[b].label.as_deref(), Some("B-brand"));
    }

    #[test]
    fn event_types_map_to_edge_directions() {
        let ledger = EventLedger::new(
            vec![biz("B", "X")],
            users(&["U", "V"]),
            vec![
                reward("B", "U", "X", 10.0),
                Event::Redeem(TokenAction {
                    business: "B".into(),
                    user: "V".into(),
                    token: "X".into(),
                    amount: 4.0,
                }),
                transfer("U", "V", "X", 3.0),
            ],
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);

        assert_eq!(graph.edge("B", "U").map(|e| e.kind), Some(EventKind::Reward));
        assert_eq!(graph.edge("V", "B").map(|e| e.kind), Some(EventKind::Redeem));
        assert_eq!(graph.edge("U", "V").map(|e| e.kind), Some(EventKind::Transfer));
        assert!(graph.edge("U", "B").is_none());
    }

    #[test]
    fn swap_creates_two_edges_with_own_tokens() {
        let ledger = EventLedger::new(
            vec![biz("B1", "X"), biz("B2", "Y")],
            users(&["U", "V"]),
            vec![Event::Swap(Swap {
                from_user: "U".into(),
                from_token: "X".into(),
                from_business: "B1".into(),
                from_amount: 5.0,
                to_user: "V".into(),
                to_token: "Y".into(),
                to_business: "B2".into(),
                to_amount: 8.0,
            })],
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);

        let forward = graph.edge("U", "V").expect("forward leg");
        let back = graph.edge("V", "U").expect("return leg");
        assert_eq!((forward.token.as_str(), forward.amount), ("X", 5.0));
        assert_eq!((back.token.as_str(), back.amount), ("Y", 8.0));
    }

    #[test]
    fn repeated_pair_keeps_last_write() {
        let ledger = EventLedger::new(
            vec![biz("B", "X")],
            users(&["A", "C"]),
            vec![transfer("A", "C", "X", 5.0), transfer("A", "C", "X", 7.0)],
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge("A", "C").map(|e| e.amount), Some(7.0));
        assert_eq!(graph.stats().edges_written, 2);
        assert_eq!(graph.stats().edges_overwritten, 1);
    }

    #[test]
    fn unregistered_endpoint_is_skipped_and_counted() {
        let ledger = EventLedger::new(
            vec![biz("B", "X")],
            users(&["U"]),
            vec![reward("B", "ghost", "X", 1.0), transfer("U", "B", "X", 1.0), Event::Unknown],
        );
        let graph = TokenFlowGraph::from_ledger(&ledger);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.stats().edges_skipped, 1);
        assert_eq!(graph.stats().unknown_events, 1);
        assert_eq!(graph.stats().events_seen, 2);
        assert!(graph.node_index("ghost").is_none());
    }

    #[test]
    fn empty_ledger_empty_graph() {
        let graph = TokenFlowGraph::from_ledger(&EventLedger::default());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
