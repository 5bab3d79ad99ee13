//! Bounded path search over the token-flow graph.
//!
//! Three searches share one depth-first walker:
//!
//! 1. **Short cycles**: for every node, paths of 2 to 4 hops that return to it
//!    without revisiting any intermediate node.
//! 2. **Flow paths**: every simple path from a source to a target within a
//!    hop cap. The target may only appear as the final hop, which lets a
//!    business trace value that leaves it and comes back.
//! 3. **Laundering trace**: from each `(user, token)` that received a reward,
//!    walk only edges carrying that token and flag walks that come back to the
//!    user after at least 4 hops.
//!
//! Every search carries a hop cap and a global result cap. On a cyclic or
//! dense graph exhaustive enumeration does not finish in useful time; the
//! caps are what guarantee termination. Finding more results than the cap
//! allows is a normal outcome reported through [`PathSearch::truncated`]; a
//! search whose results exactly fill the cap is complete.
//!
//! Search state (current path, visited set) lives in a walker created per
//! start node, so concurrent or repeated searches never share it.

use std::collections::HashSet;
use std::ops::ControlFlow;

use flow_data::{Event, EventLedger};
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::config::{DEFAULT_MAX_PATHS, DEFAULT_PATH_DEPTH};
use crate::graph::{FlowEdge, TokenFlowGraph};

/// Minimum hop count of a reported short cycle (self-loops excluded).
pub const SHORT_CYCLE_MIN_HOPS: usize = 2;
/// Maximum hop count of a reported short cycle.
pub const SHORT_CYCLE_MAX_HOPS: usize = 4;
/// Hops a token must travel before returning to its reward recipient to be flagged.
pub const LAUNDERING_MIN_HOPS: usize = 4;

/// Hop cap and global result cap for one search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PathLimits {
    pub max_depth: usize,
    pub max_paths: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_PATH_DEPTH,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

/// Results of a capped search.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathSearch<T> {
    pub results: Vec<T>,
    /// True when at least one qualifying result beyond the cap was found and
    /// dropped.
    pub truncated: bool,
    /// Start points after the one where the extra result turned up. Zero
    /// unless `truncated`.
    pub unsearched_starts: usize,
}

impl<T> PathSearch<T> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            truncated: false,
            unsearched_starts: 0,
        }
    }
}

/// A token-constrained walk that came back to its reward recipient.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaunderingCandidate {
    pub user: String,
    pub token: String,
    /// Addresses from the user back to the user, inclusive.
    pub path: Vec<String>,
}

/// How the walker treats nodes it has already reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Revisit {
    /// No node may appear twice on the current path (target excepted as final hop).
    Never,
    /// A node may be reached again at a different depth; each `(node, depth)`
    /// is expanded at most once per walk.
    AtNewDepth,
}

/// Depth-first walker for one start node.
struct Walker<'g, F> {
    graph: &'g TokenFlowGraph,
    target: NodeIndex,
    min_hops: usize,
    max_hops: usize,
    follow: F,
    revisit: Revisit,
    path: Vec<NodeIndex>,
    on_path: HashSet<NodeIndex>,
    expanded: HashSet<(NodeIndex, usize)>,
    found: Vec<Vec<NodeIndex>>,
    budget: usize,
}

impl<'g, F> Walker<'g, F>
where
    F: Fn(&FlowEdge) -> bool,
{
    fn new(
        graph: &'g TokenFlowGraph,
        target: NodeIndex,
        hops: (usize, usize),
        revisit: Revisit,
        budget: usize,
        follow: F,
    ) -> Self {
        Self {
            graph,
            target,
            min_hops: hops.0,
            max_hops: hops.1,
            follow,
            revisit,
            path: Vec::new(),
            on_path: HashSet::new(),
            expanded: HashSet::new(),
            found: Vec::new(),
            budget,
        }
    }

    /// Walks from `start`, returning the paths found and whether a path
    /// beyond the budget exists. A zero budget still walks, looking for one.
    fn run(mut self, start: NodeIndex) -> (Vec<Vec<NodeIndex>>, bool) {
        if self.max_hops == 0 {
            return (self.found, false);
        }
        self.path.push(start);
        self.on_path.insert(start);
        self.expanded.insert((start, 0));
        let flow = self.walk(start);
        (self.found, flow.is_break())
    }

    fn walk(&mut self, node: NodeIndex) -> ControlFlow<()> {
        let graph = self.graph;
        let hops = self.path.len();

        for (next, edge) in graph.successors(node) {
            if !(self.follow)(edge) {
                continue;
            }

            if next == self.target && hops >= self.min_hops {
                if self.found.len() >= self.budget {
                    return ControlFlow::Break(());
                }
                let mut found = self.path.clone();
                found.push(next);
                self.found.push(found);
                continue;
            }

            if hops >= self.max_hops {
                continue;
            }

            match self.revisit {
                Revisit::Never => {
                    if next == self.target || self.on_path.contains(&next) {
                        continue;
                    }
                }
                Revisit::AtNewDepth => {
                    if !self.expanded.insert((next, hops)) {
                        continue;
                    }
                }
            }

            self.path.push(next);
            self.on_path.insert(next);
            let flow = self.walk(next);
            self.path.pop();
            if !self.path.contains(&next) {
                self.on_path.remove(&next);
            }
            if flow.is_break() {
                return flow;
            }
        }

        ControlFlow::Continue(())
    }
}

/// Enumerates cycles of 2 to 4 hops through every node.
///
/// A cycle of `k` distinct nodes is reported once per member, starting and
/// ending at that member. Nodes outside any non-trivial strongly connected
/// component cannot lie on a cycle and are not searched.
pub fn short_cycles(graph: &TokenFlowGraph, max_paths: usize) -> PathSearch<Vec<String>> {
    let cyclic: HashSet<NodeIndex> = tarjan_scc(&graph.graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .flatten()
        .collect();

    let starts: Vec<NodeIndex> = graph
        .graph
        .node_indices()
        .filter(|ix| cyclic.contains(ix))
        .collect();

    let search = collect(&starts, max_paths, |start, budget| {
        Walker::new(
            graph,
            start,
            (SHORT_CYCLE_MIN_HOPS, SHORT_CYCLE_MAX_HOPS),
            Revisit::Never,
            budget,
            |_: &FlowEdge| true,
        )
        .run(start)
    });

    finish(graph, search, "short cycle enumeration")
}

/// Every simple path from `source` to `target` within `limits.max_depth` hops.
///
/// When `source == target` the search returns round trips of at least two
/// hops. Unknown addresses yield an empty result.
pub fn paths_between(
    graph: &TokenFlowGraph,
    source: &str,
    target: &str,
    limits: PathLimits,
) -> PathSearch<Vec<String>> {
    let (Some(from), Some(to)) = (graph.node_index(source), graph.node_index(target)) else {
        tracing::debug!(source, target, "path endpoints not in graph");
        return PathSearch::empty();
    };
    let min_hops = if from == to { 2 } else { 1 };

    let search = collect(&[from], limits.max_paths, |start, budget| {
        Walker::new(
            graph,
            to,
            (min_hops, limits.max_depth),
            Revisit::Never,
            budget,
            |_: &FlowEdge| true,
        )
        .run(start)
    });

    finish(graph, search, "flow path search")
}

/// Traces value leaving a business owner and returning to it.
pub fn trace_business_flow(
    graph: &TokenFlowGraph,
    owner: &str,
    limits: PathLimits,
) -> PathSearch<Vec<String>> {
    paths_between(graph, owner, owner, limits)
}

/// Finds token-constrained walks that return to a reward recipient.
///
/// Seeds are the distinct `(user, token)` pairs of reward events, in ledger
/// order. From each seed the walk follows only edges carrying the seed
/// token and reports every return to the user after at least
/// [`LAUNDERING_MIN_HOPS`] hops. Intermediate nodes, including the user, may
/// reappear at different depths.
pub fn laundering_candidates(
    graph: &TokenFlowGraph,
    ledger: &EventLedger,
    limits: PathLimits,
) -> PathSearch<LaunderingCandidate> {
    let mut seen = HashSet::new();
    let seeds: Vec<(NodeIndex, &str)> = ledger
        .events()
        .iter()
        .filter_map(|event| match event {
            Event::Reward(reward) => Some(reward),
            _ => None,
        })
        .filter(|reward| seen.insert((reward.user.as_str(), reward.token.as_str())))
        .filter_map(|reward| {
            graph
                .node_index(&reward.user)
                .map(|ix| (ix, reward.token.as_str()))
        })
        .collect();

    let mut out = PathSearch::empty();
    for (position, &(user, token)) in seeds.iter().enumerate() {
        let budget = limits.max_paths.saturating_sub(out.results.len());
        let (found, exhausted) = Walker::new(
            graph,
            user,
            (LAUNDERING_MIN_HOPS, limits.max_depth),
            Revisit::AtNewDepth,
            budget,
            |edge: &FlowEdge| edge.token == token,
        )
        .run(user);

        out.results
            .extend(found.into_iter().map(|path| LaunderingCandidate {
                user: graph.address(user).to_string(),
                token: token.to_string(),
                path: graph.addresses(&path),
            }));

        if exhausted {
            out.truncated = true;
            out.unsearched_starts = seeds.len() - position - 1;
            break;
        }
    }

    if out.truncated {
        tracing::warn!(
            max_paths = limits.max_paths,
            unsearched = out.unsearched_starts,
            "laundering trace stopped at result cap"
        );
    }
    out
}

/// Runs a walker per start node under one global budget.
fn collect<W>(
    starts: &[NodeIndex],
    max_paths: usize,
    mut walk: W,
) -> PathSearch<Vec<NodeIndex>>
where
    W: FnMut(NodeIndex, usize) -> (Vec<Vec<NodeIndex>>, bool),
{
    let mut out = PathSearch::empty();
    for (position, &start) in starts.iter().enumerate() {
        let budget = max_paths.saturating_sub(out.results.len());
        let (found, exhausted) = walk(start, budget);
        out.results.extend(found);
        if exhausted {
            out.truncated = true;
            out.unsearched_starts = starts.len() - position - 1;
            break;
        }
    }
    out
}

fn finish(
    graph: &TokenFlowGraph,
    search: PathSearch<Vec<NodeIndex>>,
    what: &str,
) -> PathSearch<Vec<String>> {
    if search.truncated {
        tracing::warn!(
            search = what,
            results = search.results.len(),
            unsearched = search.unsearched_starts,
            "search stopped at result cap"
        );
    }
    PathSearch {
        results: search
            .results
            .iter()
            .map(|path| graph.addresses(path))
            .collect(),
        truncated: search.truncated,
        unsearched_starts: search.unsearched_starts,
    }
}
