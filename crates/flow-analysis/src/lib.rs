//! flow-analysis crate
//!
//! Token-flow analytics over a loyalty ledger: graph construction, bounded
//! path search, centrality, redemption attribution, bottleneck detection,
//! and ledger-based activity reports.

pub mod activity;
pub mod attribution;
pub mod bottleneck;
pub mod business;
pub mod centrality;
pub mod config;
pub mod graph;
pub mod paths;
pub mod rank;

pub use config::{AnalysisConfig, BusinessSelector};
pub use graph::TokenFlowGraph;
pub use rank::Ranked;
