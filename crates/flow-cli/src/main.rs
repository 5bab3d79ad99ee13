mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use flow_analysis::activity::{business_activity, most_active, redemption_anomalies, PairFlows};
use flow_analysis::attribution::attribute_redemptions;
use flow_analysis::bottleneck::bottlenecks;
use flow_analysis::business::selected_business_report;
use flow_analysis::centrality::influence;
use flow_analysis::config::{
    DEFAULT_DAMPING, DEFAULT_ITERATIONS, DEFAULT_LAUNDERING_DEPTH, DEFAULT_MAX_PATHS,
    DEFAULT_PATH_DEPTH, DEFAULT_TOP,
};
use flow_analysis::paths::{
    laundering_candidates, paths_between, short_cycles, trace_business_flow,
};
use flow_analysis::{AnalysisConfig, BusinessSelector, TokenFlowGraph};
use flow_data::store::Store;
use flow_data::{EventKind, EventLedger, JsonFileSource, LedgerLoader, SqliteSource};
use indicatif::{ProgressBar, ProgressStyle};
use render::Output;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const LEDGER_ENV: &str = "TOKEN_FLOW_LEDGER";
const DEFAULT_LEDGER: &str = "data/graph.json";

#[derive(Debug, Clone)]
struct AppContext {
    ledger_path: PathBuf,
    db_path: Option<String>,
    config: AnalysisConfig,
    output: Output,
}

#[derive(Parser, Debug)]
#[command(name = "token-flow")]
#[command(about = "Token-flow analytics for loyalty-token ledgers")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// JSON ledger file. Falls back to $TOKEN_FLOW_LEDGER, then data/graph.json.
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Read the ledger from this SQLite database instead (import target for `import`).
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Rows per ranked report.
    #[arg(long, global = true, default_value_t = DEFAULT_TOP)]
    top: usize,

    /// Global cap on enumerated paths and cycles.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PATHS)]
    max_paths: usize,

    /// Hop cap override (default 6 for paths, 7 for the laundering trace).
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    #[arg(long, global = true, default_value_t = DEFAULT_DAMPING)]
    damping: f64,

    #[arg(long, global = true, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Output format: table (default) or json.
    #[arg(long, global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ledger and graph overview.
    Summary,
    /// Per-user activity in each business token.
    Activity(SelectorArgs),
    /// Top reward receivers, redeemers and transfer senders.
    ActiveUsers,
    /// Direct vs indirect redemption attribution and router usage.
    Redemption,
    /// PageRank and degree centrality.
    Influence,
    /// Users who redeemed more of a token than they were rewarded.
    Anomalies,
    /// Router flow ratios, stagnant tokens and terminal holders.
    Bottlenecks,
    /// Issuance, redemption and back-flow for one business.
    Business(SelectorArgs),
    /// Ledger totals per (from, to, token).
    Flows,
    /// Cycles of 2 to 4 hops through every participant.
    Cycles,
    /// Token-constrained round trips back to reward recipients.
    Launder,
    /// Every simple path between two addresses.
    Paths(PathsArgs),
    /// Paths that leave a business owner and come back to it.
    Trace(SelectorArgs),
    /// Copy the JSON ledger into the SQLite database given by --db-path.
    Import,
}

/// Business selection shared by single-business commands.
#[derive(Args, Debug, Clone)]
struct SelectorArgs {
    /// Business owner address (case-insensitive).
    #[arg(long, conflicts_with = "brand")]
    business: Option<String>,

    /// Brand name (case-insensitive).
    #[arg(long)]
    brand: Option<String>,
}

impl SelectorArgs {
    fn selector(&self) -> Option<BusinessSelector> {
        match (&self.business, &self.brand) {
            (Some(owner), _) => Some(BusinessSelector::Owner(owner.clone())),
            (None, Some(brand)) => Some(BusinessSelector::Brand(brand.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Args, Debug)]
struct PathsArgs {
    #[arg(long)]
    from: String,

    #[arg(long)]
    to: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let config = AnalysisConfig {
        top: cli.top,
        max_paths: cli.max_paths,
        max_depth: cli.max_depth,
        damping: cli.damping,
        iterations: cli.iterations,
        business: None,
    };
    config.validate()?;

    let ledger_path = cli
        .ledger
        .or_else(|| std::env::var(LEDGER_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER));

    let ctx = AppContext {
        ledger_path,
        db_path: cli.db_path,
        config,
        output: Output::parse(&cli.output)?,
    };

    match cli.command {
        Commands::Summary => handle_summary(&ctx).await,
        Commands::Activity(args) => handle_activity(&ctx, args).await,
        Commands::ActiveUsers => handle_active_users(&ctx).await,
        Commands::Redemption => handle_redemption(&ctx).await,
        Commands::Influence => handle_influence(&ctx).await,
        Commands::Anomalies => handle_anomalies(&ctx).await,
        Commands::Bottlenecks => handle_bottlenecks(&ctx).await,
        Commands::Business(args) => handle_business(&ctx, args).await,
        Commands::Flows => handle_flows(&ctx).await,
        Commands::Cycles => handle_cycles(&ctx).await,
        Commands::Launder => handle_launder(&ctx).await,
        Commands::Paths(args) => handle_paths(&ctx, args).await,
        Commands::Trace(args) => handle_trace(&ctx, args).await,
        Commands::Import => handle_import(&ctx).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Loads the ledger from SQLite when `--db-path` is set, otherwise from JSON.
async fn load_ledger(ctx: &AppContext) -> Result<Arc<EventLedger>> {
    let pb = spinner("loading ledger")?;
    let loaded = match &ctx.db_path {
        Some(db) => LedgerLoader::new(SqliteSource::new(db.clone())).ledger().await,
        None => {
            LedgerLoader::new(JsonFileSource::new(ctx.ledger_path.clone()))
                .ledger()
                .await
        }
    };
    pb.finish_and_clear();

    let ledger = loaded.wrap_err("failed to load ledger")?;
    if ledger.is_empty() {
        tracing::warn!("ledger has no businesses or no events; reports will be empty");
    }
    Ok(ledger)
}

fn with_selector(ctx: &AppContext, args: &SelectorArgs) -> AnalysisConfig {
    AnalysisConfig {
        business: args.selector(),
        ..ctx.config.clone()
    }
}

#[derive(Serialize)]
struct Summary {
    businesses: usize,
    users: usize,
    events: usize,
    rewards: usize,
    redeems: usize,
    transfers: usize,
    swaps: usize,
    unknown_events: usize,
    nodes: usize,
    edges: usize,
    edges_overwritten: usize,
    edges_skipped: usize,
}

async fn handle_summary(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);

    let count = |kind: EventKind| {
        ledger
            .events()
            .iter()
            .filter(|e| e.kind() == Some(kind))
            .count()
    };
    let stats = graph.stats();
    let summary = Summary {
        businesses: ledger.businesses().len(),
        users: ledger.users().len(),
        events: ledger.events().len(),
        rewards: count(EventKind::Reward),
        redeems: count(EventKind::Redeem),
        transfers: count(EventKind::Transfer),
        swaps: count(EventKind::Swap),
        unknown_events: stats.unknown_events,
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        edges_overwritten: stats.edges_overwritten,
        edges_skipped: stats.edges_skipped,
    };

    match ctx.output {
        Output::Json => render::json(&summary)?,
        Output::Table => {
            let mut t = render::table(vec!["Metric", "Value"]);
            for (name, value) in [
                ("Businesses", summary.businesses),
                ("Users", summary.users),
                ("Events", summary.events),
                ("  Reward", summary.rewards),
                ("  Redeem", summary.redeems),
                ("  Transfer", summary.transfers),
                ("  Swap", summary.swaps),
                ("  Unrecognized", summary.unknown_events),
                ("Graph nodes", summary.nodes),
                ("Graph edges", summary.edges),
                ("Edges overwritten", summary.edges_overwritten),
                ("Movements skipped", summary.edges_skipped),
            ] {
                t.add_row(vec![name.to_string(), value.to_string()]);
            }
            render::section("Ledger summary", &t, summary.events);
        }
    }

    info!(events = summary.events, nodes = summary.nodes, "summary command completed");
    Ok(())
}

async fn handle_activity(ctx: &AppContext, args: SelectorArgs) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let mut report = business_activity(&ledger);

    if let Some(selector) = args.selector() {
        let business = selector
            .resolve(&ledger)
            .ok_or_else(|| eyre!("no business matches {selector:?}"))?;
        report.retain(|b| b.owner == business.owner);
    }

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            if report.is_empty() {
                render::section("Business activity", &render::table(vec!["User"]), 0);
            }
            for biz in &report {
                let mut t = render::table(vec![
                    "User", "Rewarded", "Redeemed", "Xfer in", "Xfer out", "Swap in",
                    "Swap out", "Balance", "Behaviour", "Status",
                ]);
                for u in &biz.users {
                    let a = &u.activity;
                    t.add_row(vec![
                        u.user.clone(),
                        a.rewarded.to_string(),
                        a.redeemed.to_string(),
                        a.transferred_in.to_string(),
                        a.transferred_out.to_string(),
                        a.swapped_in.to_string(),
                        a.swapped_out.to_string(),
                        u.balance.to_string(),
                        format!("{:?}", u.behaviour),
                        format!("{:?}", u.holding),
                    ]);
                }
                let title = format!("{} (token {})", biz.brand, biz.token);
                render::section(&title, &t, biz.users.len());
            }
        }
    }

    info!(businesses = report.len(), "activity command completed");
    Ok(())
}

async fn handle_active_users(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let report = most_active(&ledger, ctx.config.top);

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            render::ranked("Reward receivers", "Amount in", &report.reward_receivers);
            render::ranked("Redeemers", "Amount out", &report.redeemers);
            render::ranked("Transfer senders", "Transfers", &report.transfer_senders);
        }
    }

    info!(top = ctx.config.top, "active-users command completed");
    Ok(())
}

async fn handle_redemption(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let report = attribute_redemptions(&ledger);

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            render::ranked(
                "Direct redemptions (reward then redeem)",
                "Count",
                &report.top_direct(ctx.config.top),
            );
            render::ranked(
                "Indirect redemptions (acquired by transfer or swap)",
                "Count",
                &report.top_indirect(ctx.config.top),
            );
            render::ranked("Redeem router usage", "Redemptions", &report.router_table());

            let mut tokens: Vec<_> = report.by_token.iter().collect();
            tokens.sort_by(|a, b| a.0.cmp(b.0));
            let mut t = render::table(vec!["Token", "Direct", "Indirect", "Total"]);
            for (token, split) in &tokens {
                t.add_row(vec![
                    token.to_string(),
                    split.direct.to_string(),
                    split.indirect.to_string(),
                    split.total().to_string(),
                ]);
            }
            render::section("Per-token split", &t, tokens.len());
        }
    }

    info!(
        direct = report.total_direct(),
        indirect = report.total_indirect(),
        "redemption command completed"
    );
    Ok(())
}

async fn handle_influence(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);
    let report = influence(&graph, &ctx.config);

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            let scores: Vec<_> = report
                .page_rank
                .iter()
                .map(|r| flow_analysis::Ranked {
                    address: r.address.clone(),
                    value: format!("{:.6}", r.value),
                })
                .collect();
            render::ranked("PageRank (amount weighted)", "Score", &scores);
            render::ranked("In-degree", "Incoming", &report.in_degree);
            render::ranked("Out-degree", "Outgoing", &report.out_degree);
        }
    }

    info!(
        nodes = graph.node_count(),
        iterations = ctx.config.iterations,
        "influence command completed"
    );
    Ok(())
}

async fn handle_anomalies(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let anomalies = redemption_anomalies(&ledger);

    match ctx.output {
        Output::Json => render::json(&anomalies)?,
        Output::Table => {
            let mut t = render::table(vec![
                "Brand", "User", "Token", "Rewarded", "Redeemed", "Excess",
            ]);
            for a in &anomalies {
                t.add_row(vec![
                    a.brand.clone(),
                    a.user.clone(),
                    a.token.clone(),
                    a.rewarded.to_string(),
                    a.redeemed.to_string(),
                    a.excess.to_string(),
                ]);
            }
            render::section("Users redeeming more than they were rewarded", &t, anomalies.len());
        }
    }

    info!(anomalies = anomalies.len(), "anomalies command completed");
    Ok(())
}

async fn handle_bottlenecks(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);
    let report = bottlenecks(&ledger, &graph, &ctx.config);

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            let mut routers = render::table(vec!["Router", "Inbound", "Outbound", "Ratio"]);
            for r in &report.routers {
                routers.add_row(vec![
                    r.router.clone(),
                    r.inbound.to_string(),
                    r.outbound.to_string(),
                    format!("{:.4}", r.ratio),
                ]);
            }
            render::section(
                "Routers with lowest out/in ratio",
                &routers,
                report.routers.len(),
            );

            let mut stagnant = render::table(vec!["Token", "Brand"]);
            for s in &report.stagnant_tokens {
                stagnant.add_row(vec![s.token.clone(), s.brand.clone()]);
            }
            render::section(
                "Business tokens that never circulate",
                &stagnant,
                report.stagnant_tokens.len(),
            );

            let mut holders = render::table(vec!["Address", "Incoming edges"]);
            for h in &report.terminal_holders {
                holders.add_row(vec![h.address.clone(), h.incoming_edges.to_string()]);
            }
            render::section(
                "Participants who receive but never send",
                &holders,
                report.terminal_holders.len(),
            );
        }
    }

    info!(
        routers = report.routers.len(),
        stagnant = report.stagnant_tokens.len(),
        holders = report.terminal_holders.len(),
        "bottlenecks command completed"
    );
    Ok(())
}

async fn handle_business(ctx: &AppContext, args: SelectorArgs) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let config = with_selector(ctx, &args);
    let report = selected_business_report(&ledger, &config)?;

    match ctx.output {
        Output::Json => render::json(&report)?,
        Output::Table => {
            println!("========== BUSINESS ANALYTICS – {} ==========\n", report.brand);
            println!("Owner address          : {}", report.owner);
            println!("Token address          : {}\n", report.token);
            println!("Tokens issued (Reward) : {}", report.issued);
            println!(
                "Redeemed back          : {} ({})",
                report.redeemed, report.redeemed_pct
            );
            println!(
                "Swapped out            : {} ({})",
                report.swapped_out, report.swapped_pct
            );
            println!("Back-flow to owner     : {}\n", report.back_flow);

            render::ranked("Top reward recipients", "Amount", &report.top_recipients);
            render::ranked("Top redeemers", "Amount", &report.top_redeemers);
        }
    }

    info!(owner = %report.owner, issued = %report.issued, "business command completed");
    Ok(())
}

async fn handle_flows(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let flows = PairFlows::from_ledger(&ledger);
    let rows: Vec<_> = flows.rows().into_iter().take(ctx.config.top).collect();

    #[derive(Serialize)]
    struct FlowRow<'a> {
        from: &'a str,
        to: &'a str,
        token: &'a str,
        amount: f64,
        count: usize,
    }

    match ctx.output {
        Output::Json => {
            let out: Vec<FlowRow<'_>> = rows
                .iter()
                .map(|&(from, to, token, f)| FlowRow {
                    from,
                    to,
                    token,
                    amount: f.amount,
                    count: f.count,
                })
                .collect();
            render::json(&out)?;
        }
        Output::Table => {
            let mut t = render::table(vec!["From", "To", "Token", "Amount", "Movements"]);
            for (from, to, token, f) in &rows {
                t.add_row(vec![
                    from.to_string(),
                    to.to_string(),
                    token.to_string(),
                    f.amount.to_string(),
                    f.count.to_string(),
                ]);
            }
            render::section("Largest pair flows (ledger totals)", &t, rows.len());
        }
    }

    info!(rows = rows.len(), "flows command completed");
    Ok(())
}

async fn handle_cycles(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);
    let search = short_cycles(&graph, ctx.config.max_paths);

    match ctx.output {
        Output::Json => render::json(&search)?,
        Output::Table => render::paths("Short cycles (2 to 4 hops)", &search),
    }

    info!(
        cycles = search.results.len(),
        truncated = search.truncated,
        "cycles command completed"
    );
    Ok(())
}

async fn handle_launder(ctx: &AppContext) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);
    let limits = ctx.config.path_limits(DEFAULT_LAUNDERING_DEPTH);
    let search = laundering_candidates(&graph, &ledger, limits);

    match ctx.output {
        Output::Json => render::json(&search)?,
        Output::Table => {
            let mut t = render::table(vec!["#", "User", "Token", "Hops", "Path"]);
            for (i, c) in search.results.iter().enumerate() {
                t.add_row(vec![
                    (i + 1).to_string(),
                    c.user.clone(),
                    c.token.clone(),
                    c.path.len().saturating_sub(1).to_string(),
                    c.path.join(" → "),
                ]);
            }
            render::section(
                "Laundering candidates (manual review)",
                &t,
                search.results.len(),
            );
            render::truncation(
                search.truncated,
                search.results.len(),
                search.unsearched_starts,
            );
        }
    }

    info!(
        candidates = search.results.len(),
        max_depth = limits.max_depth,
        truncated = search.truncated,
        "launder command completed"
    );
    Ok(())
}

async fn handle_paths(ctx: &AppContext, args: PathsArgs) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let graph = TokenFlowGraph::from_ledger(&ledger);
    for addr in [&args.from, &args.to] {
        if graph.node_index(addr).is_none() {
            return Err(eyre!("address {addr} is not a registered participant"));
        }
    }

    let limits = ctx.config.path_limits(DEFAULT_PATH_DEPTH);
    let search = paths_between(&graph, &args.from, &args.to, limits);

    match ctx.output {
        Output::Json => render::json(&search)?,
        Output::Table => {
            let title = format!("Paths {} → {}", args.from, args.to);
            render::paths(&title, &search);
        }
    }

    info!(
        paths = search.results.len(),
        max_depth = limits.max_depth,
        "paths command completed"
    );
    Ok(())
}

async fn handle_trace(ctx: &AppContext, args: SelectorArgs) -> Result<()> {
    let ledger = load_ledger(ctx).await?;
    let config = with_selector(ctx, &args);
    let owner = config.selected_business(&ledger)?.owner.clone();
    let graph = TokenFlowGraph::from_ledger(&ledger);

    let limits = config.path_limits(DEFAULT_PATH_DEPTH);
    let search = trace_business_flow(&graph, &owner, limits);

    match ctx.output {
        Output::Json => render::json(&search)?,
        Output::Table => {
            let title = format!("Flows leaving and returning to {owner}");
            render::paths(&title, &search);
        }
    }

    info!(
        owner = %owner,
        paths = search.results.len(),
        "trace command completed"
    );
    Ok(())
}

async fn handle_import(ctx: &AppContext) -> Result<()> {
    let db_path = ctx
        .db_path
        .as_deref()
        .ok_or_else(|| eyre!("--db-path is required for import"))?;

    let source = JsonFileSource::new(ctx.ledger_path.clone());
    let ledger = LedgerLoader::new(source)
        .ledger()
        .await
        .wrap_err("failed to load JSON ledger")?;

    let store = Store::new(db_path).wrap_err("failed to open SQLite store")?;
    let written = store.import(&ledger)?;
    let total = store.event_count()?;

    println!(
        "Imported {written} events from {} into {db_path} ({total} stored).",
        ctx.ledger_path.display()
    );
    info!(
        written,
        total,
        db_path,
        "import command completed"
    );
    Ok(())
}
