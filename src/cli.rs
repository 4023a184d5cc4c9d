use crate::config::{Config, load_config};
use crate::layout::SolverKind;
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::model::{ExpansionState, ResourceKind, ResourceStatus, Snapshot};
use crate::pipeline::build_topology;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

static EXPAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^=\s]+)\s*=\s*([A-Za-z]+)\s*$").unwrap());

#[derive(Parser, Debug)]
#[command(name = "ktopo", version, about = "Kubernetes resource topology layout")]
pub struct Args {
    /// Snapshot JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout JSON. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Expansion state JSON file: {"<id>": ["<Kind>", ...]}
    #[arg(short = 'x', long = "expansion")]
    pub expansion: Option<PathBuf>,

    /// Toggle one expansion, as <id>=<Kind>. Repeatable.
    #[arg(long = "expand", value_name = "ID=KIND")]
    pub expand: Vec<String>,

    /// Only show these kinds. Repeatable.
    #[arg(short = 'k', long = "kind")]
    pub kinds: Vec<String>,

    /// Only show these statuses. Repeatable.
    #[arg(short = 's', long = "status")]
    pub statuses: Vec<String>,

    /// Only show these namespaces. Repeatable.
    #[arg(short = 'n', long = "namespace")]
    pub namespaces: Vec<String>,

    /// Substring search, or /regex/
    #[arg(long = "search")]
    pub search: Option<String>,

    #[arg(long = "problems-only")]
    pub problems_only: bool,

    #[arg(long = "hide-cluster-scoped")]
    pub hide_cluster_scoped: bool,

    /// Coordinate solver
    #[arg(long = "solver", value_enum)]
    pub solver: Option<SolverArg>,

    /// Pretty-print the output
    #[arg(short = 'p', long = "pretty")]
    pub pretty: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SolverArg {
    Dagre,
    Layered,
}

impl From<SolverArg> for SolverKind {
    fn from(arg: SolverArg) -> Self {
        match arg {
            SolverArg::Dagre => SolverKind::Dagre,
            SolverArg::Layered => SolverKind::Layered,
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", args.config))?;
    apply_args(&mut config, &args)?;

    let input = read_input(args.input.as_deref())?;
    let snapshot = Snapshot::from_json(&input)?;
    let expansion = load_expansion(args.expansion.as_deref(), &args.expand)?;

    let topology = build_topology(&snapshot, &config.filters, &expansion, &config.layout);
    tracing::info!(
        nodes = topology.layout.nodes.len(),
        edges = topology.layout.edges.len(),
        hidden = topology.diagnostics.hidden_nodes,
        dropped_edges = topology.diagnostics.dropped_edges,
        "topology laid out"
    );

    match args.output.as_deref() {
        Some(path) => write_layout_dump(path, &snapshot.scope, &topology, args.pretty)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            LayoutDump::from_topology(&snapshot.scope, &topology).to_writer(&mut writer, args.pretty)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn apply_args(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(solver) = args.solver {
        config.layout.solver = solver.into();
    }
    for token in &args.kinds {
        let kind = ResourceKind::from_token(token)
            .ok_or_else(|| anyhow::anyhow!("unknown resource kind `{token}`"))?;
        config.filters.kinds.insert(kind);
    }
    for token in &args.statuses {
        let status = ResourceStatus::from_token(token)
            .ok_or_else(|| anyhow::anyhow!("unknown status `{token}`"))?;
        config.filters.statuses.insert(status);
    }
    config.filters.namespaces.extend(args.namespaces.iter().cloned());
    if let Some(search) = &args.search {
        config.filters.search = Some(search.clone());
    }
    config.filters.problems_only |= args.problems_only;
    config.filters.hide_cluster_scoped |= args.hide_cluster_scoped;
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn load_expansion(path: Option<&Path>, toggles: &[String]) -> Result<ExpansionState> {
    let mut expansion = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&contents)?
        }
        None => ExpansionState::new(),
    };
    for toggle in toggles {
        let (id, kind) = parse_toggle(toggle)?;
        expansion.toggle(&id, kind);
    }
    Ok(expansion)
}

fn parse_toggle(token: &str) -> Result<(String, ResourceKind)> {
    let caps = EXPAND_RE
        .captures(token)
        .ok_or_else(|| anyhow::anyhow!("expected <id>=<Kind>, got `{token}`"))?;
    let kind = ResourceKind::from_token(&caps[2])
        .ok_or_else(|| anyhow::anyhow!("unknown resource kind `{}`", &caps[2]))?;
    Ok((caps[1].to_string(), kind))
}
