pub mod attachments;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod edges;
pub mod layout;
pub mod layout_dump;
pub mod measure;
pub mod model;
pub mod pipeline;
pub mod priority;
pub mod scheduler;
pub mod simplify;
pub mod visibility;

pub use attachments::{AttachmentEngine, AttachmentSet, AttachmentSummary, compute_attachments};
#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, load_config};
pub use edges::{EdgeValidation, resolve_edges, validate_edges};
pub use layout::{
    CoordinateSolver, DagreSolver, LayeredSolver, LayoutNode, SolverError, SolverKind,
    SolverOutcome, TopologyLayout, layout, layout_with_solver,
};
pub use model::{Edge, EdgeType, ExpansionState, Resource, ResourceKind, ResourceStatus, Snapshot};
pub use pipeline::{Diagnostics, Topology, build_topology, build_topology_with_solver};
pub use priority::{OWNER_PRIORITY, resolve_owner};
pub use scheduler::{LayoutScheduler, RequestOutcome};
pub use simplify::simplify_edges;
pub use visibility::{Filters, apply_filters, filter_visible};
