use crate::attachments::AttachmentSummary;
use crate::layout::Lane;
use crate::model::{EdgeType, ResourceKind, ResourceStatus};
use crate::pipeline::{Diagnostics, Topology};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// What the rendering side consumes: positioned nodes, typed edges and diagnostics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub scope: String,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub status: ResourceStatus,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub lane: Lane,
    pub column: Option<usize>,
    pub owner: Option<String>,
    pub attachments: Vec<AttachmentSummary>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relation: EdgeType,
}

impl LayoutDump {
    pub fn from_topology(scope: &str, topology: &Topology) -> Self {
        let layout = &topology.layout;
        let nodes = layout
            .nodes
            .iter()
            .map(|node| NodeDump {
                id: node.resource.id.clone(),
                kind: node.resource.kind(),
                name: node.resource.name.clone(),
                namespace: node.resource.namespace.clone(),
                status: node.resource.status,
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
                lane: node.lane,
                column: node.column,
                owner: node.owner.clone(),
                attachments: node.attachments.clone(),
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                from: edge.from.clone(),
                to: edge.to.clone(),
                relation: edge.relation,
            })
            .collect();

        LayoutDump {
            scope: scope.to_string(),
            width: layout.width,
            height: layout.height,
            nodes,
            edges,
            diagnostics: topology.diagnostics.clone(),
        }
    }

    pub fn to_writer<W: Write>(&self, writer: W, pretty: bool) -> anyhow::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(writer, self)?;
        } else {
            serde_json::to_writer(writer, self)?;
        }
        Ok(())
    }
}

pub fn write_layout_dump(path: &Path, scope: &str, topology: &Topology, pretty: bool) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    LayoutDump::from_topology(scope, topology).to_writer(&mut writer, pretty)?;
    writer.flush()?;
    Ok(())
}
