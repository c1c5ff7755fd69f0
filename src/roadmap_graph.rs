//! Node/edge view of a roadmap for visual rendering, plus a layered layout.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use crate::models::{PrerequisitesMap, RoadmapStructure};

const NODE_SEPARATION: f64 = 180.0;
const RANK_SEPARATION: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphNodeKind {
    Level,
    Section,
    Subtopic,
}

impl GraphNodeKind {
    /// Rendered `(width, height)` of a node of this kind.
    pub fn size(&self) -> (f64, f64) {
        match self {
            GraphNodeKind::Level => (280.0, 120.0),
            GraphNodeKind::Section => (240.0, 100.0),
            GraphNodeKind::Subtopic => (190.0, 75.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: GraphNodeKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphEdgeKind {
    Hierarchy,
    Sequence,
    Prerequisite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: GraphEdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadmapGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl RoadmapGraph {
    fn add_node(&mut self, seen: &mut HashSet<String>, node: GraphNode) {
        if seen.insert(node.id.clone()) {
            self.nodes.push(node);
        }
    }

    fn add_edge(&mut self, seen: &mut HashSet<(String, String)>, source: &str, target: &str, kind: GraphEdgeKind) {
        if seen.insert((source.to_string(), target.to_string())) {
            self.edges.push(GraphEdge {
                id: format!("{}->{}", source, target),
                source: source.to_string(),
                target: target.to_string(),
                kind,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutDirection {
    #[default]
    TB,
    LR,
}

impl FromStr for LayoutDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TB" => Ok(LayoutDirection::TB),
            "LR" => Ok(LayoutDirection::LR),
            other => Err(anyhow::anyhow!("Invalid direction '{}'. Must be 'TB' or 'LR'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedNode {
    #[serde(flatten)]
    pub node: GraphNode,
    pub rank: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLayout {
    pub direction: LayoutDirection,
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<GraphEdge>,
}

/// Build the render graph. Subtopic nodes carry their completion state.
///
/// Edges run level to first section, section to next section, section to
/// first subtopic, subtopic to next subtopic, the last section of a level to
/// the first section of the next, and prerequisite to subtopic. Each
/// `(source, target)` pair appears once; self and unknown prerequisites are
/// skipped.
pub fn build_roadmap_graph(
    structure: &RoadmapStructure,
    prerequisites: Option<&PrerequisitesMap>,
    completed: &HashSet<String>,
) -> RoadmapGraph {
    let mut graph = RoadmapGraph::default();
    let mut node_ids = HashSet::new();
    let mut edge_keys = HashSet::new();
    let mut previous_last_section: Option<&str> = None;

    for level in &structure.levels {
        graph.add_node(
            &mut node_ids,
            GraphNode {
                id: level.id.clone(),
                kind: GraphNodeKind::Level,
                label: level.title.clone(),
                description: level.description.clone(),
                estimated_hours: level.estimated_hours,
                completed: None,
            },
        );

        if let Some(first) = level.sections.first() {
            graph.add_edge(&mut edge_keys, &level.id, &first.id, GraphEdgeKind::Hierarchy);
            if let Some(previous) = previous_last_section {
                graph.add_edge(&mut edge_keys, previous, &first.id, GraphEdgeKind::Sequence);
            }
        }

        for (index, section) in level.sections.iter().enumerate() {
            graph.add_node(
                &mut node_ids,
                GraphNode {
                    id: section.id.clone(),
                    kind: GraphNodeKind::Section,
                    label: section.title.clone(),
                    description: section.description.clone(),
                    estimated_hours: section.estimated_hours,
                    completed: None,
                },
            );

            if let Some(next) = level.sections.get(index + 1) {
                graph.add_edge(&mut edge_keys, &section.id, &next.id, GraphEdgeKind::Sequence);
            }
            if let Some(first) = section.subtopics.first() {
                graph.add_edge(&mut edge_keys, &section.id, &first.id, GraphEdgeKind::Hierarchy);
            }

            for (position, subtopic) in section.subtopics.iter().enumerate() {
                graph.add_node(
                    &mut node_ids,
                    GraphNode {
                        id: subtopic.id.clone(),
                        kind: GraphNodeKind::Subtopic,
                        label: subtopic.title.clone(),
                        description: subtopic.description.clone(),
                        estimated_hours: Some(subtopic.effective_hours()),
                        completed: Some(completed.contains(&subtopic.id)),
                    },
                );

                if let Some(next) = section.subtopics.get(position + 1) {
                    graph.add_edge(&mut edge_keys, &subtopic.id, &next.id, GraphEdgeKind::Sequence);
                }
            }
        }

        if let Some(last) = level.sections.last() {
            previous_last_section = Some(last.id.as_str());
        }
    }

    if let Some(map) = prerequisites {
        let known: HashSet<String> = node_ids;
        for (_, _, subtopic) in structure.subtopics() {
            let Some(entry) = map.get(&subtopic.id) else {
                continue;
            };
            for required in &entry.required_topics {
                if *required == subtopic.id || !known.contains(required) {
                    continue;
                }
                graph.add_edge(&mut edge_keys, required, &subtopic.id, GraphEdgeKind::Prerequisite);
            }
        }
    }

    graph
}

/// Layered layout. A node's rank is its longest path from a source once
/// back-edges are ignored; nodes sharing a rank keep insertion order and each
/// rank is centred on the widest one.
pub fn layout_graph(graph: &RoadmapGraph, direction: LayoutDirection) -> GraphLayout {
    let ranks = compute_ranks(graph);
    let rank_count = ranks.iter().copied().max().map_or(0, |max| max + 1);

    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (index, rank) in ranks.iter().enumerate() {
        layers[*rank].push(index);
    }

    // Along-rank extent is width for TB and height for LR; across is the other.
    let extent = |index: usize| {
        let (width, height) = graph.nodes[index].kind.size();
        match direction {
            LayoutDirection::TB => (width, height),
            LayoutDirection::LR => (height, width),
        }
    };

    let layer_lengths: Vec<f64> = layers
        .iter()
        .map(|layer| {
            let sum: f64 = layer.iter().map(|&i| extent(i).0).sum();
            sum + NODE_SEPARATION * layer.len().saturating_sub(1) as f64
        })
        .collect();
    let widest = layer_lengths.iter().copied().fold(0.0, f64::max);

    let mut placed: Vec<Option<(f64, f64)>> = vec![None; graph.nodes.len()];
    let mut rank_offset = 0.0;
    for (layer, length) in layers.iter().zip(&layer_lengths) {
        let mut along = (widest - length) / 2.0;
        let mut thickest: f64 = 0.0;
        for &index in layer {
            let (along_size, across_size) = extent(index);
            placed[index] = Some(match direction {
                LayoutDirection::TB => (along, rank_offset),
                LayoutDirection::LR => (rank_offset, along),
            });
            along += along_size + NODE_SEPARATION;
            thickest = thickest.max(across_size);
        }
        rank_offset += thickest + RANK_SEPARATION;
    }

    let nodes = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let (width, height) = node.kind.size();
            let (x, y) = placed[index].unwrap_or((0.0, 0.0));
            PositionedNode {
                node: node.clone(),
                rank: ranks[index],
                x,
                y,
                width,
                height,
            }
        })
        .collect();

    GraphLayout {
        direction,
        nodes,
        edges: graph.edges.clone(),
    }
}

fn compute_ranks(graph: &RoadmapGraph) -> Vec<usize> {
    let index_of: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), index))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    for edge in &graph.edges {
        if let (Some(&source), Some(&target)) =
            (index_of.get(edge.source.as_str()), index_of.get(edge.target.as_str()))
        {
            successors[source].push(target);
        }
    }

    let acyclic = drop_back_edges(successors);

    let mut in_degree = vec![0usize; acyclic.len()];
    for targets in &acyclic {
        for &target in targets {
            in_degree[target] += 1;
        }
    }

    let mut ranks = vec![0usize; acyclic.len()];
    let mut queue: VecDeque<usize> = (0..acyclic.len()).filter(|&i| in_degree[i] == 0).collect();
    while let Some(node) = queue.pop_front() {
        for &target in &acyclic[node] {
            ranks[target] = ranks[target].max(ranks[node] + 1);
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                queue.push_back(target);
            }
        }
    }

    ranks
}

/// Depth-first from each node in insertion order, removing edges that point
/// back onto the current path.
fn drop_back_edges(mut successors: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    let mut on_path = vec![false; successors.len()];
    let mut done = vec![false; successors.len()];

    for root in 0..successors.len() {
        if done[root] {
            continue;
        }
        let mut stack = vec![(root, 0usize)];
        on_path[root] = true;

        while let Some(&(node, cursor)) = stack.last() {
            let Some(&target) = successors[node].get(cursor) else {
                stack.pop();
                on_path[node] = false;
                done[node] = true;
                continue;
            };

            if on_path[target] {
                successors[node].remove(cursor);
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if !done[target] {
                on_path[target] = true;
                stack.push((target, 0));
            }
        }
    }

    successors
}
