// SYNOID Filter Graph - DAG of encoder filter stages
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Each node is one filter chain with labelled input and output pads. Edges
// run from the stage that produces a pad to every stage that consumes it.
// Pads with no producer (`0:v`, `1:a`) are encoder inputs.

use petgraph::algo::is_cyclic_directed;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PlanError;

/// One `[in]filter,filter[out]` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStage {
    pub inputs: Vec<String>,
    pub filters: Vec<String>,
    pub outputs: Vec<String>,
}

impl FilterStage {
    pub fn new<I, O>(inputs: I, filters: Vec<String>, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        Self {
            inputs: inputs.into_iter().map(|s| s.as_ref().to_string()).collect(),
            filters,
            outputs: outputs.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Single filter, single input, single output
    pub fn single(input: &str, filter: impl Into<String>, output: &str) -> Self {
        Self::new([input], vec![filter.into()], [output])
    }

    pub fn render(&self) -> String {
        let pads = |labels: &[String]| labels.iter().map(|l| format!("[{}]", l)).collect::<String>();
        format!("{}{}{}", pads(&self.inputs), self.filters.join(","), pads(&self.outputs))
    }
}

/// Pad carried along an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadLink {
    pub label: String,
}

pub struct FilterGraph {
    pub dag: StableGraph<FilterStage, PadLink, Directed>,
    producers: HashMap<String, NodeIndex>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self {
            dag: StableGraph::new(),
            producers: HashMap::new(),
        }
    }

    /// Add a stage, wiring it to whichever earlier stages produce its inputs.
    pub fn add_stage(&mut self, stage: FilterStage) -> NodeIndex {
        let inputs = stage.inputs.clone();
        let outputs = stage.outputs.clone();
        let node = self.dag.add_node(stage);

        for label in inputs {
            if let Some(&producer) = self.producers.get(&label) {
                self.dag.add_edge(producer, node, PadLink { label });
            }
        }
        for label in outputs {
            self.producers.insert(label, node);
        }
        node
    }

    pub fn stage_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn stages(&self) -> impl Iterator<Item = &FilterStage> {
        self.dag.node_indices().filter_map(|idx| self.dag.node_weight(idx))
    }

    /// Output pads nothing downstream consumes. For a finished plan these
    /// are exactly the mapped output labels.
    pub fn terminal_pads(&self) -> Vec<String> {
        let mut pads = Vec::new();
        for idx in self.dag.node_indices() {
            let consumed: Vec<&str> = self
                .dag
                .edges_directed(idx, Direction::Outgoing)
                .map(|edge| edge.weight().label.as_str())
                .collect();
            if let Some(stage) = self.dag.node_weight(idx) {
                pads.extend(
                    stage
                        .outputs
                        .iter()
                        .filter(|label| !consumed.contains(&label.as_str()))
                        .cloned(),
                );
            }
        }
        pads
    }

    /// Serialize to a `-filter_complex` description.
    ///
    /// Stages are emitted in insertion order, which is already topological
    /// because a stage can only consume pads produced before it.
    pub fn to_filter_complex(&self) -> Result<String, PlanError> {
        if is_cyclic_directed(&self.dag) {
            let first = self
                .stages()
                .next()
                .map(FilterStage::render)
                .unwrap_or_default();
            return Err(PlanError::GraphCycle(first));
        }
        Ok(self.stages().map(FilterStage::render).collect::<Vec<_>>().join(";"))
    }
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new()
    }
}
