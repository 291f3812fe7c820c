//! # ONNX Runtime
//!
//! Loads an exported artifact back and evaluates it.
//!
//! Only graphs made of a single `ai.onnx.ml.TreeEnsembleRegressor` node are
//! evaluated. Everything else is reported as `Unsupported`. Loading checks
//! the operator attributes for consistency and every tree for cycles, so a
//! loaded model always evaluates in bounded time.

use super::export::{META_FEATURE_COLUMNS, META_TRAINING_MEANS};
use super::proto::{
    AttributeProto, DATA_TYPE_DOUBLE, DATA_TYPE_FLOAT, ModelProto, NodeProto, ValueInfoProto,
    tensor_shape_proto::dimension, type_proto,
};
use super::{ML_DOMAIN, TREE_ENSEMBLE_REGRESSOR};
use crate::drift::FeatureMeans;
use crate::primitives::{FEATURE_COUNT, MAX_MODEL_FILE_SIZE};
use crate::{FeatureVector, PickestError};
use prost::Message;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// =============================================================================
// SIGNATURES
// =============================================================================

/// Declared name, element type and shape of a graph input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSignature {
    /// Tensor name.
    pub name: String,
    /// `TensorProto.DataType` code.
    pub elem_type: i32,
    /// Dimensions; symbolic or unknown dimensions are `None`.
    pub shape: Vec<Option<i64>>,
}

impl TensorSignature {
    /// Human-readable element type.
    #[must_use]
    pub fn elem_type_name(&self) -> &'static str {
        match self.elem_type {
            DATA_TYPE_FLOAT => "float32",
            DATA_TYPE_DOUBLE => "float64",
            _ => "other",
        }
    }

    fn from_value_info(info: &ValueInfoProto) -> Result<Self, PickestError> {
        let tensor = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
            Some(type_proto::Value::TensorType(t)) => t,
            None => {
                return Err(PickestError::InvalidModel(format!(
                    "value '{}' is not a tensor",
                    info.name
                )));
            }
        };
        let shape = tensor
            .shape
            .as_ref()
            .map(|s| {
                s.dim
                    .iter()
                    .map(|d| match d.value {
                        Some(dimension::Value::DimValue(v)) => Some(v),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name: info.name.clone(),
            elem_type: tensor.elem_type,
            shape,
        })
    }
}

impl fmt::Display for TensorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| d.map_or_else(|| "None".to_string(), |v| v.to_string()))
            .collect();
        write!(f, "{}: {}[{}]", self.name, self.elem_type_name(), dims.join(", "))
    }
}

// =============================================================================
// ENSEMBLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchMode {
    Leq,
    Lt,
    Gte,
    Gt,
    Eq,
    Neq,
}

impl BranchMode {
    fn parse(mode: &str) -> Option<Self> {
        Some(match mode {
            "BRANCH_LEQ" => Self::Leq,
            "BRANCH_LT" => Self::Lt,
            "BRANCH_GTE" => Self::Gte,
            "BRANCH_GT" => Self::Gt,
            "BRANCH_EQ" => Self::Eq,
            "BRANCH_NEQ" => Self::Neq,
            _ => return None,
        })
    }

    fn goes_true(self, x: f32, threshold: f32) -> bool {
        match self {
            Self::Leq => x <= threshold,
            Self::Lt => x < threshold,
            Self::Gte => x >= threshold,
            Self::Gt => x > threshold,
            Self::Eq => x == threshold,
            Self::Neq => x != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EnsembleNode {
    Branch {
        mode: BranchMode,
        feature: usize,
        threshold: f32,
        missing_goes_true: bool,
        true_child: usize,
        false_child: usize,
    },
    Leaf {
        weight: f64,
    },
}

/// How per-tree outputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Average,
    Min,
    Max,
}

impl Aggregate {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "SUM" => Self::Sum,
            "AVERAGE" => Self::Average,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            _ => return None,
        })
    }

    /// Operator spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Average => "AVERAGE",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// One tree; `nodes[0]` is the root.
#[derive(Debug, Clone, PartialEq)]
struct EnsembleTree {
    nodes: Vec<EnsembleNode>,
}

impl EnsembleTree {
    fn evaluate(&self, x: &[f32]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(EnsembleNode::Branch {
                    mode,
                    feature,
                    threshold,
                    missing_goes_true,
                    true_child,
                    false_child,
                }) => {
                    let v = x.get(*feature).copied().unwrap_or(f32::NAN);
                    let go_true = if v.is_nan() {
                        *missing_goes_true
                    } else {
                        mode.goes_true(v, *threshold)
                    };
                    idx = if go_true { *true_child } else { *false_child };
                }
                Some(EnsembleNode::Leaf { weight }) => return *weight,
                None => return 0.0,
            }
        }
    }

    /// Reject trees in which a branch can reach itself.
    fn check_acyclic(&self, tree_id: i64) -> Result<(), PickestError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack = vec![(0usize, false)];
        while let Some((idx, exiting)) = stack.pop() {
            if exiting {
                marks[idx] = Mark::Done;
                continue;
            }
            match marks[idx] {
                Mark::Done => continue,
                Mark::Open => {
                    return Err(PickestError::InvalidModel(format!(
                        "tree {} contains a cycle",
                        tree_id
                    )));
                }
                Mark::New => {}
            }
            marks[idx] = Mark::Open;
            stack.push((idx, true));
            if let EnsembleNode::Branch {
                true_child,
                false_child,
                ..
            } = self.nodes[idx]
            {
                for child in [true_child, false_child] {
                    if marks[child] == Mark::Open {
                        return Err(PickestError::InvalidModel(format!(
                            "tree {} contains a cycle",
                            tree_id
                        )));
                    }
                    if marks[child] == Mark::New {
                        stack.push((child, false));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TreeEnsemble {
    trees: Vec<EnsembleTree>,
    aggregate: Aggregate,
    base_value: f64,
    max_feature: usize,
}

impl TreeEnsemble {
    fn from_node(node: &NodeProto) -> Result<Self, PickestError> {
        let attrs: Attributes<'_> = node
            .attribute
            .iter()
            .map(|a| (a.name.as_str(), a))
            .collect();

        if let Some(n) = attrs.get("n_targets").and_then(|a| a.i).filter(|&n| n != 1) {
            return Err(PickestError::Unsupported(format!(
                "n_targets = {} (only 1 is evaluated)",
                n
            )));
        }

        let post_transform = string_attr(&attrs, "post_transform", "NONE");
        if post_transform != "NONE" {
            return Err(PickestError::Unsupported(format!(
                "post_transform = {}",
                post_transform
            )));
        }

        let aggregate_name = string_attr(&attrs, "aggregate_function", "SUM");
        let aggregate = Aggregate::parse(&aggregate_name).ok_or_else(|| {
            PickestError::Unsupported(format!("aggregate_function = {}", aggregate_name))
        })?;

        let tree_ids = ints_attr(&attrs, "nodes_treeids")?;
        let node_ids = ints_attr(&attrs, "nodes_nodeids")?;
        let feature_ids = ints_attr(&attrs, "nodes_featureids")?;
        let true_ids = ints_attr(&attrs, "nodes_truenodeids")?;
        let false_ids = ints_attr(&attrs, "nodes_falsenodeids")?;
        let values = floats_attr(&attrs, "nodes_values")?;
        let modes = attrs
            .get("nodes_modes")
            .map(|a| a.strings.as_slice())
            .ok_or_else(|| missing("nodes_modes"))?;
        let missing_tracks = attrs
            .get("nodes_missing_value_tracks_true")
            .map(|a| a.ints.as_slice())
            .unwrap_or_default();

        let n = tree_ids.len();
        let lens = [
            node_ids.len(),
            feature_ids.len(),
            true_ids.len(),
            false_ids.len(),
            values.len(),
            modes.len(),
        ];
        if lens.iter().any(|&l| l != n) {
            return Err(PickestError::InvalidModel(
                "node attribute arrays differ in length".to_string(),
            ));
        }
        if !missing_tracks.is_empty() && missing_tracks.len() != n {
            return Err(PickestError::InvalidModel(
                "nodes_missing_value_tracks_true differs in length".to_string(),
            ));
        }

        // Group flat node positions by tree, keeping first-seen tree order.
        let mut tree_order: Vec<i64> = Vec::new();
        let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (pos, &t) in tree_ids.iter().enumerate() {
            members
                .entry(t)
                .or_insert_with(|| {
                    tree_order.push(t);
                    Vec::new()
                })
                .push(pos);
        }

        // Leaf weights for target 0.
        let target_tree = ints_attr(&attrs, "target_treeids")?;
        let target_node = ints_attr(&attrs, "target_nodeids")?;
        let target_weight = floats_attr(&attrs, "target_weights")?;
        let target_ids = attrs
            .get("target_ids")
            .map(|a| a.ints.as_slice())
            .unwrap_or_default();
        if target_node.len() != target_tree.len() || target_weight.len() != target_tree.len() {
            return Err(PickestError::InvalidModel(
                "target attribute arrays differ in length".to_string(),
            ));
        }
        if target_ids.iter().any(|&id| id != 0) {
            return Err(PickestError::Unsupported(
                "targets other than 0".to_string(),
            ));
        }
        let mut weights: BTreeMap<(i64, i64), f64> = BTreeMap::new();
        for ((&t, &nid), &w) in target_tree.iter().zip(target_node).zip(target_weight) {
            *weights.entry((t, nid)).or_insert(0.0) += f64::from(w);
        }

        let mut trees = Vec::with_capacity(tree_order.len());
        let mut max_feature = 0usize;
        for tree_id in tree_order {
            let positions = members.get(&tree_id).map(Vec::as_slice).unwrap_or_default();
            let local: BTreeMap<i64, usize> = positions
                .iter()
                .enumerate()
                .map(|(i, &pos)| (node_ids[pos], i))
                .collect();
            if local.len() != positions.len() {
                return Err(PickestError::InvalidModel(format!(
                    "tree {} repeats a node id",
                    tree_id
                )));
            }
            let child = |id: i64| {
                local.get(&id).copied().ok_or_else(|| {
                    PickestError::InvalidModel(format!(
                        "tree {} references missing node {}",
                        tree_id, id
                    ))
                })
            };

            let mut nodes = Vec::with_capacity(positions.len());
            for &pos in positions {
                let mode = String::from_utf8_lossy(&modes[pos]);
                if mode == "LEAF" {
                    let weight = weights
                        .remove(&(tree_id, node_ids[pos]))
                        .unwrap_or(0.0);
                    nodes.push(EnsembleNode::Leaf { weight });
                    continue;
                }
                let branch = BranchMode::parse(&mode).ok_or_else(|| {
                    PickestError::Unsupported(format!("node mode {}", mode))
                })?;
                let feature = usize::try_from(feature_ids[pos]).map_err(|_| {
                    PickestError::InvalidModel(format!(
                        "negative feature id {}",
                        feature_ids[pos]
                    ))
                })?;
                max_feature = max_feature.max(feature);
                nodes.push(EnsembleNode::Branch {
                    mode: branch,
                    feature,
                    threshold: values[pos],
                    missing_goes_true: missing_tracks.get(pos).is_some_and(|&m| m != 0),
                    true_child: child(true_ids[pos])?,
                    false_child: child(false_ids[pos])?,
                });
            }

            let tree = EnsembleTree { nodes };
            tree.check_acyclic(tree_id)?;
            trees.push(tree);
        }

        if trees.is_empty() {
            return Err(PickestError::InvalidModel("ensemble has no trees".to_string()));
        }
        if let Some(&(t, nid)) = weights.keys().next() {
            return Err(PickestError::InvalidModel(format!(
                "target weight refers to non-leaf or missing node {} of tree {}",
                nid, t
            )));
        }

        let base_value = attrs
            .get("base_values")
            .and_then(|a| a.floats.first())
            .map_or(0.0, |&v| f64::from(v));

        Ok(Self {
            trees,
            aggregate,
            base_value,
            max_feature,
        })
    }

    fn evaluate(&self, x: &[f32]) -> f64 {
        let outputs = self.trees.iter().map(|t| t.evaluate(x));
        let combined = match self.aggregate {
            Aggregate::Sum => outputs.sum(),
            Aggregate::Average => outputs.sum::<f64>() / self.trees.len() as f64,
            Aggregate::Min => outputs.fold(f64::INFINITY, f64::min),
            Aggregate::Max => outputs.fold(f64::NEG_INFINITY, f64::max),
        };
        combined + self.base_value
    }
}

type Attributes<'a> = BTreeMap<&'a str, &'a AttributeProto>;

fn missing(name: &str) -> PickestError {
    PickestError::InvalidModel(format!("missing attribute {}", name))
}

fn ints_attr<'a>(attrs: &Attributes<'a>, name: &str) -> Result<&'a [i64], PickestError> {
    attrs
        .get(name)
        .copied()
        .map(|a| a.ints.as_slice())
        .ok_or_else(|| missing(name))
}

fn floats_attr<'a>(attrs: &Attributes<'a>, name: &str) -> Result<&'a [f32], PickestError> {
    attrs
        .get(name)
        .copied()
        .map(|a| a.floats.as_slice())
        .ok_or_else(|| missing(name))
}

fn string_attr(attrs: &Attributes<'_>, name: &str, default: &str) -> String {
    attrs
        .get(name)
        .map_or_else(|| default.to_string(), |a| String::from_utf8_lossy(&a.s).into_owned())
}

// =============================================================================
// MODEL
// =============================================================================

/// A loaded, validated tree-ensemble ONNX model.
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxModel {
    ir_version: i64,
    producer: String,
    opsets: Vec<(String, i64)>,
    inputs: Vec<TensorSignature>,
    outputs: Vec<TensorSignature>,
    metadata: BTreeMap<String, String>,
    input_width: usize,
    ensemble: TreeEnsemble,
}

impl OnnxModel {
    /// Read and load a model file.
    pub fn from_path(path: &Path) -> Result<Self, PickestError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            PickestError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_MODEL_FILE_SIZE {
            return Err(PickestError::InvalidModel(format!(
                "Model size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_MODEL_FILE_SIZE
            )));
        }
        let bytes = std::fs::read(path).map_err(|e| {
            PickestError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Decode and validate serialized ONNX bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PickestError> {
        if bytes.len() as u64 > MAX_MODEL_FILE_SIZE {
            return Err(PickestError::InvalidModel(format!(
                "Model size {} bytes exceeds maximum allowed {} bytes",
                bytes.len(),
                MAX_MODEL_FILE_SIZE
            )));
        }
        let model = ModelProto::decode(bytes)
            .map_err(|e| PickestError::DeserializationError(format!("ONNX decode: {}", e)))?;
        Self::from_proto(&model)
    }

    /// Validate an already-decoded model.
    pub fn from_proto(model: &ModelProto) -> Result<Self, PickestError> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| PickestError::InvalidModel("model has no graph".to_string()))?;

        let inputs = graph
            .input
            .iter()
            .map(TensorSignature::from_value_info)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = graph
            .output
            .iter()
            .map(TensorSignature::from_value_info)
            .collect::<Result<Vec<_>, _>>()?;

        let [input] = inputs.as_slice() else {
            return Err(PickestError::Unsupported(format!(
                "graph has {} inputs (expected 1)",
                inputs.len()
            )));
        };
        if input.elem_type != DATA_TYPE_FLOAT {
            return Err(PickestError::Unsupported(format!(
                "input element type {} (expected float32)",
                input.elem_type
            )));
        }

        let [node] = graph.node.as_slice() else {
            return Err(PickestError::Unsupported(format!(
                "graph has {} nodes (expected a single {})",
                graph.node.len(),
                TREE_ENSEMBLE_REGRESSOR
            )));
        };
        if node.op_type != TREE_ENSEMBLE_REGRESSOR || node.domain != ML_DOMAIN {
            return Err(PickestError::Unsupported(format!(
                "operator {}.{}",
                node.domain, node.op_type
            )));
        }
        if node.input.first() != Some(&input.name) {
            return Err(PickestError::InvalidModel(
                "operator input is not the graph input".to_string(),
            ));
        }

        let ensemble = TreeEnsemble::from_node(node)?;

        let input_width = match input.shape.get(1).copied().flatten() {
            Some(w) => usize::try_from(w).map_err(|_| {
                PickestError::InvalidModel(format!("negative input width {}", w))
            })?,
            None => ensemble.max_feature + 1,
        };
        if ensemble.max_feature >= input_width {
            return Err(PickestError::InvalidModel(format!(
                "feature id {} outside input width {}",
                ensemble.max_feature, input_width
            )));
        }

        Ok(Self {
            ir_version: model.ir_version,
            producer: format!("{} {}", model.producer_name, model.producer_version)
                .trim()
                .to_string(),
            opsets: model
                .opset_import
                .iter()
                .map(|o| (o.domain.clone(), o.version))
                .collect(),
            inputs,
            outputs,
            metadata: model
                .metadata_props
                .iter()
                .map(|e| (e.key.clone(), e.value.clone()))
                .collect(),
            input_width,
            ensemble,
        })
    }

    /// Predict one row. `features` must have exactly the input width.
    pub fn predict(&self, features: &[f32]) -> Result<f32, PickestError> {
        if features.len() != self.input_width {
            return Err(PickestError::InvalidInput(format!(
                "expected {} feature values, got {}",
                self.input_width,
                features.len()
            )));
        }
        Ok(self.ensemble.evaluate(features) as f32)
    }

    /// Predict every row of a batch.
    pub fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<f32>, PickestError> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Declared graph inputs.
    #[must_use]
    pub fn inputs(&self) -> &[TensorSignature] {
        &self.inputs
    }

    /// Declared graph outputs.
    #[must_use]
    pub fn outputs(&self) -> &[TensorSignature] {
        &self.outputs
    }

    /// Model metadata properties.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Feature order recorded by the exporter, if present.
    #[must_use]
    pub fn feature_columns(&self) -> Option<Vec<String>> {
        self.metadata
            .get(META_FEATURE_COLUMNS)
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
    }

    /// Training feature means recorded by the exporter, if present.
    pub fn training_means(&self) -> Result<Option<FeatureMeans>, PickestError> {
        let Some(raw) = self.metadata.get(META_TRAINING_MEANS) else {
            return Ok(None);
        };
        let invalid = || {
            PickestError::InvalidModel(format!(
                "{} must hold {} comma-separated numbers, got '{}'",
                META_TRAINING_MEANS, FEATURE_COUNT, raw
            ))
        };

        let mut means = [0.0; FEATURE_COUNT];
        let mut values = raw.split(',');
        for slot in &mut means {
            let value: f64 = values
                .next()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(invalid)?;
            if !value.is_finite() {
                return Err(invalid());
            }
            *slot = value;
        }
        if values.next().is_some() {
            return Err(invalid());
        }
        Ok(Some(means))
    }

    /// ONNX IR version.
    #[must_use]
    pub fn ir_version(&self) -> i64 {
        self.ir_version
    }

    /// Producer name and version.
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Imported operator sets as `(domain, version)`.
    #[must_use]
    pub fn opsets(&self) -> &[(String, i64)] {
        &self.opsets
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.ensemble.trees.len()
    }

    /// Ensemble aggregation.
    #[must_use]
    pub fn aggregate(&self) -> Aggregate {
        self.ensemble.aggregate
    }
}

// =============================================================================
// TESTS
// =============================================================================
