//! # ONNX Export
//!
//! Converts a fitted forest into a single-node ONNX graph:
//!
//! ```text
//! input: float[N, 6] ──► ai.onnx.ml.TreeEnsembleRegressor ──► variable: float[N, 1]
//! ```
//!
//! Every tree keeps its node numbering (node 0 is the root). Split nodes use
//! `BRANCH_LEQ`, matching the training rule `x <= threshold` goes left.
//! Leaves carry their value as a target weight and the ensemble averages.

use super::proto::{
    AttributeProto, DATA_TYPE_FLOAT, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, ValueInfoProto,
};
use super::{
    DEFAULT_OPSET_VERSION, IR_VERSION, ML_DOMAIN, ML_OPSET_VERSION, TREE_ENSEMBLE_REGRESSOR,
};
use crate::drift::FeatureMeans;
use crate::forest::{RandomForest, TreeNode};
use crate::primitives::{
    BATCH_DIM_PARAM, FEATURE_COLUMNS, FEATURE_COUNT, INPUT_TENSOR_NAME, OUTPUT_TENSOR_NAME,
    TARGET_COLUMN,
};
use prost::Message;

/// Metadata key holding the comma-separated feature order.
pub const META_FEATURE_COLUMNS: &str = "feature_columns";

/// Metadata key holding the target column name.
pub const META_TARGET_COLUMN: &str = "target_column";

/// Metadata key holding the tree count.
pub const META_N_ESTIMATORS: &str = "n_estimators";

/// Metadata key holding the comma-separated training feature means.
pub const META_TRAINING_MEANS: &str = "training_means";

/// Descriptive fields written into the model header.
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxExportOptions {
    pub producer_name: String,
    pub producer_version: String,
    pub model_version: i64,
    pub graph_name: String,
    pub doc_string: String,
    /// Training feature means, recorded as the drift baseline.
    pub training_means: Option<FeatureMeans>,
}

impl Default for OnnxExportOptions {
    fn default() -> Self {
        Self {
            producer_name: "pickest".to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            model_version: 1,
            graph_name: "picking_time_forest".to_string(),
            doc_string: "Random forest regressor predicting picking time in minutes".to_string(),
            training_means: None,
        }
    }
}

/// Build the ONNX model for a fitted forest.
#[must_use]
pub fn forest_to_model(forest: &RandomForest, options: &OnnxExportOptions) -> ModelProto {
    let node = tree_ensemble_node(forest);

    let graph = GraphProto {
        node: vec![node],
        name: options.graph_name.clone(),
        doc_string: String::new(),
        input: vec![ValueInfoProto::tensor(
            INPUT_TENSOR_NAME,
            DATA_TYPE_FLOAT,
            &[None, Some(FEATURE_COUNT as i64)],
            BATCH_DIM_PARAM,
        )],
        output: vec![ValueInfoProto::tensor(
            OUTPUT_TENSOR_NAME,
            DATA_TYPE_FLOAT,
            &[None, Some(1)],
            BATCH_DIM_PARAM,
        )],
    };

    let mut metadata = vec![
        (META_FEATURE_COLUMNS, FEATURE_COLUMNS.join(",")),
        (META_TARGET_COLUMN, TARGET_COLUMN.to_string()),
        (META_N_ESTIMATORS, forest.trees().len().to_string()),
    ];
    if let Some(means) = &options.training_means {
        let values: Vec<String> = means.iter().map(f64::to_string).collect();
        metadata.push((META_TRAINING_MEANS, values.join(",")));
    }

    ModelProto {
        ir_version: IR_VERSION,
        opset_import: vec![
            OperatorSetIdProto {
                domain: String::new(),
                version: DEFAULT_OPSET_VERSION,
            },
            OperatorSetIdProto {
                domain: ML_DOMAIN.to_string(),
                version: ML_OPSET_VERSION,
            },
        ],
        producer_name: options.producer_name.clone(),
        producer_version: options.producer_version.clone(),
        domain: String::new(),
        model_version: options.model_version,
        doc_string: options.doc_string.clone(),
        graph: Some(graph),
        metadata_props: metadata
            .into_iter()
            .map(|(key, value)| StringStringEntryProto {
                key: key.to_string(),
                value,
            })
            .collect(),
    }
}

/// Serialize a fitted forest to ONNX bytes.
#[must_use]
pub fn export_onnx(forest: &RandomForest, options: &OnnxExportOptions) -> Vec<u8> {
    forest_to_model(forest, options).encode_to_vec()
}

/// Flatten every tree into the parallel attribute arrays of the operator.
fn tree_ensemble_node(forest: &RandomForest) -> NodeProto {
    let total = forest.node_count();

    let mut tree_ids = Vec::with_capacity(total);
    let mut node_ids = Vec::with_capacity(total);
    let mut feature_ids = Vec::with_capacity(total);
    let mut modes = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    let mut true_ids = Vec::with_capacity(total);
    let mut false_ids = Vec::with_capacity(total);

    let mut target_tree_ids = Vec::new();
    let mut target_node_ids = Vec::new();
    let mut target_weights = Vec::new();

    for (t, tree) in forest.trees().iter().enumerate() {
        for (n, node) in tree.nodes().iter().enumerate() {
            tree_ids.push(t as i64);
            node_ids.push(n as i64);
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    feature_ids.push(feature as i64);
                    modes.push("BRANCH_LEQ");
                    values.push(threshold);
                    true_ids.push(left as i64);
                    false_ids.push(right as i64);
                }
                TreeNode::Leaf { value } => {
                    feature_ids.push(0);
                    modes.push("LEAF");
                    values.push(0.0);
                    true_ids.push(0);
                    false_ids.push(0);

                    target_tree_ids.push(t as i64);
                    target_node_ids.push(n as i64);
                    target_weights.push(value as f32);
                }
            }
        }
    }

    let leaf_count = target_weights.len();

    NodeProto {
        input: vec![INPUT_TENSOR_NAME.to_string()],
        output: vec![OUTPUT_TENSOR_NAME.to_string()],
        name: TREE_ENSEMBLE_REGRESSOR.to_string(),
        op_type: TREE_ENSEMBLE_REGRESSOR.to_string(),
        domain: ML_DOMAIN.to_string(),
        attribute: vec![
            AttributeProto::string("aggregate_function", "AVERAGE"),
            AttributeProto::int("n_targets", 1),
            AttributeProto::ints("nodes_falsenodeids", false_ids),
            AttributeProto::ints("nodes_featureids", feature_ids),
            AttributeProto::floats("nodes_hitrates", vec![1.0; total]),
            AttributeProto::ints("nodes_missing_value_tracks_true", vec![0; total]),
            AttributeProto::strings("nodes_modes", &modes),
            AttributeProto::ints("nodes_nodeids", node_ids),
            AttributeProto::ints("nodes_treeids", tree_ids),
            AttributeProto::ints("nodes_truenodeids", true_ids),
            AttributeProto::floats("nodes_values", values),
            AttributeProto::string("post_transform", "NONE"),
            AttributeProto::ints("target_ids", vec![0; leaf_count]),
            AttributeProto::ints("target_nodeids", target_node_ids),
            AttributeProto::ints("target_treeids", target_tree_ids),
            AttributeProto::floats("target_weights", target_weights),
        ],
        doc_string: String::new(),
    }
}
