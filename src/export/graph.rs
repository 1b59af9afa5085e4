//! Graph assembly from a trained network, and the checks a graph must pass
//! before it is written.

use crate::config::ExportConfig;
use crate::export::onnx::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, TensorProto, ValueInfoProto, DATA_TYPE_FLOAT,
};
use crate::export::ExportError;
use crate::model::labels::LabelMap;
use crate::model::network::Network;
use std::collections::{BTreeSet, HashSet};

/// IR version written into every model.
pub const IR_VERSION: i64 = 8;

/// Producer name written into every model.
pub const PRODUCER_NAME: &str = "myo-gesture-trainer";

/// Metadata key holding the class labels as a JSON array.
pub const CLASSES_METADATA_KEY: &str = "classes";

/// Metadata key holding the input feature columns as a JSON array.
pub const FEATURE_NAMES_METADATA_KEY: &str = "feature_names";

/// Build the graph of a trained network.
///
/// Each layer becomes `MatMul` + `Add`; hidden layers are followed by their
/// activation and the last layer by `Softmax` over the class axis. Weights are
/// stored as float initializers with the trained matrix shapes.
pub fn build_model(network: &Network, labels: &LabelMap, config: &ExportConfig) -> ModelProto {
    let mut nodes = Vec::new();
    let mut initializers = Vec::new();
    let mut current = config.input_name.clone();
    let last = network.layers.len().saturating_sub(1);

    for (i, layer) in network.layers.iter().enumerate() {
        let weight_name = format!("layer{i}.weight");
        let bias_name = format!("layer{i}.bias");
        let weights: Vec<f32> = layer.weights.iter().map(|&w| w as f32).collect();
        let bias: Vec<f32> = layer.bias.iter().map(|&b| b as f32).collect();
        initializers.push(TensorProto::float(
            &weight_name,
            vec![layer.n_inputs() as i64, layer.n_outputs() as i64],
            &weights,
        ));
        initializers.push(TensorProto::float(
            &bias_name,
            vec![layer.n_outputs() as i64],
            &bias,
        ));

        let matmul_out = format!("layer{i}.matmul");
        nodes.push(node("MatMul", &matmul_out, vec![current, weight_name], &matmul_out));
        let add_out = format!("layer{i}.add");
        nodes.push(node("Add", &add_out, vec![matmul_out, bias_name], &add_out));
        current = add_out;

        if i < last {
            let act_out = format!("layer{i}.act");
            nodes.push(node(
                network.activation.op_type(),
                &act_out,
                vec![current],
                &act_out,
            ));
            current = act_out;
        }
    }

    let mut softmax = node("Softmax", "softmax", vec![current], &config.output_name);
    softmax.attribute.push(AttributeProto::int("axis", -1));
    nodes.push(softmax);

    let classes: Vec<&String> = labels.classes().iter().collect();
    let metadata_props = vec![
        StringStringEntryProto {
            key: CLASSES_METADATA_KEY.to_string(),
            value: serde_json::to_string(&classes).unwrap_or_default(),
        },
        StringStringEntryProto {
            key: "architecture".to_string(),
            value: network.architecture(),
        },
    ];

    ModelProto {
        ir_version: IR_VERSION,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: config.opset_version,
        }],
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: crate::VERSION.to_string(),
        graph: Some(GraphProto {
            name: "emg_classifier".to_string(),
            node: nodes,
            initializer: initializers,
            input: vec![ValueInfoProto::float_tensor(
                &config.input_name,
                &[1, network.n_inputs() as i64],
            )],
            output: vec![ValueInfoProto::float_tensor(
                &config.output_name,
                &[1, network.n_outputs() as i64],
            )],
            ..Default::default()
        }),
        metadata_props,
        ..Default::default()
    }
}

fn node(op_type: &str, name: &str, inputs: Vec<String>, output: &str) -> NodeProto {
    NodeProto {
        input: inputs,
        output: vec![output.to_string()],
        name: name.to_string(),
        op_type: op_type.to_string(),
        ..Default::default()
    }
}

/// Sorted distinct operator types of a model.
pub fn op_types(model: &ModelProto) -> Vec<String> {
    let ops: BTreeSet<&str> = model
        .graph
        .iter()
        .flat_map(|g| g.node.iter().map(|n| n.op_type.as_str()))
        .collect();
    ops.into_iter().map(String::from).collect()
}

/// Class labels recorded in the model metadata.
pub fn metadata_classes(model: &ModelProto) -> Option<Vec<String>> {
    metadata_list(model, CLASSES_METADATA_KEY)
}

/// Input feature columns recorded in the model metadata.
pub fn metadata_feature_names(model: &ModelProto) -> Option<Vec<String>> {
    metadata_list(model, FEATURE_NAMES_METADATA_KEY)
}

/// Record the input feature columns, replacing any previous entry.
pub fn set_feature_names(model: &mut ModelProto, names: &[String]) {
    model
        .metadata_props
        .retain(|p| p.key != FEATURE_NAMES_METADATA_KEY);
    model.metadata_props.push(StringStringEntryProto {
        key: FEATURE_NAMES_METADATA_KEY.to_string(),
        value: serde_json::to_string(names).unwrap_or_default(),
    });
}

fn metadata_list(model: &ModelProto, key: &str) -> Option<Vec<String>> {
    model
        .metadata_props
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| serde_json::from_str(&p.value).ok())
}

/// Structural well-formedness of a model with the expected interface.
pub fn check_structure(
    model: &ModelProto,
    n_features: usize,
    n_classes: usize,
) -> Result<(), ExportError> {
    if model.ir_version <= 0 {
        return Err(ExportError::MissingIrVersion);
    }
    let has_default_opset = model
        .opset_import
        .iter()
        .any(|o| (o.domain.is_empty() || o.domain == "ai.onnx") && o.version > 0);
    if !has_default_opset {
        return Err(ExportError::MissingOpset);
    }
    let graph = model.graph.as_ref().ok_or(ExportError::MissingGraph)?;

    if graph.input.len() != 1 || graph.output.len() != 1 {
        return Err(ExportError::Interface(format!(
            "expected one input and one output, found {} and {}",
            graph.input.len(),
            graph.output.len()
        )));
    }

    let mut defined: HashSet<&str> = HashSet::new();
    for name in graph
        .input
        .iter()
        .map(|i| i.name.as_str())
        .chain(graph.initializer.iter().map(|t| t.name.as_str()))
    {
        if !defined.insert(name) {
            return Err(ExportError::DuplicateValue(name.to_string()));
        }
    }

    for tensor in &graph.initializer {
        if tensor.data_type != DATA_TYPE_FLOAT {
            return Err(ExportError::Interface(format!(
                "initializer {} has data type {}",
                tensor.name, tensor.data_type
            )));
        }
        let expected = tensor.element_count();
        let actual = tensor.payload_len();
        if expected < 0 || expected as usize != actual {
            return Err(ExportError::InitializerSize {
                name: tensor.name.clone(),
                expected,
                actual,
            });
        }
    }

    for node in &graph.node {
        for input in node.input.iter().filter(|i| !i.is_empty()) {
            if !defined.contains(input.as_str()) {
                return Err(ExportError::DanglingInput {
                    node: node.name.clone(),
                    input: input.clone(),
                });
            }
        }
        for output in &node.output {
            if !defined.insert(output.as_str()) {
                return Err(ExportError::DuplicateValue(output.clone()));
            }
        }
    }

    let output = &graph.output[0];
    if !defined.contains(output.name.as_str()) {
        return Err(ExportError::MissingOutput(output.name.clone()));
    }

    let expected_in = vec![1, n_features as i64];
    let expected_out = vec![1, n_classes as i64];
    for (info, expected) in [(&graph.input[0], expected_in), (output, expected_out)] {
        let actual = info.fixed_dims().unwrap_or_default();
        if actual != expected {
            return Err(ExportError::ShapeMismatch {
                name: info.name.clone(),
                expected,
                actual,
            });
        }
    }

    Ok(())
}

/// Operator types the downstream runtime supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowSet {
    ops: BTreeSet<String>,
}

impl AllowSet {
    pub fn new<I, S>(ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ops: ops.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.allowed_ops.iter().cloned())
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.ops.contains(op_type)
    }

    /// Fail listing every operator type outside the set.
    pub fn check(&self, model: &ModelProto) -> Result<(), ExportError> {
        let unsupported: Vec<String> = op_types(model)
            .into_iter()
            .filter(|op| !self.contains(op))
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(ExportError::UnsupportedOps(unsupported))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::network::Activation;
    use prost::Message;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network(hidden: &[usize], activation: Activation) -> Network {
        let mut rng = StdRng::seed_from_u64(5);
        Network::new(6, hidden, 3, activation, &mut rng)
    }

    fn labels() -> LabelMap {
        LabelMap::from_labels(["Fist", "Pinch", "Resting"])
    }

    #[test]
    fn test_graph_layout() {
        let model = build_model(
            &network(&[4], Activation::Tanh),
            &labels(),
            &ExportConfig::default(),
        );
        let graph = model.graph.as_ref().unwrap();
        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["MatMul", "Add", "Tanh", "MatMul", "Add", "Softmax"]);
        assert_eq!(graph.initializer[0].dims, vec![6, 4]);
        assert_eq!(graph.initializer[3].dims, vec![3]);
        assert_eq!(graph.node.last().unwrap().output, vec!["output"]);
        assert_eq!(model.opset_import[0].version, 13);
        assert_eq!(model.ir_version, IR_VERSION);
        assert!(check_structure(&model, 6, 3).is_ok());
    }

    #[test]
    fn test_export_is_deterministic() {
        let net = network(&[4, 4], Activation::Relu);
        let config = ExportConfig::default();
        let a = build_model(&net, &labels(), &config).encode_to_vec();
        let b = build_model(&net, &labels(), &config).encode_to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn test_metadata_classes_round_trip() {
        let model = build_model(
            &network(&[], Activation::Relu),
            &labels(),
            &ExportConfig::default(),
        );
        let classes = metadata_classes(&model).unwrap();
        assert_eq!(LabelMap::from_labels(&classes), labels());
    }

    #[test]
    fn test_feature_names_recorded_once() {
        let mut model = build_model(
            &network(&[], Activation::Relu),
            &labels(),
            &ExportConfig::default(),
        );
        assert!(metadata_feature_names(&model).is_none());

        let names: Vec<String> = (1..=6).map(|i| format!("CH{i}_mav")).collect();
        set_feature_names(&mut model, &names[..3]);
        set_feature_names(&mut model, &names);
        assert_eq!(metadata_feature_names(&model).unwrap(), names);
        let entries = model
            .metadata_props
            .iter()
            .filter(|p| p.key == FEATURE_NAMES_METADATA_KEY)
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_dangling_input_rejected() {
        let mut model = build_model(
            &network(&[4], Activation::Relu),
            &labels(),
            &ExportConfig::default(),
        );
        model.graph.as_mut().unwrap().node[1].input[1] = "nowhere".to_string();
        assert!(matches!(
            check_structure(&model, 6, 3),
            Err(ExportError::DanglingInput { input, .. }) if input == "nowhere"
        ));
    }

    #[test]
    fn test_structure_rejects_bad_interface() {
        let mut model = build_model(
            &network(&[4], Activation::Relu),
            &labels(),
            &ExportConfig::default(),
        );
        assert!(matches!(
            check_structure(&model, 7, 3),
            Err(ExportError::ShapeMismatch { .. })
        ));

        model.graph.as_mut().unwrap().initializer[0].raw_data.truncate(8);
        assert!(matches!(
            check_structure(&model, 6, 3),
            Err(ExportError::InitializerSize { .. })
        ));

        model.opset_import.clear();
        assert!(matches!(
            check_structure(&model, 6, 3),
            Err(ExportError::MissingOpset)
        ));
    }

    #[test]
    fn test_allow_set_lists_unsupported_ops() {
        let model = build_model(
            &network(&[4], Activation::Logistic),
            &labels(),
            &ExportConfig::default(),
        );
        assert!(AllowSet::from_config(&ExportConfig::default())
            .check(&model)
            .is_ok());

        let narrow = AllowSet::new(["MatMul", "Add"]);
        match narrow.check(&model) {
            Err(ExportError::UnsupportedOps(ops)) => {
                assert_eq!(ops, vec!["Sigmoid".to_string(), "Softmax".to_string()])
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
