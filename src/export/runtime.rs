//! Reference evaluator for exported graphs.
//!
//! Decodes serialized model bytes and executes the node list in order with
//! single-precision arithmetic, the way an inference runtime would. Only the
//! operators a dense classifier graph can contain are implemented.

use crate::export::onnx::ModelProto;
use crate::export::ExportError;
use crate::model::network::logistic;
use ndarray::{Array2, Axis};
use prost::Message;
use std::collections::HashMap;

/// A decoded model ready to run.
#[derive(Debug, Clone)]
pub struct GraphRuntime {
    model: ModelProto,
    constants: HashMap<String, Array2<f32>>,
}

impl GraphRuntime {
    /// Decode serialized model bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExportError> {
        let model = ModelProto::decode(bytes)?;
        Self::new(model)
    }

    /// Prepare a decoded model. 1-D initializers become single-row matrices.
    pub fn new(model: ModelProto) -> Result<Self, ExportError> {
        let graph = model.graph.as_ref().ok_or(ExportError::MissingGraph)?;
        let mut constants = HashMap::new();

        for tensor in &graph.initializer {
            let shape = match tensor.dims.as_slice() {
                [n] => (1, *n as usize),
                [rows, cols] => (*rows as usize, *cols as usize),
                dims => {
                    return Err(ExportError::Evaluation(format!(
                        "initializer {} has unsupported rank {}",
                        tensor.name,
                        dims.len()
                    )))
                }
            };
            let values = Array2::from_shape_vec(shape, tensor.float_values()).map_err(|_| {
                ExportError::InitializerSize {
                    name: tensor.name.clone(),
                    expected: tensor.element_count(),
                    actual: tensor.payload_len(),
                }
            })?;
            constants.insert(tensor.name.clone(), values);
        }

        Ok(Self { model, constants })
    }

    pub fn model(&self) -> &ModelProto {
        &self.model
    }

    /// Run one sample through the graph and return the graph output row.
    pub fn run(&self, input: &[f32]) -> Result<Vec<f32>, ExportError> {
        let graph = self.model.graph.as_ref().ok_or(ExportError::MissingGraph)?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ExportError::Interface("graph has no input".into()))?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ExportError::Interface("graph has no output".into()))?;

        let mut values: HashMap<String, Array2<f32>> = HashMap::new();
        let row = Array2::from_shape_vec((1, input.len()), input.to_vec())
            .map_err(|e| ExportError::Evaluation(e.to_string()))?;
        values.insert(input_name, row);

        for node in &graph.node {
            let args = node
                .input
                .iter()
                .map(|name| {
                    values
                        .get(name)
                        .or_else(|| self.constants.get(name))
                        .ok_or_else(|| ExportError::DanglingInput {
                            node: node.name.clone(),
                            input: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let result = evaluate(&node.op_type, &args, &node.name)?;
            let output = node.output.first().ok_or_else(|| {
                ExportError::Evaluation(format!("node {} has no output", node.name))
            })?;
            values.insert(output.clone(), result);
        }

        let out = values
            .remove(&output_name)
            .ok_or(ExportError::MissingOutput(output_name))?;
        Ok(out.iter().copied().collect())
    }
}

fn evaluate(op_type: &str, args: &[&Array2<f32>], node: &str) -> Result<Array2<f32>, ExportError> {
    let arity = |n: usize| -> Result<(), ExportError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(ExportError::Evaluation(format!(
                "{op_type} node {node} takes {n} inputs, got {}",
                args.len()
            )))
        }
    };

    match op_type {
        "MatMul" => {
            arity(2)?;
            let (a, b) = (args[0], args[1]);
            if a.ncols() != b.nrows() {
                return Err(ExportError::Evaluation(format!(
                    "MatMul node {node}: {:?} x {:?}",
                    a.dim(),
                    b.dim()
                )));
            }
            Ok(a.dot(b))
        }
        "Add" => {
            arity(2)?;
            let (a, b) = (args[0], args[1]);
            let rhs = b.broadcast(a.raw_dim()).ok_or_else(|| {
                ExportError::Evaluation(format!(
                    "Add node {node}: cannot broadcast {:?} to {:?}",
                    b.dim(),
                    a.dim()
                ))
            })?;
            Ok(a + &rhs)
        }
        "Relu" => {
            arity(1)?;
            Ok(args[0].mapv(|v| v.max(0.0)))
        }
        "Tanh" => {
            arity(1)?;
            Ok(args[0].mapv(f32::tanh))
        }
        "Sigmoid" => {
            arity(1)?;
            Ok(args[0].mapv(|v| logistic(v as f64) as f32))
        }
        "Identity" => {
            arity(1)?;
            Ok(args[0].clone())
        }
        "Softmax" => {
            arity(1)?;
            let mut out = args[0].clone();
            for mut row in out.axis_iter_mut(Axis(0)) {
                let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
            }
            Ok(out)
        }
        other => Err(ExportError::UnsupportedOps(vec![other.to_string()])),
    }
}
