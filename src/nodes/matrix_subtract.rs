//! Element-wise subtraction of a streamed matrix and a side matrix
//!
//! The node takes exactly one input stream and one input side packet. Their
//! tags decide which operand is which:
//!
//! ```json
//! {
//!   "node": "MatrixSubtractNode",
//!   "input_stream": ["MINUEND:input_matrix"],
//!   "input_side_packet": ["SUBTRAHEND:side_matrix"],
//!   "output_stream": ["output_matrix"]
//! }
//! ```
//!
//! computes `input_matrix - side_matrix`, while swapping the two tags computes
//! `side_matrix - input_matrix`. Every output packet carries the timestamp of
//! the input packet it was computed from.

use crate::matrix::{Matrix, Shape};
use crate::runtime::config::NodeConfig;
use crate::runtime::contract::{NodeContract, TagMap};
use crate::runtime::errors::{NodeError, PortError};
use crate::runtime::node::{InputPort, OpenContext, OutputPort, ProcessNode, WorkResult};
use crate::runtime::packet::{Packet, TimestampDiff};
use crate::runtime::ports::PortSchema;
use std::sync::Arc;
use tracing::{debug, trace};

/// Registry id of the node
pub const NODE_TYPE: &str = "MatrixSubtractNode";

/// Tag of the port supplying the left operand
pub const MINUEND: &str = "MINUEND";

/// Tag of the port supplying the right operand
pub const SUBTRAHEND: &str = "SUBTRAHEND";

/// Which operand the streamed matrix supplies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    InputIsMinuend,
    InputIsSubtrahend,
}

impl Role {
    /// Role implied by the tag bound to the input stream
    pub fn from_stream_tag(tag: &str) -> Self {
        if tag == MINUEND {
            Role::InputIsMinuend
        } else {
            Role::InputIsSubtrahend
        }
    }

    /// Order `(streamed, side)` as `(minuend, subtrahend)`
    pub fn operands<'a>(self, streamed: &'a Matrix, side: &'a Matrix) -> (&'a Matrix, &'a Matrix) {
        match self {
            Role::InputIsMinuend => (streamed, side),
            Role::InputIsSubtrahend => (side, streamed),
        }
    }
}

/// Subtract with the operand order given by `role`
///
/// Fails with `DimensionMismatch` unless both matrices have the same shape.
/// Neither operand is modified.
pub fn subtract(role: Role, streamed: &Matrix, side: &Matrix) -> Result<Matrix, NodeError> {
    let (minuend, subtrahend) = role.operands(streamed, side);
    if minuend.shape() != subtrahend.shape() {
        return Err(NodeError::DimensionMismatch {
            minuend: Shape::of(minuend),
            subtrahend: Shape::of(subtrahend),
        });
    }
    Ok(minuend - subtrahend)
}

/// Lifecycle of a node instance
#[derive(Debug)]
enum NodeState {
    Unconfigured,
    Ready { role: Role, side: Arc<Matrix> },
    Closed,
}

/// Port indices handed out by the contract
#[derive(Debug, Clone, Copy)]
struct PortIndices {
    input: usize,
    side: usize,
    output: usize,
}

/// Matrix subtraction node
///
/// Input: one `Matrix` stream tagged MINUEND or SUBTRAHEND
/// Side input: one `Matrix` side packet carrying the complementary tag
/// Output: `Matrix` stream, untagged index 0
pub struct MatrixSubtractNode {
    name: String,
    contract: NodeContract,
    ports: PortIndices,
    state: NodeState,
}

impl MatrixSubtractNode {
    /// Validate a configuration and declare the ports it binds
    ///
    /// Checks run in a fixed order: cardinality first, then the role tags,
    /// then the output. No matrix values are involved.
    pub fn contract(config: &NodeConfig) -> Result<NodeContract, NodeError> {
        Self::declare(config).map(|(contract, _)| contract)
    }

    fn declare(config: &NodeConfig) -> Result<(NodeContract, PortIndices), NodeError> {
        if config.input_stream.len() != 1 || config.input_side_packet.len() != 1 {
            return Err(NodeError::InvalidConfiguration(format!(
                "{} only accepts exactly one input stream and one input side packet",
                NODE_TYPE
            )));
        }

        let inputs = TagMap::parse(config.input_stream.as_slice())?;
        let side_inputs = TagMap::parse(config.input_side_packet.as_slice())?;
        let stream = &inputs.entries()[0];
        let side = &side_inputs.entries()[0];

        let complementary = matches!(
            (stream.tag.as_str(), side.tag.as_str()),
            (MINUEND, SUBTRAHEND) | (SUBTRAHEND, MINUEND)
        );
        if !complementary {
            return Err(NodeError::InvalidConfiguration(
                "Must specify exactly one minuend and one subtrahend".to_string(),
            ));
        }

        let outputs = TagMap::parse(config.output_stream.as_slice())?;
        let output = match outputs.get("", 0) {
            Some(entry) if outputs.num_entries() == 1 => entry,
            _ => {
                return Err(NodeError::InvalidConfiguration(format!(
                    "{} produces exactly one untagged output stream",
                    NODE_TYPE
                )));
            }
        };

        let mut contract = NodeContract::new(NODE_TYPE);
        let ports = PortIndices {
            input: contract.add_input::<Matrix>(stream),
            side: contract.add_side_input::<Matrix>(side),
            output: contract.add_output::<Matrix>(output),
        };
        Ok((contract, ports))
    }

    /// Create a node from its configuration, checking the contract
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
        let (contract, ports) = Self::declare(config)?;
        let name = config.name.clone().unwrap_or_else(|| NODE_TYPE.to_string());
        Ok(Self {
            name,
            contract,
            ports,
            state: NodeState::Unconfigured,
        })
    }

    /// Role fixed at open, if the node is ready
    pub fn role(&self) -> Option<Role> {
        match self.state {
            NodeState::Ready { role, .. } => Some(role),
            _ => None,
        }
    }
}

impl ProcessNode for MatrixSubtractNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        self.contract.inputs().to_vec()
    }

    fn side_input_schema(&self) -> Vec<PortSchema> {
        self.contract.side_inputs().to_vec()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        self.contract.outputs().to_vec()
    }

    fn open(&mut self, ctx: &mut OpenContext) -> WorkResult<()> {
        let stream = &self.contract.inputs()[self.ports.input];
        let role = Role::from_stream_tag(&stream.tag);
        let side = ctx.side_packet::<Matrix>(self.ports.side)?;
        ctx.set_offset(TimestampDiff::ZERO);

        debug!(
            "[{}] Ready: {:?}, side matrix {}",
            self.name,
            role,
            Shape::of(&side)
        );
        self.state = NodeState::Ready { role, side };
        Ok(())
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let NodeState::Ready { role, side } = &self.state else {
            return Err(NodeError::NotReady(self.name.clone()).into());
        };

        let input = inputs
            .get(self.ports.input)
            .ok_or_else(|| PortError::NotConnected(self.contract.inputs()[self.ports.input].to_string()))?
            .get::<Matrix>()?;
        let output = outputs
            .get(self.ports.output)
            .ok_or_else(|| {
                PortError::NotConnected(self.contract.outputs()[self.ports.output].to_string())
            })?
            .get::<Matrix>()?;

        let packet = input.recv()?;
        let result = subtract(*role, packet.get(), side)?;
        trace!("[{}] {} -> {}", self.name, packet.timestamp, Shape::of(&result));

        output.send(Packet::new(result, packet.timestamp))?;
        Ok(1)
    }

    fn close(&mut self) -> WorkResult<()> {
        debug!("[{}] Closed", self.name);
        self.state = NodeState::Closed;
        Ok(())
    }
}
