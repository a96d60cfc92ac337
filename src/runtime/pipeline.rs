//! Pipeline builder for constructing node graphs
//!
//! Nodes are wired by stream name: every input stream must be produced by
//! exactly one output of another node, with the same payload type. Side
//! packets are provided by name and bound to the side input ports that name
//! them. `build()` validates the whole graph and opens every node before the
//! first thread starts, so contract and setup errors never leave a half-run
//! graph behind.

use super::config::{DEFAULT_BUFFER_SIZE, GraphConfig, NodeConfig};
use super::errors::ConnectionError;
use super::node::{InputPort, OpenContext, OutputPort, ProcessNode, SideValue};
use super::ports::PortSchema;
use super::registry::NodeRegistry;
use super::scheduler::Scheduler;
use super::packet::TimestampDiff;
use super::type_registry::{TYPE_REGISTRY, TypeRegistry};
use super::watchdog::DEFAULT_THRESHOLD;
use crate::GraphError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// (node id, port index)
type PortKey = (usize, usize);

/// Channel endpoint before it is wrapped in a port
type ErasedEndpoint = Box<dyn Any + Send>;

/// Input receivers and output senders of one node
type NodeEndpoints = (Vec<ErasedEndpoint>, Vec<ErasedEndpoint>);

/// Ports declared by one node
struct NodeInfo {
    name: String,
    inputs: Vec<PortSchema>,
    side_inputs: Vec<PortSchema>,
    outputs: Vec<PortSchema>,
}

/// Side packet provided to the pipeline
struct SidePacket {
    type_id: TypeId,
    type_name: &'static str,
    value: SideValue,
}

/// Resolved producer/consumer pair for one consumed stream
struct PendingConnection {
    from_node: usize,
    from_port: usize,
    to_node: usize,
    to_port: usize,
    type_id: TypeId,
    type_name: &'static str,
}

/// Pipeline builder that manages nodes, side packets and connections
pub struct Pipeline {
    nodes: Vec<(usize, Box<dyn ProcessNode>)>,
    node_info: Vec<NodeInfo>,
    node_names: HashMap<String, usize>,
    side_packets: HashMap<String, SidePacket>,
    default_buffer_size: usize,
    watchdog_threshold: Duration,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_info: Vec::new(),
            node_names: HashMap::new(),
            side_packets: HashMap::new(),
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            watchdog_threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Build a pipeline holding every node of `config`
    pub fn from_config(config: &GraphConfig, registry: &NodeRegistry) -> Result<Self, GraphError> {
        let mut pipeline = Self::new()
            .with_default_buffer_size(config.buffer_size())
            .with_watchdog_threshold(config.watchdog_threshold());
        for node in &config.node {
            pipeline.add_node(node, registry)?;
        }
        Ok(pipeline)
    }

    /// Set the default buffer size for connections
    pub fn with_default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }

    /// Set how long a send/recv may block before the watchdog reports it
    pub fn with_watchdog_threshold(mut self, threshold: Duration) -> Self {
        self.watchdog_threshold = threshold;
        self
    }

    /// Add a node instance under a unique name
    pub fn add_process<N: ProcessNode + 'static>(
        &mut self,
        name: impl Into<String>,
        node: N,
    ) -> Result<(), GraphError> {
        self.insert(name.into(), Box::new(node))
    }

    /// Instantiate a configured node through the registry and add it.
    /// The node's contract is checked here, before anything is wired.
    /// Unnamed nodes are named `{node}_{index}`, and the factory sees that name.
    pub fn add_node(&mut self, config: &NodeConfig, registry: &NodeRegistry) -> Result<(), GraphError> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", config.node, self.nodes.len()));
        let node = registry.create(&config.clone().with_name(name.clone()))?;
        self.insert(name, node)
    }

    fn insert(&mut self, name: String, node: Box<dyn ProcessNode>) -> Result<(), GraphError> {
        if self.node_names.contains_key(&name) {
            return Err(ConnectionError::DuplicateNode(name).into());
        }

        let id = self.nodes.len();
        self.node_info.push(NodeInfo {
            name: name.clone(),
            inputs: node.input_schema(),
            side_inputs: node.side_input_schema(),
            outputs: node.output_schema(),
        });
        self.node_names.insert(name, id);
        self.nodes.push((id, node));
        Ok(())
    }

    /// Provide a side packet under `name`
    pub fn add_side_packet<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), GraphError> {
        let name = name.into();
        if self.side_packets.contains_key(&name) {
            return Err(ConnectionError::DuplicateSidePacket(name).into());
        }
        self.side_packets.insert(
            name,
            SidePacket {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value: Arc::new(value),
            },
        );
        Ok(())
    }

    /// List all input ports for a node by name
    pub fn list_node_inputs(&self, name: &str) -> Option<&[PortSchema]> {
        let id = *self.node_names.get(name)?;
        Some(self.node_info[id].inputs.as_slice())
    }

    /// List all output ports for a node by name
    pub fn list_node_outputs(&self, name: &str) -> Option<&[PortSchema]> {
        let id = *self.node_names.get(name)?;
        Some(self.node_info[id].outputs.as_slice())
    }

    /// List all node names, in insertion order
    pub fn list_nodes(&self) -> Vec<&str> {
        self.node_info.iter().map(|info| info.name.as_str()).collect()
    }

    /// Match every consumed stream with its producer
    fn resolve_connections(&self) -> Result<Vec<PendingConnection>, ConnectionError> {
        let mut producers: HashMap<&str, (usize, &PortSchema)> = HashMap::new();
        for (id, info) in self.node_info.iter().enumerate() {
            for port in &info.outputs {
                if let Some((first, _)) = producers.insert(port.stream.as_str(), (id, port)) {
                    return Err(ConnectionError::DuplicateProducer {
                        stream: port.stream.clone(),
                        first: self.node_info[first].name.clone(),
                        second: info.name.clone(),
                    });
                }
            }
        }

        let mut connections = Vec::new();
        for (to_id, info) in self.node_info.iter().enumerate() {
            for port in &info.inputs {
                let (from_id, from_port) = producers.get(port.stream.as_str()).ok_or_else(|| {
                    ConnectionError::StreamNotFound {
                        node: info.name.clone(),
                        stream: port.stream.clone(),
                    }
                })?;

                if from_port.type_id != port.type_id {
                    return Err(ConnectionError::TypeMismatch {
                        stream: port.stream.clone(),
                        from_node: self.node_info[*from_id].name.clone(),
                        from_type: from_port.type_name,
                        to_node: info.name.clone(),
                        to_type: port.type_name,
                    });
                }

                connections.push(PendingConnection {
                    from_node: *from_id,
                    from_port: from_port.index,
                    to_node: to_id,
                    to_port: port.index,
                    type_id: port.type_id,
                    type_name: port.type_name,
                });
            }
        }
        Ok(connections)
    }

    /// Bind and type-check the side packets a node declared
    fn resolve_side_packets(
        side_packets: &HashMap<String, SidePacket>,
        info: &NodeInfo,
    ) -> Result<Vec<(PortSchema, SideValue)>, ConnectionError> {
        info.side_inputs
            .iter()
            .map(|port| {
                let packet = side_packets.get(&port.stream).ok_or_else(|| {
                    ConnectionError::SidePacketNotFound {
                        node: info.name.clone(),
                        name: port.stream.clone(),
                    }
                })?;
                if packet.type_id != port.type_id {
                    return Err(ConnectionError::SidePacketTypeMismatch {
                        node: info.name.clone(),
                        name: port.stream.clone(),
                        provided: packet.type_name,
                        expected: port.type_name,
                    });
                }
                Ok((port.clone(), Arc::clone(&packet.value)))
            })
            .collect()
    }

    /// Open one node, binding its side packets
    fn open_node(&mut self, position: usize) -> Result<Option<(String, TimestampDiff)>, GraphError> {
        let (id, node) = &mut self.nodes[position];
        let info = &self.node_info[*id];
        let side_packets = Self::resolve_side_packets(&self.side_packets, info)?;
        let mut ctx = OpenContext::new(info.name.clone(), side_packets);
        node.open(&mut ctx).map_err(|source| GraphError::NodeFailed {
            node: info.name.clone(),
            source,
        })?;
        debug!("Opened node {}: {}", id, info.name);
        Ok(ctx.offset().map(|offset| (info.name.clone(), offset)))
    }

    /// Open every node in insertion order. On failure the nodes opened so
    /// far are closed again.
    fn open_nodes(&mut self) -> Result<Vec<(String, TimestampDiff)>, GraphError> {
        let mut offsets = Vec::new();
        for position in 0..self.nodes.len() {
            match self.open_node(position) {
                Ok(offset) => offsets.extend(offset),
                Err(e) => {
                    self.close_nodes(position);
                    return Err(e);
                }
            }
        }
        Ok(offsets)
    }

    /// Close the first `count` nodes of a build that did not complete
    fn close_nodes(&mut self, count: usize) {
        for (id, node) in self.nodes.iter_mut().take(count) {
            let name = &self.node_info[*id].name;
            match node.close() {
                Ok(()) => debug!("Closed node {} after failed build", name),
                Err(e) => warn!("[{}] Close error after failed build: {}", name, e),
            }
        }
    }

    /// Take each node's channel endpoints, in node order
    fn gather_endpoints(
        &self,
        registry: &TypeRegistry,
        receivers: &mut HashMap<PortKey, ErasedEndpoint>,
        senders: &mut HashMap<PortKey, Vec<ErasedEndpoint>>,
    ) -> Result<Vec<NodeEndpoints>, ConnectionError> {
        let mut endpoints = Vec::with_capacity(self.nodes.len());
        for (id, _) in &self.nodes {
            let info = &self.node_info[*id];

            let inputs = info
                .inputs
                .iter()
                .map(|schema| {
                    receivers.remove(&(*id, schema.index)).ok_or_else(|| {
                        ConnectionError::StreamNotFound {
                            node: info.name.clone(),
                            stream: schema.stream.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, ConnectionError>>()?;

            // Unconnected outputs get a sender without destinations
            let outputs = info
                .outputs
                .iter()
                .map(|schema| {
                    let txs = senders.remove(&(*id, schema.index)).unwrap_or_default();
                    registry
                        .wrap_output(schema.type_id, txs)
                        .ok_or(ConnectionError::TypeNotRegistered(schema.type_name))
                })
                .collect::<Result<Vec<_>, ConnectionError>>()?;

            endpoints.push((inputs, outputs));
        }
        Ok(endpoints)
    }

    /// Build the pipeline and return a running scheduler
    pub fn build(mut self) -> Result<Scheduler, GraphError> {
        let connections = self.resolve_connections()?;
        info!(
            "Building pipeline with {} nodes and {} connections",
            self.nodes.len(),
            connections.len()
        );

        // Phase 1: create all channels, accumulating receivers and senders
        let mut receivers: HashMap<PortKey, ErasedEndpoint> = HashMap::new();
        let mut senders: HashMap<PortKey, Vec<ErasedEndpoint>> = HashMap::new();
        let registry = TYPE_REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);

        for conn in &connections {
            let (tx, rx) = registry
                .create_channel(conn.type_id, self.default_buffer_size)
                .ok_or(ConnectionError::TypeNotRegistered(conn.type_name))?;
            receivers.insert((conn.to_node, conn.to_port), rx);
            senders
                .entry((conn.from_node, conn.from_port))
                .or_default()
                .push(tx);
        }

        // Phase 2: open every node before any thread starts
        let offsets = self.open_nodes()?;

        // Phase 3: gather each node's channel endpoints
        let endpoints = match self.gather_endpoints(&registry, &mut receivers, &mut senders) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.close_nodes(self.nodes.len());
                return Err(e.into());
            }
        };
        drop(registry);

        // Phase 4: wrap ports with watchdog monitoring and start threads
        let mut scheduler = Scheduler::with_watchdog_threshold(self.watchdog_threshold);
        let watchdog = scheduler.watchdog().clone();

        for (name, offset) in offsets {
            scheduler.record_offset(&name, offset);
        }

        for ((id, node), (inputs, outputs)) in self.nodes.drain(..).zip(endpoints) {
            let info = &self.node_info[id];
            let input_ports = info
                .inputs
                .iter()
                .zip(inputs)
                .map(|(schema, rx)| {
                    InputPort::from_type_erased(rx, &watchdog, &info.name, &schema.to_string())
                })
                .collect();
            let output_ports = info
                .outputs
                .iter()
                .zip(outputs)
                .map(|(schema, tx)| {
                    OutputPort::from_type_erased(tx, &watchdog, &info.name, &schema.to_string())
                })
                .collect();
            scheduler.start_process(info.name.clone(), node, input_ports, output_ports);
        }

        info!(
            "Pipeline built successfully with {} threads",
            scheduler.num_threads()
        );
        Ok(scheduler)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
