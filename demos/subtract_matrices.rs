//! Example: Subtracting a constant side matrix from a stream
//!
//! Streams a sequence of generated matrices through a MatrixSubtractNode and
//! prints every result with its timestamp.
//!
//! Usage:
//!   cargo run --example subtract_matrices -- --rows 2 --cols 3 -n 5
//!
//! Reverse the operands (side minus stream):
//!   cargo run --example subtract_matrices -- --side-minuend
//!
//! With a graph configuration file:
//!   cargo run --example subtract_matrices -- \
//!       --config demos/graphs/subtract.json
//!
//! The configuration must read `input_matrix`, bind the `side_matrix` side
//! packet and produce `output_matrix`.

use clap::Parser;
use matgraph::nodes::builtin_registry;
use matgraph::runtime::{InputPort, OutputPort, PortDirection, PortError, PortSchema};
use matgraph::{
    GraphConfig, Matrix, NodeConfig, Packet, PacketSource, Pipeline, ProcessNode, Shape,
    Timestamp, WorkResult,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Graph configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rows of every matrix
    #[arg(long, default_value_t = 2)]
    rows: usize,

    /// Columns of every matrix
    #[arg(long, default_value_t = 2)]
    cols: usize,

    /// Number of matrices to stream
    #[arg(short, long, default_value_t = 5)]
    n: usize,

    /// Value of every element of the side matrix
    #[arg(long, default_value_t = 10.0)]
    side_value: f32,

    /// Rows of the side matrix, when it should differ from the stream
    #[arg(long)]
    side_rows: Option<usize>,

    /// Bind the side matrix as the minuend (computes side - stream)
    #[arg(long)]
    side_minuend: bool,

    /// Timestamp distance between streamed matrices
    #[arg(long, default_value_t = 10)]
    step: i64,
}

/// Sink that prints result matrices
struct MatrixPrinter {
    count: usize,
}

impl ProcessNode for MatrixPrinter {
    fn name(&self) -> &str {
        "matrix_printer"
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::untagged::<Matrix>(
            "output_matrix",
            0,
            PortDirection::Input,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let input = inputs
            .first()
            .ok_or_else(|| PortError::NotConnected("output_matrix".to_string()))?
            .get::<Matrix>()?;

        let packet = input.recv()?;

        self.count += 1;
        info!(
            "Result #{} at {} ({}):{}",
            self.count,
            packet.timestamp,
            Shape::of(packet.get()),
            packet.get()
        );
        Ok(0)
    }
}

/// Built-in graph used when no configuration file is given
fn default_config(side_minuend: bool) -> GraphConfig {
    let (stream_tag, side_tag) = if side_minuend {
        ("SUBTRAHEND", "MINUEND")
    } else {
        ("MINUEND", "SUBTRAHEND")
    };
    GraphConfig {
        node: vec![
            NodeConfig::new("MatrixSubtractNode")
                .with_name("subtract")
                .input_stream(format!("{}:input_matrix", stream_tag))
                .input_side_packet(format!("{}:side_matrix", side_tag))
                .output_stream("output_matrix"),
        ],
        ..GraphConfig::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Matrix Subtract Example ===");

    let config = match &args.config {
        Some(path) => {
            info!("Config: {}", path.display());
            GraphConfig::from_file(path)?
        }
        None => default_config(args.side_minuend),
    };

    let registry = builtin_registry()?;
    let mut pipeline = Pipeline::from_config(&config, &registry)?;

    let side_rows = args.side_rows.unwrap_or(args.rows);
    let side = Matrix::from_element(side_rows, args.cols, args.side_value);
    info!("Side matrix: {} filled with {}", Shape::of(&side), args.side_value);
    pipeline.add_side_packet("side_matrix", side)?;

    // Matrix k holds k + (element index) in row-major order
    let inputs = (0..args.n).map(|k| {
        let matrix = Matrix::from_fn(args.rows, args.cols, |r, c| (k + r * args.cols + c) as f32);
        Packet::new(matrix, Timestamp::new(k as i64 * args.step))
    });
    pipeline.add_process("source", PacketSource::new("input_matrix", inputs))?;
    pipeline.add_process("printer", MatrixPrinter { count: 0 })?;

    // Build and run
    info!("Building pipeline...");
    let scheduler = pipeline.build()?;

    info!("Running...");
    scheduler.wait()?;

    info!("Done!");

    Ok(())
}
