//! Turn a heap-allocator snapshot (free-list heads plus the chunks on each
//! list) into a pointer graph, flag chunks that look corrupted, and write the
//! graph out for Graphviz.
//!
//! ```no_run
//! use heapscope::{Engine, EngineConfig};
//!
//! let payload = std::fs::read_to_string("heap.json")?;
//! let built = Engine::new(EngineConfig::from_env()?).build(&payload)?;
//! print!("{}", built.description);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod addr;
pub mod analyze;
pub mod config;
pub mod graph;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod serialize;
pub mod session;
pub mod snapshot;

pub use addr::Address;
pub use analyze::{Analyzer, Check};
pub use config::{Conventions, EngineConfig, ReconcileStrategy};
pub use graph::GraphModel;
pub use pipeline::{Built, Engine};
pub use render::{CommandSink, Dot, FileSink, GraphSink, RenderError, WriterSink};
pub use session::{Session, TickError, Trigger};
pub use snapshot::{HeapSnapshot, ParseError};
