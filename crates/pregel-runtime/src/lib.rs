//! A bulk-synchronous-parallel (Pregel) engine over [`pregel_core::Graph`].
//!
//! A run executes a [`Computation`] as a sequence of supersteps. In each
//! superstep every active node runs its step function once, reading the
//! messages sent to it in the previous superstep and sending messages that
//! will be read in the next one. Nodes that vote to halt sleep until a message
//! wakes them. The run ends when no node is active, when the iteration cap is
//! reached, or when the termination flag is raised.
//!
//! - [`engine::Pregel`]: validation and the superstep driver
//! - [`scheduler`]: partitioning and the worker pool
//! - [`message`]: payloads, combiners and the inbox iterator
//! - [`config::PregelConfig`]: run configuration
//!
//! Results are independent of [`PregelConfig::concurrency`] as long as any
//! combiner in use is associative and commutative.

pub mod active;
pub mod computation;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod message;
mod message_store;
pub mod paged;
pub mod progress;
pub mod scheduler;
pub mod termination;

pub use computation::Computation;
pub use config::{InitialActive, PregelConfig, MAX_CONCURRENCY};
pub use context::ComputeContext;
pub use engine::{NodeValues, Pregel, PregelResult, SuperstepStats, Termination};
pub use error::{PregelError, StepError};
pub use message::{Combiner, CombinerKind, Message, Messages};
pub use progress::{LoggingProgress, NoopProgress, ProgressTracker};
pub use termination::{CancellationToken, NeverCancelled, TerminationFlag};
