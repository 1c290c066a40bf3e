//! Service layer
//!
//! Services contain business logic for the runner: the running-job
//! registry, runner-script resolution, and trace buffering.
//!
//! Services are trait-based where it enables testing and dependency
//! injection.

mod registry;
mod script;
mod trace_buffer;

// Re-export traits
pub use script::ScriptResolver;
pub use trace_buffer::TraceBuffer;

// Re-export implementations
pub use registry::JobRegistry;
pub use script::BrokerScriptResolver;
pub use trace_buffer::InMemoryTraceBuffer;
