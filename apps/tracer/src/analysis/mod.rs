// Knowledge-gap analysis: prompt context, batch formatting, backend invocation,
// reply validation and report rendering.
// All backend calls go through llm_client; nothing here speaks HTTP.

pub mod context;
pub mod formatter;
pub mod invoker;
pub mod mode;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod validator;

#[cfg(test)]
pub mod testing;

pub use invoker::{AnalysisInvoker, DEFAULT_POLL_INTERVAL};
pub use mode::AnalysisMode;
pub use pipeline::{run_analysis, Execution, PipelineOptions};
