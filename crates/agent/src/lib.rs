//! Agent runtime: turns operator text into vetted device work.
//!
//! A turn runs as a fixed pipeline:
//! 1. **Context** - trim history to the token budget, summarising what falls out
//! 2. **Understanding** (`llm`, `prompts`, `plan`) - ask the LLM for a JSON `ExecutionPlan`
//! 3. **Guardrails** (`guardrails`) - validate devices and commands, hold config for approval
//! 4. **Execution** (`tools`, `executor`, `transport`) - run steps over SSH with bounded workers
//! 5. **Formatting** - turn raw device output into an `AgentResponse`
//!
//! The LLM only proposes. Validation and the approval gate decide what reaches a device.

pub mod executor;
pub mod guardrails;
pub mod llm;
pub mod plan;
pub mod prompts;
pub mod runtime;
pub mod tools;
pub mod transport;

pub use executor::{DeviceTask, TaskExecutor};
pub use llm::{LlmClient, LlmError, OpenAiCompatClient};
pub use runtime::{AgentRuntime, Approver, SessionStats, TurnOutcome, TurnStatus};
pub use transport::{DeviceTransport, SshTransport, TransportError};
