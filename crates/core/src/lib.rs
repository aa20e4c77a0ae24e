pub mod audit;
pub mod command;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod inventory;
pub mod safety;

pub use command::{build_prompt, parse_command, validate_command, ParsedCommand};
pub use domain::approval::{
    ApprovalDecision, ApprovalId, ApprovalRecord, ApprovalRequest, RiskLevel,
};
pub use domain::conversation::{Conversation, Message, Role};
pub use domain::device::{Device, Platform};
pub use domain::execution::{ExecutionReport, HostResult};
pub use domain::plan::{ActionType, ExecutionPlan, NetworkAction};
pub use domain::response::AgentResponse;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use inventory::DeviceInventory;
