pub mod approval;
pub mod conversation;
pub mod device;
pub mod execution;
pub mod plan;
pub mod response;
