//! One operator turn: trim, plan, guard, approve, execute, format.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use netpilot_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use netpilot_core::config::ContextConfig;
use netpilot_core::context::{
    compress_history, enforce_message_limit, fallback_tail, trim_history, with_summary,
    DEFAULT_KEEP_LAST, DEFAULT_MAX_TOOL_OUTPUT,
};
use netpilot_core::domain::approval::{ApprovalDecision, ApprovalRecord, ApprovalRequest};
use netpilot_core::domain::conversation::{Conversation, Message};
use netpilot_core::domain::execution::ExecutionReport;
use netpilot_core::domain::plan::{ExecutionPlan, NetworkAction};
use netpilot_core::domain::response::AgentResponse;
use netpilot_db::repositories::ApprovalLogRepository;

use crate::executor::TaskExecutor;
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{ChatMessage, LlmClient};
use crate::plan::{parse_plan, parse_response};
use crate::prompts::PromptLibrary;
use crate::tools::{ToolRegistry, CONFIG_COMMAND};

const ACTOR: &str = "netpilot-agent";
const NO_ACTION_MESSAGE: &str = "I could not determine an action for that request.";
pub const DENIED_TOOL_MESSAGE: &str = "User denied permission: config_command";

/// Operator consent for configuration changes.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Answers every request with the same decision.
#[derive(Clone, Copy, Debug)]
pub struct StaticApprover(pub ApprovalDecision);

#[async_trait]
impl Approver for StaticApprover {
    async fn decide(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub turns: u32,
    pub llm_calls: u32,
    pub executed_steps: u32,
    pub failed_hosts: u32,
    pub approvals_granted: u32,
    pub approvals_denied: u32,
}

#[derive(Clone, Debug, Default)]
struct SessionState {
    conversation: Conversation,
    stats: SessionStats,
}

/// In-memory conversations keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    async fn load(&self, session_id: &str) -> SessionState {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned().unwrap_or_else(|| SessionState {
            conversation: Conversation::new(session_id),
            stats: SessionStats::default(),
        })
    }

    async fn save(&self, session_id: &str, state: SessionState) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), state);
    }

    pub async fn conversation(&self, session_id: &str) -> Option<Conversation> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|state| state.conversation.clone())
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionStats> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|state| state.stats.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    /// Answered without touching devices.
    Answered,
    Executed,
    Denied,
    Rejected,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub session_id: String,
    pub status: TurnStatus,
    pub response: AgentResponse,
    pub approval: Option<ApprovalRecord>,
    pub reports: Vec<(NetworkAction, ExecutionReport)>,
    pub warnings: Vec<String>,
}

impl TurnOutcome {
    fn new(session_id: &str, status: TurnStatus, response: AgentResponse) -> Self {
        Self {
            session_id: session_id.to_string(),
            status,
            response,
            approval: None,
            reports: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLibrary,
    guardrails: GuardrailPolicy,
    executor: Arc<TaskExecutor>,
    tools: ToolRegistry,
    context: ContextConfig,
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
    approval_log: Option<Arc<dyn ApprovalLogRepository>>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<TaskExecutor>,
        context: ContextConfig,
    ) -> Result<Self> {
        Ok(Self {
            llm,
            prompts: PromptLibrary::new()?,
            guardrails: GuardrailPolicy,
            tools: ToolRegistry::network(Arc::clone(&executor)),
            executor,
            context,
            sessions: SessionStore::default(),
            audit: Arc::new(TracingAuditSink),
            approval_log: None,
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_approval_log(mut self, approval_log: Arc<dyn ApprovalLogRepository>) -> Self {
        self.approval_log = Some(approval_log);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle(
        &self,
        session_id: &str,
        user_text: &str,
        approver: &dyn Approver,
    ) -> Result<TurnOutcome> {
        let mut state = self.sessions.load(session_id).await;
        state.stats.turns += 1;
        state.conversation.push(Message::user(user_text));
        self.emit(session_id, "agent.turn.received", AuditCategory::Ingress, AuditOutcome::Success);

        state.conversation.messages =
            self.trim_context(&state.conversation.messages, &mut state.stats).await?;

        let outcome = self.run_turn(session_id, user_text, &mut state, approver).await?;

        state.conversation.push(Message::assistant(outcome.response.summary.clone()));
        state.stats.failed_hosts += outcome
            .reports
            .iter()
            .map(|(_, report)| report.failed_hosts().len() as u32)
            .sum::<u32>();
        log_stats(session_id, &state.stats);
        self.sessions.save(session_id, state).await;

        Ok(outcome)
    }

    async fn run_turn(
        &self,
        session_id: &str,
        user_text: &str,
        state: &mut SessionState,
        approver: &dyn Approver,
    ) -> Result<TurnOutcome> {
        let plan = match self.understand(&state.conversation.messages, &mut state.stats).await? {
            Ok(plan) => plan,
            Err(response) => return Ok(TurnOutcome::new(session_id, TurnStatus::Failed, response)),
        };

        tracing::info!(
            event_name = "agent.plan.parsed",
            session_id = %session_id,
            steps = plan.steps.len(),
            requires_approval = plan.requires_approval(),
            "plan parsed"
        );

        if !plan.has_steps() {
            let answer = plan.direct_response.unwrap_or_else(|| NO_ACTION_MESSAGE.to_string());
            let response = AgentResponse::summary(answer);
            return Ok(TurnOutcome::new(session_id, TurnStatus::Answered, response));
        }

        let (warnings, approval) =
            match self.guardrails.evaluate(session_id, &plan, self.executor.inventory()) {
                GuardrailDecision::Deny { reason_code, user_message } => {
                    self.emit_with(
                        AuditEvent::new(
                            session_id,
                            "agent.plan.rejected",
                            AuditCategory::Plan,
                            ACTOR,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("reason_code", reason_code),
                    );
                    let response = AgentResponse::failure(user_message, reason_code);
                    return Ok(TurnOutcome::new(session_id, TurnStatus::Rejected, response));
                }
                GuardrailDecision::Allow { warnings } => (warnings, None),
                GuardrailDecision::RequireApproval(request) => {
                    state.conversation.approval_context = Some(request.clone());
                    let decision = approver.decide(&request).await;
                    state.conversation.approval_context = None;

                    let record = ApprovalRecord::from_request(&request, decision);
                    self.record_approval(&record).await;

                    if !decision.is_approved() {
                        state.stats.approvals_denied += 1;
                        state.conversation.push(Message::tool(CONFIG_COMMAND, DENIED_TOOL_MESSAGE));
                        let response =
                            self.format(user_text, DENIED_TOOL_MESSAGE, &mut state.stats).await?;
                        let mut outcome = TurnOutcome::new(session_id, TurnStatus::Denied, response);
                        outcome.approval = Some(record);
                        outcome.warnings = request.warnings;
                        return Ok(outcome);
                    }

                    state.stats.approvals_granted += 1;
                    (request.warnings, Some(record))
                }
            };

        let mut reports = Vec::with_capacity(plan.steps.len());
        let mut tool_outputs = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let tool_name = step.action_type.tool_name();
            let input = serde_json::to_value(step)?;
            let output = match self.tools.invoke(tool_name, input).await {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.step.tool_error",
                        session_id = %session_id,
                        tool = tool_name,
                        error = %error,
                        "tool refused step"
                    );
                    serde_json::json!({ "error": error.to_string() })
                }
            };

            let rendered = serde_json::to_string_pretty(&output)?;
            state.conversation.push(Message::tool(tool_name, rendered.clone()));
            tool_outputs.push(rendered);
            state.stats.executed_steps += 1;

            let report = serde_json::from_value::<ExecutionReport>(output)
                .unwrap_or_else(|error| ExecutionReport::Rejected { error: error.to_string() });
            let step_outcome = match &report {
                ExecutionReport::Hosts(_) if report.failed_hosts().is_empty() => AuditOutcome::Success,
                _ => AuditOutcome::Failed,
            };
            self.emit_with(
                AuditEvent::new(
                    session_id,
                    "agent.step.executed",
                    AuditCategory::Execution,
                    ACTOR,
                    step_outcome,
                )
                .with_metadata("tool", tool_name)
                .with_metadata("devices", step.devices.join(",")),
            );
            reports.push((step.clone(), report));
        }

        let response = self.format(user_text, &tool_outputs.join("\n\n"), &mut state.stats).await?;
        let mut outcome = TurnOutcome::new(session_id, TurnStatus::Executed, response);
        outcome.approval = approval;
        outcome.reports = reports;
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Fits history into the configured budget, summarising what falls out.
    async fn trim_context(
        &self,
        messages: &[Message],
        stats: &mut SessionStats,
    ) -> Result<Vec<Message>> {
        let limited = enforce_message_limit(messages, self.context.max_message_count);
        let outcome = trim_history(&limited, self.context.max_history_tokens);
        if !outcome.trimmed() {
            return Ok(limited);
        }

        tracing::info!(
            event_name = "context.trim.applied",
            dropped = outcome.dropped.len(),
            kept = outcome.kept.len(),
            "conversation history trimmed"
        );

        let prompt = self.prompts.summary(&outcome.dropped)?;
        stats.llm_calls += 1;
        match self.llm.chat(&[ChatMessage::user(prompt)]).await {
            Ok(summary) => Ok(with_summary(outcome, summary.trim())),
            Err(error) => {
                tracing::warn!(
                    event_name = "context.summary.failed",
                    error = %error,
                    "history summary failed, keeping the most recent messages"
                );
                Ok(fallback_tail(&limited))
            }
        }
    }

    /// Asks the planner for an execution plan. The inner `Err` is an operator-facing failure.
    async fn understand(
        &self,
        messages: &[Message],
        stats: &mut SessionStats,
    ) -> Result<std::result::Result<ExecutionPlan, AgentResponse>> {
        let mut chat = vec![ChatMessage::system(self.prompts.planner(self.executor.inventory())?)];
        chat.extend(
            compress_history(messages, DEFAULT_KEEP_LAST, DEFAULT_MAX_TOOL_OUTPUT)
                .iter()
                .map(ChatMessage::from),
        );

        stats.llm_calls += 1;
        match self.llm.chat_json(&chat).await {
            Ok(reply) => Ok(Ok(parse_plan(&reply))),
            Err(error) => {
                tracing::error!(
                    event_name = "agent.plan.llm_failed",
                    error = %error,
                    "planner call failed"
                );
                Ok(Err(AgentResponse::failure(error.user_message(), error.to_string())))
            }
        }
    }

    async fn format(
        &self,
        user_text: &str,
        tool_output: &str,
        stats: &mut SessionStats,
    ) -> Result<AgentResponse> {
        let prompt = self.prompts.formatter(user_text, tool_output)?;
        stats.llm_calls += 1;
        let reply = self
            .llm
            .chat_json(&[ChatMessage::system(prompt), ChatMessage::user(user_text)])
            .await;

        Ok(match reply {
            Ok(reply) => parse_response(&reply),
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.format.llm_failed",
                    error = %error,
                    "formatter call failed"
                );
                AgentResponse::formatting_fallback(error.user_message(), tool_output)
            }
        })
    }

    async fn record_approval(&self, record: &ApprovalRecord) {
        let (event_type, outcome) = if record.decision.is_approved() {
            ("agent.approval.approved", AuditOutcome::Success)
        } else {
            ("agent.approval.denied", AuditOutcome::Rejected)
        };
        self.emit_with(
            AuditEvent::new(&record.session_id, event_type, AuditCategory::Approval, ACTOR, outcome)
                .with_metadata("approval_id", record.id.0.clone())
                .with_metadata("risk_level", record.risk_level.as_str())
                .with_metadata("devices", record.devices.join(",")),
        );

        if let Some(log) = &self.approval_log {
            if let Err(error) = log.record(record).await {
                self.emit_with(
                    AuditEvent::new(
                        &record.session_id,
                        "agent.approval_log.write_failed",
                        AuditCategory::Persistence,
                        ACTOR,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
    }

    fn emit(
        &self,
        session_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) {
        self.emit_with(AuditEvent::new(session_id, event_type, category, ACTOR, outcome));
    }

    fn emit_with(&self, event: AuditEvent) {
        self.audit.emit(event);
    }
}

fn log_stats(session_id: &str, stats: &SessionStats) {
    tracing::info!(
        event_name = "agent.session.stats",
        session_id = %session_id,
        turns = stats.turns,
        llm_calls = stats.llm_calls,
        executed_steps = stats.executed_steps,
        failed_hosts = stats.failed_hosts,
        approvals_granted = stats.approvals_granted,
        approvals_denied = stats.approvals_denied,
        "session stats"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use netpilot_core::audit::InMemoryAuditSink;
    use netpilot_core::config::AppConfig;
    use netpilot_core::context::SUMMARY_PREFIX;
    use netpilot_core::domain::approval::{ApprovalDecision, ApprovalRequest, RiskLevel};
    use netpilot_core::domain::conversation::Role;
    use netpilot_core::domain::device::Device;
    use netpilot_core::inventory::DeviceInventory;
    use netpilot_db::repositories::{ApprovalLogRepository, InMemoryApprovalLogRepository};

    use super::{AgentRuntime, Approver, StaticApprover, TurnStatus, DENIED_TOOL_MESSAGE};
    use crate::executor::TaskExecutor;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::transport::{RecordingTransport, TransportCall};

    const SHOW_PLAN: &str =
        r#"{"steps":[{"action_type":"read","devices":["R1"],"commands":["show version"]}]}"#;
    const CONFIG_PLAN: &str = r#"```json
{"steps":[{"action_type":"configure","devices":["R1","R2"],"commands":["interface Gi0/1\n description UPLINK\n"]}]}
```"#;

    struct CountingApprover {
        decision: ApprovalDecision,
        calls: AtomicUsize,
    }

    impl CountingApprover {
        fn new(decision: ApprovalDecision) -> Self {
            Self { decision, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Approver for CountingApprover {
        async fn decide(&self, _request: &ApprovalRequest) -> ApprovalDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    struct Harness {
        runtime: AgentRuntime,
        llm: Arc<ScriptedLlmClient>,
        transport: Arc<RecordingTransport>,
        approvals: Arc<InMemoryApprovalLogRepository>,
        audit: InMemoryAuditSink,
    }

    fn harness(replies: &[&str], max_history_tokens: usize) -> Harness {
        let inventory = DeviceInventory::new(["R1", "R2"].into_iter().map(|name| Device {
            name: name.to_string(),
            host: "192.0.2.1".to_string(),
            username: "admin".to_string(),
            password_env_var: "LAB_PASSWORD".to_string(),
            device_type: "cisco_ios".to_string(),
            port: 22,
        }));
        let llm = Arc::new(ScriptedLlmClient::new(replies.iter().copied()));
        let transport = Arc::new(RecordingTransport::default());
        let approvals = Arc::new(InMemoryApprovalLogRepository::default());
        let audit = InMemoryAuditSink::default();
        let executor = Arc::new(TaskExecutor::new(Arc::new(inventory), transport.clone(), 4));

        let mut context = AppConfig::default().context;
        context.max_history_tokens = max_history_tokens;

        let runtime = AgentRuntime::new(llm.clone(), executor, context)
            .expect("runtime")
            .with_audit_sink(Arc::new(audit.clone()))
            .with_approval_log(approvals.clone());

        Harness { runtime, llm, transport, approvals, audit }
    }

    #[tokio::test]
    async fn show_only_plan_runs_without_approval() {
        let h = harness(&[SHOW_PLAN, r#"{"summary":"R1 runs IOS 15.2"}"#], 20_000);
        let approver = CountingApprover::new(ApprovalDecision::Denied);

        let outcome = h.runtime.handle("s-1", "show version on R1", &approver).await.expect("turn");

        assert_eq!(outcome.status, TurnStatus::Executed);
        assert_eq!(outcome.response.summary, "R1 runs IOS 15.2");
        assert_eq!(approver.calls(), 0);
        assert!(outcome.approval.is_none());
        assert_eq!(
            h.transport.calls(),
            vec![TransportCall::Command {
                device: "R1".to_string(),
                command: "show version".to_string()
            }]
        );

        let requests = h.llm.requests();
        let formatter_request = &requests[1];
        assert!(formatter_request[0].content.contains("R1# show version"));
        assert_eq!(formatter_request[1].content, "show version on R1");
    }

    #[tokio::test]
    async fn denied_config_never_reaches_devices() {
        let h = harness(&[CONFIG_PLAN, r#"{"summary":"No changes were applied."}"#], 20_000);
        let approver = CountingApprover::new(ApprovalDecision::Denied);

        let outcome = h.runtime.handle("s-1", "describe uplinks", &approver).await.expect("turn");

        assert_eq!(outcome.status, TurnStatus::Denied);
        assert_eq!(approver.calls(), 1);
        assert!(h.transport.calls().is_empty());
        assert!(outcome.reports.is_empty());

        let conversation = h.runtime.sessions().conversation("s-1").await.expect("session");
        let denial = conversation
            .messages
            .iter()
            .find(|message| message.role == Role::Tool)
            .expect("denial tool message");
        assert_eq!(denial.content, DENIED_TOOL_MESSAGE);
        assert_eq!(denial.name.as_deref(), Some("config_command"));
        assert!(conversation.approval_context.is_none());

        let logged = h.approvals.list_for_session("s-1").await.expect("approval log");
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].decision, ApprovalDecision::Denied);
        assert_eq!(logged[0].devices, vec!["R1", "R2"]);

        let stats = h.runtime.sessions().stats("s-1").await.expect("stats");
        assert_eq!(stats.approvals_denied, 1);
        assert_eq!(stats.executed_steps, 0);
        assert!(h.audit.events().iter().any(|event| event.event_type == "agent.approval.denied"));
    }

    #[tokio::test]
    async fn approved_config_sends_cleaned_lines() {
        let h = harness(&[CONFIG_PLAN, r#"{"summary":"Descriptions applied."}"#], 20_000);

        let outcome = h
            .runtime
            .handle("s-1", "describe uplinks", &StaticApprover(ApprovalDecision::Approved))
            .await
            .expect("turn");

        assert_eq!(outcome.status, TurnStatus::Executed);
        let approval = outcome.approval.expect("approval record");
        assert_eq!(approval.decision, ApprovalDecision::Approved);
        assert_eq!(approval.risk_level, RiskLevel::Low);

        let lines = vec!["interface Gi0/1".to_string(), "description UPLINK".to_string()];
        let mut calls = h.transport.calls();
        calls.sort_by_key(|call| format!("{call:?}"));
        assert_eq!(
            calls,
            vec![
                TransportCall::Config { device: "R1".to_string(), lines: lines.clone() },
                TransportCall::Config { device: "R2".to_string(), lines },
            ]
        );
        assert_eq!(h.runtime.sessions().stats("s-1").await.expect("stats").approvals_granted, 1);
    }

    #[tokio::test]
    async fn unknown_devices_are_rejected_before_execution() {
        let h = harness(
            &[r#"{"steps":[{"action_type":"read","devices":["R9"],"commands":["show clock"]}]}"#],
            20_000,
        );

        let outcome = h
            .runtime
            .handle("s-1", "show clock on R9", &StaticApprover(ApprovalDecision::Approved))
            .await
            .expect("turn");

        assert_eq!(outcome.status, TurnStatus::Rejected);
        assert!(outcome.response.summary.contains("Unknown devices: R9. Available devices: R1, R2"));
        assert_eq!(outcome.response.error.as_deref(), Some("unknown_devices"));
        assert!(h.transport.calls().is_empty());
        assert_eq!(h.llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn conversational_reply_is_answered_directly() {
        let h = harness(&["Hello! I can run show and config commands."], 20_000);

        let outcome = h
            .runtime
            .handle("s-1", "hi", &StaticApprover(ApprovalDecision::Denied))
            .await
            .expect("turn");

        assert_eq!(outcome.status, TurnStatus::Answered);
        assert_eq!(outcome.response.summary, "Hello! I can run show and config commands.");
        let conversation = h.runtime.sessions().conversation("s-1").await.expect("session");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn planner_failure_is_reported_to_the_operator() {
        let h = harness(&[], 20_000);
        h.llm.push(Err(LlmError::Http { status: 429, body: "slow down".to_string() }));

        let outcome = h
            .runtime
            .handle("s-1", "show version on R1", &StaticApprover(ApprovalDecision::Approved))
            .await
            .expect("turn");

        assert_eq!(outcome.status, TurnStatus::Failed);
        assert_eq!(outcome.response.summary, "Rate limit reached. Please wait a moment.");
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn unparseable_formatter_reply_falls_back_to_raw_text() {
        let h = harness(&[SHOW_PLAN, "R1 is fine"], 20_000);

        let outcome = h
            .runtime
            .handle("s-1", "show version on R1", &StaticApprover(ApprovalDecision::Approved))
            .await
            .expect("turn");

        assert!(outcome.response.summary.starts_with("Error generating structured response:"));
        assert_eq!(
            outcome.response.structured_data,
            Some(serde_json::json!({ "raw": "R1 is fine" }))
        );
    }

    #[tokio::test]
    async fn trimmed_history_is_replaced_by_a_summary() {
        let h = harness(
            &[
                r#"{"steps":[],"direct_response":"Hi there"}"#,
                "Operator greeted the agent.",
                r#"{"steps":[],"direct_response":"Noted."}"#,
            ],
            40,
        );
        let approver = StaticApprover(ApprovalDecision::Denied);

        h.runtime.handle("s-1", "hello", &approver).await.expect("first turn");
        h.runtime.handle("s-1", &"a".repeat(120), &approver).await.expect("second turn");

        let conversation = h.runtime.sessions().conversation("s-1").await.expect("session");
        assert_eq!(conversation.messages[0].role, Role::System);
        assert_eq!(
            conversation.messages[0].content,
            format!("{SUMMARY_PREFIX}Operator greeted the agent.")
        );
        assert_eq!(conversation.messages[1].content, "a".repeat(120));
        assert_eq!(conversation.messages.len(), 3);

        let stats = h.runtime.sessions().stats("s-1").await.expect("stats");
        assert_eq!(stats.turns, 2);
        assert_eq!(stats.llm_calls, 3);
    }
}
