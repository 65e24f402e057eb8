//! 编排主循环
//!
//! 一个显式状态机驱动两种形态：
//! - 选择/评估（SelectEvaluate）：Selecting -> Executing -> Evaluating -> (Executing | Summarizing | Done)
//! - ReAct：Reasoning -> Executing -> (Reasoning | Summarizing | Done)
//!
//! 迭代上限保证终止，用尽时做一次不带工具的兜底总结；除取消外的所有错误都转为 FAILED 结果。
//! 推理步骤由 InterruptGuard 包裹：任何非正常退出（取消、出错、future 被丢弃）都会为已收到的工具调用补写中断结果。

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{ContentBlock, ConversationLog, Role, Turn};
use crate::react::caller::{ModelCaller, ModelOutcome, PartialReply, SelectionOutcome};
use crate::react::observation::{split_chunks, Observer};
use crate::react::state::{ExecutionRecord, OrchestrationResult, OrchestrationStatus, RunState};
use crate::react::{prompts, ReactEvent};
use crate::tools::{finish_payload, ToolExecutor, ToolInvocation, ToolRegistry, ToolResponse, ToolSchema};

/// 推理内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 取消时为未执行的工具调用写入的结果
pub const INTERRUPTED_RESULT: &str = "The tool call was interrupted by user.";

/// 循环形态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopShape {
    /// 选择与评估分两次模型调用（委派 / 分类管理者）
    SelectEvaluate,
    /// 每轮一次推理 + 执行
    React,
}

/// 对话日志策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// 每次运行开始和结束都清空，委派任务之间互不可见
    Isolated,
    /// 跨运行保留；超过阈值时先摘要压缩（0 表示不压缩）
    Persistent { compact_threshold: usize },
}

/// 运行参数
#[derive(Clone, Debug)]
pub struct OrchestrationConfig {
    pub shape: LoopShape,
    pub max_iterations: usize,
    pub parallel_tool_calls: bool,
    pub chunk_size: usize,
    /// 成功调用即结束运行的工具
    pub finish_tool_name: Option<String>,
    pub memory: MemoryPolicy,
}

impl OrchestrationConfig {
    /// 委派形态默认值：5 轮、顺序执行、隔离记忆、无结束工具
    pub fn delegated(max_iterations: usize) -> Self {
        Self {
            shape: LoopShape::SelectEvaluate,
            max_iterations: max_iterations.max(1),
            parallel_tool_calls: false,
            chunk_size: 10_000,
            finish_tool_name: None,
            memory: MemoryPolicy::Isolated,
        }
    }

    /// ReAct 形态默认值：常驻记忆、generate_response 作为结束工具
    pub fn react(max_iterations: usize) -> Self {
        Self {
            shape: LoopShape::React,
            max_iterations: max_iterations.max(1),
            parallel_tool_calls: false,
            chunk_size: 10_000,
            finish_tool_name: Some(crate::tools::DEFAULT_FINISH_TOOL.to_string()),
            memory: MemoryPolicy::Persistent {
                compact_threshold: 24,
            },
        }
    }

    /// 从应用配置生成某一形态的运行参数
    pub fn from_app_config(cfg: &AppConfig, shape: LoopShape) -> Self {
        let section = &cfg.orchestration;
        let base = match shape {
            LoopShape::SelectEvaluate => Self::delegated(section.max_iterations),
            LoopShape::React => Self::react(section.react_max_iterations).with_memory(
                MemoryPolicy::Persistent {
                    compact_threshold: section.compact_threshold,
                },
            ),
        };
        let finish = match shape {
            LoopShape::SelectEvaluate => None,
            LoopShape::React => Some(section.finish_tool_name.clone()).filter(|n| !n.is_empty()),
        };
        base.with_parallel_tool_calls(section.parallel_tool_calls)
            .with_chunk_size(section.chunk_size)
            .with_finish_tool(finish)
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_finish_tool(mut self, name: Option<String>) -> Self {
        self.finish_tool_name = name;
        self
    }

    pub fn with_memory(mut self, memory: MemoryPolicy) -> Self {
        self.memory = memory;
        self
    }
}

/// 状态机的阶段
#[derive(Debug)]
enum Phase {
    Selecting,
    Reasoning,
    Executing(Vec<ToolInvocation>),
    Evaluating,
    Summarizing,
    Done(String),
}

fn send_event(tx: Option<&mpsc::UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn assistant_turn(speaker: &str, reasoning: &str, invocations: &[ToolInvocation]) -> Turn {
    let mut content = Vec::with_capacity(invocations.len() + 1);
    if !reasoning.is_empty() {
        content.push(ContentBlock::text(reasoning));
    }
    content.extend(invocations.iter().map(ToolInvocation::to_block));
    Turn::assistant(speaker, content)
}

fn objective_turn(objective: &str, exact_input: Option<&str>) -> Turn {
    let text = match exact_input {
        Some(exact) if !exact.trim().is_empty() => {
            format!("{}\n\n## Exact input\n{}", objective, exact)
        }
        _ => objective.to_string(),
    };
    Turn::user("user", text)
}

/// 推理步骤的作用域守卫：未 disarm 就被丢弃时，把已收到的部分回复写入日志，
/// 并为其中每个工具调用补一条中断结果，保证调用与结果一一对应
struct InterruptGuard<'a> {
    memory: &'a mut ConversationLog,
    speaker: &'a str,
    events: Option<&'a mpsc::UnboundedSender<ReactEvent>>,
    partial: PartialReply,
    reason: String,
    armed: bool,
}

impl<'a> InterruptGuard<'a> {
    fn new(
        memory: &'a mut ConversationLog,
        speaker: &'a str,
        events: Option<&'a mpsc::UnboundedSender<ReactEvent>>,
    ) -> Self {
        Self {
            memory,
            speaker,
            events,
            partial: PartialReply::default(),
            reason: INTERRUPTED_RESULT.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let partial = std::mem::take(&mut self.partial);
        let pending = partial.invocations.len();
        self.memory.append(assistant_turn(
            self.speaker,
            partial.text.trim(),
            &partial.invocations,
        ));
        for invocation in &partial.invocations {
            self.memory.append(Turn::tool_result(
                invocation.id.clone(),
                invocation.name.clone(),
                vec![ContentBlock::text(self.reason.clone())],
            ));
        }
        tracing::info!(agent = %self.speaker, pending, "reasoning interrupted, pending tool calls closed");
        send_event(self.events, ReactEvent::Interrupted { pending_tools: pending });
    }
}

/// 记录一次工具执行：追加执行记录与带原调用 id 的工具结果；结束工具成功时返回最终回答
fn commit_execution(
    memory: &mut ConversationLog,
    state: &mut RunState,
    events: Option<&mpsc::UnboundedSender<ReactEvent>>,
    finish_tool: Option<&str>,
    invocation: &ToolInvocation,
    response: ToolResponse,
) -> Option<String> {
    let result = response.render();
    if response.success {
        send_event(
            events,
            ReactEvent::Observation {
                id: invocation.id.clone(),
                tool: invocation.name.clone(),
                preview: preview(&result, OBSERVATION_PREVIEW_CHARS),
            },
        );
    } else {
        tracing::warn!(tool = %invocation.name, id = %invocation.id, reason = %result, "tool failed");
        send_event(
            events,
            ReactEvent::ToolFailure {
                id: invocation.id.clone(),
                tool: invocation.name.clone(),
                reason: result.clone(),
            },
        );
    }
    state.record(ExecutionRecord::new(invocation, result.clone(), response.success));

    let output = if response.content.is_empty() {
        vec![ContentBlock::text("")]
    } else {
        response.content
    };
    memory.append(Turn::tool_result(
        invocation.id.clone(),
        invocation.name.clone(),
        output,
    ));

    if response.success && finish_tool == Some(invocation.name.as_str()) {
        return Some(finish_payload(response.metadata.as_ref()).unwrap_or(result));
    }
    None
}

/// 编排器：持有模型调用适配器、工具执行器与对话日志
pub struct Orchestrator {
    name: String,
    persona: Option<String>,
    caller: ModelCaller,
    executor: ToolExecutor,
    config: OrchestrationConfig,
    memory: ConversationLog,
    observer: Option<Arc<dyn Observer>>,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
}

impl Orchestrator {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            name: name.into(),
            persona: None,
            caller: ModelCaller::new(llm),
            executor,
            config,
            memory: ConversationLog::new(),
            observer: None,
            event_tx: None,
        }
    }

    /// 按应用配置构建：超时、并发上限、流式与文本协议开关均取自配置
    pub fn from_app_config(
        cfg: &AppConfig,
        shape: LoopShape,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
    ) -> Self {
        let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs)
            .with_concurrency_limit(cfg.orchestration.max_concurrent_tools);
        Self::new(
            cfg.app.name.clone(),
            llm,
            executor,
            OrchestrationConfig::from_app_config(cfg, shape),
        )
        .with_streaming(cfg.orchestration.streaming)
        .with_text_protocol(cfg.orchestration.text_protocol)
    }

    /// 附加在各阶段 system prompt 前的角色说明
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.caller = self.caller.with_streaming(streaming);
        self
    }

    pub fn with_text_protocol(mut self, enabled: bool) -> Self {
        self.caller = self.caller.with_text_protocol(enabled);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn memory(&self) -> &ConversationLog {
        &self.memory
    }

    /// 执行一次运行；总是返回结果对象，不会失败
    pub async fn run(&mut self, objective: &str, exact_input: Option<&str>) -> OrchestrationResult {
        match self
            .run_until_cancelled(objective, exact_input, CancellationToken::new())
            .await
        {
            Ok(result) => result,
            Err(e) => OrchestrationResult::failed(&self.name, e),
        }
    }

    /// 可取消的运行：唯一的错误是 Cancelled（已完成中断记账后才返回）
    pub async fn run_until_cancelled(
        &mut self,
        objective: &str,
        exact_input: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult, AgentError> {
        let isolated = self.config.memory == MemoryPolicy::Isolated;
        if isolated {
            self.memory.clear();
        }
        tracing::info!(agent = %self.name, shape = ?self.config.shape, "run start");

        let mut state = RunState::new();
        let outcome = self
            .drive(objective_turn(objective, exact_input), &mut state, &cancel)
            .await;

        let result = match outcome {
            Ok((status, summary)) => Ok(OrchestrationResult {
                status,
                summary,
                trace: state.trace,
                agent_name: self.name.clone(),
                terminal_turn: state.terminal_turn,
            }),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(agent = %self.name, error = %e, "run failed");
                send_event(self.event_tx.as_ref(), ReactEvent::Error { text: e.to_string() });
                Ok(OrchestrationResult::failed(&self.name, e))
            }
        };

        if isolated {
            self.memory.clear();
        }
        match &result {
            Ok(r) => {
                tracing::info!(agent = %self.name, status = ?r.status, executions = r.trace.len(), "run finished");
                send_event(self.event_tx.as_ref(), ReactEvent::Finished { status: r.status });
            }
            Err(_) => tracing::info!(agent = %self.name, "run cancelled"),
        }
        result
    }

    async fn drive(
        &mut self,
        objective: Turn,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(OrchestrationStatus, String), AgentError> {
        if self.executor.is_empty() {
            return Err(AgentError::RunSetup("no tools registered".to_string()));
        }
        let tools = self.executor.schemas();

        let mut phase = match self.config.shape {
            LoopShape::SelectEvaluate => Phase::Selecting,
            LoopShape::React => {
                self.memory.append(objective.clone());
                Phase::Reasoning
            }
        };
        loop {
            tracing::debug!(agent = %self.name, iteration = state.iteration, phase = ?phase, "phase");
            phase = match phase {
                Phase::Selecting => self.select(&objective, &tools, cancel).await?,
                Phase::Reasoning => self.reason(&tools, cancel).await?,
                Phase::Executing(batch) => self.execute(batch, state).await,
                Phase::Evaluating => self.evaluate(&tools, state, cancel).await?,
                Phase::Summarizing => {
                    return Ok((OrchestrationStatus::Exhausted, self.summarize_exhausted().await))
                }
                Phase::Done(summary) => return Ok((OrchestrationStatus::Completed, summary)),
            };
        }
    }

    /// 受守卫保护的模型调用
    async fn guarded_call(
        &mut self,
        system: &str,
        history: &[Turn],
        tools: Option<&[ToolSchema]>,
        cancel: &CancellationToken,
    ) -> Result<ModelOutcome, AgentError> {
        send_event(self.event_tx.as_ref(), ReactEvent::Thinking);
        let mut guard = InterruptGuard::new(&mut self.memory, &self.name, self.event_tx.as_ref());
        match self
            .caller
            .call_cancellable(system, history, tools, cancel, &mut guard.partial)
            .await
        {
            Ok(outcome) => {
                guard.disarm();
                send_event(
                    guard.events,
                    ReactEvent::ThinkingContent {
                        text: preview(&outcome.reasoning, THINKING_PREVIEW_CHARS),
                    },
                );
                Ok(outcome)
            }
            Err(e) => {
                if !e.is_cancelled() {
                    guard.reason = format!("The tool call was not executed: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn select(
        &mut self,
        objective: &Turn,
        tools: &[ToolSchema],
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        let system = prompts::selection_prompt(
            &self.name,
            self.persona.as_deref(),
            tools,
            self.caller.text_protocol(),
        );
        let outcome = self
            .guarded_call(&system, std::slice::from_ref(objective), Some(tools), cancel)
            .await?;
        Ok(match outcome.into_selection() {
            SelectionOutcome::Done(reasoning) => {
                tracing::info!(agent = %self.name, "no action selected");
                Phase::Done(reasoning)
            }
            SelectionOutcome::Continue {
                reasoning,
                invocations,
            } => {
                self.memory.append(objective.clone());
                self.memory
                    .append(assistant_turn(&self.name, &reasoning, &invocations));
                Phase::Executing(invocations)
            }
        })
    }

    async fn evaluate(
        &mut self,
        tools: &[ToolSchema],
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        let system = prompts::evaluation_prompt(
            &self.name,
            self.persona.as_deref(),
            tools,
            self.caller.text_protocol(),
        );
        let history = self.memory.snapshot();
        let outcome = self.guarded_call(&system, &history, Some(tools), cancel).await?;
        Ok(match outcome.into_selection() {
            SelectionOutcome::Done(summary) => {
                self.memory
                    .append(Turn::assistant(&self.name, vec![ContentBlock::text(&summary)]));
                Phase::Done(summary)
            }
            SelectionOutcome::Continue {
                reasoning,
                invocations,
            } => self.next_round(state, reasoning, invocations),
        })
    }

    /// 评估要求继续：计数 +1，未到上限则执行新一批调用，否则进入兜底总结
    fn next_round(
        &mut self,
        state: &mut RunState,
        reasoning: String,
        invocations: Vec<ToolInvocation>,
    ) -> Phase {
        state.iteration += 1;
        let max = self.config.max_iterations;
        send_event(
            self.event_tx.as_ref(),
            ReactEvent::StepUpdate {
                step: state.iteration,
                max_steps: max,
            },
        );
        if state.iteration < max {
            self.memory
                .append(assistant_turn(&self.name, &reasoning, &invocations));
            Phase::Executing(invocations)
        } else {
            self.memory.append(assistant_turn(&self.name, &reasoning, &[]));
            Phase::Summarizing
        }
    }

    async fn reason(
        &mut self,
        tools: &[ToolSchema],
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        self.maybe_compact(cancel).await?;

        let system = prompts::react_prompt(
            &self.name,
            self.persona.as_deref(),
            tools,
            self.config.finish_tool_name.as_deref(),
            self.caller.text_protocol(),
        );
        let outcome = match self.observe().await {
            Some(observation) => {
                self.reason_over_observation(&system, tools, &observation, cancel)
                    .await?
            }
            None => {
                let history = self.memory.snapshot();
                self.guarded_call(&system, &history, Some(tools), cancel).await?
            }
        };

        Ok(match outcome.into_selection() {
            SelectionOutcome::Done(text) => {
                self.memory
                    .append(Turn::assistant(&self.name, vec![ContentBlock::text(&text)]));
                Phase::Done(text)
            }
            SelectionOutcome::Continue {
                reasoning,
                invocations,
            } => {
                self.memory
                    .append(assistant_turn(&self.name, &reasoning, &invocations));
                Phase::Executing(invocations)
            }
        })
    }

    async fn observe(&self) -> Option<String> {
        let observer = self.observer.as_ref()?;
        match observer.observe().await {
            Ok(snapshot) => snapshot.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                tracing::warn!(agent = %self.name, error = %e, "observation failed, reasoning without it");
                None
            }
        }
    }

    /// 观察不入日志；超过 chunk_size 时逐块调用模型，直到某块给出工具调用或块用完
    async fn reason_over_observation(
        &mut self,
        system: &str,
        tools: &[ToolSchema],
        observation: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelOutcome, AgentError> {
        let base = self.memory.snapshot();
        let chunks = split_chunks(observation, self.config.chunk_size);
        let total = chunks.len();
        if total == 1 {
            let mut history = base;
            history.push(Turn::user(
                "environment",
                prompts::observation_turn_text(observation),
            ));
            return self.guarded_call(system, &history, Some(tools), cancel).await;
        }

        let mut digest = String::new();
        let mut outcome = ModelOutcome::default();
        for (i, chunk) in chunks.iter().enumerate() {
            send_event(
                self.event_tx.as_ref(),
                ReactEvent::ObservationChunk {
                    index: i + 1,
                    total,
                },
            );
            let mut history = base.clone();
            history.push(Turn::user(
                "environment",
                prompts::observation_chunk_text(i + 1, total, &digest, chunk),
            ));
            outcome = self.guarded_call(system, &history, Some(tools), cancel).await?;
            if !outcome.invocations.is_empty() {
                tracing::debug!(agent = %self.name, chunk = i + 1, total, "chunk sufficient");
                break;
            }
            digest = outcome.reasoning.clone();
        }
        Ok(outcome)
    }

    /// 常驻记忆超过阈值时：摘要写回为一条 system 记录 + 最近的用户目标。
    /// 取消会向上传递（日志保持原样），其余失败只记录日志
    async fn maybe_compact(&mut self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let MemoryPolicy::Persistent { compact_threshold } = self.config.memory else {
            return Ok(());
        };
        if compact_threshold == 0 || self.memory.size() <= compact_threshold {
            return Ok(());
        }
        let before = self.memory.size();
        let history = self.memory.snapshot();
        let mut partial = PartialReply::default();
        match self
            .caller
            .call_cancellable(prompts::compaction_prompt(), &history, None, cancel, &mut partial)
            .await
        {
            Ok(outcome) if outcome.parse_error.is_none() && !outcome.reasoning.is_empty() => {
                let mut turns = vec![Turn::system(format!(
                    "Previous conversation summary:\n\n{}",
                    outcome.reasoning
                ))];
                if let Some(goal) = history
                    .iter()
                    .rev()
                    .find(|t| t.role == Role::User && t.speaker_name == "user")
                {
                    turns.push(goal.clone());
                }
                self.memory.replace(turns);
                tracing::info!(agent = %self.name, before, after = self.memory.size(), "memory compacted");
                send_event(
                    self.event_tx.as_ref(),
                    ReactEvent::Compaction {
                        turns_before: before,
                    },
                );
            }
            Ok(_) => tracing::warn!(agent = %self.name, "compaction produced no summary, keeping memory"),
            Err(AgentError::Cancelled) => {
                tracing::info!(agent = %self.name, "compaction cancelled");
                return Err(AgentError::Cancelled);
            }
            Err(e) => tracing::warn!(agent = %self.name, error = %e, "compaction failed, keeping memory"),
        }
        Ok(())
    }

    async fn execute(&mut self, batch: Vec<ToolInvocation>, state: &mut RunState) -> Phase {
        for invocation in &batch {
            tracing::debug!(agent = %self.name, tool = %invocation.name, id = %invocation.id, "dispatch");
            send_event(
                self.event_tx.as_ref(),
                ReactEvent::ToolCall {
                    id: invocation.id.clone(),
                    tool: invocation.name.clone(),
                    args: invocation.args(),
                },
            );
        }

        let finish_tool = self.config.finish_tool_name.as_deref();
        let events = self.event_tx.as_ref();
        let mut answer: Option<String> = None;
        if self.config.parallel_tool_calls && batch.len() > 1 {
            // 全部发出后再等待；记录按完成顺序追加，每条结果都带自己的调用 id
            let executor = &self.executor;
            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|invocation| async move {
                    (invocation, executor.execute_to_completion(invocation).await)
                })
                .collect();
            while let Some((invocation, response)) = pending.next().await {
                if let Some(a) = commit_execution(
                    &mut self.memory,
                    state,
                    events,
                    finish_tool,
                    invocation,
                    response,
                ) {
                    answer.get_or_insert(a);
                }
            }
        } else {
            for invocation in &batch {
                let response = self.executor.execute_to_completion(invocation).await;
                if let Some(a) = commit_execution(
                    &mut self.memory,
                    state,
                    events,
                    finish_tool,
                    invocation,
                    response,
                ) {
                    answer.get_or_insert(a);
                }
            }
        }

        if let Some(answer) = answer {
            let turn = Turn::assistant(&self.name, vec![ContentBlock::text(&answer)]);
            self.memory.append(turn.clone());
            state.terminal_turn = Some(turn);
            return Phase::Done(answer);
        }

        match self.config.shape {
            LoopShape::SelectEvaluate => Phase::Evaluating,
            LoopShape::React => {
                state.iteration += 1;
                let max = self.config.max_iterations;
                send_event(
                    self.event_tx.as_ref(),
                    ReactEvent::StepUpdate {
                        step: state.iteration,
                        max_steps: max,
                    },
                );
                if state.iteration < max {
                    Phase::Reasoning
                } else {
                    Phase::Summarizing
                }
            }
        }
    }

    /// 迭代用尽：不带工具地总结一次；这一步自身失败也只返回模板文本，不会抛错
    async fn summarize_exhausted(&mut self) -> String {
        let max = self.config.max_iterations;
        tracing::warn!(agent = %self.name, max_iterations = max, "max iterations reached, summarizing");
        send_event(
            self.event_tx.as_ref(),
            ReactEvent::Summarizing { iterations: max },
        );
        let system = prompts::exhausted_summary_prompt(&self.name, max);
        let history = self.memory.snapshot();
        let summary = match self.caller.call(&system, &history, None).await {
            Ok(outcome) if outcome.parse_error.is_none() && !outcome.reasoning.is_empty() => {
                outcome.reasoning
            }
            Ok(outcome) => format!(
                "Reached max iterations ({}), summary generation failed: {}",
                max,
                outcome
                    .parse_error
                    .unwrap_or_else(|| "empty summary".to_string())
            ),
            Err(e) => format!(
                "Reached max iterations ({}), summary generation failed: {}",
                max, e
            ),
        };
        self.memory
            .append(Turn::assistant(&self.name, vec![ContentBlock::text(&summary)]));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelReply, ToolUseChunk};
    use crate::tools::EchoTool;
    use serde_json::json;

    fn echo_executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        ToolExecutor::new(registry, 5)
    }

    #[test]
    fn test_objective_with_exact_input() {
        let turn = objective_turn("Translate", Some("bonjour"));
        assert_eq!(turn.text(), "Translate\n\n## Exact input\nbonjour");
        assert_eq!(objective_turn("Translate", Some("  ")).text(), "Translate");
    }

    #[test]
    fn test_guard_closes_pending_calls_on_drop() {
        let mut log = ConversationLog::new();
        {
            let mut guard = InterruptGuard::new(&mut log, "agent", None);
            guard.partial.text = "partial".to_string();
            guard.partial.invocations = vec![
                ToolInvocation::new("a", "echo", Default::default()),
                ToolInvocation::new("b", "echo", Default::default()),
            ];
        }
        assert_eq!(log.size(), 3);
        assert_eq!(log.turns()[0].tool_use_ids(), vec![("a", "echo"), ("b", "echo")]);
        assert_eq!(log.turns()[1].tool_result_id(), Some("a"));
        assert_eq!(log.turns()[2].tool_result_id(), Some("b"));
    }

    #[test]
    fn test_disarmed_guard_writes_nothing() {
        let mut log = ConversationLog::new();
        {
            let mut guard = InterruptGuard::new(&mut log, "agent", None);
            guard.partial.text = "ok".to_string();
            guard.disarm();
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_config_from_app_config() {
        let mut cfg = AppConfig::default();
        cfg.orchestration.parallel_tool_calls = true;
        cfg.orchestration.max_iterations = 0;
        let delegated = OrchestrationConfig::from_app_config(&cfg, LoopShape::SelectEvaluate);
        assert_eq!(delegated.max_iterations, 1);
        assert!(delegated.parallel_tool_calls);
        assert_eq!(delegated.memory, MemoryPolicy::Isolated);
        assert!(delegated.finish_tool_name.is_none());

        let react = OrchestrationConfig::from_app_config(&cfg, LoopShape::React);
        assert_eq!(react.max_iterations, 30);
        assert_eq!(react.finish_tool_name.as_deref(), Some("generate_response"));
        assert_eq!(react.memory, MemoryPolicy::Persistent { compact_threshold: 24 });
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mock = MockLlmClient::with_replies(vec![
            ModelReply::text("echo it").with_tool_use(ToolUseChunk::new("c1", "echo", json!({"text": "hi"}))),
            ModelReply::text("done"),
        ]);
        let mut orch = Orchestrator::new(
            "events",
            Arc::new(mock),
            echo_executor(),
            OrchestrationConfig::delegated(3),
        )
        .with_event_tx(tx);
        let result = orch.run("say hi", None).await;
        assert_eq!(result.status, OrchestrationStatus::Completed);

        let mut saw_call = false;
        let mut saw_finished = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                ReactEvent::ToolCall { id, .. } => saw_call = id == "c1",
                ReactEvent::Finished { status } => saw_finished = status == OrchestrationStatus::Completed,
                _ => {}
            }
        }
        assert!(saw_call);
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn test_compaction_replaces_memory() {
        let mock = MockLlmClient::with_replies(vec![
            ModelReply::text("first answer"),
            ModelReply::text("they asked one thing"),
            ModelReply::text("second answer"),
        ]);
        let mut orch = Orchestrator::new(
            "chat",
            Arc::new(mock),
            echo_executor(),
            OrchestrationConfig::react(5).with_memory(MemoryPolicy::Persistent {
                compact_threshold: 2,
            }),
        );
        orch.run("one", None).await;
        assert_eq!(orch.memory().size(), 2);

        // 第二次运行追加目标后为 3 条，超过阈值，先压缩
        let result = orch.run("two", None).await;
        assert_eq!(result.summary, "second answer");
        let turns = orch.memory().turns();
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].text().contains("they asked one thing"));
        assert_eq!(turns[1].text(), "two");
        assert_eq!(turns[2].text(), "second answer");
    }
}
