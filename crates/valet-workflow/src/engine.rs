use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use valet_broker::ToolBroker;
use valet_classifier::patterns::required_parameters;
use valet_classifier::{ClassificationCache, IntentClassifier};
use valet_context::ContextStore;
use valet_core::types::{ClassificationResult, CommandCategory, ContextSnapshot, Utterance};

use crate::complexity::{analyze_complexity, estimate_steps};
use crate::error::{Result, WorkflowError};
use crate::params::resolve_parameters;
use crate::templates::{match_template, WorkflowTemplate};
use crate::types::{
    AdvancedParameter, CommandComplexity, CommandStep, MultiStepWorkflow, ParameterSource,
    WorkflowStatus,
};

/// Which tool services a step's category.
fn tool_for(category: CommandCategory) -> &'static str {
    match category {
        CommandCategory::DocumentGeneration => "document",
        CommandCategory::Email => "email",
        CommandCategory::WebSearch => "search",
        _ => "ai",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub total_steps: usize,
    pub status: WorkflowStatus,
    pub complexity: CommandComplexity,
    pub template: Option<&'static str>,
}

/// What `process` hands back to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub classification: ClassificationResult,
    pub complexity: CommandComplexity,
    pub estimated_steps: usize,
    pub parameters: Vec<AdvancedParameter>,
    pub workflow: Option<WorkflowSummary>,
    pub requires_user_input: bool,
    pub multi_step: bool,
    pub processing_ms: f64,
}

/// Decomposes utterances into ordered step plans and drives their
/// execution through the tool broker.
///
/// The engine depends on the classifier and the context store; neither
/// depends back on it. The classifier only ever sees a context snapshot
/// value.
pub struct WorkflowEngine {
    classifier: Arc<IntentClassifier>,
    cache: Arc<ClassificationCache>,
    context: Arc<ContextStore>,
    broker: Arc<ToolBroker>,
    workflows: DashMap<String, MultiStepWorkflow>,
}

impl WorkflowEngine {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        cache: Arc<ClassificationCache>,
        context: Arc<ContextStore>,
        broker: Arc<ToolBroker>,
    ) -> Self {
        Self {
            classifier,
            cache,
            context,
            broker,
            workflows: DashMap::new(),
        }
    }

    /// Cache-fronted classification with context injection.
    pub fn classify(&self, utterance: &Utterance) -> Result<ClassificationResult> {
        utterance
            .validate()
            .map_err(|e| WorkflowError::InvalidInput(e.to_string()))?;

        if let Some(hit) = self.cache.get(
            &utterance.text,
            &utterance.user_id,
            &utterance.session_id,
            utterance.use_context,
        ) {
            return Ok(hit);
        }

        let snapshot: Option<ContextSnapshot> = if utterance.use_context {
            self.context
                .get(&utterance.user_id, &utterance.session_id, true)
                .map(|ctx| ctx.snapshot())
        } else {
            None
        };

        let result = self.classifier.classify(utterance, snapshot.as_ref());
        self.cache.put(
            &utterance.text,
            &utterance.user_id,
            &utterance.session_id,
            utterance.use_context,
            &result,
        );

        if utterance.use_context {
            self.context.note_classification(
                &utterance.user_id,
                &utterance.session_id,
                result.category,
                &result.parameters,
            );
        }

        Ok(result)
    }

    /// Full pipeline: classify, analyse complexity, resolve parameters,
    /// assemble a workflow when the utterance needs one. Workflows are
    /// returned `pending`; execution is driven by
    /// [`continue_workflow`](Self::continue_workflow).
    pub fn process(&self, utterance: &Utterance) -> Result<ExecutionReport> {
        let started = Instant::now();
        let classification = self.classify(utterance)?;

        let complexity = analyze_complexity(&utterance.text);
        let estimated = estimate_steps(&utterance.text, complexity);

        let snapshot: Option<ContextSnapshot> = if utterance.use_context {
            self.context
                .get(&utterance.user_id, &utterance.session_id, false)
                .map(|ctx| ctx.snapshot())
        } else {
            None
        };
        let parameters = resolve_parameters(&utterance.text, &classification, snapshot.as_ref());
        let requires_user_input = parameters.iter().any(|p| p.needs_prompt());

        let template = match_template(&utterance.text);
        let workflow = if template.is_some() || estimated > 1 {
            let wf = self.build_workflow(utterance, complexity, estimated, &parameters, template);
            let summary = WorkflowSummary {
                workflow_id: wf.workflow_id.clone(),
                total_steps: wf.steps.len(),
                status: wf.status,
                complexity: wf.complexity,
                template: template.map(|t| t.name),
            };
            info!(
                workflow_id = %wf.workflow_id,
                steps = wf.steps.len(),
                template = ?template.map(|t| t.name),
                "workflow created"
            );
            self.workflows.insert(wf.workflow_id.clone(), wf);
            Some(summary)
        } else {
            None
        };

        Ok(ExecutionReport {
            multi_step: workflow
                .as_ref()
                .map(|w| w.total_steps > 1)
                .unwrap_or(false),
            classification,
            complexity,
            estimated_steps: estimated,
            parameters,
            workflow,
            requires_user_input,
            processing_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    fn build_workflow(
        &self,
        utterance: &Utterance,
        complexity: CommandComplexity,
        estimated: usize,
        parameters: &[AdvancedParameter],
        template: Option<&'static WorkflowTemplate>,
    ) -> MultiStepWorkflow {
        let workflow_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let plan: Vec<(String, CommandCategory)> = match template {
            Some(t) => t
                .steps
                .iter()
                .map(|s| (s.command.to_string(), s.category))
                .collect(),
            // generic N-step plan for connective-heavy utterances with no
            // template counterpart
            None => (0..estimated.max(2))
                .map(|_| ("chat".to_string(), CommandCategory::GeneralConversation))
                .collect(),
        };

        let mut steps: Vec<CommandStep> = Vec::with_capacity(plan.len());
        for (i, (command, category)) in plan.into_iter().enumerate() {
            let mut step = CommandStep::new(format!("{workflow_id}-step-{i}"), &command, category);
            if i > 0 {
                step.dependencies = vec![format!("{workflow_id}-step-{}", i - 1)];
            }
            // only resolved values flow into steps; prompts are attached
            // per step from its own category requirements below
            for param in parameters.iter().filter(|p| p.value.is_some()) {
                step.parameters.insert(param.name.clone(), param.clone());
            }
            // each step must have its own category's required fields, even
            // when the utterance classified differently
            for required in required_parameters(category) {
                step.parameters
                    .entry(required.to_string())
                    .and_modify(|p| p.required = true)
                    .or_insert_with(|| AdvancedParameter {
                        name: required.to_string(),
                        value: None,
                        source: ParameterSource::Prompted,
                        confidence: 0.0,
                        required: true,
                        description: format!("required parameter '{required}'"),
                    });
            }
            steps.push(step);
        }

        MultiStepWorkflow {
            workflow_id,
            user_id: utterance.user_id.clone(),
            session_id: utterance.session_id.clone(),
            original_command: utterance.text.clone(),
            complexity: template.map(|t| t.complexity).unwrap_or(complexity),
            steps,
            current_step: 0,
            status: WorkflowStatus::Pending,
            created_at: now,
            updated_at: now,
            completion_percentage: 0.0,
        }
    }

    pub fn get(&self, workflow_id: &str) -> Result<MultiStepWorkflow> {
        self.workflows
            .get(workflow_id)
            .map(|wf| wf.value().clone())
            .ok_or_else(|| WorkflowError::NotFound {
                id: workflow_id.to_string(),
            })
    }

    pub fn list_for_user(&self, user_id: &str) -> Vec<MultiStepWorkflow> {
        self.workflows
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn active_workflows(&self) -> usize {
        self.workflows.len()
    }

    /// Advance the current step by exactly one terminal transition.
    ///
    /// `user_input` satisfies the first prompted parameter still waiting
    /// on the current step (and the same field on later steps). At most
    /// one step of a workflow is ever running; a concurrent call while a
    /// step runs fails `workflow_busy`.
    pub async fn continue_workflow(
        &self,
        workflow_id: &str,
        user_input: Option<&str>,
    ) -> Result<MultiStepWorkflow> {
        // claim the step under the map's entry lock, then execute with the
        // lock released
        let claimed = {
            let mut entry =
                self.workflows
                    .get_mut(workflow_id)
                    .ok_or_else(|| WorkflowError::NotFound {
                        id: workflow_id.to_string(),
                    })?;
            let wf = entry.value_mut();

            if wf.status.is_terminal() {
                return Ok(wf.clone());
            }
            if wf.current_step >= wf.steps.len() {
                wf.update_progress();
                return Ok(wf.clone());
            }
            if wf.steps[wf.current_step].status == WorkflowStatus::Running {
                return Err(WorkflowError::StepInProgress {
                    id: workflow_id.to_string(),
                });
            }

            if let Some(input) = user_input {
                fill_prompted(wf, input);
            }

            let idx = wf.current_step;
            let step = &mut wf.steps[idx];
            if !step.unmet_prompts().is_empty() {
                step.status = WorkflowStatus::WaitingInput;
                wf.status = WorkflowStatus::WaitingInput;
                wf.updated_at = Utc::now();
                debug!(workflow_id, step = idx, "step waiting for user input");
                return Ok(wf.clone());
            }

            step.status = WorkflowStatus::Running;
            step.started_at = Some(Utc::now());
            wf.status = WorkflowStatus::Running;
            wf.updated_at = Utc::now();

            (
                idx,
                step.command.clone(),
                step.category,
                build_exec_params(step, &wf.original_command),
                Duration::from_secs(step.timeout_secs),
            )
        };

        let (idx, command, category, exec_params, timeout) = claimed;
        let outcome = self
            .broker
            .dispatch(tool_for(category), &command, exec_params, Some(timeout))
            .await;

        let mut entry =
            self.workflows
                .get_mut(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound {
                    id: workflow_id.to_string(),
                })?;
        let wf = entry.value_mut();

        match outcome {
            Ok(result) => {
                {
                    let step = &mut wf.steps[idx];
                    step.status = WorkflowStatus::Completed;
                    step.completed_at = Some(Utc::now());
                    step.error = None;
                    step.result = Some(result.clone());
                }
                carry_forward(wf, idx, &result);
                wf.current_step += 1;
                wf.status = WorkflowStatus::Pending;
                wf.update_progress();
                debug!(workflow_id, step = idx, "step completed");
            }
            Err(e) => {
                let step = &mut wf.steps[idx];
                step.retry_count += 1;
                step.error = Some(e.to_string());
                if step.retry_count <= step.max_retries {
                    // failed → pending: retried with unchanged parameters
                    step.status = WorkflowStatus::Pending;
                    wf.status = WorkflowStatus::Pending;
                    warn!(
                        workflow_id,
                        step = idx,
                        attempt = step.retry_count,
                        err = %e,
                        "step failed, will retry"
                    );
                } else {
                    step.status = WorkflowStatus::Failed;
                    wf.status = WorkflowStatus::Failed;
                    warn!(workflow_id, step = idx, err = %e, "step failed, budget exhausted");
                }
                wf.updated_at = Utc::now();
            }
        }

        Ok(wf.clone())
    }
}

/// Satisfy the current step's first unmet prompt, and the same field on
/// every later step so the answer is not asked twice.
fn fill_prompted(wf: &mut MultiStepWorkflow, input: &str) {
    let idx = wf.current_step;
    let Some(name) = wf.steps[idx]
        .unmet_prompts()
        .first()
        .map(|p| p.name.clone())
    else {
        return;
    };

    for step in wf.steps.iter_mut().skip(idx) {
        if let Some(param) = step.parameters.get_mut(&name) {
            if param.needs_prompt() {
                param.value = Some(Value::String(input.to_string()));
                param.confidence = 1.0;
            }
        }
    }
}

/// Merge scalar fields of a completed step's result into later steps'
/// parameters, so values like a composed email body flow forward.
fn carry_forward(wf: &mut MultiStepWorkflow, completed_idx: usize, result: &Value) {
    let Some(fields) = result.as_object() else {
        return;
    };
    for step in wf.steps.iter_mut().skip(completed_idx + 1) {
        for (name, value) in fields {
            if value.is_string() || value.is_number() || value.is_boolean() {
                let replace = step
                    .parameters
                    .get(name)
                    .map(|p| p.value.is_none() || p.source == ParameterSource::Contextual)
                    .unwrap_or(true);
                if replace {
                    step.parameters.insert(
                        name.clone(),
                        AdvancedParameter {
                            name: name.clone(),
                            value: Some(value.clone()),
                            source: ParameterSource::Contextual,
                            confidence: 0.8,
                            required: step
                                .parameters
                                .get(name)
                                .map(|p| p.required)
                                .unwrap_or(false),
                            description: format!("carried forward from step {completed_idx}"),
                        },
                    );
                }
            }
        }
    }
}

/// Flatten a step's resolved parameters into the JSON payload its tool
/// command expects.
fn build_exec_params(step: &CommandStep, original_command: &str) -> Value {
    let mut map = Map::new();
    for (name, param) in &step.parameters {
        if let Some(value) = &param.value {
            map.insert(name.clone(), value.clone());
        }
    }

    let str_of = |map: &Map<String, Value>, key: &str| -> Option<String> {
        map.get(key).and_then(|v| v.as_str()).map(String::from)
    };

    match step.command.as_str() {
        "chat" => {
            map.insert("prompt".into(), json!(original_command));
            map.entry("context".to_string()).or_insert_with(|| json!([]));
        }
        "generate_pdf" | "generate_docx" | "generate_markdown" => {
            let content = str_of(&map, "content")
                .or_else(|| str_of(&map, "body"))
                .or_else(|| str_of(&map, "content_topic"))
                .unwrap_or_else(|| original_command.to_string());
            map.insert("content".into(), json!(content));
        }
        "web_search" | "knowledge_query" | "research" | "fact_check" => {
            let query = str_of(&map, "query")
                .or_else(|| str_of(&map, "content_topic"))
                .unwrap_or_else(|| original_command.to_string());
            map.insert("query".into(), json!(query));
        }
        "compose_email" => {
            let subject = str_of(&map, "subject").unwrap_or_else(|| original_command.to_string());
            map.insert("subject".into(), json!(subject));
        }
        "send_email" => {
            if let Some(recipient) = str_of(&map, "recipient") {
                map.insert("to".into(), json!(recipient));
            }
            let subject = str_of(&map, "subject").unwrap_or_else(|| original_command.to_string());
            map.insert("subject".into(), json!(subject));
            let body = str_of(&map, "body")
                .or_else(|| str_of(&map, "content"))
                .unwrap_or_else(|| original_command.to_string());
            map.insert("body".into(), json!(body));
        }
        _ => {}
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use valet_broker::{BrokerError, ToolServer};
    use valet_classifier::{CosineScorer, IntentClassifier};

    struct StubTool {
        name: &'static str,
        caps: &'static [&'static str],
        result: Value,
        fail_first: u32,
        calls: AtomicU32,
    }

    impl StubTool {
        fn ok(name: &'static str, caps: &'static [&'static str], result: Value) -> Arc<Self> {
            Arc::new(Self {
                name,
                caps,
                result,
                fail_first: 0,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolServer for StubTool {
        fn name(&self) -> &'static str {
            self.name
        }
        fn capabilities(&self) -> Vec<String> {
            self.caps.iter().map(|c| c.to_string()).collect()
        }
        async fn execute(&self, _command: &str, _params: Value) -> valet_broker::Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(BrokerError::ToolError("transient".into()));
            }
            Ok(self.result.clone())
        }
    }

    async fn engine_with_tools(tools: Vec<Arc<dyn ToolServer>>) -> WorkflowEngine {
        let broker = Arc::new(ToolBroker::new(tools));
        broker.start_all().await;
        WorkflowEngine::new(
            Arc::new(IntentClassifier::new(Box::new(CosineScorer::fit()))),
            Arc::new(ClassificationCache::new(
                100,
                Duration::from_secs(60),
                None,
            )),
            Arc::new(ContextStore::new(None)),
            broker,
        )
    }

    fn default_tools() -> Vec<Arc<dyn ToolServer>> {
        vec![
            StubTool::ok(
                "search",
                &["web_search", "knowledge_query", "fact_check", "research"],
                json!({ "results": [] }),
            ),
            StubTool::ok("ai", &["chat", "model_selection"], json!({ "content": "drafted" })),
            StubTool::ok(
                "document",
                &["generate_pdf", "generate_docx", "generate_markdown", "extract_text"],
                json!({ "document_id": "valet://documents/x.pdf" }),
            ),
            StubTool::ok(
                "email",
                &["send_email", "compose_email"],
                json!({ "body": "- hi\n", "subject": "s" }),
            ),
        ]
    }

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            user_id: "u2".into(),
            session_id: "s2".into(),
            use_context: true,
            parameters: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn sequential_utterance_creates_pending_workflow() {
        let engine = engine_with_tools(default_tools()).await;
        let report = engine
            .process(&utterance(
                "schedule a meeting with Sarah tomorrow then send the invite",
            ))
            .unwrap();

        assert_eq!(report.complexity, CommandComplexity::Sequential);
        assert!(report.estimated_steps >= 2);
        let wf = report.workflow.expect("workflow expected");
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert!(wf.total_steps >= 2);
    }

    #[tokio::test]
    async fn simple_utterance_bypasses_workflow_creation() {
        let engine = engine_with_tools(default_tools()).await;
        let report = engine
            .process(&utterance("create a pdf report about machine learning"))
            .unwrap();

        assert!(report.workflow.is_none());
        assert!(!report.multi_step);
        assert_eq!(
            report.classification.category,
            CommandCategory::DocumentGeneration
        );
    }

    #[tokio::test]
    async fn template_workflow_runs_to_completion() {
        let engine = engine_with_tools(default_tools()).await;
        let report = engine
            .process(&utterance("research rust async runtimes for the report"))
            .unwrap();
        let id = report.workflow.unwrap().workflow_id;

        let mut wf = engine.get(&id).unwrap();
        let total = wf.steps.len();
        for _ in 0..total {
            wf = engine.continue_workflow(&id, None).await.unwrap();
        }

        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.completion_percentage, 1.0);
        assert_eq!(wf.completed_steps(), total);
        assert_eq!(wf.current_step, total);
    }

    #[tokio::test]
    async fn only_one_step_advances_per_continue() {
        let engine = engine_with_tools(default_tools()).await;
        let report = engine
            .process(&utterance("research rust async runtimes for the report"))
            .unwrap();
        let id = report.workflow.unwrap().workflow_id;

        let wf = engine.continue_workflow(&id, None).await.unwrap();
        assert_eq!(wf.completed_steps(), 1);
        assert_eq!(wf.current_step, 1);
        let total = wf.steps.len();
        assert_eq!(wf.completion_percentage, 1.0 / total as f64);
    }

    #[tokio::test]
    async fn failed_step_retries_then_exhausts_budget() {
        let flaky = Arc::new(StubTool {
            name: "search",
            caps: &["web_search", "knowledge_query", "fact_check", "research"],
            result: json!({}),
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let mut tools = default_tools();
        tools[0] = flaky;
        let engine = engine_with_tools(tools).await;

        let report = engine
            .process(&utterance("research rust async runtimes for the report"))
            .unwrap();
        let id = report.workflow.unwrap().workflow_id;

        // three retries within the budget, the fourth attempt exhausts it
        for attempt in 1..=3 {
            let wf = engine.continue_workflow(&id, None).await.unwrap();
            assert_eq!(wf.status, WorkflowStatus::Pending, "attempt {attempt}");
            assert_eq!(wf.steps[0].retry_count, attempt);
        }
        let wf = engine.continue_workflow(&id, None).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.steps[0].status, WorkflowStatus::Failed);
        assert_eq!(wf.current_step, 0);
    }

    #[tokio::test]
    async fn prompted_parameter_blocks_until_supplied() {
        let engine = engine_with_tools(default_tools()).await;
        let report = engine
            .process(&utterance("send an email campaign about the launch"))
            .unwrap();
        let id = report.workflow.unwrap().workflow_id;

        // step 0 is a chat draft; step 1 composes and needs a recipient
        let wf = engine.continue_workflow(&id, None).await.unwrap();
        assert_eq!(wf.completed_steps(), 1);

        let wf = engine.continue_workflow(&id, None).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::WaitingInput);
        assert_eq!(wf.steps[1].status, WorkflowStatus::WaitingInput);

        let wf = engine
            .continue_workflow(&id, Some("team@example.com"))
            .await
            .unwrap();
        assert_eq!(wf.completed_steps(), 2);

        // the answer carried forward: the send step no longer prompts
        let wf = engine.continue_workflow(&id, None).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let engine = engine_with_tools(default_tools()).await;
        let err = engine.continue_workflow("missing", None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn classify_twice_hits_cache() {
        let engine = engine_with_tools(default_tools()).await;
        let u = utterance("hello there");
        let a = engine.classify(&u).unwrap();
        let b = engine.classify(&u).unwrap();
        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence, b.confidence);
    }

    #[tokio::test]
    async fn oversized_text_is_invalid_input() {
        let engine = engine_with_tools(default_tools()).await;
        let mut u = utterance("x");
        u.text = "a".repeat(1001);
        let err = engine.process(&u).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
