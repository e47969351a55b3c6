//! Run trigger boundary
//!
//! Decides synchronous vs. background execution and persists the final
//! context snapshot. The engine itself is a pure function of
//! (graph, trigger payload) → final context; this service owns everything
//! around that call, including the recursion entry point for SYNC
//! sub-flows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::capability::{ConnectorGateway, LanguageModel, ScriptHarness};
use crate::capability::{UnconfiguredConnectorGateway, UnconfiguredLanguageModel, UnconfiguredScriptHarness};
use crate::context::RunStatus;
use crate::engine::FlowEngine;
use crate::error::EngineError;
use crate::events::{EventSink, NullEventSink};
use crate::executor::RunServices;
use crate::graph::{FlowGraph, JsonMap};
use crate::store::{Execution, ExecutionStore, FlowStore};

/// Triggers flow runs. Implemented by [`FlowService`]; sub-flow executors
/// call back through this trait so a child run uses the same machinery as a
/// top-level trigger.
#[async_trait]
pub trait FlowTrigger: Send + Sync {
    /// Start a run in the background and return immediately with the
    /// execution in status RUNNING; the record is updated when the run
    /// completes.
    async fn trigger_flow(
        &self,
        flow_id: &str,
        payload: JsonMap,
        triggered_by: &str,
    ) -> Result<Execution, EngineError>;

    /// Run a flow to completion and return the final execution.
    async fn trigger_flow_sync(
        &self,
        flow_id: &str,
        payload: JsonMap,
        triggered_by: &str,
    ) -> Result<Execution, EngineError>;
}

/// The trigger boundary: engine + stores + capabilities.
///
/// Cheap to clone (all fields are shared handles); each run gets a
/// [`RunServices`] bundle carrying a clone of this service as its trigger,
/// which is what lets SUB_FLOW nodes recurse.
#[derive(Clone)]
pub struct FlowService {
    engine: Arc<FlowEngine>,
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionStore>,
    events: Arc<dyn EventSink>,
    scripts: Arc<dyn ScriptHarness>,
    language_model: Arc<dyn LanguageModel>,
    connectors: Arc<dyn ConnectorGateway>,
}

impl FlowService {
    /// Create a service with every capability stubbed; wire real ones with
    /// the `with_*` builders.
    pub fn new(
        engine: Arc<FlowEngine>,
        flows: Arc<dyn FlowStore>,
        executions: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            engine,
            flows,
            executions,
            events: Arc::new(NullEventSink),
            scripts: Arc::new(UnconfiguredScriptHarness),
            language_model: Arc::new(UnconfiguredLanguageModel),
            connectors: Arc::new(UnconfiguredConnectorGateway),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptHarness>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = model;
        self
    }

    pub fn with_connectors(mut self, connectors: Arc<dyn ConnectorGateway>) -> Self {
        self.connectors = connectors;
        self
    }

    fn run_services(&self) -> RunServices {
        RunServices {
            events: self.events.clone(),
            scripts: self.scripts.clone(),
            language_model: self.language_model.clone(),
            connectors: self.connectors.clone(),
            flows: self.flows.clone(),
            trigger: Some(Arc::new(self.clone())),
        }
    }

    /// Drive one run to completion and persist the outcome.
    ///
    /// Fatal engine faults are logged and recorded as a FAILURE execution
    /// with a minimal snapshot, so the record always explains what happened.
    async fn run_execution(self, graph: FlowGraph, mut execution: Execution, payload: JsonMap) -> Execution {
        let services = self.run_services();
        match self.engine.execute(&graph, &execution.id, payload, &services).await {
            Ok(ctx) => {
                execution.status = ctx.meta.status;
                execution.snapshot = Some(ctx.snapshot().unwrap_or_else(|err| {
                    log::error!("Failed to serialize snapshot for execution {}: {}", execution.id, err);
                    json!({ "nodes": {}, "nodeExecutionOrder": [], "error": err.to_string() })
                }));
            }
            Err(err) => {
                log::error!("Flow {} execution {} failed: {}", graph.id, execution.id, err);
                execution.status = RunStatus::Failure;
                execution.snapshot = Some(json!({
                    "nodes": {},
                    "nodeExecutionOrder": [],
                    "error": err.to_string(),
                }));
            }
        }
        execution.completed_at = Some(Utc::now());
        self.executions.save(execution.clone()).await;
        execution
    }

    async fn create_execution(
        &self,
        flow_id: &str,
        triggered_by: &str,
    ) -> Result<(FlowGraph, Execution), EngineError> {
        let graph = self
            .flows
            .get_flow(flow_id)
            .await
            .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
        let execution = Execution::new(flow_id, triggered_by);
        self.executions.save(execution.clone()).await;
        Ok((graph, execution))
    }
}

#[async_trait]
impl FlowTrigger for FlowService {
    async fn trigger_flow(
        &self,
        flow_id: &str,
        payload: JsonMap,
        triggered_by: &str,
    ) -> Result<Execution, EngineError> {
        let (graph, execution) = self.create_execution(flow_id, triggered_by).await?;
        let service = self.clone();
        let background = execution.clone();
        tokio::spawn(async move {
            service.run_execution(graph, background, payload).await;
        });
        Ok(execution)
    }

    async fn trigger_flow_sync(
        &self,
        flow_id: &str,
        payload: JsonMap,
        triggered_by: &str,
    ) -> Result<Execution, EngineError> {
        let (graph, execution) = self.create_execution(flow_id, triggered_by).await?;
        Ok(self.clone().run_execution(graph, execution, payload).await)
    }
}
