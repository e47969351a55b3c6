//! Flow execution engine
//!
//! The interpreter: loads the graph, seeds the execution context with the
//! trigger payload, walks nodes through their executors with retry/backoff,
//! records results, resolves successors from edges, and finalizes the run.
//! Normal flow failures (node failures, cycles, step overflow) never
//! surface as errors; they are encoded in the returned context.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::context::{FlowContext, NodeRecord, NodeStatus, RunStatus};
use crate::error::EngineError;
use crate::executor::RunServices;
use crate::graph::{EdgeCondition, FlowEdge, FlowGraph, FlowNode, JsonMap, NodeType};
use crate::registry::ExecutorRegistry;
use crate::retry::RetryConfig;

/// Valid "save output as" names.
static NEX_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Hard cap on total node executions per run, a safety valve against
    /// runaway graphs.
    pub max_steps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_steps: 5000 }
    }
}

/// The flow execution engine. One instance serves any number of concurrent
/// runs; each run owns its own context.
pub struct FlowEngine {
    registry: ExecutorRegistry,
    config: EngineConfig,
}

impl FlowEngine {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: ExecutorRegistry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Interpret a flow graph for one trigger payload.
    ///
    /// Returns `Err` only for fatal faults (a node type with no registered
    /// executor); every normal outcome, including failure, lands in the
    /// returned context's `meta`.
    pub async fn execute(
        &self,
        graph: &FlowGraph,
        execution_id: &str,
        payload: JsonMap,
        services: &RunServices,
    ) -> Result<FlowContext, EngineError> {
        let mut ctx = FlowContext::create(&graph.id, execution_id);

        let (nodes, start_node) = Self::working_nodes(graph);
        let node_map: HashMap<&str, &FlowNode> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        self.inject_trigger_payload(&mut ctx, &start_node, payload);

        for node in &nodes {
            if node.node_type == NodeType::Loop {
                ctx.meta
                    .loop_has_continue_edge
                    .insert(node.id.clone(), graph.has_continue_edge(&node.id));
            }
        }

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start_node.id.clone());
        let mut executed: HashSet<String> = HashSet::new();
        let mut steps: u32 = 0;
        let mut run_failed = false;

        'run: while let Some(current_id) = queue.pop_front() {
            let Some(&node) = node_map.get(current_id.as_str()) else {
                continue;
            };
            ctx.meta.current_node_id = Some(current_id.clone());

            if steps >= self.config.max_steps {
                run_failed = true;
                ctx.meta.error_message = Some(format!(
                    "Execution stopped after reaching the step ceiling ({} node executions)",
                    self.config.max_steps
                ));
                log::error!(
                    "Flow {} execution {} hit the step ceiling at node {}",
                    graph.id,
                    execution_id,
                    node.id
                );
                break;
            }

            services.events.on_node_started(execution_id, &node.id);
            let result = self
                .execute_with_retry(node, &mut ctx, services, execution_id)
                .await?;
            let status = result.status;

            // The START record was written by payload injection and must
            // never be overwritten.
            if node.node_type != NodeType::Start {
                if let Some(alias) = node.alias_key() {
                    ctx.record_alias(alias, result.clone());
                }
                if !matches!(node.node_type, NodeType::Variable | NodeType::Loop) {
                    if let Some(name) = node.save_output_as() {
                        save_named_output(&mut ctx, name, result.primary_output());
                    }
                }
                ctx.record_node(&node.id, result.clone());
            }
            services.events.on_node_completed(execution_id, &node.id, status, &ctx.nex);
            ctx.node_execution_order.push(node.id.clone());
            executed.insert(node.id.clone());
            steps += 1;

            if status == NodeStatus::Failure {
                if let Some(msg) = result.error_message.as_deref() {
                    services.events.on_node_error(execution_id, &node.id, msg);
                }
            }

            if node.node_type.is_terminal() {
                if node.node_type == NodeType::Failure {
                    run_failed = true;
                }
                break;
            }

            let successors = Self::resolve_successors(node, status, &graph.edges, &node_map);

            if status == NodeStatus::Failure && successors.is_empty() {
                run_failed = true;
                if ctx.meta.error_message.is_none() {
                    ctx.meta.error_message = Some(
                        result
                            .error_message
                            .clone()
                            .unwrap_or_else(|| format!("Node '{}' failed", display_name(node))),
                    );
                }
                break;
            }

            for successor in successors {
                if executed.contains(successor.id.as_str()) {
                    let reentry_allowed =
                        status == NodeStatus::Continue || successor.node_type == NodeType::Loop;
                    if !reentry_allowed {
                        run_failed = true;
                        ctx.meta.error_message = Some(format!(
                            "Loop detected: node '{}' was already executed. Use a LOOP node for intentional loops.",
                            display_name(successor)
                        ));
                        log::error!(
                            "Flow {} execution {}: accidental cycle at node {}",
                            graph.id,
                            execution_id,
                            successor.id
                        );
                        break 'run;
                    }
                }
                queue.push_back(successor.id.clone());
            }
        }

        ctx.meta.completed_at = Some(Utc::now());
        ctx.meta.status = if run_failed || ctx.meta.error_message.is_some() {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };
        Ok(ctx)
    }

    /// The run's working node set. A flow without a START node gets a
    /// default one synthesized rather than a failed run.
    fn working_nodes(graph: &FlowGraph) -> (Vec<FlowNode>, FlowNode) {
        let mut nodes = graph.nodes.clone();
        let start = match nodes.iter().find(|n| n.node_type == NodeType::Start) {
            Some(n) => n.clone(),
            None => {
                log::warn!("Flow {} has no START node; synthesizing a default entry point", graph.id);
                let start = FlowNode::synthetic_start();
                nodes.push(start.clone());
                start
            }
        };
        (nodes, start)
    }

    /// Write the trigger payload as the START node's output, exactly once.
    fn inject_trigger_payload(&self, ctx: &mut FlowContext, start_node: &FlowNode, payload: JsonMap) {
        let mut output = JsonMap::new();
        output.insert("body".into(), Value::Object(payload));
        let record = NodeRecord::new(&start_node.id, NodeType::Start, NodeStatus::Success)
            .with_output(output);

        if let Some(alias) = start_node.alias_key() {
            ctx.record_alias(alias, record.clone());
        }
        if let Some(name) = start_node.save_output_as() {
            save_named_output(ctx, name, record.primary_output());
        }
        ctx.record_node(&start_node.id, record);
    }

    /// Run one node through its executor with retry/backoff.
    ///
    /// A thrown fault becomes a FAILURE record; node-level faults never
    /// escape to the engine loop. LOOP failures are structural and are
    /// never retried.
    async fn execute_with_retry(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
        execution_id: &str,
    ) -> Result<NodeRecord, EngineError> {
        let executor = self.registry.get(node.node_type)?;
        let retry = RetryConfig::from_config(&node.config);
        let mut attempt: u32 = 0;

        loop {
            let result = match executor.execute(node, ctx, services).await {
                Ok(record) => record,
                Err(err) => {
                    log::error!("Node {} execution failed: {}", node.id, err);
                    NodeRecord::failure(&node.id, node.node_type, err.to_string())
                }
            };

            if result.status != NodeStatus::Failure
                || node.node_type == NodeType::Loop
                || attempt >= retry.max_retries
            {
                return Ok(result);
            }

            services.events.on_node_retrying(execution_id, &node.id);
            let delay = retry.delay_for_attempt(attempt);
            log::info!(
                "Retrying node {} (retry {}/{}) after {} ms",
                node.id,
                attempt + 1,
                retry.max_retries,
                delay
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Map the node's outcome to a required edge condition and collect the
    /// targets of every eligible edge. DEFAULT edges always fire.
    /// Non-terminal successors come first so a flow stays alive as long as
    /// possible when multiple edges fire.
    fn resolve_successors<'a>(
        node: &FlowNode,
        outcome: NodeStatus,
        edges: &[FlowEdge],
        node_map: &HashMap<&str, &'a FlowNode>,
    ) -> Vec<&'a FlowNode> {
        let required = match outcome {
            NodeStatus::Success => EdgeCondition::Success,
            NodeStatus::Failure => EdgeCondition::Failure,
            NodeStatus::Continue => EdgeCondition::Continue,
            _ => EdgeCondition::Default,
        };

        let mut next: Vec<&FlowNode> = edges
            .iter()
            .filter(|e| e.source_node_id == node.id)
            .filter(|e| e.condition == required || e.condition == EdgeCondition::Default)
            .filter_map(|e| node_map.get(e.target_node_id.as_str()).copied())
            .collect();
        next.sort_by_key(|n| n.node_type.is_terminal());
        next
    }
}

/// Publish a node's primary output under a name in the `nex` container.
/// Invalid names are skipped with a warning; collisions warn and overwrite.
fn save_named_output(ctx: &mut FlowContext, name: &str, output: Option<&JsonMap>) {
    let key = name.trim();
    if !NEX_KEY.is_match(key) {
        log::warn!("Ignoring invalid save-output-as name '{key}'");
        return;
    }
    let Some(output) = output else {
        return;
    };
    if ctx.nex.contains_key(key) {
        log::warn!("Named output '{key}' already exists; overwriting");
    }
    ctx.nex.insert(key.to_string(), Value::Object(output.clone()));
}

fn display_name(node: &FlowNode) -> &str {
    node.label.as_deref().unwrap_or(&node.id)
}
