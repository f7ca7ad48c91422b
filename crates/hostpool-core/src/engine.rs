//! Sequential batch execution.
//!
//! Operations run strictly one after another in queue order: concurrent
//! aggregate edits on the backend can interleave into half-applied states.
//! A failed, refused or timed-out operation is recorded and the batch moves
//! on; hosts are independent infrastructure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::settings::Timeouts;
use crate::types::{BatchReport, ExecuteOutcome, ExecutionResult, FailureKind, Operation, OperationKind};
use crate::{Backend, Error, Result};

pub struct ExecutionEngine {
    backend: Arc<dyn Backend>,
    timeouts: Timeouts,
}

impl ExecutionEngine {
    pub fn new(backend: Arc<dyn Backend>, timeouts: Timeouts) -> Self {
        Self { backend, timeouts }
    }

    /// Run every operation in order and report each outcome.
    ///
    /// Never fails as a whole and cannot be cancelled half way.
    pub async fn run(&self, ops: &[Operation]) -> BatchReport {
        info!(operations = ops.len(), "executing batch");
        let mut report = BatchReport::default();

        for op in ops {
            let started = Instant::now();
            let outcome = self.execute(op).await;
            let result = to_result(op, outcome, started.elapsed());

            if result.success {
                info!(host = %result.host, kind = op.kind.label(), elapsed_ms = result.elapsed.as_millis() as u64, "operation succeeded");
            } else {
                warn!(
                    host = %result.host,
                    kind = op.kind.label(),
                    failure = ?result.failure,
                    error = result.error.as_deref().unwrap_or_default(),
                    "operation failed"
                );
            }
            report.results.push(result);
        }

        info!(succeeded = report.succeeded(), failed = report.failed(), "batch finished");
        report
    }

    async fn execute(&self, op: &Operation) -> Result<ExecuteOutcome> {
        match &op.kind {
            OperationKind::Migration(m) => {
                bounded("migration", self.timeouts.migration, self.backend.execute_migration(m)).await
            }
            OperationKind::Launch(l) => {
                bounded("launch", self.timeouts.launch, self.backend.execute_launch(l)).await
            }
        }
    }
}

async fn bounded<F>(operation: &'static str, after: Duration, call: F) -> Result<ExecuteOutcome>
where
    F: Future<Output = Result<ExecuteOutcome>>,
{
    tokio::time::timeout(after, call)
        .await
        .unwrap_or(Err(Error::Timeout { operation, after }))
}

fn to_result(op: &Operation, outcome: Result<ExecuteOutcome>, elapsed: Duration) -> ExecutionResult {
    let host = op.host().to_string();
    match outcome {
        Ok(out) if out.success => ExecutionResult {
            operation_id: op.id,
            host,
            success: true,
            error: None,
            failure: None,
            output: out.message.into_iter().chain(out.output).collect(),
            elapsed,
        },
        Ok(out) => ExecutionResult {
            operation_id: op.id,
            host,
            success: false,
            error: Some(
                out.error
                    .or(out.message)
                    .unwrap_or_else(|| "backend reported failure".into()),
            ),
            failure: Some(FailureKind::Rejected),
            output: out.output,
            elapsed,
        },
        Err(e) => ExecutionResult {
            operation_id: op.id,
            host,
            success: false,
            error: Some(e.user_message()),
            failure: Some(e.failure_kind()),
            output: Vec::new(),
            elapsed,
        },
    }
}
