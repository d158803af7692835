//! Atomic mutation coordinator
//!
//! Non-atomic batches run each item on its own. Atomic batches run every
//! item inside one store transaction; any item failure, or a failure of the
//! transaction itself, rolls the whole batch back and surfaces a single
//! AtomicOperationFailure.

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::request::{RecordModifyRequest, RecordModifyResponse};
use crate::context::RequestContext;
use crate::error::{ErrorCode, RecordError, RecordResult};
use crate::observability::Event;
use crate::store::RecordStore;

pub struct AtomicCoordinator<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> AtomicCoordinator<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Run `modify` over the batch with the requested atomicity.
    ///
    /// # Errors
    ///
    /// - NotSupported if the batch is atomic and the store has no
    ///   transactions; nothing is attempted
    /// - AtomicOperationFailure after a rollback, with `info` mapping each
    ///   failed id to its error, or `innerError` for transaction failures
    pub fn run<F>(
        &self,
        ctx: &RequestContext,
        req: &RecordModifyRequest,
        resp: &mut RecordModifyResponse,
        mut modify: F,
    ) -> RecordResult<()>
    where
        F: FnMut(&RequestContext, &RecordModifyRequest, &mut RecordModifyResponse) -> RecordResult<()>,
    {
        if !req.atomic {
            return modify(ctx, req, resp);
        }

        let tx = self
            .store
            .transactional()
            .ok_or_else(|| RecordError::not_supported("store does not support atomic operation"))?;

        tx.begin(ctx).map_err(|e| inner_failure(&e))?;

        let failure = match modify(ctx, req, resp) {
            Err(err) => Some(inner_failure(&err)),
            Ok(()) if resp.has_errors() => Some(item_failures(resp)),
            Ok(()) => tx.commit(ctx).err().map(|e| inner_failure(&e)),
        };

        match failure {
            None => {
                info!(
                    event = %Event::AtomicCommit,
                    request_id = %ctx.request_id,
                    items = req.len(),
                    "atomic batch committed"
                );
                Ok(())
            }
            Some(err) => {
                if let Err(rollback_err) = tx.rollback(ctx) {
                    warn!(
                        event = %Event::AtomicRollback,
                        request_id = %ctx.request_id,
                        error = %rollback_err,
                        "rollback failed"
                    );
                }
                resp.clear_successes();
                warn!(
                    event = %Event::AtomicRollback,
                    request_id = %ctx.request_id,
                    failed = resp.err_map.len(),
                    "atomic batch rolled back"
                );
                Err(err)
            }
        }
    }
}

fn item_failures(resp: &RecordModifyResponse) -> RecordError {
    let info: Map<String, Value> = resp
        .err_map
        .iter()
        .map(|(id, err)| (id.to_string(), err.to_json_for(id)))
        .collect();
    RecordError::with_info(
        ErrorCode::AtomicOperationFailure,
        "Atomic Operation rolled back due to one or more errors",
        info,
    )
}

fn inner_failure(err: &RecordError) -> RecordError {
    let mut info = Map::new();
    info.insert("innerError".into(), Value::String(err.message().to_string()));
    RecordError::with_info(
        ErrorCode::AtomicOperationFailure,
        "Atomic Operation rolled back due to internal error",
        info,
    )
}
