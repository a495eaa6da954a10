//! Chunked transfers: open, N x append, close.
//!
//! Used for SD-card file uploads and firmware uploads to volatile memory.
//! Every phase arms its own barrier and liveness is checked before each one.
//! Any failure aborts the transaction; file uploads then delete the partial
//! destination on a best-effort basis.

pub mod chunk;
pub mod file;
pub mod firmware;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::command::{CommandError, CommandState, ExecContext, Phase};
use crate::events::CommandEvent;
use crate::link::accept;
use crate::protocol::StatusCode;
use crate::protocol::constants::TOKEN_DELETE;
use crate::transport::DeviceRequest;

pub use chunk::{Chunk, ChunkPlan, ProgressTracker};
pub use file::{FileUpload, TransferSource};
pub use firmware::FirmwareUpload;

/// The requests making up one chunked transfer.
pub trait TransferPlan {
    /// Label used in progress events.
    fn label(&self) -> String;

    /// Bytes declared in the open phase and sent across all appends.
    fn total_len(&self) -> u64;

    fn open_request(&self) -> DeviceRequest;

    /// Append request carrying `chunk`. Chunks are requested in order.
    fn append_request(&mut self, chunk: Chunk) -> Result<DeviceRequest, CommandError>;

    fn close_request(&self) -> DeviceRequest;

    /// Destination to delete if the transfer fails part way.
    fn cleanup_path(&self) -> Option<String> {
        None
    }
}

/// Run every phase of `plan` against the device.
#[instrument(level = "info", skip_all, fields(transfer = %plan.label(), bytes = plan.total_len()))]
pub fn run_transfer(
    ctx: &ExecContext<'_>,
    state: &Arc<CommandState>,
    plan: &mut dyn TransferPlan,
) -> Result<StatusCode, CommandError> {
    let result = run_phases(ctx, state, plan);

    if let Err(e) = &result {
        warn!(error = %e, "Transfer aborted");
        if let Some(path) = plan.cleanup_path() {
            cleanup(ctx, state, &path);
        }
    }
    result
}

fn run_phases(
    ctx: &ExecContext<'_>,
    state: &Arc<CommandState>,
    plan: &mut dyn TransferPlan,
) -> Result<StatusCode, CommandError> {
    let total = plan.total_len();
    let label = plan.label();

    let status = ctx.link.transact(
        state,
        Phase::Open,
        &plan.open_request(),
        ctx.config.open_timeout(),
    )?;
    accept(status, Phase::Open, &[])?;

    let chunks = ChunkPlan::new(total, ctx.config.chunk_size);
    let mut progress = ProgressTracker::new(total);
    debug!(chunks = chunks.count(), "Transfer opened");

    for chunk in chunks.iter() {
        let request = plan.append_request(chunk)?;
        let status = ctx
            .link
            .transact(state, Phase::Append, &request, ctx.config.ack_timeout())?;
        accept(status, Phase::Append, &[])?;

        if let Some(percent) = progress.record(chunk.len as u64) {
            ctx.observer.on_event(&CommandEvent::Progress {
                operation: label.clone(),
                percent,
            });
        }
    }

    let status = ctx.link.transact(
        state,
        Phase::Close,
        &plan.close_request(),
        ctx.config.ack_timeout(),
    )?;
    accept(status, Phase::Close, &[])?;

    info!(bytes = progress.sent(), "Transfer complete");
    Ok(status)
}

/// Delete a partially written destination. Failures are only logged.
fn cleanup(ctx: &ExecContext<'_>, state: &Arc<CommandState>, path: &str) {
    ctx.link.unregister(state);

    let delete = Arc::new(CommandState::new(TOKEN_DELETE));
    let _registration = ctx.link.register(&delete);
    let request = DeviceRequest::Delete {
        path: path.to_string(),
    };
    match ctx
        .link
        .transact(&delete, Phase::Request, &request, ctx.config.ack_timeout())
    {
        Ok(status) => debug!(path, %status, "Cleanup delete answered"),
        Err(e) => debug!(path, error = %e, "Cleanup delete failed"),
    }
}
