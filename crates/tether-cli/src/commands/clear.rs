//! `/clear`: delete the stored conversation with the current peer.

use std::ops::ControlFlow;

use tracing::info;

use crate::commands::CommandContext;
use crate::events::{emit, SessionEvent};
use crate::session::{with_store, SessionOutcome};

pub async fn run(ctx: &mut CommandContext<'_>) -> ControlFlow<SessionOutcome> {
    let session = ctx.session;
    let peer = session.peer.name().to_string();

    if !ctx
        .confirm(&format!("Delete all chat history with {peer}?"))
        .await
    {
        emit(&session.events, SessionEvent::Info("Nothing deleted".to_string()));
        return ControlFlow::Continue(());
    }

    let local = session.local.name();
    match with_store(&session.store, |db| db.clear_history(local, &peer)) {
        Ok(deleted) => {
            info!(peer = %peer, deleted, "History cleared");
            emit(
                &session.events,
                SessionEvent::Info(format!("Deleted {deleted} messages with {peer}")),
            );
        }
        Err(e) => emit(
            &session.events,
            SessionEvent::Error(format!("Could not clear history: {e}")),
        ),
    }
    ControlFlow::Continue(())
}
