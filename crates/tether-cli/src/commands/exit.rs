use std::ops::ControlFlow;

use crate::commands::CommandContext;
use crate::events::{emit, SessionEvent};
use crate::session::SessionOutcome;

pub async fn run(ctx: &mut CommandContext<'_>) -> ControlFlow<SessionOutcome> {
    emit(
        &ctx.session.events,
        SessionEvent::Info(format!("Leaving the chat with {}", ctx.session.peer.name())),
    );
    ControlFlow::Break(SessionOutcome::LocalExit)
}
