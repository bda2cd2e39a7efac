use std::ops::ControlFlow;

use crate::commands::{CommandContext, COMMANDS};
use crate::events::{emit, SessionEvent};
use crate::session::SessionOutcome;

pub async fn run(ctx: &mut CommandContext<'_>) -> ControlFlow<SessionOutcome> {
    emit(&ctx.session.events, SessionEvent::Help(COMMANDS));
    ControlFlow::Continue(())
}
