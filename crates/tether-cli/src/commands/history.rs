use std::ops::ControlFlow;

use crate::commands::CommandContext;
use crate::session::SessionOutcome;

pub async fn run(ctx: &mut CommandContext<'_>) -> ControlFlow<SessionOutcome> {
    ctx.session.show_history();
    ControlFlow::Continue(())
}
