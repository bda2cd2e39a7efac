//! `/file [path]`: send one file after confirmation.

use std::ops::ControlFlow;
use std::path::PathBuf;

use tracing::warn;

use tether_net::send_file;
use tether_shared::types::format_size;
use tether_shared::ChatRecord;

use crate::commands::CommandContext;
use crate::events::{emit, SessionEvent};
use crate::session::SessionOutcome;

pub async fn run(ctx: &mut CommandContext<'_>, path: Option<String>) -> ControlFlow<SessionOutcome> {
    let session = ctx.session;

    let path = match path {
        Some(path) => path,
        None => match ctx.prompt("Path of the file to send: ").await {
            Some(path) if !path.is_empty() => path,
            _ => {
                emit(&session.events, SessionEvent::Info("File transfer cancelled".to_string()));
                return ControlFlow::Continue(());
            }
        },
    };
    let path = PathBuf::from(path);

    let described = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => format!(
            "{} ({})",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            format_size(meta.len())
        ),
        // send_file reports the precise problem
        _ => path.display().to_string(),
    };

    if !ctx
        .confirm(&format!("Send {described} to {}?", session.peer.name()))
        .await
    {
        emit(&session.events, SessionEvent::Info("File transfer cancelled".to_string()));
        return ControlFlow::Continue(());
    }

    let local = session.local.name();
    let peer = session.peer.name();

    match send_file(&session.transport, &path, local, peer).await {
        Ok(sent) => {
            session.record(&ChatRecord::file(
                local,
                peer,
                sent.name.clone(),
                sent.path.display().to_string(),
            ));
            emit(
                &session.events,
                SessionEvent::FileSent {
                    name: sent.name,
                    size: sent.size,
                },
            );
            ControlFlow::Continue(())
        }
        Err(e) if e.is_fatal() => {
            warn!(path = %path.display(), error = %e, "File send broke the connection");
            emit(&session.events, SessionEvent::Error(format!("File send failed: {e}")));
            ControlFlow::Break(SessionOutcome::Failed(e.to_string()))
        }
        Err(e) => {
            emit(&session.events, SessionEvent::Error(format!("File not sent: {e}")));
            ControlFlow::Continue(())
        }
    }
}
