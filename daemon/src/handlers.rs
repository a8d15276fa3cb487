//! Message handlers for the daemon

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use restomod_core::{ConfiguratorSnapshot, ImageStyle, IpcMessage, IpcResponse, ResearchQuery, Subject};

use crate::controller::{ConfiguratorHandle, ControllerError};
use crate::DaemonState;

/// Handle an incoming IPC message
pub async fn handle_message(msg: IpcMessage, state: &Arc<DaemonState>) -> IpcResponse {
    match msg {
        IpcMessage::Ping => {
            debug!("Ping received");
            IpcResponse::Pong {
                uptime_secs: state.uptime_secs(),
                cached_entries: state.cache.len() as u64,
            }
        }

        IpcMessage::Shutdown => {
            info!("Shutdown requested via IPC");
            // Give the acknowledgement a moment to reach the client
            let state = Arc::clone(state);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                state.request_shutdown();
            });
            IpcResponse::Ok
        }

        IpcMessage::Select {
            session,
            subject,
            style,
        } => {
            let style = style.unwrap_or(state.config.images.default_style);
            info!("Session '{}': select {} ({})", session, subject, style.as_str());

            let handle = state.session(&session);
            snapshot_response(select_and_settle(&handle, subject, style).await)
        }

        IpcMessage::Regenerate { session } => {
            info!("Session '{}': regenerate", session);
            let Some(handle) = state.existing_session(&session) else {
                return IpcResponse::Error(format!("Unknown session '{}'", session));
            };

            snapshot_response(regenerate_and_settle(&handle).await)
        }

        IpcMessage::Status { session } => {
            debug!("Session '{}': status", session);
            let snapshot = state
                .existing_session(&session)
                .map(|handle| handle.snapshot())
                .unwrap_or_default();
            IpcResponse::Configurator(snapshot)
        }

        IpcMessage::Reset { session } => {
            debug!("Session '{}': reset", session);
            // Dropping the last handle stops the session actor
            match state.remove_session(&session) {
                Some(handle) => match handle.reset().await {
                    Ok(()) => IpcResponse::Ok,
                    Err(e) => IpcResponse::Error(e.to_string()),
                },
                None => IpcResponse::Ok,
            }
        }

        IpcMessage::Invalidate { subject } => match ResearchQuery::new(subject) {
            Ok(query) => {
                let removed = state.cache.invalidate(&query);
                info!("Invalidate {}: {}", query.cache_key(), if removed { "removed" } else { "not cached" });
                IpcResponse::Ok
            }
            Err(e) => IpcResponse::Error(e.to_string()),
        },

        IpcMessage::ClearCache => {
            info!("Clearing research cache ({} entries)", state.cache.len());
            state.cache.clear();
            IpcResponse::Ok
        }

        IpcMessage::FallbackImage { subject } => IpcResponse::Image {
            url: state.resolver.resolve(&subject),
        },
    }
}

async fn select_and_settle(
    handle: &ConfiguratorHandle,
    subject: Subject,
    style: ImageStyle,
) -> Result<ConfiguratorSnapshot, ControllerError> {
    let seq = handle.select(subject, style).await?;
    handle.resolved(seq).await
}

async fn regenerate_and_settle(
    handle: &ConfiguratorHandle,
) -> Result<ConfiguratorSnapshot, ControllerError> {
    match handle.regenerate().await? {
        Some(seq) => handle.resolved(seq).await,
        None => Err(ControllerError::Subject(restomod_core::Error::NoSubjectSelected)),
    }
}

fn snapshot_response(result: Result<ConfiguratorSnapshot, ControllerError>) -> IpcResponse {
    match result {
        Ok(snapshot) => IpcResponse::Configurator(snapshot),
        Err(e) => {
            warn!("Configurator request failed: {}", e);
            IpcResponse::Error(e.to_string())
        }
    }
}
