//! SessionStore - actor owning every conversation log
//!
//! One task owns the session map; callers hold a cloneable handle and talk
//! to it over a channel, so message appends for a session are serialised.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{SessionCommand, SessionError, SessionResponse};
use crate::domain::{ConversationContext, ConversationMessage, UserRole};

/// Handle to send commands to the SessionStore
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionStore {
    /// Spawn a new SessionStore actor
    pub fn spawn() -> Self {
        debug!("SessionStore::spawn: called");
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(rx));
        info!("SessionStore spawned");
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)
    }

    /// Return the session, creating it on first use
    pub async fn get_or_create(
        &self,
        session_id: &str,
        role: UserRole,
        current_page: Option<String>,
    ) -> SessionResponse<ConversationContext> {
        debug!(%session_id, %role, "SessionStore::get_or_create: called");
        self.request(|reply| SessionCommand::GetOrCreate {
            session_id: session_id.to_string(),
            role,
            current_page,
            reply,
        })
        .await
    }

    pub async fn get(&self, session_id: &str) -> SessionResponse<Option<ConversationContext>> {
        debug!(%session_id, "SessionStore::get: called");
        self.request(|reply| SessionCommand::Get {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    /// Get a session, treating absence as an error
    pub async fn get_required(&self, session_id: &str) -> SessionResponse<ConversationContext> {
        self.get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn append_message(&self, session_id: &str, message: ConversationMessage) -> SessionResponse<()> {
        debug!(%session_id, role = ?message.role, "SessionStore::append_message: called");
        self.request(|reply| SessionCommand::AppendMessage {
            session_id: session_id.to_string(),
            message,
            reply,
        })
        .await?
    }

    pub async fn record_command(&self, session_id: &str, command: &str, limit: usize) -> SessionResponse<()> {
        debug!(%session_id, %command, "SessionStore::record_command: called");
        self.request(|reply| SessionCommand::RecordCommand {
            session_id: session_id.to_string(),
            command: command.to_string(),
            limit,
            reply,
        })
        .await?
    }

    pub async fn set_pending_plan(&self, session_id: &str, plan_id: Option<String>) -> SessionResponse<()> {
        debug!(%session_id, ?plan_id, "SessionStore::set_pending_plan: called");
        self.request(|reply| SessionCommand::SetPendingPlan {
            session_id: session_id.to_string(),
            plan_id,
            reply,
        })
        .await?
    }

    /// Drop a session; returns whether it existed
    pub async fn end(&self, session_id: &str) -> SessionResponse<bool> {
        debug!(%session_id, "SessionStore::end: called");
        self.request(|reply| SessionCommand::End {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    /// IDs of all live sessions, sorted
    pub async fn list(&self) -> SessionResponse<Vec<String>> {
        debug!("SessionStore::list: called");
        self.request(|reply| SessionCommand::List { reply }).await
    }

    /// Shutdown the SessionStore
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        debug!("SessionStore::shutdown: called");
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::ChannelError)
    }
}

fn with_session(
    sessions: &mut HashMap<String, ConversationContext>,
    session_id: &str,
    f: impl FnOnce(&mut ConversationContext),
) -> SessionResponse<()> {
    let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
    f(session);
    Ok(())
}

async fn actor_loop(mut rx: mpsc::Receiver<SessionCommand>) {
    debug!("SessionStore actor started");
    let mut sessions: HashMap<String, ConversationContext> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::GetOrCreate {
                session_id,
                role,
                current_page,
                reply,
            } => {
                debug!(%session_id, "actor_loop: GetOrCreate command");
                let session = sessions.entry(session_id.clone()).or_insert_with(|| {
                    info!("Started conversation {}", session_id);
                    ConversationContext::new(session_id.clone(), role, current_page)
                });
                let _ = reply.send(session.clone());
            }

            SessionCommand::Get { session_id, reply } => {
                debug!(%session_id, "actor_loop: Get command");
                let _ = reply.send(sessions.get(&session_id).cloned());
            }

            SessionCommand::AppendMessage {
                session_id,
                message,
                reply,
            } => {
                debug!(%session_id, "actor_loop: AppendMessage command");
                let result = with_session(&mut sessions, &session_id, |s| s.push_message(message));
                let _ = reply.send(result);
            }

            SessionCommand::RecordCommand {
                session_id,
                command,
                limit,
                reply,
            } => {
                debug!(%session_id, "actor_loop: RecordCommand command");
                let result = with_session(&mut sessions, &session_id, |s| s.record_command(command, limit));
                let _ = reply.send(result);
            }

            SessionCommand::SetPendingPlan {
                session_id,
                plan_id,
                reply,
            } => {
                debug!(%session_id, ?plan_id, "actor_loop: SetPendingPlan command");
                let result = with_session(&mut sessions, &session_id, |s| {
                    s.pending_plan_id = plan_id;
                    s.updated_at = chrono::Utc::now();
                });
                let _ = reply.send(result);
            }

            SessionCommand::End { session_id, reply } => {
                debug!(%session_id, "actor_loop: End command");
                let existed = sessions.remove(&session_id).is_some();
                if existed {
                    info!("Ended conversation {}", session_id);
                }
                let _ = reply.send(existed);
            }

            SessionCommand::List { reply } => {
                let mut ids: Vec<String> = sessions.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }

            SessionCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("SessionStore shutting down");
                break;
            }
        }
    }

    debug!("SessionStore actor stopped");
}
