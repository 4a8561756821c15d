//! Session keys and flash messages.
//!
//! Session state lives in a process-held [`MemoryStore`] keyed by a cookie
//! that expires with the browser session. Logout removes a session's
//! record; a session abandoned without logging out stays in memory until
//! the process restarts, since `MemoryStore` never evicts.

use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, Session, SessionManagerLayer};

/// Key for storing the logged-in user's id.
pub const SESSION_USER_ID_KEY: &str = "user_id";
/// Key for messages queued for the next rendered page.
const FLASHES_KEY: &str = "_flashes";

pub type SessionResult<T> = Result<T, tower_sessions::session::Error>;

pub fn layer() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name("docqa_session")
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnSessionEnd)
}

pub async fn current_user(session: &Session) -> SessionResult<Option<i64>> {
    session.get::<i64>(SESSION_USER_ID_KEY).await
}

/// Binds the session to a user. The id is cycled so a pre-login cookie
/// cannot be reused after authentication.
pub async fn log_in(session: &Session, user_id: i64) -> SessionResult<()> {
    session.cycle_id().await?;
    session.insert(SESSION_USER_ID_KEY, user_id).await
}

pub async fn log_out(session: &Session) -> SessionResult<()> {
    session.flush().await
}

pub async fn flash(session: &Session, message: impl Into<String>) -> SessionResult<()> {
    let mut pending = session
        .get::<Vec<String>>(FLASHES_KEY)
        .await?
        .unwrap_or_default();
    pending.push(message.into());
    session.insert(FLASHES_KEY, pending).await
}

/// Drains queued flash messages; each message is shown once.
pub async fn take_flashes(session: &Session) -> SessionResult<Vec<String>> {
    Ok(session
        .remove::<Vec<String>>(FLASHES_KEY)
        .await?
        .unwrap_or_default())
}
