use std::time::Duration;

use wamp_session::peer::{
    Session,
    SessionState,
};

/// Waits for the session to reach the given state, panicking after a few seconds.
pub async fn wait_for_state(session: &Session, state: SessionState) {
    for _ in 0..300 {
        if session.state().await == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "session did not reach {state:?}, currently {:?}",
        session.state().await
    );
}
