//! Cancellation tokens for in-flight turns, keyed by session and message.
//!
//! Mirrors the lifecycle of provider requests: a token is registered when a
//! turn starts streaming and removed when the turn finishes, errors out, or
//! is cancelled.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct ControllerPool {
    controllers: HashMap<(String, String), CancellationToken>,
}

impl ControllerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, session_id: &str, message_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.controllers.insert(
            (session_id.to_string(), message_id.to_string()),
            token.clone(),
        );
        token
    }

    /// Cancel one turn and forget its token.
    pub fn stop(&mut self, session_id: &str, message_id: &str) {
        if let Some(token) = self
            .controllers
            .remove(&(session_id.to_string(), message_id.to_string()))
        {
            token.cancel();
        }
    }

    /// Cancel every in-flight turn for one session.
    pub fn stop_session(&mut self, session_id: &str) {
        self.controllers.retain(|(sid, _), token| {
            if sid == session_id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    pub fn stop_all(&mut self) {
        for token in self.controllers.values() {
            token.cancel();
        }
        self.controllers.clear();
    }

    /// Drop a token without cancelling, once its turn completed on its own.
    pub fn remove(&mut self, session_id: &str, message_id: &str) {
        self.controllers
            .remove(&(session_id.to_string(), message_id.to_string()));
    }

    pub fn has_pending(&self) -> bool {
        !self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_cancels_and_removes() {
        let mut pool = ControllerPool::new();
        let token = pool.add("s1", "m1");
        assert!(pool.has_pending());

        pool.stop("s1", "m1");
        assert!(token.is_cancelled());
        assert!(!pool.has_pending());
    }

    #[test]
    fn stop_session_only_touches_that_session() {
        let mut pool = ControllerPool::new();
        let t1 = pool.add("s1", "m1");
        let t2 = pool.add("s1", "m2");
        let t3 = pool.add("s2", "m3");

        pool.stop_session("s1");
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert!(!t3.is_cancelled());
        assert!(pool.has_pending());
    }

    #[test]
    fn remove_forgets_without_cancelling() {
        let mut pool = ControllerPool::new();
        let token = pool.add("s1", "m1");
        pool.remove("s1", "m1");
        assert!(!token.is_cancelled());
        assert!(!pool.has_pending());
    }

    #[test]
    fn stop_all_drains_the_pool() {
        let mut pool = ControllerPool::new();
        let t1 = pool.add("s1", "m1");
        let t2 = pool.add("s2", "m2");
        pool.stop_all();
        assert!(t1.is_cancelled() && t2.is_cancelled());
        assert!(!pool.has_pending());
    }
}
