use crate::core::store::SessionStore;

/// Print the session list, current session marked.
pub fn list_sessions(store: &SessionStore) {
    let current = store.current_session_index();
    for (index, session) in store.sessions().iter().enumerate() {
        let marker = if index == current { "*" } else { " " };
        println!(
            "{marker} [{index}] {}  ({} messages, updated {})",
            session.topic,
            session.messages.len(),
            session.last_update.format("%Y-%m-%d %H:%M"),
        );
    }
}
