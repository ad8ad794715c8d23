//! Local store round trips through the on-disk backend

mod common;

use tempfile::TempDir;
use tutorchat::preferences::UserPreferences;
use tutorchat::session::{ChatSession, Difficulty, Message, SessionAction};
use tutorchat::storage::{PersistentStore, BOOKMARKS_KEY, SESSIONS_KEY};

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().expect("failed to create tempdir");
    let session = ChatSession::new(Some("chemistry".into()), Some(Difficulty::Intermediate));
    let question = Message::user("Why do acids taste sour?");

    {
        let state = common::open_local_state(&dir);
        state
            .sessions
            .dispatch(SessionAction::Create(session.clone()))
            .unwrap();
        state
            .sessions
            .dispatch(SessionAction::AppendMessage {
                session_id: session.id.clone(),
                message: question.clone(),
            })
            .unwrap();
        state
            .sessions
            .dispatch(SessionAction::ToggleBookmark {
                session_id: session.id.clone(),
                message_id: question.id.clone(),
            })
            .unwrap();
        state
            .preferences
            .update(|prefs| prefs.set_field("autoSpeak", "on"))
            .unwrap();
        state.progress.record_session_created();
    }

    let state = common::open_local_state(&dir);
    let reopened = state.sessions.session(&session.id).unwrap();
    assert_eq!(reopened.title, "Why do acids taste sour?");
    assert_eq!(reopened.difficulty, Some(Difficulty::Intermediate));
    assert!(reopened.messages[0].is_bookmarked);

    let bookmarks = state.sessions.bookmarks();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].message.id, question.id);

    assert!(state.preferences.get().auto_speak);
    assert_eq!(state.progress.stats().total_sessions, 1);
}

#[test]
fn test_bookmarks_key_is_written_alongside_sessions() {
    let dir = TempDir::new().expect("failed to create tempdir");
    let config = common::storage_config(&dir);
    let session = ChatSession::new(None, None);
    let reply = Message::assistant("Acids donate protons.");

    {
        let state = common::open_local_state(&dir);
        state
            .sessions
            .dispatch(SessionAction::Create(session.clone()))
            .unwrap();
        state
            .sessions
            .dispatch(SessionAction::AppendMessage {
                session_id: session.id.clone(),
                message: reply.clone(),
            })
            .unwrap();
        state
            .sessions
            .dispatch(SessionAction::ToggleBookmark {
                session_id: session.id.clone(),
                message_id: reply.id.clone(),
            })
            .unwrap();
    }

    let store = PersistentStore::open(&config).unwrap();
    let sessions = store.read_value(SESSIONS_KEY).unwrap();
    assert_eq!(sessions[0]["messages"][0]["isBookmarked"], true);
    let bookmarks = store.read_value(BOOKMARKS_KEY).unwrap();
    assert_eq!(bookmarks[0]["sessionId"], session.id.as_str());
}

#[test]
fn test_malformed_sessions_load_as_empty() {
    let dir = TempDir::new().expect("failed to create tempdir");
    let config = common::storage_config(&dir);

    {
        let store = PersistentStore::open(&config).unwrap();
        assert!(store.write(SESSIONS_KEY, "not a session list").is_success());
    }

    let state = common::open_local_state(&dir);
    assert!(state.sessions.is_empty());
    assert_eq!(state.preferences.get(), UserPreferences::default());
}
