use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tutorchat::api::{ChatRequest, ChatTurn};
use tutorchat::commands::LocalState;
use tutorchat::config::StorageConfig;
use tutorchat::session::Role;

#[allow(dead_code)]
pub fn storage_config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        path: Some(dir.path().join("store")),
        ..StorageConfig::default()
    }
}

#[allow(dead_code)]
pub fn open_local_state(dir: &TempDir) -> LocalState {
    LocalState::open(&storage_config(dir)).expect("failed to open local store")
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn chat_request(question: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatTurn {
            role: Role::User,
            content: question.to_string(),
        }],
        subject: Some("math".to_string()),
        difficulty: None,
    }
}
