//! End-to-end turns against a fake completion endpoint.

use chat_core::session::FAILURE_DESCRIPTION;
use chat_core::{
    ChatSession, CompletionClient, CompletionSettings, CredentialStore, FileCredentialStore,
    MemoryCredentialStore, Notification, Speaker, Turn, CREDENTIAL_KEY,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> CompletionClient {
    CompletionClient::new(CompletionSettings {
        endpoint: format!("{}/chat/completions", server.uri()),
        ..CompletionSettings::default()
    })
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

#[tokio::test]
async fn hello_gets_an_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test123"))
        .respond_with(reply("Hi there!"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut session = ChatSession::new(Box::new(MemoryCredentialStore::with_entry(
        CREDENTIAL_KEY,
        "sk-test123",
    )));

    let notice = session.send(&client, "Hello").await.unwrap();

    assert_eq!(notice, None);
    assert_eq!(
        session.conversation().turns(),
        &[Turn::user("Hello"), Turn::assistant("Hi there!")]
    );
}

#[tokio::test]
async fn unauthorized_leaves_only_the_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut session = ChatSession::new(Box::new(MemoryCredentialStore::with_entry(
        CREDENTIAL_KEY,
        "sk-revoked",
    )));

    let notice = session.send(&client, "Hello").await.unwrap();

    assert_eq!(notice, Some(Notification::error(FAILURE_DESCRIPTION)));
    assert_eq!(session.conversation().turns(), &[Turn::user("Hello")]);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn many_rounds_alternate_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(reply("ok"))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut session = ChatSession::new(Box::new(MemoryCredentialStore::with_entry(
        CREDENTIAL_KEY,
        "sk-test123",
    )));

    for prompt in ["one", "two", "three", "four"] {
        session.send(&client, prompt).await.unwrap();
    }

    let turns = session.conversation().turns();
    assert_eq!(turns.len(), 8);
    let speakers: Vec<Speaker> = turns.iter().map(|t| t.speaker()).collect();
    assert_eq!(
        speakers,
        [Speaker::User, Speaker::Assistant].repeat(4)
    );
    let prompts: Vec<&str> = turns
        .iter()
        .filter(|t| !t.is_assistant())
        .map(|t| t.text())
        .collect();
    assert_eq!(prompts, vec!["one", "two", "three", "four"]);
}

#[tokio::test]
async fn credential_saved_to_disk_is_used_for_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer pplx-from-file"))
        .respond_with(reply("stored key works"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");

    let mut first = ChatSession::new(Box::new(FileCredentialStore::new(&path)));
    assert!(first.needs_credential());
    first.save_credential("pplx-from-file").unwrap();
    assert!(!first.needs_credential());

    // A new session (next launch) finds the key without asking
    let mut second = ChatSession::new(Box::new(FileCredentialStore::new(&path)));
    assert!(!second.needs_credential());
    assert_eq!(
        FileCredentialStore::new(&path).read(CREDENTIAL_KEY).unwrap().as_deref(),
        Some("pplx-from-file")
    );

    let client = client_for(&server);
    second.send(&client, "ping").await.unwrap();
    assert_eq!(
        second.conversation().turns().last(),
        Some(&Turn::assistant("stored key works"))
    );
}
