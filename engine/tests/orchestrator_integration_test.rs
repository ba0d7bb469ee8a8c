//! Integration tests for the conversation orchestrator
//!
//! Runs whole turns through the real tool registry, job manager and recorder
//! with a scripted provider and a mock structure registry.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use bindery_engine::agent::ConversationContext;
use bindery_engine::config::Config;
use bindery_engine::db::{Database, Recorder};
use bindery_engine::handlers::build_orchestrator;
use bindery_engine::llm::{
    CompletionRequest, CompletionResponse, ContentBlock, ConversationMessage, LLMProvider,
    MessageContent, Result as LLMResult, Role, StopReason, Usage,
};
use bindery_engine::message_bus::MessageBus;
use sdk::types::AgentEvent;

const PDB: &str = "\
ATOM      1  N   GLY A   1      11.104   6.134  -6.504  1.00  0.00           N
ATOM      2  CA  GLY A   1      11.639   6.071  -5.147  1.00  0.00           C
ATOM      3  N   ALA A   2      12.000   7.000  -4.000  1.00  0.00           N
END
";

/// Fetches a structure, then visualizes whatever file id came back, then answers
struct FetchThenShowProvider {
    requests: Mutex<Vec<Vec<ConversationMessage>>>,
}

fn last_tool_result(messages: &[ConversationMessage]) -> Option<Value> {
    let last = messages.last()?;
    match &last.content {
        MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
            ContentBlock::ToolResult { content, .. } => serde_json::from_str(content).ok(),
            _ => None,
        }),
        MessageContent::Text(_) => None,
    }
}

fn tool_use(id: &str, name: &str, input: Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![
            ContentBlock::text(format!("Calling {}.", name)),
            ContentBlock::ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input,
            },
        ],
        stop_reason: StopReason::ToolUse,
        usage: Usage {
            input_tokens: 100,
            output_tokens: 20,
        },
    }
}

#[async_trait]
impl LLMProvider for FetchThenShowProvider {
    fn name(&self) -> &str {
        "fetch-then-show"
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> LLMResult<CompletionResponse> {
        self.requests.lock().unwrap().push(request.messages.to_vec());
        let call_number = self.requests.lock().unwrap().len();

        let response = match call_number {
            1 => tool_use("t1", "fetch_structure", json!({"pdb_id": "1abc"})),
            2 => {
                let fetched = last_tool_result(request.messages).unwrap_or(Value::Null);
                let file_id = fetched["file_id"].as_str().unwrap_or("missing").to_string();
                tool_use(
                    "t2",
                    "visualize_structure",
                    json!({"file_ids": [file_id], "style": "stick"}),
                )
            }
            _ => CompletionResponse {
                content: vec![ContentBlock::text("Here is 1ABC.")],
                stop_reason: StopReason::EndTurn,
                usage: Usage {
                    input_tokens: 300,
                    output_tokens: 12,
                },
            },
        };
        Ok(response)
    }
}

async fn registry_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1ABC.pdb"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PDB))
        .mount(&server)
        .await;
    server
}

fn test_config(temp: &TempDir, registry_url: &str) -> Config {
    let mut config = Config::default();
    config.core.data_dir = temp.path().join("data");
    config.jobs.upload_dir = temp.path().join("uploads");
    config.jobs.output_dir = temp.path().join("outputs");
    config.registry.base_url = registry_url.to_string();
    config
}

async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_fetch_and_visualize_turn() {
    let temp = TempDir::new().unwrap();
    let server = registry_server().await;
    let config = test_config(&temp, &server.uri());

    let provider = Arc::new(FetchThenShowProvider {
        requests: Mutex::new(Vec::new()),
    });
    let bus = Arc::new(MessageBus::new());
    let (orchestrator, _jobs) = build_orchestrator(&config, provider.clone(), bus);

    let mut ctx = ConversationContext::new("conv-1");
    let (tx, rx) = mpsc::channel(64);
    let summary = orchestrator
        .run_turn(&mut ctx, "Fetch 1ABC and show me its chains as sticks", &tx)
        .await;
    drop(tx);
    let events = drain(rx).await;

    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "text",
            "tool_call",
            "tool_result",
            "text",
            "tool_call",
            "tool_result",
            "visualization",
            "text",
            "done"
        ]
    );

    match &events[6] {
        AgentEvent::Visualization {
            pdb_contents,
            style,
            color_by,
        } => {
            let files = pdb_contents.as_object().unwrap();
            assert_eq!(files.len(), 1);
            assert_eq!(files.values().next().unwrap(), &json!(PDB));
            assert_eq!(style, "stick");
            assert_eq!(color_by, "chain");
        }
        other => panic!("expected visualization, got {:?}", other),
    }

    assert_eq!(summary.iterations, 3);
    assert_eq!(
        summary.final_text,
        "Calling fetch_structure.\n\nCalling visualize_structure.\n\nHere is 1ABC."
    );
    assert_eq!(
        events.last(),
        Some(&AgentEvent::Done {
            model_used: "claude-sonnet-4-6".to_string(),
            iterations: 3
        })
    );

    // Every assistant tool-call message is followed by exactly one user message
    // carrying all of its results
    let roles: Vec<Role> = ctx.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
    for pair in ctx.messages.windows(2) {
        if pair[0].has_tool_calls() {
            match &pair[1].content {
                MessageContent::Blocks(blocks) => {
                    assert!(blocks
                        .iter()
                        .all(|b| matches!(b, ContentBlock::ToolResult { .. })));
                }
                other => panic!("expected tool results, got {:?}", other),
            }
        }
    }

    // The file was stored under the upload directory
    let uploads: Vec<_> = std::fs::read_dir(&config.jobs.upload_dir)
        .unwrap()
        .collect();
    assert_eq!(uploads.len(), 1);
}

#[tokio::test]
async fn test_turn_messages_are_recorded() {
    let temp = TempDir::new().unwrap();
    let server = registry_server().await;
    let config = test_config(&temp, &server.uri());

    let db = Database::new(&config.database_path()).await.unwrap();
    let bus = Arc::new(MessageBus::new());
    let recorder = Recorder::new(&db).spawn(&bus).await;

    let provider = Arc::new(FetchThenShowProvider {
        requests: Mutex::new(Vec::new()),
    });
    let (orchestrator, _jobs) = build_orchestrator(&config, provider, bus);

    let mut ctx = ConversationContext::new("conv-2");
    let (tx, rx) = mpsc::channel(64);
    orchestrator
        .run_turn(&mut ctx, "Fetch 1ABC and show me its chains as sticks", &tx)
        .await;
    drop(tx);
    drain(rx).await;

    recorder.shutdown().await;

    let stored = db.messages().conversation("conv-2").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, "user");
    assert_eq!(stored[1].role, "assistant");
    assert!(stored[1].content.ends_with("Here is 1ABC."));
    assert_eq!(stored[1].model_used.as_deref(), Some("claude-sonnet-4-6"));
    assert_eq!(stored[1].token_count, Some(312));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_pdb_is_reported_to_the_model() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let config = test_config(&temp, &server.uri());

    let provider = Arc::new(FetchThenShowProvider {
        requests: Mutex::new(Vec::new()),
    });
    let bus = Arc::new(MessageBus::new());
    let (orchestrator, _jobs) = build_orchestrator(&config, provider.clone(), bus);

    let mut ctx = ConversationContext::new("conv-3");
    let (tx, rx) = mpsc::channel(64);
    orchestrator
        .run_turn(&mut ctx, "Fetch 1ABC and show me its chains as sticks", &tx)
        .await;
    drop(tx);
    let events = drain(rx).await;

    match &events[2] {
        AgentEvent::ToolResult { name, result } => {
            assert_eq!(name, "fetch_structure");
            let value: Value = serde_json::from_str(result).unwrap();
            assert_eq!(value["error"], "PDB ID '1ABC' not found on RCSB.");
        }
        other => panic!("expected tool result, got {:?}", other),
    }

    // The second request saw the error as a tool result
    let requests = provider.requests.lock().unwrap();
    let error = last_tool_result(&requests[1]).unwrap();
    assert!(error.get("error").is_some());
}
