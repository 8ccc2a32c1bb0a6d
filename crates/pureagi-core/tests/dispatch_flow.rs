use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pureagi_core::{
    AgentOptions, Attachment, ChatError, ChatOutcome, ChatRequest, ChatResponse, DispatchAgent,
    GenerateError, InteractionLogger, ResponseGenerator, UploadDir, UploadedFile,
};
use tokio::sync::Mutex;

/// Records what the worker handed to the model; fails when the text says so.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, Vec<Attachment>)>>,
}

#[async_trait::async_trait]
impl ResponseGenerator for Recorder {
    async fn generate(
        &self,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String, GenerateError> {
        self.seen
            .lock()
            .await
            .push((text.to_string(), attachments.to_vec()));
        if text.starts_with("fail") {
            return Err(GenerateError::Remote {
                status: 503,
                message: "model overloaded".into(),
            });
        }
        Ok(format!("reply to {text}"))
    }
}

fn build(dir: &Path, gen: Arc<Recorder>) -> DispatchAgent {
    DispatchAgent::spawn(
        gen,
        InteractionLogger::open(dir.join("chat_memory.csv")).expect("open log"),
        UploadDir::new(dir.join("uploads")).expect("upload dir"),
        AgentOptions {
            poll_interval: Duration::from_millis(25),
            queue_capacity: 16,
        },
    )
}

fn csv_rows(path: &Path) -> Vec<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("open csv")
        .records()
        .map(|r| r.expect("csv row"))
        .collect()
}

fn upload_dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("uploads"))
        .expect("read uploads")
        .count()
}

#[tokio::test]
async fn uploads_are_sent_in_order_then_removed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gen = Arc::new(Recorder::default());
    let agent = build(temp.path(), gen.clone());

    let reply = agent
        .process(
            "what is this?",
            vec![
                UploadedFile::new("a.jpg", b"first".to_vec()),
                UploadedFile::new("b.png", b"second".to_vec()),
            ],
        )
        .await
        .expect("reply");
    assert_eq!(reply, "reply to what is this?");
    assert_eq!(upload_dir_entries(temp.path()), 0);

    let seen = gen.seen.lock().await;
    let (text, attachments) = &seen[0];
    assert_eq!(text, "what is this?");
    assert_eq!(
        attachments,
        &vec![
            Attachment::new("image/jpeg", b"first".to_vec()),
            Attachment::new("image/png", b"second".to_vec()),
        ]
    );
    drop(seen);
    agent.shutdown().await;
}

#[tokio::test]
async fn uploads_are_removed_when_the_model_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let agent = build(temp.path(), Arc::new(Recorder::default()));

    let outcome = agent
        .process(
            "fail please",
            vec![
                UploadedFile::new("a.jpg", b"1".to_vec()),
                UploadedFile::new("b.jpg", b"2".to_vec()),
            ],
        )
        .await;
    let err = outcome.expect_err("model failure");
    assert!(matches!(
        err,
        ChatError::Generate(GenerateError::Remote { status: 503, .. })
    ));
    assert_eq!(
        ChatResponse::from(ChatOutcome::Err(err)).text,
        "Error generating response: model returned 503: model overloaded"
    );
    assert_eq!(upload_dir_entries(temp.path()), 0);
    agent.shutdown().await;
}

#[tokio::test]
async fn every_request_is_logged_once_with_joined_paths() {
    let temp = tempfile::tempdir().expect("tempdir");
    let agent = build(temp.path(), Arc::new(Recorder::default()));

    agent.submit(ChatRequest::new("plain")).await.expect("plain");
    agent
        .process(
            "with files",
            vec![
                UploadedFile::new("a.jpg", b"1".to_vec()),
                UploadedFile::new("b.jpg", b"2".to_vec()),
            ],
        )
        .await
        .expect("with files");
    let _ = agent.submit(ChatRequest::new("fail now")).await;
    agent.shutdown().await;

    let rows = csv_rows(&temp.path().join("chat_memory.csv"));
    assert_eq!(rows.len(), 4, "header plus three data rows");
    assert_eq!(
        rows[0].iter().collect::<Vec<_>>(),
        vec!["timestamp", "user_input", "bot_response", "files"]
    );

    assert_eq!(&rows[1][1], "plain");
    assert_eq!(&rows[1][2], "reply to plain");
    assert_eq!(&rows[1][3], "");

    assert_eq!(&rows[2][1], "with files");
    let files: Vec<&str> = rows[2][3].split(',').collect();
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("-a.jpg"));
    assert!(files[1].ends_with("-b.jpg"));

    assert_eq!(&rows[3][1], "fail now");
    assert!(rows[3][2].starts_with("Error generating response: "));
}

#[tokio::test]
async fn concurrent_callers_each_get_exactly_one_reply() {
    let temp = tempfile::tempdir().expect("tempdir");
    let agent = build(temp.path(), Arc::new(Recorder::default()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            (i, agent.submit(ChatRequest::new(format!("msg-{i}"))).await)
        }));
    }
    let mut replies = Vec::new();
    for handle in handles {
        let (i, outcome) = handle.await.expect("join");
        let reply = outcome.expect("reply");
        assert_eq!(reply, format!("reply to msg-{i}"));
        replies.push(reply);
    }
    replies.sort();
    replies.dedup();
    assert_eq!(replies.len(), 8);
    assert_eq!(agent.processed(), 8);
    agent.shutdown().await;
}

#[tokio::test]
async fn save_failure_short_circuits_before_the_model() {
    let temp = tempfile::tempdir().expect("tempdir");
    let gen = Arc::new(Recorder::default());
    let agent = build(temp.path(), gen.clone());
    std::fs::remove_dir_all(temp.path().join("uploads")).expect("remove uploads");

    let err = agent
        .process("hi", vec![UploadedFile::new("a.jpg", b"1".to_vec())])
        .await
        .expect_err("save should fail");
    assert!(matches!(err, ChatError::Upload(_)));
    assert!(err.to_string().starts_with("Error saving file: "));
    assert!(gen.seen.lock().await.is_empty());
    agent.shutdown().await;
}
