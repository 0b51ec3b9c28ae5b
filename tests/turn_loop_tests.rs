use anyhow::Result;
use async_trait::async_trait;
use chatsh::api::mock_client::{MockModelService, MockReply};
use chatsh::runtime::{Frontend, PromptKind, TurnLoop, TurnPhase, RESET_NOTICE};
use chatsh::shell::ShellSession;
use chatsh::state::{system_preamble, Conversation};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Answers prompts from a queue and keeps a transcript of the screen.
#[derive(Default)]
struct TranscriptFrontend {
    answers: VecDeque<String>,
    input_prompts: usize,
    confirmations: Vec<String>,
    screen: String,
    notices: Vec<String>,
    said_goodbye: bool,
}

impl TranscriptFrontend {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Frontend for TranscriptFrontend {
    async fn read_line(&mut self, kind: PromptKind, prompt: &str) -> Result<Option<String>> {
        match kind {
            PromptKind::Input => self.input_prompts += 1,
            PromptKind::Confirmation => self.confirmations.push(prompt.to_string()),
        }
        Ok(self.answers.pop_front())
    }

    fn blank_line(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin_response(&mut self) -> Result<()> {
        Ok(())
    }

    fn render_fragment(&mut self, fragment: &str) -> Result<()> {
        self.screen.push_str(fragment);
        Ok(())
    }

    fn end_response(&mut self) -> Result<()> {
        self.screen.push('\n');
        Ok(())
    }

    fn mirror_shell_line(&mut self, line: &str) {
        self.screen.push_str(line);
    }

    fn end_shell_output(&mut self) -> Result<()> {
        Ok(())
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        self.notices.push(message.to_string());
        Ok(())
    }

    fn farewell(&mut self) -> Result<()> {
        self.said_goodbye = true;
        Ok(())
    }
}

type Harness = TurnLoop<MockModelService, TranscriptFrontend, ShellSession>;

async fn harness(dir: &Path, model: &MockModelService, answers: &[&str], budget: usize) -> Harness {
    let shell = ShellSession::spawn(Path::new("/bin/sh"), dir)
        .await
        .expect("spawn /bin/sh");
    TurnLoop::new(
        model.clone(),
        TranscriptFrontend::new(answers),
        shell,
        system_preamble("Linux"),
        budget,
    )
    .await
    .expect("turn loop")
}

#[tokio::test]
async fn test_confirmed_listing_feeds_next_turn() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(temp.path().join("a.txt"), "").expect("write a.txt");
    fs::create_dir(temp.path().join("b")).expect("mkdir b");

    let model = MockModelService::new(vec![
        MockReply::text(&["```sh\n", "ls -p\n", "```"]),
        MockReply::text(&["Yes, a.txt is a text file."]),
    ]);
    let mut turns = harness(
        temp.path(),
        &model,
        &["Show me local files.", "", "Is there any text file?"],
        6144,
    )
    .await;

    turns.run(CancellationToken::new()).await.expect("run");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].last().unwrap().content,
        "<SYSTEM>\na.txt\nb/\n\n</SYSTEM>\n<USER>\nIs there any text file?\n</USER>"
    );
    let frontend = turns.frontend();
    assert_eq!(
        frontend.confirmations,
        vec!["[Press enter to execute SH BLOCK 1, or 'n' to cancel] "]
    );
    assert!(frontend.screen.contains("a.txt\nb/\n"));
    assert!(frontend.said_goodbye);
}

#[tokio::test]
async fn test_cancelled_block_leaves_shell_untouched() {
    let temp = TempDir::new().expect("temp dir");
    let model = MockModelService::new(vec![
        MockReply::text(&["```sh\ntouch should-not-exist\n```"]),
        MockReply::text(&["Okay, I will not."]),
    ]);
    let mut turns = harness(temp.path(), &model, &["make a file", "n", "never mind"], 6144).await;

    turns.run(CancellationToken::new()).await.expect("run");

    assert!(!temp.path().join("should-not-exist").exists());
    let requests = model.requests();
    assert_eq!(
        requests[1].last().unwrap().content,
        "<USER>\nnever mind\n</USER>"
    );
}

#[tokio::test]
async fn test_end_of_input_at_confirmation_cancels_block() {
    let temp = TempDir::new().expect("temp dir");
    let model = MockModelService::new(vec![MockReply::text(&["```sh\ntouch nope\n```"])]);
    let mut turns = harness(temp.path(), &model, &["make a file"], 6144).await;

    turns.run(CancellationToken::new()).await.expect("run");

    assert!(!temp.path().join("nope").exists());
    assert!(turns.frontend().said_goodbye);
}

#[tokio::test]
async fn test_budget_exhaustion_starts_new_chat() {
    let temp = TempDir::new().expect("temp dir");
    let model = MockModelService::new(vec![
        MockReply::BudgetExceeded,
        MockReply::text(&["Hi again."]),
    ]);
    let preamble_cost = Conversation::start(&model, system_preamble("Linux"))
        .await
        .expect("preamble")
        .token_count();
    let mut turns = harness(temp.path(), &model, &["hello", "hello again"], 6144).await;

    turns.run(CancellationToken::new()).await.expect("run");

    assert_eq!(turns.frontend().notices, vec![RESET_NOTICE]);
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].len(), 2);
    assert_eq!(turns.conversation().len(), 3);
    assert!(turns.conversation().token_count() > preamble_cost);
}

#[tokio::test]
async fn test_interrupt_exits_without_model_or_shell_calls() {
    let temp = TempDir::new().expect("temp dir");
    let model = MockModelService::new(vec![MockReply::text(&["```sh\ntouch late\n```"])]);
    let mut turns = harness(temp.path(), &model, &["make a file", ""], 6144).await;
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    turns.run(shutdown).await.expect("run");

    assert_eq!(turns.phase(), TurnPhase::Exit);
    assert_eq!(turns.frontend().input_prompts, 0);
    assert!(model.requests().is_empty());
    assert!(!temp.path().join("late").exists());
    assert!(turns.frontend().said_goodbye);
}
