//! `agent.process_card` pipeline — the 5-step agent dispatch that drives a
//! role-specific coding agent against a kanban card.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use cp_core::broker::payload::AgentProcessCardPayload;
use uuid::Uuid;

use super::PipelineRunner;
use crate::driver::OutputCallback;
use crate::error::{OrchestratorError, Result};
use crate::roles::{agent_for_column, profile_for};

const TOTAL_STEPS: u32 = 5;
const COMMENT_TRUNCATE_LEN: usize = 2000;

fn materialize_prompt(payload: &AgentProcessCardPayload, role: &str) -> String {
    let description = payload.card_description.as_deref().unwrap_or("(no description)");
    format!(
        "You are acting as the '{role}' agent for card \"{title}\".\n\nColumn: {column}\nDescription:\n{description}\n",
        role = role,
        title = payload.card_title,
        column = payload.column_name,
    )
}

pub async fn process_card(runner: &PipelineRunner, task_id: Uuid, payload: AgentProcessCardPayload) -> Result<()> {
    let deps = runner.deps();

    // 1. materialize prompt from card + personality template
    runner.report(task_id, 1, TOTAL_STEPS, "resolving agent role for column").await;
    let role = agent_for_column(&payload.column_name)
        .ok_or_else(|| OrchestratorError::step_failed("resolve_role", format!("no agent role for column '{}'", payload.column_name)))?;
    let profile = profile_for(role);
    let prompt = materialize_prompt(&payload, role.as_str());

    // 2. post "starting" comment
    runner.report(task_id, 2, TOTAL_STEPS, "posting starting comment").await;
    post_comment(
        &payload.webhook_callback_url,
        &payload.card_id,
        &format!("{} agent starting work on this card.", role.as_str()),
    )
    .await?;

    // 3. spawn driver with role timeout/tool-allowlist/streamed stdout callback
    runner.report(task_id, 3, TOTAL_STEPS, "running agent").await;
    let transcript: Arc<StdMutex<String>> = Arc::new(StdMutex::new(String::new()));
    let transcript_for_callback = transcript.clone();
    let on_output: OutputCallback = Box::new(move |line: &str| {
        if let Ok(mut buf) = transcript_for_callback.lock() {
            buf.push_str(line);
            buf.push('\n');
        }
    });

    let workdir = deps.tenants_root.join("agent-work").join(&payload.card_id);
    tokio::fs::create_dir_all(&workdir)
        .await
        .map_err(|e| OrchestratorError::step_failed("run_agent", e.to_string()))?;

    let outcome = deps
        .agent_driver
        .run(&prompt, &workdir, role, &on_output, profile.timeout)
        .await;

    // 4. post result comment (truncated) and move the card
    runner.report(task_id, 4, TOTAL_STEPS, "posting result comment").await;
    let transcript_text = transcript.lock().map(|t| t.clone()).unwrap_or_default();
    let result_comment = match &outcome {
        Ok(run) => format!("{} finished: {}\n\n{}", role.as_str(), run.exit_summary, transcript_text),
        Err(err) => format!("{} failed: {err}\n\n{}", role.as_str(), transcript_text),
    };
    let truncated = truncate_comment(&result_comment);
    post_comment(&payload.webhook_callback_url, &payload.card_id, &truncated).await?;

    runner.report(task_id, 5, TOTAL_STEPS, "finalizing card move").await;
    outcome.map(|_| ())
}

fn truncate_comment(comment: &str) -> String {
    if comment.len() <= COMMENT_TRUNCATE_LEN {
        comment.to_string()
    } else {
        let mut truncated: String = comment.chars().take(COMMENT_TRUNCATE_LEN).collect();
        truncated.push_str("\n... (truncated)");
        truncated
    }
}

async fn post_comment(callback_url: &str, card_id: &str, body: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .post(callback_url)
        .json(&serde_json::json!({ "cardId": card_id, "comment": body }))
        .send()
        .await
        .map_err(OrchestratorError::from)?;

    if !response.status().is_success() {
        return Err(OrchestratorError::step_failed(
            "post_comment",
            format!("webhook callback returned {}", response.status()),
        ));
    }
    Ok(())
}
