use crate::config::{AI_KEY_ENV, Config};
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const STUDY_BUDDY_TEMPERATURE: f64 = 0.2;
const MAX_QUESTION_CHARS: usize = 2000;

const STUDY_BUDDY_PROMPT: &str = "You are a friendly study buddy for a secondary school student. \
Explain concepts step by step in plain language, check understanding with a short follow-up question, \
and never just hand over homework answers without the reasoning.";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Asks the configured chat-completion endpoint to answer a study question.
pub fn answer_question(config: &Config, question: &str) -> Result<String> {
    if !config.ai_enabled {
        bail!("Study buddy is disabled. Run `mindtrack config set ai.enabled true`.");
    }

    let api_key = config
        .resolved_ai_key()
        .with_context(|| format!("AI API key is missing. Set `ai.api_key` or `{AI_KEY_ENV}`."))?;

    let question = question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }
    let question = question.chars().take(MAX_QUESTION_CHARS).collect::<String>();

    chat_completion(config, &api_key, STUDY_BUDDY_PROMPT, &question)
}

pub fn test_connection(config: &Config) -> Result<String> {
    let api_key = config.resolved_ai_key().with_context(|| {
        format!("AI API key is missing. Set `mindtrack config set ai.api_key <KEY>` or `{AI_KEY_ENV}`.")
    })?;

    chat_completion(
        config,
        &api_key,
        "Reply with exactly one short sentence confirming the API connection works.",
        "Health check for MindTrack.",
    )
}

pub fn has_api_key(config: &Config) -> bool {
    config.resolved_ai_key().is_some()
}

fn chat_completion(config: &Config, api_key: &str, system: &str, user: &str) -> Result<String> {
    let base_url = config.ai_api_base_url.clone();
    let model = config.ai_model.clone();
    let timeout_seconds = config.ai_timeout_seconds.max(5);
    let api_key = api_key.to_string();
    let system = system.to_string();
    let user = user.to_string();

    // reqwest's blocking client must not run on a tokio worker.
    std::thread::spawn(move || {
        chat_completion_blocking(&base_url, &model, timeout_seconds, &api_key, &system, &user)
    })
    .join()
    .map_err(|_| anyhow!("AI worker thread panicked"))?
}

fn chat_completion_blocking(
    base_url: &str,
    model: &str,
    timeout_seconds: u64,
    api_key: &str,
    system: &str,
    user: &str,
) -> Result<String> {
    if api_key.trim().is_empty() {
        bail!("AI API key is empty");
    }

    let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("Failed to build Authorization header")?,
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()
        .context("Failed to create AI HTTP client")?;

    let request_body = json!({
        "model": model,
        "temperature": STUDY_BUDDY_TEMPERATURE,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ]
    });

    let response = client
        .post(endpoint)
        .json(&request_body)
        .send()
        .context("AI API request failed")?;

    let status = response.status();
    let body = response.text().context("Failed to read AI response body")?;

    if !status.is_success() {
        bail!("AI API error {}: {}", status, body);
    }

    parse_completion(&body)
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse AI response: {body}"))?;

    parsed
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("AI response did not include message.content"))
}
