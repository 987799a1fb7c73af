//! Batched machine translation through the chat model.
//!
//! Inputs are split into batches that run concurrently; a failing batch only
//! loses its own entries.

use aidigest_providers::ChatClient;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::text::remove_markdown_code_block;

pub const DEFAULT_BATCH_SIZE: usize = 20;

const SYSTEM_PROMPT: &str = "You are a translation engine. Translate English text into Simplified Chinese. \
Reply with a JSON array of strings only, one translation per input, in input order.";

fn batch_prompt(batch: &[&str]) -> String {
    let input = serde_json::to_string(batch).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Translate each string of this JSON array to Simplified Chinese and answer with a JSON array \
of the same length:\n{input}"
    )
}

/// Parses the model reply into exactly `expected` strings.
fn parse_batch_reply(reply: &str, expected: usize) -> Option<Vec<String>> {
    let cleaned = remove_markdown_code_block(reply);
    let parsed: Vec<String> = serde_json::from_str(&cleaned).ok()?;
    (parsed.len() == expected).then_some(parsed)
}

/// Translates `texts`, returning one entry per input.
///
/// Blank inputs map to `Some("")` without a request. Entries of a batch that
/// fails, or whose reply does not have the right length, are `None`.
pub async fn translate_texts(
    client: &ChatClient,
    texts: &[String],
    batch_size: usize,
) -> Vec<Option<String>> {
    let mut results: Vec<Option<String>> = texts
        .iter()
        .map(|t| t.trim().is_empty().then(String::new))
        .collect();

    let pending: Vec<(usize, &str)> = texts
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.trim().is_empty())
        .map(|(i, t)| (i, t.as_str()))
        .collect();
    if pending.is_empty() {
        return results;
    }

    let batches: Vec<&[(usize, &str)]> = pending.chunks(batch_size.max(1)).collect();
    debug!(texts = pending.len(), batches = batches.len(), "Translating");

    let replies = join_all(batches.iter().map(|batch| async move {
        let inputs: Vec<&str> = batch.iter().map(|(_, t)| *t).collect();
        client
            .generate(&batch_prompt(&inputs), Some(SYSTEM_PROMPT))
            .await
    }))
    .await;

    for (batch, reply) in batches.iter().zip(replies) {
        let translated = match reply {
            Ok(reply) => parse_batch_reply(&reply, batch.len()),
            Err(err) => {
                warn!(error = %err, "Translation batch failed");
                continue;
            }
        };
        let Some(translated) = translated else {
            warn!(expected = batch.len(), "Translation reply was malformed or mismatched");
            continue;
        };
        for ((index, _), text) in batch.iter().zip(translated) {
            results[*index] = Some(text);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use aidigest_providers::{ChatConfig, Provider};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gemini_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}, "finishReason": "STOP"}]
        }))
    }

    fn client(server: &MockServer) -> ChatClient {
        ChatClient::new(ChatConfig::new(Provider::Gemini, server.uri(), "k", "m")).unwrap()
    }

    #[test]
    fn test_parse_batch_reply() {
        assert_eq!(
            parse_batch_reply("```json\n[\"一\", \"二\"]\n```", 2),
            Some(vec!["一".to_string(), "二".to_string()])
        );
        assert_eq!(parse_batch_reply("[\"一\"]", 2), None);
        assert_eq!(parse_batch_reply("sorry", 1), None);
    }

    #[tokio::test]
    async fn test_blank_inputs_are_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(gemini_reply("[]"))
            .expect(0)
            .mount(&server)
            .await;

        let texts = vec![String::new(), "  ".to_string()];
        let out = translate_texts(&client(&server), &texts, 5).await;
        assert_eq!(out, vec![Some(String::new()), Some(String::new())]);
    }

    /// Test: batches run independently; a mismatched batch yields `None` only
    /// for its own entries.
    #[tokio::test]
    async fn test_batches_fail_independently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("alpha"))
            .respond_with(gemini_reply("```json\n[\"甲\", \"乙\"]\n```"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("gamma"))
            .respond_with(gemini_reply("[\"only one\", \"too\", \"many\"]"))
            .mount(&server)
            .await;

        let texts = vec![
            "alpha".to_string(),
            "beta".to_string(),
            String::new(),
            "gamma".to_string(),
        ];
        let out = translate_texts(&client(&server), &texts, 2).await;
        assert_eq!(
            out,
            vec![
                Some("甲".to_string()),
                Some("乙".to_string()),
                Some(String::new()),
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_http_failure_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let out = translate_texts(&client(&server), &["hello".to_string()], 10).await;
        assert_eq!(out, vec![None]);
    }
}
