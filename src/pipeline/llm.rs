//! Optional LLM rewrite assist.
//!
//! Single request/response contract against an OpenAI-compatible chat
//! completions endpoint. The assist only ever proposes a draft; the caller
//! re-validates it with the same anchor/ratio/ban rules as the rule-based
//! path and discards anything that fails. The pipeline is fully functional
//! with the provider set to `none`.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::collectors::cjk_ratio;
use crate::models::{LlmProvider, RawItem};
use crate::pipeline::rewriter::{rewrite_is_valid, ZhRewrite};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Draft shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct DraftPayload {
    q1: String,
    q2: String,
    #[serde(default)]
    q3: Option<String>,
    proof: String,
}

pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Build a client when a provider is configured; `None` for `none`.
    pub fn from_provider(provider: &LlmProvider) -> Result<Option<Self>> {
        match provider {
            LlmProvider::None => Ok(None),
            LlmProvider::OpenAiCompatible {
                base_url,
                api_key,
                model,
            } => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .user_agent("BriefBot/1.0 (rewrite assist)")
                    .build()
                    .context("failed to build LLM HTTP client")?;
                Ok(Some(Self {
                    http,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key: api_key.clone(),
                    model: model.clone(),
                }))
            }
        }
    }

    /// Ask the model to phrase Q1/Q2/Proof around the given anchors.
    ///
    /// Returns `None` on any transport error or when the draft fails
    /// validation; the caller then keeps the rule-based rendition.
    pub async fn assist_rewrite(
        &self,
        item: &RawItem,
        baseline: &ZhRewrite,
    ) -> Option<ZhRewrite> {
        let anchors = &baseline.anchors;
        let prompt = format!(
            "用简体中文改写以下新闻为两句摘要(q1,q2)和一行证据(proof)。\
             每句必须原样包含下列锚文本之一并用「」包裹，禁止省略号，禁止空话。\
             以JSON对象输出，键为q1,q2,proof。\n标题: {}\n锚文本: {}",
            item.title,
            anchors
                .iter()
                .take(3)
                .map(|a| format!("「{a}」"))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "你是新闻简报撰写助手，只输出JSON。"},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "LLM assist rejected, keeping rule-based text");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "LLM assist unreachable, keeping rule-based text");
                return None;
            }
        };

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "LLM assist returned malformed envelope");
                return None;
            }
        };
        let content = parsed.choices.first().map(|c| c.message.content.as_str())?;

        let draft: DraftPayload = match serde_json::from_str(strip_code_fence(content)) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "LLM draft was not valid JSON");
                return None;
            }
        };

        let combined = format!("{}{}{}", draft.q1, draft.q2, draft.proof);
        let candidate = ZhRewrite {
            q1: draft.q1,
            q2: draft.q2,
            q3: draft.q3,
            proof: draft.proof,
            anchors: anchors.clone(),
            zh_ratio: cjk_ratio(&combined),
            skeletonized: false,
        };

        if rewrite_is_valid(&candidate, &item.body)
            && candidate.zh_ratio >= baseline.zh_ratio.min(0.35)
        {
            Some(candidate)
        } else {
            debug!("LLM draft failed validation, keeping rule-based text");
            None
        }
    }
}

/// Models love to wrap JSON in markdown fences.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_none_yields_no_client() {
        assert!(LlmClient::from_provider(&LlmProvider::None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn draft_payload_accepts_missing_q3() {
        let draft: DraftPayload =
            serde_json::from_str(r#"{"q1":"一","q2":"二","proof":"证"}"#).unwrap();
        assert!(draft.q3.is_none());
    }
}
