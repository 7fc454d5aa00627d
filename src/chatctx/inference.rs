use crate::chatctx::config::InferenceConfig;
use crate::error::ChatCtxError;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use reqwest::blocking::Client;
use serde_json::Value;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(context|question)\}").expect("placeholder pattern"));

/// Context text plus the question asked about it.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub context: String,
    pub question: String,
}

pub trait Answerer {
    fn answer(&self, request: &AnswerRequest) -> Result<String>;

    fn label(&self) -> String;
}

pub struct GeminiAnswerer {
    pub api_key: String,
    pub model: String,
    pub template: String,
    pub timeout_secs: u64,
}

pub struct OpenAiCompatAnswerer {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub template: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAiCompatible,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAiCompatible => "openai-compatible",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash-lite",
            Provider::OpenAiCompatible => "gpt-4.1-mini",
        }
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn parse_provider_alias(raw: &str) -> Option<Provider> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some(Provider::Gemini),
        "openai" | "openai-compatible" | "compatible" | "deepseek" => {
            Some(Provider::OpenAiCompatible)
        }
        _ => None,
    }
}

fn parse_prefixed_model(raw: &str) -> (Option<Provider>, String) {
    let trimmed = raw.trim();
    if let Some((prefix, model)) = trimmed.split_once(':')
        && let Some(provider) = parse_provider_alias(prefix)
    {
        return (Some(provider), model.trim().to_string());
    }
    (None, trimmed.to_string())
}

fn infer_provider_from_model(model: &str) -> Option<Provider> {
    let lower = model.trim().to_ascii_lowercase();
    if lower.starts_with("gemini-") {
        return Some(Provider::Gemini);
    }
    if lower.starts_with("gpt-") || lower.starts_with("deepseek-") || lower.starts_with("o4") {
        return Some(Provider::OpenAiCompatible);
    }
    None
}

fn first_available_provider() -> Option<Provider> {
    if env_non_empty("GEMINI_API_KEY").is_some() {
        return Some(Provider::Gemini);
    }
    if env_non_empty("AI_API_KEY").is_some() || env_non_empty("OPENAI_API_KEY").is_some() {
        return Some(Provider::OpenAiCompatible);
    }
    None
}

fn resolve_api_key(provider: Provider) -> Option<String> {
    match provider {
        Provider::Gemini => env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("AI_API_KEY")),
        Provider::OpenAiCompatible => {
            env_non_empty("AI_API_KEY").or_else(|| env_non_empty("OPENAI_API_KEY"))
        }
    }
}

fn resolve_compatible_base_url(model: &str) -> String {
    if let Some(base) = env_non_empty("AI_BASE_URL") {
        return base;
    }
    if model.trim().to_ascii_lowercase().starts_with("deepseek-") {
        return "https://api.deepseek.com".to_string();
    }
    "https://api.openai.com".to_string()
}

/// Pick a provider from config, model prefix or whichever key is set.
pub fn resolve_answerer(cfg: &InferenceConfig) -> Result<Box<dyn Answerer>, ChatCtxError> {
    let configured_model = Some(cfg.model.clone())
        .filter(|m| !m.trim().is_empty())
        .or_else(|| env_non_empty("AI_MODEL"));

    let (prefixed, mut model) = configured_model
        .as_deref()
        .map(parse_prefixed_model)
        .unwrap_or((None, String::new()));

    let provider = Some(cfg.provider.as_str())
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .or_else(|| env_non_empty("AI_PROVIDER"))
        .and_then(|raw| parse_provider_alias(&raw))
        .or(prefixed)
        .or_else(|| infer_provider_from_model(&model))
        .or_else(first_available_provider)
        .ok_or_else(|| {
            ChatCtxError::InferenceUnavailable(
                "no provider configured; set GEMINI_API_KEY or AI_API_KEY".to_string(),
            )
        })?;

    if model.trim().is_empty() {
        model = provider.default_model().to_string();
    }
    let api_key = resolve_api_key(provider).ok_or_else(|| {
        ChatCtxError::InferenceUnavailable(format!("no API key for {}", provider.label()))
    })?;

    tracing::debug!(provider = provider.label(), model = %model, "resolved answerer");
    let answerer: Box<dyn Answerer> = match provider {
        Provider::Gemini => Box::new(GeminiAnswerer {
            api_key,
            model,
            template: cfg.prompt_template.clone(),
            timeout_secs: cfg.timeout_secs,
        }),
        Provider::OpenAiCompatible => Box::new(OpenAiCompatAnswerer {
            base_url: resolve_compatible_base_url(&model),
            api_key,
            model,
            template: cfg.prompt_template.clone(),
            timeout_secs: cfg.timeout_secs,
        }),
    };
    Ok(answerer)
}

/// Fill `{context}` and `{question}` in one pass, so neither value is
/// scanned for placeholders.
pub fn build_prompt(template: &str, request: &AnswerRequest) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "context" => request.context.trim_end().to_string(),
            _ => request.question.trim().to_string(),
        })
        .into_owned()
}

fn non_blank(text: Option<String>, provider: &str) -> Result<String> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        _ => Err(ChatCtxError::InferenceUnavailable(format!(
            "{provider} returned an empty answer"
        ))
        .into()),
    }
}

fn client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let first = json.get("choices").and_then(Value::as_array)?.first()?;
    match first.get("message")?.get("content")? {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    }
}

impl Answerer for GeminiAnswerer {
    fn answer(&self, request: &AnswerRequest) -> Result<String> {
        let prompt = build_prompt(&self.template, request);
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let payload = serde_json::json!({
            "contents": [
                {
                    "parts": [
                        {"text": prompt}
                    ]
                }
            ]
        });

        let response = client(self.timeout_secs)?
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|err| ChatCtxError::InferenceUnavailable(format!("gemini request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ChatCtxError::InferenceUnavailable(format!(
                "gemini call failed with status {}",
                response.status()
            ))
            .into());
        }
        let json: Value = response.json().context("gemini response was not JSON")?;
        non_blank(extract_gemini_text(&json), "gemini")
    }

    fn label(&self) -> String {
        format!("gemini:{}", self.model)
    }
}

impl Answerer for OpenAiCompatAnswerer {
    fn answer(&self, request: &AnswerRequest) -> Result<String> {
        let prompt = build_prompt(&self.template, request);
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/v1/chat/completions");
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2
        });

        let response = client(self.timeout_secs)?
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| {
                ChatCtxError::InferenceUnavailable(format!("openai-compatible request failed: {err}"))
            })?;
        if !response.status().is_success() {
            return Err(ChatCtxError::InferenceUnavailable(format!(
                "openai-compatible call failed with status {}",
                response.status()
            ))
            .into());
        }
        let json: Value = response
            .json()
            .context("openai-compatible response was not JSON")?;
        non_blank(extract_openai_compatible_text(&json), "openai-compatible")
    }

    fn label(&self) -> String {
        format!("openai-compatible:{}", self.model)
    }
}

/// Answer each context in order. One context yields the bare answer; several
/// are joined under `[part i/n]` headers.
pub fn answer_parts(answerer: &dyn Answerer, contexts: &[String], question: &str) -> Result<String> {
    let total = contexts.len();
    let mut answers = Vec::with_capacity(total);
    for (idx, context) in contexts.iter().enumerate() {
        let request = AnswerRequest {
            context: context.clone(),
            question: question.to_string(),
        };
        let answer = answerer
            .answer(&request)
            .with_context(|| format!("part {}/{total} failed", idx + 1))?;
        answers.push(answer);
    }
    if total == 1 {
        return Ok(answers.remove(0));
    }
    Ok(answers
        .iter()
        .enumerate()
        .map(|(i, a)| format!("[part {}/{total}]\n{a}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, code_for};
    use serde_json::json;
    use std::cell::RefCell;

    struct Canned {
        replies: RefCell<Vec<String>>,
        seen: RefCell<Vec<String>>,
    }

    impl Answerer for Canned {
        fn answer(&self, request: &AnswerRequest) -> Result<String> {
            self.seen.borrow_mut().push(request.context.clone());
            let reply = self.replies.borrow_mut().remove(0);
            non_blank(Some(reply), "canned")
        }

        fn label(&self) -> String {
            "canned".into()
        }
    }

    fn canned(replies: &[&str]) -> Canned {
        Canned {
            replies: RefCell::new(replies.iter().map(|s| s.to_string()).collect()),
            seen: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn prompt_fills_both_placeholders() {
        let request = AnswerRequest {
            context: "Alice: hi\n".into(),
            question: " who spoke? ".into(),
        };
        let prompt = build_prompt("C={context}|Q={question}", &request);
        assert_eq!(prompt, "C=Alice: hi|Q=who spoke?");
    }

    #[test]
    fn placeholders_inside_values_are_left_alone() {
        let request = AnswerRequest {
            context: "Bob: see {question}".into(),
            question: "what does {context} mean?".into(),
        };
        let prompt = build_prompt("Q={question}\nC={context}", &request);
        assert_eq!(prompt, "Q=what does {context} mean?\nC=Bob: see {question}");
    }

    #[test]
    fn single_part_answer_is_bare() {
        let answerer = canned(&["Alice did."]);
        let out = answer_parts(&answerer, &["ctx".into()], "who?").unwrap();
        assert_eq!(out, "Alice did.");
    }

    #[test]
    fn multiple_parts_are_labelled_in_order() {
        let answerer = canned(&["first", "second"]);
        let out = answer_parts(&answerer, &["a".into(), "b".into()], "q").unwrap();
        assert_eq!(out, "[part 1/2]\nfirst\n\n[part 2/2]\nsecond");
        assert_eq!(*answerer.seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn blank_answer_is_inference_failure() {
        let answerer = canned(&["   "]);
        let err = answer_parts(&answerer, &["a".into()], "q").unwrap_err();
        assert_eq!(code_for(&err), Some(ErrorCode::E004InferenceUnavailable));
    }

    #[test]
    fn extracts_text_from_both_response_shapes() {
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "yes"}]}}]});
        assert_eq!(extract_gemini_text(&gemini).as_deref(), Some("yes"));

        let compat = json!({"choices": [{"message": {"content": "no"}}]});
        assert_eq!(extract_openai_compatible_text(&compat).as_deref(), Some("no"));
        assert_eq!(extract_openai_compatible_text(&json!({"choices": []})), None);
    }

    #[test]
    fn provider_prefixes_and_model_names_resolve() {
        assert_eq!(
            parse_prefixed_model("gemini:gemini-2.0-flash"),
            (Some(Provider::Gemini), "gemini-2.0-flash".to_string())
        );
        assert_eq!(
            infer_provider_from_model("deepseek-chat"),
            Some(Provider::OpenAiCompatible)
        );
        assert_eq!(infer_provider_from_model("llama3"), None);
    }
}
