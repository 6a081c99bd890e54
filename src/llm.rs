use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{AnswerChoice, McqQuestion};

const GEMINI_API: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Free-text completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
	async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
	contents: Vec<Content>,
	generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
	response_mime_type: &'static str,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Content {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	role: Option<String>,
	#[serde(default)]
	parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Part {
	#[serde(default)]
	text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
	#[serde(default)]
	candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
	content: Option<Content>,
}

/// Why a single API call failed, and whether trying again may help
struct CallFailure {
	transient: bool,
	message: String,
}

/// Gemini `generateContent` client. Built once at startup and shared.
pub struct GeminiClient {
	http: reqwest::Client,
	base_url: String,
	api_key: String,
	model: String,
	retries: u32,
	retry_delay: Duration,
}

impl GeminiClient {
	pub fn new(api_key: impl Into<String>, model: impl Into<String>, retries: u32, retry_delay: Duration) -> Self {
		Self {
			http: reqwest::Client::new(),
			base_url: GEMINI_API.to_string(),
			api_key: api_key.into(),
			model: model.into(),
			retries,
			retry_delay,
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}

	async fn generate(&self, prompt: &str) -> std::result::Result<String, CallFailure> {
		let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key);
		let request = GenerateRequest {
			contents: vec![Content {
				role: Some("user".to_string()),
				parts: vec![Part { text: prompt.to_string() }],
			}],
			generation_config: GenerationConfig { response_mime_type: "application/json" },
		};

		let response = self.http.post(&url).json(&request).send().await.map_err(|e| CallFailure {
			transient: true,
			message: format!("network error: {e}"),
		})?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(CallFailure {
				transient: status.as_u16() == 429 || status.is_server_error(),
				message: format!("HTTP {status}: {body}"),
			});
		}

		let parsed: GenerateResponse = response.json().await.map_err(|e| CallFailure {
			transient: false,
			message: format!("unparseable response: {e}"),
		})?;
		let text: String = parsed
			.candidates
			.into_iter()
			.next()
			.and_then(|c| c.content)
			.map(|c| c.parts.into_iter().map(|p| p.text).collect())
			.unwrap_or_default();
		if text.is_empty() {
			return Err(CallFailure {
				transient: false,
				message: "response has no text".to_string(),
			});
		}
		Ok(text)
	}
}

#[async_trait]
impl LanguageModel for GeminiClient {
	/// Transient failures (429, 5xx, network) are retried with a linearly growing delay
	async fn complete(&self, prompt: &str) -> Result<String> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.generate(prompt).await {
				Ok(text) => return Ok(text),
				Err(failure) if failure.transient && attempt <= self.retries => {
					warn!("Gemini call failed (attempt {}/{}): {}", attempt, self.retries + 1, failure.message);
					tokio::time::sleep(self.retry_delay * attempt).await;
				}
				Err(failure) => bail!("Gemini call failed: {}", failure.message),
			}
		}
	}
}

/// Shape the model is told to reply in
#[derive(Debug, Deserialize)]
struct ModelAnswer {
	answer_index: usize,
	reason: Option<String>,
}

pub fn build_prompt(context: &str, question: &McqQuestion) -> String {
	format!(
		r#"You are a course assistant answering multiple-choice questions based on the provided learning content.
Use the context below to answer each question.
Always return your response strictly in JSON format: {{"answer_index": <1-{n}>, "reason": "<brief reason>"}}

Context: {context}

Question: {question}

Options:
{options}

Best Answer (in JSON format):"#,
		n = question.option_count(),
		question = question.text,
		options = question.numbered_options(),
	)
}

/// Drop a surrounding markdown code fence, if any
pub fn strip_code_fence(text: &str) -> &str {
	let text = text.trim();
	let Some(inner) = text.strip_prefix("```") else {
		return text;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);
	inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_answer(raw: &str) -> Result<AnswerChoice> {
	let json_str = strip_code_fence(raw);
	let answer: ModelAnswer = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse model JSON response: {} - raw: '{}'", e, json_str))?;
	Ok(AnswerChoice::new(answer.answer_index, answer.reason))
}

/// Deterministic answers used when the model is unavailable or replies garbage.
///
/// Keyed by exact question text. Only there to keep runs reproducible; entries go stale when the
/// platform rewords a question.
#[derive(Clone, Debug)]
pub struct FallbackTable {
	answers: HashMap<String, usize>,
}

impl Default for FallbackTable {
	fn default() -> Self {
		Self::from_entries([
			("Choosing a separator type applies when you are importing which of the following file formats?", 1),
			(
				"Which of the following is the most appropriate import option if you want to merge new data with data that you already have on your spreadsheet?",
				2,
			),
			("Importing is the process of transferring data from Google Sheets into another file.", 2),
		])
	}
}

impl FallbackTable {
	pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
		Self {
			answers: entries.into_iter().map(|(q, i)| (q.trim().to_string(), i)).collect(),
		}
	}

	/// 1-based answer for `question`, 1 when unknown
	pub fn lookup(&self, question: &str) -> usize {
		self.answers.get(question.trim()).copied().unwrap_or(1)
	}
}

/// Picks an answer for a quiz question: the model first, the fallback table when that fails
pub struct QuizAnswerer {
	model: Arc<dyn LanguageModel>,
	fallback: FallbackTable,
}

impl QuizAnswerer {
	pub fn new(model: Arc<dyn LanguageModel>, fallback: FallbackTable) -> Self {
		Self { model, fallback }
	}

	/// Never fails: any API or parse error degrades to the fallback table
	pub async fn solve(&self, context: Option<&str>, question: &McqQuestion) -> AnswerChoice {
		let prompt = build_prompt(context.unwrap_or("(none)"), question);
		match self.ask(&prompt).await {
			Ok(choice) => {
				info!("Model picked option {} ({})", choice.index, choice.reason.as_deref().unwrap_or("no reason given"));
				choice
			}
			Err(e) => {
				let index = self.fallback.lookup(&question.text);
				warn!("Falling back to answer {} for '{}': {}", index, question.text, e);
				AnswerChoice::new(index, None)
			}
		}
	}

	async fn ask(&self, prompt: &str) -> Result<AnswerChoice> {
		let raw = self.model.complete(prompt).await?;
		debug!("Model raw response: {}", raw);
		parse_answer(&raw)
	}
}
