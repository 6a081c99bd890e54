//! Google Slides reader, authorized with an installed-app OAuth grant cached on disk.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use color_eyre::{Result, eyre::eyre};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};
use yup_oauth2::{
	InstalledFlowAuthenticator, InstalledFlowReturnMethod,
	authenticator::Authenticator,
	hyper::client::connect::HttpConnector,
	hyper_rustls::HttpsConnector,
};

pub const SLIDES_SCOPE: &str = "https://www.googleapis.com/auth/presentations.readonly";
const SLIDES_API: &str = "https://slides.googleapis.com/v1";

/// Presentation id out of an embed or edit URL (`.../presentation/d/<id>/...`)
pub fn presentation_id(url: &str) -> Option<String> {
	let re = Regex::new(r"presentation/d/([a-zA-Z0-9_-]+)").ok()?;
	re.captures(url).map(|c| c[1].to_string())
}

/// Hands out bearer tokens for the Slides API
#[async_trait]
pub trait TokenSource: Send + Sync {
	async fn token(&self) -> Result<String>;
}

/// OAuth grant for the read-only Slides scope.
///
/// Tokens are persisted to `token_cache` and refreshed when expired. Without a usable cached token
/// the first request opens the interactive browser grant.
pub struct GoogleOAuth {
	auth: Authenticator<HttpsConnector<HttpConnector>>,
}

impl GoogleOAuth {
	pub async fn new(credentials: &Path, token_cache: &Path) -> Result<Self> {
		let secret = yup_oauth2::read_application_secret(credentials)
			.await
			.map_err(|e| eyre!("Failed to read OAuth client secret {}: {}", credentials.display(), e))?;
		let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
			.persist_tokens_to_disk(token_cache)
			.build()
			.await
			.map_err(|e| eyre!("Failed to set up Google OAuth: {}", e))?;
		Ok(Self { auth })
	}
}

#[async_trait]
impl TokenSource for GoogleOAuth {
	async fn token(&self) -> Result<String> {
		let token = self.auth.token(&[SLIDES_SCOPE]).await.map_err(|e| eyre!("Failed to get Google access token: {}", e))?;
		token.token().map(str::to_owned).ok_or_else(|| eyre!("Google returned an empty access token"))
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
	#[serde(default)]
	pub slides: Vec<Slide>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
	#[serde(default)]
	pub page_elements: Vec<PageElement>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageElement {
	pub shape: Option<Shape>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Shape {
	pub text: Option<TextContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
	#[serde(default)]
	pub text_elements: Vec<TextElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
	pub text_run: Option<TextRun>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextRun {
	#[serde(default)]
	pub content: String,
}

impl Presentation {
	/// One `--- Slide N ---` section per slide holding its text runs. `None` without slides.
	pub fn render(&self) -> Option<String> {
		if self.slides.is_empty() {
			return None;
		}
		let sections = self
			.slides
			.iter()
			.enumerate()
			.map(|(i, slide)| {
				let runs: String = slide
					.page_elements
					.iter()
					.filter_map(|e| e.shape.as_ref()?.text.as_ref())
					.flat_map(|t| &t.text_elements)
					.filter_map(|t| t.text_run.as_ref())
					.map(|r| r.content.as_str())
					.collect();
				format!("--- Slide {} ---\n{}", i + 1, runs)
			})
			.collect::<Vec<_>>();
		Some(sections.join("\n"))
	}
}

#[derive(Clone)]
pub struct SlidesClient {
	http: reqwest::Client,
	base_url: String,
	tokens: Arc<dyn TokenSource>,
}

impl SlidesClient {
	pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
		Self { http: reqwest::Client::new(), base_url: SLIDES_API.to_string(), tokens }
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}

	pub async fn presentation(&self, id: &str) -> Result<Presentation> {
		let token = self.tokens.token().await?;
		let url = format!("{}/presentations/{}", self.base_url, id);
		let response = self.http.get(&url).bearer_auth(token).send().await.map_err(|e| eyre!("Slides API request failed: {}", e))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(eyre!("Slides API returned {} for {}: {}", status, id, body));
		}
		response.json().await.map_err(|e| eyre!("Failed to parse Slides API response: {}", e))
	}

	/// Text of every slide of presentation `id`
	pub async fn slide_text(&self, id: &str) -> Result<Option<String>> {
		let presentation = self.presentation(id).await?;
		match presentation.render() {
			Some(text) => {
				info!("Extracted text from {} slides", presentation.slides.len());
				Ok(Some(text))
			}
			None => {
				warn!("Presentation {} has no slides", id);
				Ok(None)
			}
		}
	}
}
