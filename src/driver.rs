//! Page driver: the browser tab the lesson handlers talk to.
//!
//! Handlers only ever see [`PageDriver`], so they run the same against a live Chromium tab
//! ([`chromium::ChromiumPage`]) and against the in-memory page the tests script.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use color_eyre::Result;
use tokio::sync::oneshot;

pub mod chromium;
#[cfg(test)]
pub mod fake;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Accessible role of a control
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Role {
	Link,
	Button,
}

impl Role {
	/// CSS matching every element that can carry this role
	pub fn css(&self) -> &'static str {
		match self {
			Role::Link => r#"a, [role="link"]"#,
			Role::Button => r#"button, [role="button"], input[type="button"], input[type="submit"]"#,
		}
	}
}

/// How to find elements on a page
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Locator {
	/// Every element matching a CSS selector
	Css(String),
	/// Elements matching `css` whose text contains `text`
	CssText { css: String, text: String },
	/// Controls with the given role whose accessible name contains `name` (case-insensitive)
	Role { role: Role, name: String },
	/// Innermost elements inside `scope` whose text contains `text`
	TextIn { scope: String, text: String },
	/// Elements matching `css` inside the first match of `scope`
	Within { scope: Box<Locator>, css: String },
	/// Only the `index`th (0-based) match of `of`
	Nth { of: Box<Locator>, index: usize },
	/// Closest ancestor matching `css` of the first match of `of`
	Ancestor { of: Box<Locator>, css: String },
}

impl Locator {
	pub fn css(css: impl Into<String>) -> Self {
		Locator::Css(css.into())
	}

	pub fn css_text(css: impl Into<String>, text: impl Into<String>) -> Self {
		Locator::CssText { css: css.into(), text: text.into() }
	}

	pub fn link(name: impl Into<String>) -> Self {
		Locator::Role { role: Role::Link, name: name.into() }
	}

	pub fn button(name: impl Into<String>) -> Self {
		Locator::Role { role: Role::Button, name: name.into() }
	}

	pub fn text_in(scope: impl Into<String>, text: impl Into<String>) -> Self {
		Locator::TextIn { scope: scope.into(), text: text.into() }
	}

	pub fn within(&self, css: impl Into<String>) -> Self {
		Locator::Within { scope: Box::new(self.clone()), css: css.into() }
	}

	pub fn nth(&self, index: usize) -> Self {
		Locator::Nth { of: Box::new(self.clone()), index }
	}

	pub fn ancestor(&self, css: impl Into<String>) -> Self {
		Locator::Ancestor { of: Box::new(self.clone()), css: css.into() }
	}
}

/// A response listener armed on a page.
///
/// Resolves with the body of the first response whose URL matched. However it is left (consumed by
/// [`ResponseWatch::wait`], or dropped early by `?`), the listener is deregistered exactly once.
pub struct ResponseWatch {
	body: oneshot::Receiver<String>,
	disarm: Option<Box<dyn FnOnce() + Send>>,
}

impl ResponseWatch {
	pub fn new(body: oneshot::Receiver<String>, disarm: impl FnOnce() + Send + 'static) -> Self {
		Self { body, disarm: Some(Box::new(disarm)) }
	}

	/// Wait for the matching response body. `None` on timeout or if the listener died.
	pub async fn wait(mut self, timeout: Duration) -> Option<String> {
		match tokio::time::timeout(timeout, &mut self.body).await {
			Ok(Ok(body)) => Some(body),
			Ok(Err(_)) => {
				tracing::warn!("Response listener closed before a match");
				None
			}
			Err(_) => {
				tracing::warn!("No matching response within {}s", timeout.as_secs());
				None
			}
		}
	}
}

impl Drop for ResponseWatch {
	fn drop(&mut self) {
		if let Some(disarm) = self.disarm.take() {
			disarm();
		}
	}
}

/// A remote-controlled browser tab
#[async_trait]
pub trait PageDriver: Send + Sync {
	async fn goto(&self, url: &str) -> Result<()>;

	async fn url(&self) -> Result<String>;

	/// Wait until the document reports `interactive` or `complete`
	async fn wait_for_dom_ready(&self, timeout: Duration) -> Result<()>;

	/// Number of elements matching. Zero is a normal answer, not an error.
	async fn count(&self, locator: &Locator) -> Result<usize>;

	/// Whether the first match exists and is rendered
	async fn is_visible(&self, locator: &Locator) -> Result<bool>;

	async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			if self.is_visible(locator).await? {
				return Ok(true);
			}
			if tokio::time::Instant::now() >= deadline {
				return Ok(false);
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	/// Click the first match. Errors if nothing matches.
	async fn click(&self, locator: &Locator) -> Result<()>;

	/// Set an input's value the way typing would
	async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

	/// Trimmed text of the first match
	async fn text(&self, locator: &Locator) -> Result<Option<String>>;

	async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

	/// `count`, evaluated inside the document of the `frame` iframe
	async fn frame_count(&self, frame: &Locator, locator: &Locator) -> Result<usize>;

	async fn frame_is_visible(&self, frame: &Locator, locator: &Locator) -> Result<bool>;

	/// Click inside the iframe. `false` when the target is not there.
	async fn frame_click(&self, frame: &Locator, locator: &Locator) -> Result<bool>;

	async fn frame_attribute(&self, frame: &Locator, locator: &Locator, name: &str) -> Result<Option<String>>;

	async fn frame_wait_visible(&self, frame: &Locator, locator: &Locator, timeout: Duration) -> Result<bool> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			if self.frame_is_visible(frame, locator).await? {
				return Ok(true);
			}
			if tokio::time::Instant::now() >= deadline {
				return Ok(false);
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	/// Arm a listener for the first network response whose URL contains `url_fragment`.
	/// Must be called before the action that triggers the request.
	async fn watch_response(&self, url_fragment: &str) -> Result<ResponseWatch>;

	async fn screenshot(&self, path: &Path) -> Result<()>;

	/// Full document HTML
	async fn html(&self) -> Result<String>;
}
