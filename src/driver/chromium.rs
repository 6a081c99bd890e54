//! [`PageDriver`] over a live chromiumoxide tab.
//!
//! Locators are compiled into small JS snippets and evaluated in the page, or in the execution context
//! of an iframe for the frame-scoped calls.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::{
	Browser, Page,
	cdp::{
		browser_protocol::{
			network::{EventLoadingFinished, EventResponseReceived, GetResponseBodyParams},
			target::EventTargetCreated,
		},
		js_protocol::runtime::{EvaluateParams, ExecutionContextId},
	},
	page::ScreenshotParams,
};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{Locator, PageDriver, ResponseWatch};

/// Helpers every generated script starts with
const DOM_HELPERS_JS: &str = r#"
	const __text = (e) => ((e && (e.innerText || e.textContent)) || '').trim();
	const __name = (e) => ((e.getAttribute && e.getAttribute('aria-label')) || e.innerText || e.textContent || e.value || e.title || '').trim();
	const __visible = (e) => {
		if (!e || !e.isConnected) return false;
		const style = window.getComputedStyle(e);
		if (style.visibility === 'hidden' || style.display === 'none') return false;
		const rect = e.getBoundingClientRect();
		return rect.width > 0 && rect.height > 0;
	};
	const __innermost = (els, text) => {
		const needle = text.toLowerCase();
		const hits = els.filter(e => __text(e).toLowerCase().includes(needle));
		return hits.filter(e => !hits.some(o => o !== e && e.contains(o)));
	};
"#;

/// JS string literal
fn js_str(s: &str) -> String {
	Value::from(s).to_string()
}

/// JS expression evaluating to the array of elements `locator` matches
fn elements_js(locator: &Locator) -> String {
	match locator {
		Locator::Css(css) => format!("Array.from(document.querySelectorAll({}))", js_str(css)),
		Locator::CssText { css, text } => format!(
			"Array.from(document.querySelectorAll({})).filter(e => __text(e).toLowerCase().includes({}))",
			js_str(css),
			js_str(&text.to_lowercase())
		),
		Locator::Role { role, name } => format!(
			"Array.from(document.querySelectorAll({})).filter(e => __name(e).toLowerCase().includes({}))",
			js_str(role.css()),
			js_str(&name.to_lowercase())
		),
		Locator::TextIn { scope, text } => format!(
			"__innermost(Array.from(document.querySelectorAll({})).flatMap(s => Array.from(s.querySelectorAll('*'))), {})",
			js_str(scope),
			js_str(text)
		),
		Locator::Within { scope, css } => format!("({}).slice(0, 1).flatMap(s => Array.from(s.querySelectorAll({})))", elements_js(scope), js_str(css)),
		Locator::Nth { of, index } => format!("({}).slice({index}, {index} + 1)", elements_js(of)),
		Locator::Ancestor { of, css } => format!(
			"({}).slice(0, 1).map(e => e.parentElement && e.parentElement.closest({})).filter(Boolean)",
			elements_js(of),
			js_str(css)
		),
	}
}

fn script(locator: &Locator, body: &str) -> String {
	format!("(function() {{ {DOM_HELPERS_JS} const els = {}; {body} }})()", elements_js(locator))
}

const COUNT_BODY: &str = "return els.length;";
const VISIBLE_BODY: &str = "return els.length > 0 && __visible(els[0]);";
const CLICK_BODY: &str = "if (!els.length) return false; els[0].scrollIntoView({block: 'center'}); els[0].click(); return true;";
/// Page-level click that also marks the current document, so a navigation it starts can be told apart from the old page
const MARKED_CLICK_BODY: &str =
	"if (!els.length) return false; window.__alxClicked = true; els[0].scrollIntoView({block: 'center'}); els[0].click(); return true;";

const DOCUMENT_STATE_JS: &str = "document.readyState + (window.__alxClicked === true ? ':clicked' : '')";
const CLEAR_CLICK_MARK_JS: &str = "delete window.__alxClicked";

/// How long a clicked document may stay in place before the click is taken as not navigating
const NAVIGATION_GRACE: Duration = Duration::from_secs(3);

/// Ready, and not the document a click just left (unless that click has had its grace period)
fn dom_settled(ready_state: &str, clicked_document: bool, grace_over: bool) -> bool {
	matches!(ready_state, "interactive" | "complete") && (!clicked_document || grace_over)
}
const TEXT_BODY: &str = "return els.length ? __text(els[0]) : null;";

fn fill_body(value: &str) -> String {
	format!(
		r#"
		if (!els.length) return false;
		const el = els[0];
		el.focus();
		const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
		Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {});
		el.dispatchEvent(new Event('input', {{ bubbles: true }}));
		el.dispatchEvent(new Event('change', {{ bubbles: true }}));
		return true;
		"#,
		js_str(value)
	)
}

fn attribute_body(name: &str) -> String {
	format!("return els.length ? els[0].getAttribute({}) : null;", js_str(name))
}

fn decode_body(body: &str, base64_encoded: bool) -> String {
	if !base64_encoded {
		return body.to_string();
	}
	match base64::engine::general_purpose::STANDARD.decode(body) {
		Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
		Err(e) => {
			warn!("Response body was not valid base64: {}", e);
			String::new()
		}
	}
}

/// Pairs `responseReceived` with `loadingFinished` for URLs containing `fragment`, in either arrival order
#[derive(Debug)]
struct ResponseMatcher<Id> {
	fragment: String,
	matched: Vec<Id>,
	finished: Vec<Id>,
}

impl<Id: Clone + PartialEq> ResponseMatcher<Id> {
	fn new(fragment: impl Into<String>) -> Self {
		Self { fragment: fragment.into(), matched: Vec::new(), finished: Vec::new() }
	}

	/// `Some(id)` once the matching response's body is ready to fetch
	fn on_response(&mut self, url: &str, id: &Id) -> Option<Id> {
		if !url.contains(&self.fragment) {
			return None;
		}
		if let Some(i) = self.finished.iter().position(|f| f == id) {
			self.finished.swap_remove(i);
			return Some(id.clone());
		}
		self.matched.push(id.clone());
		None
	}

	fn on_finished(&mut self, id: &Id) -> Option<Id> {
		if let Some(i) = self.matched.iter().position(|m| m == id) {
			self.matched.swap_remove(i);
			return Some(id.clone());
		}
		self.finished.push(id.clone());
		None
	}
}

/// The active browser tab
#[derive(Clone, Debug)]
pub struct ChromiumPage {
	page: Page,
}

impl ChromiumPage {
	pub fn new(page: Page) -> Self {
		Self { page }
	}

	/// Click something that opens a new tab and hand back that tab.
	///
	/// The target listener is armed before the click so a fast-opening tab is not missed.
	pub async fn follow_into_new_tab(&self, browser: &Browser, locator: &Locator, timeout: Duration) -> Result<ChromiumPage> {
		let mut created = browser
			.event_listener::<EventTargetCreated>()
			.await
			.map_err(|e| eyre!("Failed to listen for new tabs: {}", e))?;

		self.click(locator).await?;

		let target_id = tokio::time::timeout(timeout, async {
			while let Some(event) = created.next().await {
				if event.target_info.r#type == "page" {
					return Some(event.target_info.target_id.clone());
				}
			}
			None
		})
		.await
		.map_err(|_| eyre!("No new tab opened within {}s", timeout.as_secs()))?
		.ok_or_else(|| eyre!("Tab listener closed before a new tab opened"))?;

		// The handler attaches to the target asynchronously
		let mut attempts = 0;
		let page = loop {
			match browser.get_page(target_id.clone()).await {
				Ok(page) => break page,
				Err(_) if attempts < 10 => {
					attempts += 1;
					tokio::time::sleep(Duration::from_millis(200)).await;
				}
				Err(e) => bail!("Failed to attach to new tab: {}", e),
			}
		};

		page.bring_to_front().await.map_err(|e| eyre!("Failed to focus new tab: {}", e))?;
		let tab = ChromiumPage::new(page);
		tab.wait_for_dom_ready(timeout).await?;
		Ok(tab)
	}

	async fn eval(&self, script: String, action: &str) -> Result<Value> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {}: {}", action, e))?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	/// Execution context of the document loaded in the `frame` iframe
	async fn frame_context(&self, frame: &Locator) -> Result<Option<ExecutionContextId>> {
		let Some(src) = self.attribute(frame, "src").await? else {
			return Ok(None);
		};
		let wanted = src.split('?').next().unwrap_or(&src).trim_start_matches("https:").trim_start_matches("http:").to_string();

		let frames = self.page.frames().await.map_err(|e| eyre!("Failed to list frames: {}", e))?;
		for id in frames {
			let Some(url) = self.page.frame_url(id.clone()).await.map_err(|e| eyre!("Failed to read frame URL: {}", e))? else {
				continue;
			};
			if url.contains(&wanted) {
				return self.page.frame_execution_context(id).await.map_err(|e| eyre!("Failed to get frame context: {}", e));
			}
		}
		debug!("No frame loaded from {}", src);
		Ok(None)
	}

	async fn frame_eval(&self, frame: &Locator, script: String, action: &str) -> Result<Option<Value>> {
		let Some(context) = self.frame_context(frame).await? else {
			return Ok(None);
		};
		let mut params = EvaluateParams::new(script);
		params.context_id = Some(context);
		let result = self.page.evaluate_expression(params).await.map_err(|e| eyre!("Failed to {} in frame: {}", action, e))?;
		Ok(Some(result.value().cloned().unwrap_or(Value::Null)))
	}
}

#[async_trait]
impl PageDriver for ChromiumPage {
	async fn goto(&self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| eyre!("Failed to navigate to {}: {}", url, e))?;
		Ok(())
	}

	async fn url(&self) -> Result<String> {
		Ok(self.page.url().await.map_err(|e| eyre!("Failed to get current URL: {}", e))?.unwrap_or_default())
	}

	async fn wait_for_dom_ready(&self, timeout: Duration) -> Result<()> {
		let start = tokio::time::Instant::now();
		let deadline = start + timeout;
		loop {
			let state = self.eval(DOCUMENT_STATE_JS.to_string(), "read document state").await?;
			let state = state.as_str().unwrap_or_default();
			let (ready_state, stale) = match state.strip_suffix(":clicked") {
				Some(ready_state) => (ready_state, true),
				None => (state, false),
			};
			if dom_settled(ready_state, stale, start.elapsed() >= NAVIGATION_GRACE) {
				if stale {
					// The click did not navigate; this document is the one to work on
					self.eval(CLEAR_CLICK_MARK_JS.to_string(), "clear click mark").await?;
				}
				return Ok(());
			}
			if tokio::time::Instant::now() >= deadline {
				bail!("Document not ready after {}s (state: {}, clicked: {})", timeout.as_secs(), ready_state, stale);
			}
			tokio::time::sleep(Duration::from_millis(250)).await;
		}
	}

	async fn count(&self, locator: &Locator) -> Result<usize> {
		let value = self.eval(script(locator, COUNT_BODY), "count elements").await?;
		Ok(value.as_u64().unwrap_or(0) as usize)
	}

	async fn is_visible(&self, locator: &Locator) -> Result<bool> {
		let value = self.eval(script(locator, VISIBLE_BODY), "check visibility").await?;
		Ok(value.as_bool().unwrap_or(false))
	}

	async fn click(&self, locator: &Locator) -> Result<()> {
		let value = self.eval(script(locator, MARKED_CLICK_BODY), "click").await?;
		if value.as_bool() != Some(true) {
			bail!("Nothing to click for {:?}", locator);
		}
		Ok(())
	}

	async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
		let filled = self.eval(script(locator, &fill_body(value)), "fill input").await?;
		if filled.as_bool() != Some(true) {
			bail!("No input to fill for {:?}", locator);
		}
		Ok(())
	}

	async fn text(&self, locator: &Locator) -> Result<Option<String>> {
		let value = self.eval(script(locator, TEXT_BODY), "read text").await?;
		Ok(value.as_str().map(str::to_owned))
	}

	async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
		let value = self.eval(script(locator, &attribute_body(name)), "read attribute").await?;
		Ok(value.as_str().map(str::to_owned))
	}

	async fn frame_count(&self, frame: &Locator, locator: &Locator) -> Result<usize> {
		let value = self.frame_eval(frame, script(locator, COUNT_BODY), "count elements").await?;
		Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
	}

	async fn frame_is_visible(&self, frame: &Locator, locator: &Locator) -> Result<bool> {
		let value = self.frame_eval(frame, script(locator, VISIBLE_BODY), "check visibility").await?;
		Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
	}

	async fn frame_click(&self, frame: &Locator, locator: &Locator) -> Result<bool> {
		let value = self.frame_eval(frame, script(locator, CLICK_BODY), "click").await?;
		Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
	}

	async fn frame_attribute(&self, frame: &Locator, locator: &Locator, name: &str) -> Result<Option<String>> {
		let value = self.frame_eval(frame, script(locator, &attribute_body(name)), "read attribute").await?;
		Ok(value.and_then(|v| v.as_str().map(str::to_owned)))
	}

	async fn watch_response(&self, url_fragment: &str) -> Result<ResponseWatch> {
		let mut responses = self
			.page
			.event_listener::<EventResponseReceived>()
			.await
			.map_err(|e| eyre!("Failed to listen for responses: {}", e))?;
		let mut finished = self
			.page
			.event_listener::<EventLoadingFinished>()
			.await
			.map_err(|e| eyre!("Failed to listen for finished loads: {}", e))?;

		let (tx, rx) = oneshot::channel();
		let page = self.page.clone();
		let mut matcher = ResponseMatcher::new(url_fragment);
		let task = tokio::spawn(async move {
			loop {
				// Responses first, so a buffered pair is paired in one pass
				let ready = tokio::select! {
					biased;
					Some(event) = responses.next() => matcher.on_response(&event.response.url, &event.request_id),
					Some(event) = finished.next() => matcher.on_finished(&event.request_id),
					else => return,
				};
				let Some(request_id) = ready else {
					continue;
				};
				debug!("Matched response {:?} finished loading", request_id);
				match page.execute(GetResponseBodyParams::new(request_id)).await {
					Ok(resp) => {
						let body = decode_body(&resp.result.body, resp.result.base64_encoded);
						let _ = tx.send(body);
						return;
					}
					Err(e) => warn!("Failed to read matched response body: {}", e),
				}
			}
		});

		let abort = task.abort_handle();
		Ok(ResponseWatch::new(rx, move || abort.abort()))
	}

	async fn screenshot(&self, path: &Path) -> Result<()> {
		self.page
			.save_screenshot(ScreenshotParams::builder().build(), path)
			.await
			.map_err(|e| eyre!("Failed to save screenshot to {}: {}", path.display(), e))?;
		Ok(())
	}

	async fn html(&self) -> Result<String> {
		self.page.content().await.map_err(|e| eyre!("Failed to get page HTML: {}", e))
	}
}
