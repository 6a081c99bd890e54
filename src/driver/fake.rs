//! Scripted in-memory page for tests.
//!
//! A [`FakePage`] walks through a list of [`Screen`]s. Each screen knows which locators resolve on it,
//! and which click moves on to the next screen.

use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use tokio::sync::oneshot;

use super::{Locator, PageDriver, ResponseWatch};

#[derive(Clone, Debug, Default)]
pub struct FakeElement {
	pub count: usize,
	pub visible: bool,
	pub text: Option<String>,
	pub attrs: HashMap<String, String>,
}

impl FakeElement {
	pub fn shown() -> Self {
		Self { count: 1, visible: true, ..Default::default() }
	}

	pub fn hidden() -> Self {
		Self { count: 1, visible: false, ..Default::default() }
	}

	pub fn text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}

	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attrs.insert(name.into(), value.into());
		self
	}

	pub fn times(mut self, count: usize) -> Self {
		self.count = count;
		self
	}
}

#[derive(Clone, Debug)]
struct Caption {
	frame: Locator,
	trigger: Locator,
	url: String,
	body: String,
}

#[derive(Clone, Debug, Default)]
pub struct Screen {
	url: String,
	html: String,
	elements: HashMap<Locator, FakeElement>,
	frame_elements: HashMap<(Locator, Locator), FakeElement>,
	failing: HashSet<Locator>,
	advance_on: Vec<Locator>,
	caption: Option<Caption>,
}

impl Screen {
	pub fn new(url: impl Into<String>) -> Self {
		let url = url.into();
		Self { html: format!("<html><body>{url}</body></html>"), url, ..Default::default() }
	}

	pub fn with(mut self, locator: Locator, element: FakeElement) -> Self {
		self.elements.insert(locator, element);
		self
	}

	pub fn with_in_frame(mut self, frame: Locator, locator: Locator, element: FakeElement) -> Self {
		self.frame_elements.insert((frame, locator), element);
		self
	}

	/// Queries for `locator` error out on this screen
	pub fn failing(mut self, locator: Locator) -> Self {
		self.failing.insert(locator);
		self
	}

	/// Clicking `locator` moves to the next screen
	pub fn advance_on(mut self, locator: Locator) -> Self {
		self.advance_on.push(locator);
		self
	}

	/// Clicking `trigger` inside `frame` fetches `url`, answered with `body`
	pub fn with_caption(mut self, frame: Locator, trigger: Locator, url: impl Into<String>, body: impl Into<String>) -> Self {
		self.caption = Some(Caption { frame, trigger, url: url.into(), body: body.into() });
		self
	}
}

#[derive(Default)]
struct State {
	screens: Vec<Screen>,
	current: usize,
	clicks: Vec<Locator>,
	frame_clicks: Vec<Locator>,
	fills: Vec<(Locator, String)>,
	gotos: Vec<String>,
	screenshots: Vec<PathBuf>,
	watchers: Vec<(String, oneshot::Sender<String>)>,
}

impl State {
	fn screen(&self) -> &Screen {
		&self.screens[self.current]
	}

	fn element(&self, locator: &Locator) -> Result<Option<&FakeElement>> {
		let screen = self.screen();
		if screen.failing.contains(locator) {
			bail!("Injected failure for {:?}", locator);
		}
		Ok(screen.elements.get(locator).filter(|e| e.count > 0))
	}

	fn frame_element(&self, frame: &Locator, locator: &Locator) -> Option<&FakeElement> {
		let screen = self.screen();
		screen.elements.get(frame).filter(|e| e.count > 0)?;
		screen.frame_elements.get(&(frame.clone(), locator.clone())).filter(|e| e.count > 0)
	}

	fn advance(&mut self) {
		if self.current + 1 < self.screens.len() {
			self.current += 1;
		}
	}
}

pub struct FakePage {
	state: Mutex<State>,
	armed: Arc<AtomicUsize>,
}

impl FakePage {
	pub fn new(screens: Vec<Screen>) -> Self {
		assert!(!screens.is_empty(), "a fake page needs at least one screen");
		Self { state: Mutex::new(State { screens, ..Default::default() }), armed: Arc::new(AtomicUsize::new(0)) }
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap()
	}

	pub fn clicks(&self) -> Vec<Locator> {
		self.state().clicks.clone()
	}

	pub fn frame_clicks(&self) -> Vec<Locator> {
		self.state().frame_clicks.clone()
	}

	pub fn fills(&self) -> Vec<(Locator, String)> {
		self.state().fills.clone()
	}

	pub fn gotos(&self) -> Vec<String> {
		self.state().gotos.clone()
	}

	pub fn screenshots(&self) -> Vec<PathBuf> {
		self.state().screenshots.clone()
	}

	pub fn current_screen(&self) -> usize {
		self.state().current
	}

	/// Response listeners not yet disarmed
	pub fn armed_watches(&self) -> usize {
		self.armed.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PageDriver for FakePage {
	async fn goto(&self, url: &str) -> Result<()> {
		let mut state = self.state();
		state.gotos.push(url.to_string());
		if let Some(i) = state.screens.iter().position(|s| s.url == url) {
			state.current = i;
		}
		Ok(())
	}

	async fn url(&self) -> Result<String> {
		Ok(self.state().screen().url.clone())
	}

	async fn wait_for_dom_ready(&self, _timeout: Duration) -> Result<()> {
		Ok(())
	}

	async fn count(&self, locator: &Locator) -> Result<usize> {
		Ok(self.state().element(locator)?.map(|e| e.count).unwrap_or(0))
	}

	async fn is_visible(&self, locator: &Locator) -> Result<bool> {
		Ok(self.state().element(locator)?.is_some_and(|e| e.visible))
	}

	async fn click(&self, locator: &Locator) -> Result<()> {
		let mut state = self.state();
		if state.element(locator)?.is_none() {
			bail!("Nothing to click for {:?}", locator);
		}
		state.clicks.push(locator.clone());
		if state.screen().advance_on.contains(locator) {
			state.advance();
		}
		Ok(())
	}

	async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
		let mut state = self.state();
		if state.element(locator)?.is_none() {
			bail!("No input to fill for {:?}", locator);
		}
		state.fills.push((locator.clone(), value.to_string()));
		Ok(())
	}

	async fn text(&self, locator: &Locator) -> Result<Option<String>> {
		Ok(self.state().element(locator)?.and_then(|e| e.text.clone()))
	}

	async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
		Ok(self.state().element(locator)?.and_then(|e| e.attrs.get(name).cloned()))
	}

	async fn frame_count(&self, frame: &Locator, locator: &Locator) -> Result<usize> {
		Ok(self.state().frame_element(frame, locator).map(|e| e.count).unwrap_or(0))
	}

	async fn frame_is_visible(&self, frame: &Locator, locator: &Locator) -> Result<bool> {
		Ok(self.state().frame_element(frame, locator).is_some_and(|e| e.visible))
	}

	async fn frame_click(&self, frame: &Locator, locator: &Locator) -> Result<bool> {
		let mut state = self.state();
		if state.frame_element(frame, locator).is_none() {
			return Ok(false);
		}
		state.frame_clicks.push(locator.clone());

		let fired = state.screen().caption.clone().filter(|c| &c.frame == frame && &c.trigger == locator);
		if let Some(caption) = fired {
			let (hits, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.watchers).into_iter().partition(|(fragment, _)| caption.url.contains(fragment.as_str()));
			state.watchers = rest;
			for (_, tx) in hits {
				let _ = tx.send(caption.body.clone());
			}
		}
		Ok(true)
	}

	async fn frame_attribute(&self, frame: &Locator, locator: &Locator, name: &str) -> Result<Option<String>> {
		Ok(self.state().frame_element(frame, locator).and_then(|e| e.attrs.get(name).cloned()))
	}

	async fn watch_response(&self, url_fragment: &str) -> Result<ResponseWatch> {
		let (tx, rx) = oneshot::channel();
		self.state().watchers.push((url_fragment.to_string(), tx));
		self.armed.fetch_add(1, Ordering::SeqCst);
		let armed = self.armed.clone();
		Ok(ResponseWatch::new(rx, move || {
			armed.fetch_sub(1, Ordering::SeqCst);
		}))
	}

	async fn screenshot(&self, path: &Path) -> Result<()> {
		self.state().screenshots.push(path.to_path_buf());
		Ok(())
	}

	async fn html(&self) -> Result<String> {
		let state = self.state();
		if state.screen().html.is_empty() {
			return Err(eyre!("Empty document"));
		}
		Ok(state.screen().html.clone())
	}
}
