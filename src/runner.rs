//! Lesson loop: classify, handle, complete, advance

use std::{fmt, path::PathBuf};

use color_eyre::Result;
use tracing::{error, info, warn};

use crate::{
	ContentType, ExtractedContent,
	classify::classify,
	completion,
	config::AppConfig,
	driver::PageDriver,
	extract::Extractor,
	llm::QuizAnswerer,
	persist,
	quiz::QuizSolver,
};

/// Shell command line running `hook` with `message` as its single argument
fn stop_hook_command(hook: &str, message: &str) -> String {
	// Escape single quotes for shell: replace ' with '\''
	let escaped = message.replace('\'', "'\\''");
	format!("{} '{}'", hook, escaped)
}

/// Run the stop hook with a message if configured
pub fn run_stop_hook(config: &AppConfig, message: &str) {
	if let Some(ref hook) = config.stop_hook {
		info!("Running stop hook: {} {:?}", hook, message);
		let _ = tokio::process::Command::new("sh").arg("-c").arg(stop_hook_command(hook, message)).spawn();
	}
}

/// What one bounded run got through
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
	pub lessons: usize,
	pub extracted: usize,
	pub quizzes: usize,
	pub completed: usize,
	/// The last lesson had no way forward
	pub reached_end: bool,
}

impl fmt::Display for RunSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} lesson(s) visited, {} completed, {} extracted, {} quiz(zes)",
			self.lessons, self.completed, self.extracted, self.quizzes
		)?;
		if self.reached_end {
			write!(f, ", no next lesson")?;
		}
		Ok(())
	}
}

pub struct Runner {
	extractor: Extractor,
	answerer: QuizAnswerer,
	config: AppConfig,
	session_id: String,
}

impl Runner {
	pub fn new(extractor: Extractor, answerer: QuizAnswerer, config: AppConfig) -> Self {
		let session_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
		Self { extractor, answerer, config, session_id }
	}

	pub fn config(&self) -> &AppConfig {
		&self.config
	}

	/// Process at most `max_pages` lessons starting at `start_url`, then run the stop hook
	pub async fn run<P: PageDriver + ?Sized>(&self, page: &P, start_url: &str) -> Result<RunSummary> {
		let result = self.run_lessons(page, start_url).await;
		match &result {
			Ok(summary) => {
				info!("Run finished: {}", summary);
				run_stop_hook(&self.config, &format!("Run finished: {summary}"));
			}
			Err(e) => run_stop_hook(&self.config, &format!("Run failed: {e}")),
		}
		result
	}

	async fn run_lessons<P: PageDriver + ?Sized>(&self, page: &P, start_url: &str) -> Result<RunSummary> {
		info!("Navigating to {}...", start_url);
		page.goto(start_url).await?;
		page.wait_for_dom_ready(self.config.timeouts.dom_ready()).await?;

		let mut summary = RunSummary::default();
		// Content of the previous lesson, offered to a quiz right after it and then dropped
		let mut carry: Option<ExtractedContent> = None;
		for n in 1..=self.config.max_pages {
			info!("Lesson {}/{}: {}", n, self.config.max_pages, page.url().await.unwrap_or_default());
			if !self.run_lesson(page, &mut carry, &mut summary).await {
				summary.reached_end = true;
				break;
			}
		}
		Ok(summary)
	}

	/// Handle the lesson on screen and move past it. `false` when there was no next lesson to go to.
	async fn run_lesson<P: PageDriver + ?Sized>(&self, page: &P, carry: &mut Option<ExtractedContent>, summary: &mut RunSummary) -> bool {
		let timeouts = &self.config.timeouts;
		let context = carry.take();
		summary.lessons += 1;

		match classify(page).await {
			ContentType::Mcq => {
				summary.quizzes += 1;
				let report = QuizSolver::new(&self.answerer, *timeouts).run(page, context.as_ref().map(|c| c.text.as_str())).await;
				info!("Quiz: {} answered, completed: {}", report.answered, report.completed);
				if report.completed {
					summary.completed += 1;
				}
				if report.aborted {
					self.snapshot(page).await;
				}
			}
			content_type => {
				if let Some(content) = self.extractor.extract(page, content_type).await {
					summary.extracted += 1;
					if let Err(e) = persist::save(&self.config.output_dir, &content) {
						error!("Failed to save extracted {}: {}", content.kind.file_stem(), e);
					}
					*carry = Some(content);
				}
				completion::report_controls(page).await;
				if completion::complete(page, timeouts).await {
					summary.completed += 1;
				} else {
					self.snapshot(page).await;
				}
			}
		}

		let advanced = completion::advance(page, timeouts).await;
		if !advanced {
			self.snapshot(page).await;
		}
		advanced
	}

	fn snapshot_dir(&self) -> PathBuf {
		#[cfg(feature = "xdg")]
		let state_dir = persist::snapshot_dir(&self.session_id);
		#[cfg(not(feature = "xdg"))]
		let state_dir: Option<PathBuf> = None;
		state_dir.unwrap_or_else(|| self.config.output_dir.join("snapshots").join(&self.session_id))
	}

	async fn snapshot<P: PageDriver + ?Sized>(&self, page: &P) {
		if !self.config.save_snapshots {
			return;
		}
		if let Err(e) = persist::save_page_html(page, &self.snapshot_dir()).await {
			warn!("Failed to save page snapshot: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use async_trait::async_trait;

	use super::*;
	use crate::{
		config::Timeouts,
		driver::fake::{FakeElement, FakePage, Screen},
		llm::{FallbackTable, LanguageModel},
		selectors,
	};

	const TRACK: &str = "WEBVTT\n\n00:00.000 --> 00:02.000\nHello \n\n00:02.000 --> 00:04.000\nworld\n";

	#[derive(Default)]
	struct Recorder {
		prompts: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl LanguageModel for Recorder {
		async fn complete(&self, prompt: &str) -> Result<String> {
			self.prompts.lock().unwrap().push(prompt.to_string());
			Ok(r#"{"answer_index":1,"reason":"from context"}"#.to_string())
		}
	}

	fn runner(model: Arc<Recorder>, output_dir: PathBuf, max_pages: usize) -> Runner {
		let config = AppConfig { output_dir, max_pages, ..Default::default() };
		Runner::new(Extractor::new(None, Timeouts::default()), QuizAnswerer::new(model, FallbackTable::default()), config)
	}

	/// Lesson page with completion controls and, when `next`, a working "Next ⇒" link
	fn lesson(url: &str, next: bool) -> Screen {
		let screen = Screen::new(url)
			.with(selectors::complete_link(), FakeElement::shown())
			.with(selectors::confirm_yes(), FakeElement::shown());
		if next {
			screen.with(selectors::next_lesson(), FakeElement::shown()).advance_on(selectors::next_lesson())
		} else {
			screen
		}
	}

	fn video(url: &str) -> Screen {
		let frame = selectors::vimeo_frame();
		lesson(url, true)
			.with(frame.clone(), FakeElement::shown())
			.with_in_frame(frame.clone(), selectors::play_button(), FakeElement::shown())
			.with_caption(frame, selectors::play_button(), "https://cdn/captions/en.vtt", TRACK)
	}

	fn pdf(url: &str) -> Screen {
		lesson(url, true).with(selectors::pdf_heading(), FakeElement::shown())
	}

	fn quiz(url: &str) -> Screen {
		let radios = selectors::quiz_radios();
		lesson(url, false)
			.with(selectors::quiz_heading(), FakeElement::shown())
			.with(selectors::quiz_prompt(), FakeElement::shown().text("What was said?"))
			.with(radios.clone(), FakeElement::shown().times(2))
			.with(radios.nth(0), FakeElement::shown())
			.with(radios.nth(1), FakeElement::shown())
			.with(selectors::quiz_option_label(&radios.nth(0)), FakeElement::shown().text("Hello world"))
			.with(selectors::quiz_option_label(&radios.nth(1)), FakeElement::shown().text("Goodbye"))
			.with(selectors::complete_button(), FakeElement::shown())
	}

	#[tokio::test(start_paused = true)]
	async fn transcript_feeds_the_following_quiz() {
		let out = tempfile::tempdir().unwrap();
		let model = Arc::new(Recorder::default());
		let page = FakePage::new(vec![video("https://lesson/1"), quiz("https://lesson/2")]);

		let summary = runner(model.clone(), out.path().to_path_buf(), 5).run(&page, "https://lesson/1").await.unwrap();

		assert_eq!(
			summary,
			RunSummary {
				lessons: 2,
				extracted: 1,
				quizzes: 1,
				completed: 2,
				reached_end: true,
			}
		);
		assert!(model.prompts.lock().unwrap()[0].contains("Context: Hello world"));
		let saved: Vec<_> = std::fs::read_dir(out.path().join("transcripts")).unwrap().collect();
		assert_eq!(saved.len(), 1);
		assert!(page.clicks().contains(&selectors::quiz_radios().nth(0)));
	}

	#[tokio::test(start_paused = true)]
	async fn context_survives_one_transition_only() {
		let out = tempfile::tempdir().unwrap();
		let model = Arc::new(Recorder::default());
		let page = FakePage::new(vec![video("https://lesson/1"), pdf("https://lesson/2"), quiz("https://lesson/3")]);

		let summary = runner(model.clone(), out.path().to_path_buf(), 5).run(&page, "https://lesson/1").await.unwrap();

		assert_eq!(summary.lessons, 3);
		let prompts = model.prompts.lock().unwrap();
		assert!(prompts[0].contains("Context: (none)"));
		assert!(!prompts[0].contains("Hello world\n\nQuestion"));
	}

	#[tokio::test(start_paused = true)]
	async fn stops_after_max_pages() {
		let out = tempfile::tempdir().unwrap();
		let page = FakePage::new(vec![pdf("https://lesson/1"), pdf("https://lesson/2"), pdf("https://lesson/3"), pdf("https://lesson/4")]);

		let summary = runner(Arc::new(Recorder::default()), out.path().to_path_buf(), 2).run(&page, "https://lesson/1").await.unwrap();

		assert_eq!(summary.lessons, 2);
		assert_eq!(summary.completed, 2);
		assert!(!summary.reached_end);
		assert_eq!(page.current_screen(), 2);
		assert_eq!(page.gotos(), vec!["https://lesson/1".to_string()]);
	}

	#[tokio::test(start_paused = true)]
	async fn missing_next_lesson_ends_run() {
		let out = tempfile::tempdir().unwrap();
		let page = FakePage::new(vec![lesson("https://lesson/1", false)]);

		let summary = runner(Arc::new(Recorder::default()), out.path().to_path_buf(), 5).run(&page, "https://lesson/1").await.unwrap();

		assert_eq!(summary.lessons, 1);
		assert!(summary.reached_end);
	}

	#[test]
	fn hook_message_is_single_quoted() {
		assert_eq!(stop_hook_command("notify", "it's done"), r#"notify 'it'\''s done'"#);
	}

	#[test]
	fn summary_reads_well() {
		let summary = RunSummary { lessons: 2, completed: 2, extracted: 1, quizzes: 1, reached_end: true };
		assert_eq!(summary.to_string(), "2 lesson(s) visited, 2 completed, 1 extracted, 1 quiz(zes), no next lesson");
	}
}
