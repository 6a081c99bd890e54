//! Multiple-choice quiz widget: answer every question, then mark the lesson complete.

use color_eyre::{Result, eyre::bail};
use tracing::{error, info, warn};

use crate::{
	AnswerChoice, McqOption, McqQuestion, completion,
	config::Timeouts,
	driver::{POLL_INTERVAL, PageDriver},
	llm::QuizAnswerer,
	selectors,
};

#[derive(Debug)]
enum Step {
	Detect,
	Extract,
	Solve(McqQuestion),
	Select(McqQuestion, AnswerChoice),
	Advance,
	FinalComplete,
	Done,
}

/// How a quiz run went
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QuizReport {
	pub answered: usize,
	/// Lesson marked complete after the last question
	pub completed: bool,
	/// Stopped on a question it could not answer safely
	pub aborted: bool,
}

pub struct QuizSolver<'a> {
	answerer: &'a QuizAnswerer,
	timeouts: Timeouts,
}

impl<'a> QuizSolver<'a> {
	pub fn new(answerer: &'a QuizAnswerer, timeouts: Timeouts) -> Self {
		Self { answerer, timeouts }
	}

	/// Work through the quiz on `page`. `context` is the text extracted from the lesson before it.
	pub async fn run<P: PageDriver + ?Sized>(&self, page: &P, context: Option<&str>) -> QuizReport {
		let mut report = QuizReport::default();
		let mut step = Step::Detect;
		// Text of the question last answered, to notice a "Next" that went nowhere
		let mut previous: Option<String> = None;
		loop {
			step = match step {
				Step::Detect =>
					if self.detect(page).await {
						Step::Extract
					} else {
						info!("No quiz question on the page");
						Step::FinalComplete
					},
				Step::Extract => match extract_question(page).await {
					Ok(Some(question)) if previous.as_deref() == Some(question.text.as_str()) => {
						warn!("Quiz still shows '{}' after 'Next', treating it as finished", question.text);
						Step::FinalComplete
					}
					Ok(Some(question)) => {
						info!("Question: {}", question);
						previous = Some(question.text.clone());
						Step::Solve(question)
					}
					Ok(None) => {
						info!("Quiz shows no options, treating it as finished");
						Step::FinalComplete
					}
					Err(e) => {
						error!("Failed to read quiz question: {}", e);
						report.aborted = true;
						Step::Done
					}
				},
				Step::Solve(question) => {
					let choice = self.answerer.solve(context, &question).await;
					Step::Select(question, choice)
				}
				Step::Select(question, choice) => match select(page, &question, &choice).await {
					Ok(()) => {
						report.answered += 1;
						Step::Advance
					}
					Err(e) => {
						error!("Aborting quiz: {}", e);
						report.aborted = true;
						Step::Done
					}
				},
				Step::Advance => match advance(page, &self.timeouts).await {
					Ok(true) => Step::Detect,
					Ok(false) => {
						info!("No 'Next' button, quiz finished");
						Step::FinalComplete
					}
					Err(e) => {
						error!("Failed to move to the next question: {}", e);
						Step::FinalComplete
					}
				},
				Step::FinalComplete => {
					report.completed = completion::complete(page, &self.timeouts).await;
					Step::Done
				}
				Step::Done => return report,
			};
		}
	}

	/// Poll for either quiz marker
	async fn detect<P: PageDriver + ?Sized>(&self, page: &P) -> bool {
		let deadline = tokio::time::Instant::now() + self.timeouts.quiz_detect();
		let markers = selectors::quiz_markers();
		loop {
			for marker in &markers {
				if page.is_visible(marker).await.unwrap_or(false) {
					return true;
				}
			}
			if tokio::time::Instant::now() >= deadline {
				return false;
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}
}

/// Question text and options as currently rendered. `None` when the widget has no options.
pub async fn extract_question<P: PageDriver + ?Sized>(page: &P) -> Result<Option<McqQuestion>> {
	let text = match page.text(&selectors::quiz_question_text()).await? {
		Some(text) if !text.is_empty() => text,
		_ => page.text(&selectors::quiz_prompt()).await?.unwrap_or_default(),
	};

	let radios = selectors::quiz_radios();
	let count = page.count(&radios).await?;
	if count == 0 {
		return Ok(None);
	}
	if text.is_empty() {
		bail!("Quiz has {} options but no question text", count);
	}

	let mut options = Vec::with_capacity(count);
	for i in 0..count {
		let control = radios.nth(i);
		let label = page.text(&selectors::quiz_option_label(&control)).await?.unwrap_or_default();
		options.push(McqOption::new(label, control));
	}
	Ok(Some(McqQuestion::new(text, options)))
}

/// Click the chosen option. Out-of-range answers are refused before anything is clicked.
pub async fn select<P: PageDriver + ?Sized>(page: &P, question: &McqQuestion, choice: &AnswerChoice) -> Result<()> {
	let n = question.option_count();
	if choice.index == 0 || choice.index > n {
		bail!("Invalid answer index {} (expected 1-{})", choice.index, n);
	}
	let option = &question.options[choice.index - 1];
	info!("Selecting answer {}: {}", choice.index, option.text);
	page.click(&option.control).await
}

/// Click "Next" if shown. `false` when there is none.
async fn advance<P: PageDriver + ?Sized>(page: &P, timeouts: &Timeouts) -> Result<bool> {
	let next = selectors::quiz_next();
	if !page.is_visible(&next).await? {
		return Ok(false);
	}
	page.click(&next).await?;
	page.wait_for_dom_ready(timeouts.dom_ready()).await?;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use async_trait::async_trait;

	use super::*;
	use crate::{
		driver::fake::{FakeElement, FakePage, Screen},
		llm::{FallbackTable, LanguageModel},
	};

	/// Replies in order, remembering the prompts
	struct Scripted {
		replies: Mutex<Vec<String>>,
		prompts: Mutex<Vec<String>>,
	}

	impl Scripted {
		fn new(replies: &[&str]) -> Arc<Self> {
			Arc::new(Self {
				replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
				prompts: Mutex::default(),
			})
		}
	}

	#[async_trait]
	impl LanguageModel for Scripted {
		async fn complete(&self, prompt: &str) -> Result<String> {
			self.prompts.lock().unwrap().push(prompt.to_string());
			Ok(self.replies.lock().unwrap().pop().unwrap_or_default())
		}
	}

	fn question_screen(url: &str, question: &str, options: &[&str]) -> Screen {
		let radios = selectors::quiz_radios();
		let screen = Screen::new(url)
			.with(selectors::quiz_heading(), FakeElement::shown().text("TEST YOUR KNOWLEDGE!"))
			.with(selectors::quiz_prompt(), FakeElement::shown().text(question))
			.with(radios.clone(), FakeElement::shown().times(options.len()));
		options.iter().enumerate().fold(screen, |s, (i, label)| {
			s.with(radios.nth(i), FakeElement::shown())
				.with(selectors::quiz_option_label(&radios.nth(i)), FakeElement::shown().text(*label))
		})
	}

	fn with_complete(screen: Screen) -> Screen {
		screen.with(selectors::complete_button(), FakeElement::shown()).with(selectors::confirm_yes(), FakeElement::shown())
	}

	fn answerer(model: Arc<Scripted>) -> QuizAnswerer {
		QuizAnswerer::new(model, FallbackTable::default())
	}

	#[tokio::test(start_paused = true)]
	async fn reads_question_and_options() {
		let page = FakePage::new(vec![question_screen("https://q", "Q1", &["A", "B", "C"])]);
		let question = extract_question(&page).await.unwrap().unwrap();
		assert_eq!(question.text, "Q1");
		assert_eq!(question.options.iter().map(|o| o.text.as_str()).collect::<Vec<_>>(), vec!["A", "B", "C"]);
		assert_eq!(question.options[2].control, selectors::quiz_radios().nth(2));
	}

	#[tokio::test(start_paused = true)]
	async fn picks_model_answer_then_completes() {
		let page = FakePage::new(vec![with_complete(question_screen("https://q", "Q1", &["A", "B", "C"]))]);
		let model = Scripted::new(&[r#"{"answer_index":2,"reason":"because"}"#]);
		let answerer = answerer(model.clone());

		let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, Some("slide text")).await;

		assert_eq!(report, QuizReport { answered: 1, completed: true, aborted: false });
		assert_eq!(page.clicks(), vec![selectors::quiz_radios().nth(1), selectors::complete_button(), selectors::confirm_yes()]);
		assert!(model.prompts.lock().unwrap()[0].contains("Context: slide text"));
	}

	#[tokio::test(start_paused = true)]
	async fn next_leads_to_following_question() {
		let first = question_screen("https://q/1", "Q1", &["A", "B"])
			.with(selectors::quiz_next(), FakeElement::shown())
			.advance_on(selectors::quiz_next());
		let second = with_complete(question_screen("https://q/2", "Q2", &["C", "D"]));
		let page = FakePage::new(vec![first, second]);
		let answerer = answerer(Scripted::new(&[r#"{"answer_index":1}"#, "```json\n{\"answer_index\":2}\n```"]));

		let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, None).await;

		assert_eq!(report.answered, 2);
		assert!(report.completed);
		assert_eq!(page.clicks()[..3], [selectors::quiz_radios().nth(0), selectors::quiz_next(), selectors::quiz_radios().nth(1)]);
	}

	#[tokio::test(start_paused = true)]
	async fn next_that_goes_nowhere_ends_quiz() {
		let screen = with_complete(question_screen("https://q", "Q1", &["A", "B"])).with(selectors::quiz_next(), FakeElement::shown());
		let page = FakePage::new(vec![screen]);
		let model = Scripted::new(&[r#"{"answer_index":2}"#, r#"{"answer_index":2}"#]);
		let answerer = answerer(model.clone());

		let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, None).await;

		assert_eq!(report, QuizReport { answered: 1, completed: true, aborted: false });
		assert_eq!(model.prompts.lock().unwrap().len(), 1);
		assert_eq!(
			page.clicks(),
			vec![selectors::quiz_radios().nth(1), selectors::quiz_next(), selectors::complete_button(), selectors::confirm_yes()]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn out_of_range_answers_click_nothing() {
		for reply in [r#"{"answer_index":0}"#, r#"{"answer_index":4}"#] {
			let page = FakePage::new(vec![with_complete(question_screen("https://q", "Q1", &["A", "B", "C"]))]);
			let answerer = answerer(Scripted::new(&[reply]));

			let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, None).await;

			assert!(report.aborted, "{reply}");
			assert!(!report.completed);
			assert!(page.clicks().is_empty(), "{reply}");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn garbage_reply_uses_fallback() {
		let page = FakePage::new(vec![question_screen("https://q", "Q1", &["A", "B", "C"])]);
		let answerer = answerer(Scripted::new(&["B, definitely"]));

		let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, None).await;

		assert_eq!(report.answered, 1);
		assert_eq!(page.clicks()[0], selectors::quiz_radios().nth(0));
	}

	#[tokio::test(start_paused = true)]
	async fn no_quiz_goes_straight_to_completion() {
		let page = FakePage::new(vec![with_complete(Screen::new("https://q"))]);
		let model = Scripted::new(&[]);
		let answerer = answerer(model.clone());

		let report = QuizSolver::new(&answerer, Timeouts::default()).run(&page, None).await;

		assert_eq!(report, QuizReport { answered: 0, completed: true, aborted: false });
		assert!(model.prompts.lock().unwrap().is_empty());
	}
}
