use std::{io::Write as _, path::PathBuf, sync::Arc, time::Duration};

use alx_headless::{
	config::AppConfig,
	driver::{PageDriver, chromium::ChromiumPage},
	extract::Extractor,
	llm::{FallbackTable, GeminiClient, QuizAnswerer},
	login::{self, Portal},
	runner::{Runner, run_stop_hook},
	selectors,
	slides::{GoogleOAuth, SlidesClient},
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "alx_headless")]
#[command(about = "Works through ALX eHub lessons: transcripts, slides, quizzes and completion", long_about = None)]
struct Args {
	/// Run with visible browser window (the default unless the config says otherwise)
	#[arg(long, conflicts_with = "headless")]
	visible: bool,

	/// Run without a browser window
	#[arg(long)]
	headless: bool,

	/// Config file (default: <config dir>/alx_headless/config.toml)
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Lessons to work through per run
	#[arg(short = 'n', long)]
	max_pages: Option<usize>,

	/// Course link to open from the eHub dashboard
	#[arg(long)]
	course: Option<String>,

	/// First lesson URL, instead of prompting for it
	url: Option<String>,
}

impl Args {
	fn apply(&self, config: &mut AppConfig) {
		if self.visible {
			config.visible = true;
		}
		if self.headless {
			config.visible = false;
		}
		if let Some(n) = self.max_pages {
			config.max_pages = n;
		}
		if let Some(course) = &self.course {
			config.course_name = course.clone();
		}
	}
}

fn browser_config(config: &AppConfig) -> Result<BrowserConfig> {
	// Same-process iframes, so the player frame has an execution context on the main target
	let mut builder = BrowserConfig::builder()
		.window_size(1920, 1080)
		.viewport(None)
		.arg("--disable-features=IsolateOrigins,site-per-process")
		.arg("--disable-site-isolation-trials");
	if config.visible {
		builder = builder.with_head();
	}
	if let Some(dir) = &config.user_data_dir {
		builder = builder.user_data_dir(dir);
	}
	builder.build().map_err(|e| eyre!("Failed to build browser config: {}", e))
}

/// Slides need the OAuth client secret; without it slide lessons are skipped
async fn slides_client(config: &AppConfig) -> Option<SlidesClient> {
	if !config.google_credentials.exists() {
		warn!("{} not found, slide extraction disabled", config.google_credentials.display());
		return None;
	}
	match GoogleOAuth::new(&config.google_credentials, &config.google_token_cache).await {
		Ok(auth) => Some(SlidesClient::new(Arc::new(auth))),
		Err(e) => {
			warn!("Slide extraction disabled: {}", e);
			None
		}
	}
}

/// Log in, open the course tab, then serve lesson URLs until the user quits
async fn session(browser: &Browser, runner: &Runner, mut first_url: Option<String>) -> Result<()> {
	let config = runner.config();
	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;
	let start = ChromiumPage::new(page);

	for portal in [Portal::Admissions, Portal::Ehub] {
		login::login(&start, portal, &config.email, &config.password, config.timeouts.login(), &config.output_dir).await;
	}

	let course = selectors::course_link(&config.course_name);
	info!("Opening course '{}'...", config.course_name);
	let opened = match start.wait_visible(&course, config.timeouts.new_tab()).await {
		Ok(true) => start.follow_into_new_tab(browser, &course, config.timeouts.new_tab()).await,
		Ok(false) => Err(eyre!("course link '{}' not found", config.course_name)),
		Err(e) => Err(e),
	};
	let page = match opened {
		Ok(tab) => {
			info!("Switched to course tab: {}", tab.url().await.unwrap_or_default());
			tab
		}
		Err(e) => {
			warn!("Could not open the course tab, continuing on the current page: {}", e);
			start
		}
	};

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		let url = match first_url.take() {
			Some(url) => url,
			None => {
				print!("\nEnter the lesson URL to begin automation (or 'q' to quit): ");
				std::io::stdout().flush()?;
				match lines.next_line().await? {
					Some(line) => line.trim().to_string(),
					None => break,
				}
			}
		};
		if url.eq_ignore_ascii_case("q") {
			break;
		}
		if url.is_empty() {
			continue;
		}
		if let Err(e) = runner.run(&page, &url).await {
			error!("Run starting at {} failed: {}", url, e);
		}
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let args = Args::parse();
	let mut config = AppConfig::load(args.config.as_deref())?;
	args.apply(&mut config);
	config.validate()?;
	info!("Visible mode: {}", config.visible);

	let model = GeminiClient::new(
		config.gemini_api_key.clone(),
		config.gemini_model.clone(),
		config.api_retries,
		Duration::from_millis(config.api_retry_delay_ms),
	);
	let answerer = QuizAnswerer::new(Arc::new(model), FallbackTable::default());
	let extractor = Extractor::new(slides_client(&config).await, config.timeouts);
	let runner = Runner::new(extractor, answerer, config.clone());

	// Launch browser
	let (mut browser, mut handler) = Browser::launch(browser_config(&config)?).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {
			// Silently consume events to prevent the browser from hanging
		}
	});

	let outcome = tokio::select! {
		result = session(&browser, &runner, args.url.clone()) => result,
		_ = tokio::signal::ctrl_c() => {
			warn!("Interrupted, aborting the run");
			run_stop_hook(&config, "Interrupted by user");
			Ok(())
		}
	};

	info!("Closing browser...");
	if let Err(e) = browser.close().await {
		warn!("Failed to close browser: {}", e);
	}
	handle.abort();

	outcome
}
