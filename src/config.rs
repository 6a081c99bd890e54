use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::llm::DEFAULT_MODEL;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	/// Login for both portals (env: `ALX_EMAIL`)
	#[serde(default)]
	pub email: String,
	/// env: `ALX_PASSWORD`
	#[serde(default)]
	pub password: String,
	/// env: `GEMINI_API_KEY`
	#[serde(default)]
	pub gemini_api_key: String,
	#[serde(default = "default_gemini_model")]
	pub gemini_model: String,
	/// Link text of the course on the eHub dashboard
	#[serde(default = "default_course_name")]
	pub course_name: String,
	/// Lessons processed per run before asking for a new URL (default: 1)
	#[serde(default = "default_max_pages")]
	pub max_pages: usize,
	/// Run with visible browser window (default: true)
	#[serde(default = "default_visible")]
	pub visible: bool,
	/// Persistent browser profile, keeps portal sessions across runs
	#[serde(default)]
	pub user_data_dir: Option<PathBuf>,
	/// Root for `slides/` and `transcripts/` output (default: current dir)
	#[serde(default = "default_output_dir")]
	pub output_dir: PathBuf,
	/// OAuth client secret for the Slides API. Slides are skipped when it is missing.
	#[serde(default = "default_google_credentials")]
	pub google_credentials: PathBuf,
	#[serde(default = "default_google_token_cache")]
	pub google_token_cache: PathBuf,
	/// Command to run on completion/error (receives message as argument)
	#[serde(default)]
	pub stop_hook: Option<String>,
	/// Number of retries for transient API errors (500, rate limit, etc) (default: 3)
	#[serde(default = "default_api_retries")]
	pub api_retries: u32,
	/// Base delay in ms between API retries, multiplied by attempt number (default: 1000)
	#[serde(default = "default_api_retry_delay_ms")]
	pub api_retry_delay_ms: u64,
	/// Dump page HTML when a lesson fails
	#[serde(default)]
	pub save_snapshots: bool,
	#[serde(default)]
	pub timeouts: Timeouts,
}

fn default_gemini_model() -> String {
	DEFAULT_MODEL.to_string()
}

fn default_course_name() -> String {
	"Data Analytics".to_string()
}

fn default_max_pages() -> usize {
	1
}

fn default_visible() -> bool {
	true
}

fn default_output_dir() -> PathBuf {
	PathBuf::from(".")
}

fn default_google_credentials() -> PathBuf {
	PathBuf::from("credentials.json")
}

fn default_google_token_cache() -> PathBuf {
	PathBuf::from("token.json")
}

fn default_api_retries() -> u32 {
	3
}

fn default_api_retry_delay_ms() -> u64 {
	1000
}

/// Bounded waits, all in milliseconds
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Timeouts {
	pub quiz_detect_ms: u64,
	pub confirm_dialog_ms: u64,
	pub caption_ms: u64,
	pub cc_button_ms: u64,
	pub dom_ready_ms: u64,
	pub login_ms: u64,
	pub new_tab_ms: u64,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			quiz_detect_ms: 5_000,
			confirm_dialog_ms: 5_000,
			caption_ms: 30_000,
			cc_button_ms: 10_000,
			dom_ready_ms: 15_000,
			login_ms: 30_000,
			new_tab_ms: 7_000,
		}
	}
}

impl Timeouts {
	pub fn quiz_detect(&self) -> Duration {
		Duration::from_millis(self.quiz_detect_ms)
	}

	pub fn confirm_dialog(&self) -> Duration {
		Duration::from_millis(self.confirm_dialog_ms)
	}

	pub fn caption(&self) -> Duration {
		Duration::from_millis(self.caption_ms)
	}

	pub fn cc_button(&self) -> Duration {
		Duration::from_millis(self.cc_button_ms)
	}

	pub fn dom_ready(&self) -> Duration {
		Duration::from_millis(self.dom_ready_ms)
	}

	pub fn login(&self) -> Duration {
		Duration::from_millis(self.login_ms)
	}

	pub fn new_tab(&self) -> Duration {
		Duration::from_millis(self.new_tab_ms)
	}
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			email: String::new(),
			password: String::new(),
			gemini_api_key: String::new(),
			gemini_model: default_gemini_model(),
			course_name: default_course_name(),
			max_pages: default_max_pages(),
			visible: default_visible(),
			user_data_dir: None,
			output_dir: default_output_dir(),
			google_credentials: default_google_credentials(),
			google_token_cache: default_google_token_cache(),
			stop_hook: None,
			api_retries: default_api_retries(),
			api_retry_delay_ms: default_api_retry_delay_ms(),
			save_snapshots: false,
			timeouts: Timeouts::default(),
		}
	}
}

impl AppConfig {
	/// Read `path`, or the per-user config file when it exists, then overlay the environment.
	///
	/// Variables from a `.env` in the working directory count as environment.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		dotenv::dotenv().ok();

		let path = path.map(Path::to_path_buf).or_else(|| dirs::config_dir().map(|d| d.join("alx_headless").join("config.toml")).filter(|p| p.exists()));
		let mut config = match path {
			Some(path) => {
				info!("Loading config from {}", path.display());
				let raw = std::fs::read_to_string(&path).map_err(|e| eyre!("Failed to read config {}: {}", path.display(), e))?;
				toml::from_str(&raw).map_err(|e| eyre!("Failed to parse config {}: {}", path.display(), e))?
			}
			None => {
				debug!("No config file, using defaults and environment");
				AppConfig::default()
			}
		};
		config.apply_env(|key| std::env::var(key).ok());
		Ok(config)
	}

	/// Non-empty environment values win over the file
	fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
		let var = |key: &str| var(key).filter(|v| !v.is_empty());
		if let Some(email) = var("ALX_EMAIL") {
			self.email = email;
		}
		if let Some(password) = var("ALX_PASSWORD") {
			self.password = password;
		}
		if let Some(key) = var("GEMINI_API_KEY") {
			self.gemini_api_key = key;
		}
	}

	/// Fail fast on anything the run cannot do without
	pub fn validate(&self) -> Result<()> {
		let missing: Vec<&str> = [("ALX_EMAIL", &self.email), ("ALX_PASSWORD", &self.password), ("GEMINI_API_KEY", &self.gemini_api_key)]
			.into_iter()
			.filter(|(_, v)| v.trim().is_empty())
			.map(|(k, _)| k)
			.collect();
		if !missing.is_empty() {
			bail!("Missing required credentials: {}", missing.join(", "));
		}
		if !(15_000..=30_000).contains(&self.timeouts.caption_ms) {
			bail!("timeouts.caption_ms must be between 15000 and 30000, got {}", self.timeouts.caption_ms);
		}
		if self.max_pages == 0 {
			bail!("max_pages must be at least 1");
		}
		Ok(())
	}
}
