use std::{path::Path, time::Duration};

use color_eyre::{Result, eyre::bail};
use tracing::{error, info};

use crate::{
	driver::{Locator, POLL_INTERVAL, PageDriver},
	selectors::{ADMISSIONS_LOGIN_URL, EHUB_LOGIN_URL},
};

/// The two sites a session has to be signed into
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Portal {
	Admissions,
	Ehub,
}

impl Portal {
	pub fn name(&self) -> &'static str {
		match self {
			Portal::Admissions => "admissions",
			Portal::Ehub => "ehub",
		}
	}

	pub fn login_url(&self) -> &'static str {
		match self {
			Portal::Admissions => ADMISSIONS_LOGIN_URL,
			Portal::Ehub => EHUB_LOGIN_URL,
		}
	}

	/// Present in the URL for as long as we are on the sign-in form
	pub fn login_marker(&self) -> &'static str {
		match self {
			Portal::Admissions => "sign_in",
			Portal::Ehub => "login",
		}
	}

	pub fn email_field(&self) -> Locator {
		match self {
			Portal::Admissions => Locator::css("#user_email"),
			Portal::Ehub => Locator::css("input[placeholder='Enter your email']"),
		}
	}

	pub fn password_field(&self) -> Locator {
		match self {
			Portal::Admissions => Locator::css("#user_password"),
			Portal::Ehub => Locator::css("input[placeholder='Enter your password']"),
		}
	}

	pub fn submit(&self) -> Locator {
		match self {
			Portal::Admissions => Locator::css("input[name='commit']"),
			Portal::Ehub => Locator::css_text("button", "Sign in"),
		}
	}

	/// The eHub app renders its form well after DOM ready
	fn settle(&self) -> Duration {
		match self {
			Portal::Admissions => Duration::from_secs(1),
			Portal::Ehub => Duration::from_secs(2),
		}
	}

	pub fn error_screenshot(&self) -> String {
		format!("{}_login_error.png", self.name())
	}
}

/// Sign into `portal`, unless the session already is.
///
/// A failed login is logged and leaves `<portal>_login_error.png` in `screenshot_dir`; it never errors.
pub async fn login<P: PageDriver + ?Sized>(page: &P, portal: Portal, email: &str, password: &str, timeout: Duration, screenshot_dir: &Path) -> bool {
	match try_login(page, portal, email, password, timeout).await {
		Ok(()) => true,
		Err(e) => {
			let url = page.url().await.unwrap_or_default();
			error!("{} login failed at {}: {}", portal.name(), url, e);
			let shot = screenshot_dir.join(portal.error_screenshot());
			if let Err(e) = page.screenshot(&shot).await {
				error!("Failed to save login screenshot: {}", e);
			}
			false
		}
	}
}

async fn try_login<P: PageDriver + ?Sized>(page: &P, portal: Portal, email: &str, password: &str, timeout: Duration) -> Result<()> {
	info!("Navigating to {}...", portal.login_url());
	page.goto(portal.login_url()).await?;
	page.wait_for_dom_ready(timeout).await?;
	tokio::time::sleep(portal.settle()).await;

	let url = page.url().await?;
	if !url.contains(portal.login_marker()) {
		info!("Already logged into {}, at {}", portal.name(), url);
		return Ok(());
	}

	info!("{} login page detected, logging in...", portal.name());
	page.fill(&portal.email_field(), email).await?;
	page.fill(&portal.password_field(), password).await?;
	page.click(&portal.submit()).await?;

	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		let url = page.url().await?;
		if !url.contains(portal.login_marker()) {
			info!("{} login successful, now at {}", portal.name(), url);
			return Ok(());
		}
		if tokio::time::Instant::now() >= deadline {
			bail!("still on the sign-in page after {}s", timeout.as_secs());
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}
