//! Marking a lesson complete and moving on to the next one

use std::time::Duration;

use color_eyre::Result;
use tracing::{debug, error, info, warn};

use crate::{config::Timeouts, driver::PageDriver, selectors};

/// Click "Set as Complete" and get through the confirmation dialog.
///
/// `false` when no completion control is shown or a click fails. Never errors.
pub async fn complete<P: PageDriver + ?Sized>(page: &P, timeouts: &Timeouts) -> bool {
	match try_complete(page, timeouts).await {
		Ok(done) => done,
		Err(e) => {
			let url = page.url().await.unwrap_or_default();
			error!("Failed to mark {} complete: {}", url, e);
			false
		}
	}
}

async fn try_complete<P: PageDriver + ?Sized>(page: &P, timeouts: &Timeouts) -> Result<bool> {
	// Usually styled as a link, sometimes a plain button
	let control = if page.is_visible(&selectors::complete_link()).await? {
		selectors::complete_link()
	} else if page.is_visible(&selectors::complete_button()).await? {
		selectors::complete_button()
	} else {
		warn!("'{}' not found", selectors::COMPLETE_LABEL);
		return Ok(false);
	};

	info!("Clicking '{}'", selectors::COMPLETE_LABEL);
	page.click(&control).await?;
	Ok(confirm(page, timeouts.confirm_dialog()).await)
}

/// Accept the completion dialog if it shows up within `timeout`.
///
/// The platform sometimes skips the dialog, so its absence counts as success.
pub async fn confirm<P: PageDriver + ?Sized>(page: &P, timeout: Duration) -> bool {
	let yes = selectors::confirm_yes();
	match page.wait_visible(&yes, timeout).await {
		Ok(true) => {}
		Ok(false) => {
			info!("No confirmation dialog, assuming the lesson is complete");
			return true;
		}
		Err(e) => {
			warn!("Could not check for confirmation dialog, assuming the lesson is complete: {}", e);
			return true;
		}
	}
	match page.click(&yes).await {
		Ok(()) => {
			info!("Lesson marked as complete");
			true
		}
		Err(e) => {
			error!("Failed to confirm completion: {}", e);
			false
		}
	}
}

/// Follow "Next ⇒" and wait for the next lesson's DOM
pub async fn advance<P: PageDriver + ?Sized>(page: &P, timeouts: &Timeouts) -> bool {
	match try_advance(page, timeouts).await {
		Ok(true) => {
			info!("Navigated to next lesson: {}", page.url().await.unwrap_or_default());
			true
		}
		Ok(false) => {
			warn!("'Next ⇒' not found. End of lessons or unexpected layout.");
			false
		}
		Err(e) => {
			error!("Failed to go to the next lesson: {}", e);
			false
		}
	}
}

async fn try_advance<P: PageDriver + ?Sized>(page: &P, timeouts: &Timeouts) -> Result<bool> {
	let next = selectors::next_lesson();
	if !page.is_visible(&next).await? {
		return Ok(false);
	}
	page.click(&next).await?;
	page.wait_for_dom_ready(timeouts.dom_ready()).await?;
	Ok(true)
}

/// Debug probe: which of the lesson controls are currently shown
pub async fn report_controls<P: PageDriver + ?Sized>(page: &P) {
	let probes = [
		("Set as Complete", selectors::complete_link()),
		("Next ⇒", selectors::next_lesson()),
		("confirmation Yes", selectors::confirm_yes()),
	];
	for (name, locator) in probes {
		match page.is_visible(&locator).await {
			Ok(true) => debug!("'{}' control found", name),
			Ok(false) => debug!("'{}' control not found", name),
			Err(e) => debug!("'{}' control probe failed: {}", name, e),
		}
	}
}
