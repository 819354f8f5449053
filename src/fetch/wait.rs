//! Post-navigation wait dispatch
//!
//! A pure dispatcher over the driver's primitives; it never touches the
//! network or the cache itself.

use std::time::Duration;
use tracing::warn;

use crate::browser::{BrowserPage, DriverError, NavigateUntil};

use super::types::WaitStrategy;

/// The milestone `navigate` should resolve at for a given strategy.
///
/// Only `domcontentloaded` resolves early; every other strategy waits for
/// the load event first and layers its own condition on top.
pub fn navigate_milestone(strategy: WaitStrategy) -> NavigateUntil {
    match strategy {
        WaitStrategy::Domcontentloaded => NavigateUntil::DomContentLoaded,
        _ => NavigateUntil::Load,
    }
}

/// Apply a wait strategy to a freshly navigated page.
pub async fn apply_wait(
    page: &mut dyn BrowserPage,
    strategy: WaitStrategy,
    selector: Option<&str>,
    timeout: Duration,
    settle: Duration,
) -> Result<(), DriverError> {
    match strategy {
        // Both milestones were already honored during navigation.
        WaitStrategy::Load | WaitStrategy::Domcontentloaded => Ok(()),
        WaitStrategy::Networkidle => page.wait_for_network_idle(timeout).await,
        WaitStrategy::Selector => match selector {
            Some(selector) => page.wait_for_selector(selector, timeout).await,
            None => {
                warn!("selector wait strategy used without a selector");
                Ok(())
            }
        },
        WaitStrategy::Timeout => {
            tokio::time::sleep(settle).await;
            Ok(())
        }
    }
}
