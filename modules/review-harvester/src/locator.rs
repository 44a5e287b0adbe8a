//! Ordered-fallback node resolution.
//!
//! A `LocatorChain` is tried strategy by strategy; each strategy gets its own
//! wait. A miss on every strategy is `None`, which callers treat as a default
//! for optional elements and as fatal (via [`require`]) for navigation.

use tracing::{debug, warn};

use harvest_common::HarvestError;

use crate::traits::{NodeHandle, Scope, Selector, Session, Strategy};

#[derive(Debug, Clone)]
pub struct LocatorChain {
    pub name: String,
    pub strategies: Vec<Strategy>,
}

impl LocatorChain {
    pub fn new(name: &str, strategies: Vec<Strategy>) -> Self {
        Self {
            name: name.to_string(),
            strategies,
        }
    }

    pub fn contains(&self, selector: &Selector) -> bool {
        self.strategies.iter().any(|s| &s.selector == selector)
    }
}

/// Presence check: first strategy that resolves wins. Leaves the page untouched.
pub async fn resolve(
    session: &dyn Session,
    chain: &LocatorChain,
    scope: Scope<'_>,
) -> Option<NodeHandle> {
    for (i, strategy) in chain.strategies.iter().enumerate() {
        match session.locate(strategy, scope).await {
            Ok(Some(node)) => {
                debug!(chain = chain.name.as_str(), strategy = i, selector = %strategy.selector, "Resolved");
                return Some(node);
            }
            Ok(None) => {
                debug!(chain = chain.name.as_str(), strategy = i, selector = %strategy.selector, "Strategy missed");
            }
            Err(e) => {
                debug!(chain = chain.name.as_str(), strategy = i, error = %e, "Strategy failed");
            }
        }
    }
    None
}

/// Click action: resolve, then click. A node that resolves but refuses the
/// click counts as a miss and the next strategy is tried.
pub async fn resolve_and_click(
    session: &dyn Session,
    chain: &LocatorChain,
    scope: Scope<'_>,
) -> Option<NodeHandle> {
    for (i, strategy) in chain.strategies.iter().enumerate() {
        let node = match session.locate(strategy, scope).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                debug!(chain = chain.name.as_str(), strategy = i, selector = %strategy.selector, "Strategy missed");
                continue;
            }
            Err(e) => {
                debug!(chain = chain.name.as_str(), strategy = i, error = %e, "Strategy failed");
                continue;
            }
        };
        match session.click(&node).await {
            Ok(()) => {
                debug!(chain = chain.name.as_str(), strategy = i, selector = %strategy.selector, "Clicked");
                return Some(node);
            }
            Err(e) => {
                warn!(chain = chain.name.as_str(), strategy = i, error = %e, "Resolved but click failed");
            }
        }
    }
    None
}

/// Promote a miss on a navigational chain to a fatal error.
pub fn require(chain: &LocatorChain, found: Option<NodeHandle>) -> Result<NodeHandle, HarvestError> {
    found.ok_or_else(|| HarvestError::NavigationNotFound(chain.name.clone()))
}

/// Immediate lookup of a field inside an item. Transport errors propagate;
/// absence is `None`.
pub async fn find_in(
    session: &dyn Session,
    item: &NodeHandle,
    selector: &Selector,
) -> anyhow::Result<Option<NodeHandle>> {
    let strategy = Strategy::present(selector.clone(), std::time::Duration::ZERO);
    session.locate(&strategy, Scope::Node(item)).await
}

/// Text of a field inside an item, trimmed; `None` when absent or blank.
pub async fn text_in(
    session: &dyn Session,
    item: &NodeHandle,
    selector: &Selector,
) -> anyhow::Result<Option<String>> {
    let Some(node) = find_in(session, item, selector).await? else {
        return Ok(None);
    };
    let text = session.text(&node).await?;
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPage, MockSurface};
    use crate::traits::RenderSurface;
    use harvest_common::HarvestConfig;
    use std::time::Duration;

    fn chain(exprs: &[&str]) -> LocatorChain {
        LocatorChain::new(
            "test chain",
            exprs
                .iter()
                .map(|e| Strategy::present(Selector::xpath(e), Duration::ZERO))
                .collect(),
        )
    }

    #[tokio::test]
    async fn falls_through_to_later_strategy() {
        let config = HarvestConfig::immediate();
        let surface = MockSurface::new(&config, MockPage::default());
        let session = surface.open_session("mock://place").await.unwrap();

        // The profile's subject-name selector is known to the mock; the
        // first strategy here is not.
        let profile = surface.profile().clone();
        let mut fallback = chain(&["//nothing[@here]"]);
        fallback
            .strategies
            .extend(profile.subject_name.strategies.iter().cloned());

        let found = resolve(session.as_ref(), &fallback, Scope::Document).await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn all_strategies_missing_is_none_and_require_errors() {
        let config = HarvestConfig::immediate();
        let surface = MockSurface::new(&config, MockPage::default());
        let session = surface.open_session("mock://place").await.unwrap();

        let missing = chain(&["//a", "//b"]);
        let found = resolve(session.as_ref(), &missing, Scope::Document).await;
        assert!(found.is_none());

        let err = require(&missing, found).unwrap_err();
        assert!(matches!(err, HarvestError::NavigationNotFound(name) if name == "test chain"));
    }

    #[tokio::test]
    async fn click_chain_records_the_click() {
        let config = HarvestConfig::immediate();
        let surface = MockSurface::new(&config, MockPage::default());
        let session = surface.open_session("mock://place").await.unwrap();
        let profile = surface.profile().clone();

        let clicked = resolve_and_click(session.as_ref(), &profile.reviews_tab, Scope::Document).await;
        assert!(clicked.is_some());
        assert!(surface.clicks().iter().any(|c| c == "reviews_tab"));
    }
}
