// WebDriver-backed rendering surface.
//
// Maps the Session trait onto webdriver-client: strategy waits become a
// find-and-check poll until the strategy's timeout, handles are WebDriver
// element references, and close deletes the remote session exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use webdriver_client::{ElementId, Using, WebDriverClient, WebDriverError, WebDriverSession};

use crate::traits::{LocateKind, NodeHandle, RenderSurface, Scope, Selector, Session, Strategy};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct WebDriverSurface {
    client: WebDriverClient,
    poll_interval: Duration,
}

impl WebDriverSurface {
    pub fn new(client: WebDriverClient) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[async_trait]
impl RenderSurface for WebDriverSurface {
    async fn open_session(&self, address: &str) -> Result<Arc<dyn Session>> {
        let session = self.client.new_session().await?;
        if let Err(e) = session.navigate(address).await {
            warn!(session_id = session.id(), error = %e, "Navigation failed, deleting session");
            if let Err(close_err) = session.delete().await {
                warn!(session_id = session.id(), error = %close_err, "Session delete failed");
            }
            return Err(e.into());
        }
        debug!(session_id = session.id(), address, "Session navigated");
        Ok(Arc::new(DriverSession {
            inner: session,
            poll_interval: self.poll_interval,
            closed: AtomicBool::new(false),
        }))
    }
}

struct DriverSession {
    inner: WebDriverSession,
    poll_interval: Duration,
    closed: AtomicBool,
}

fn using(selector: &Selector) -> (Using, &str) {
    match selector {
        Selector::XPath(expr) => (Using::XPath, expr),
        Selector::Css(expr) => (Using::Css, expr),
    }
}

fn element(node: &NodeHandle) -> ElementId {
    ElementId(node.0.clone())
}

fn parent(scope: Scope<'_>) -> Option<ElementId> {
    match scope {
        Scope::Document => None,
        Scope::Node(node) => Some(element(node)),
    }
}

impl DriverSession {
    async fn satisfies(&self, el: &ElementId, kind: LocateKind) -> webdriver_client::Result<bool> {
        match kind {
            LocateKind::Present => Ok(true),
            LocateKind::Clickable => {
                Ok(self.inner.is_displayed(el).await? && self.inner.is_enabled(el).await?)
            }
        }
    }

    /// One find-and-check attempt. Stale references count as not found.
    async fn attempt(
        &self,
        strategy: &Strategy,
        parent: Option<&ElementId>,
    ) -> webdriver_client::Result<Option<ElementId>> {
        let (using, expr) = using(&strategy.selector);
        let Some(el) = self.inner.find(using, expr, parent).await? else {
            return Ok(None);
        };
        match self.satisfies(&el, strategy.kind).await {
            Ok(true) => Ok(Some(el)),
            Ok(false) => Ok(None),
            Err(e) if e.is_missing_element() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Session for DriverSession {
    async fn locate(&self, strategy: &Strategy, scope: Scope<'_>) -> Result<Option<NodeHandle>> {
        let parent = parent(scope);
        let deadline = Instant::now() + strategy.timeout;
        loop {
            if let Some(el) = self.attempt(strategy, parent.as_ref()).await? {
                return Ok(Some(NodeHandle(el.0)));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn locate_all(&self, selector: &Selector, scope: Scope<'_>) -> Result<Vec<NodeHandle>> {
        let (using, expr) = using(selector);
        let parent = parent(scope);
        let found = self.inner.find_all(using, expr, parent.as_ref()).await?;
        Ok(found.into_iter().map(|el| NodeHandle(el.0)).collect())
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        Ok(self.inner.click(&element(node)).await?)
    }

    async fn text(&self, node: &NodeHandle) -> Result<String> {
        Ok(self.inner.text(&element(node)).await?)
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        match self.inner.attribute(&element(node), name).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_missing_element() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_script(&self, script: &str, args: &[NodeHandle]) -> Result<()> {
        let args: Vec<ElementId> = args.iter().map(element).collect();
        self.inner.execute(script, &args).await?;
        Ok(())
    }

    async fn current_address(&self) -> Result<String> {
        Ok(self.inner.current_url().await?)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.inner.delete().await {
            Ok(()) => {
                debug!(session_id = self.inner.id(), "Session deleted");
                Ok(())
            }
            // Already gone on the remote end.
            Err(WebDriverError::Protocol { status: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_map_to_locator_strategies() {
        let xpath = Selector::xpath("//div[@data-review-id]");
        assert_eq!(using(&xpath), (Using::XPath, "//div[@data-review-id]"));
        let css = Selector::css("h1.DUwDvf");
        assert_eq!(using(&css), (Using::Css, "h1.DUwDvf"));
    }

    #[test]
    fn scope_becomes_parent_reference() {
        assert!(parent(Scope::Document).is_none());
        let node = NodeHandle("abc-123".to_string());
        assert_eq!(parent(Scope::Node(&node)), Some(ElementId("abc-123".to_string())));
    }
}
