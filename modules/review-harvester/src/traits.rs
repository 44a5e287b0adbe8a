// Trait abstractions for the rendering surface the harvester drives.
//
// RenderSurface opens sessions; Session is everything the harvester is
// allowed to do to a loaded page: locate, click, read text and attributes,
// run the scroll script, and report its address.
//
// The WebDriver adapter (webdriver.rs) is the production implementation;
// testing.rs provides a scripted in-memory document for deterministic tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Locating
// ---------------------------------------------------------------------------

/// What "found" means for a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateKind {
    /// The node exists in the document.
    Present,
    /// The node exists, is displayed, and is enabled.
    Clickable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    XPath(String),
    Css(String),
}

impl Selector {
    pub fn xpath(expr: &str) -> Self {
        Selector::XPath(expr.to_string())
    }

    pub fn css(expr: &str) -> Self {
        Selector::Css(expr.to_string())
    }

    pub fn expr(&self) -> &str {
        match self {
            Selector::XPath(e) | Selector::Css(e) => e,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::XPath(e) => write!(f, "xpath:{e}"),
            Selector::Css(e) => write!(f, "css:{e}"),
        }
    }
}

/// One attempt in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub kind: LocateKind,
    pub selector: Selector,
    pub timeout: Duration,
}

impl Strategy {
    pub fn present(selector: Selector, timeout: Duration) -> Self {
        Self {
            kind: LocateKind::Present,
            selector,
            timeout,
        }
    }

    pub fn clickable(selector: Selector, timeout: Duration) -> Self {
        Self {
            kind: LocateKind::Clickable,
            selector,
            timeout,
        }
    }
}

/// Opaque handle to a node in the session's document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub String);

/// Where a lookup starts.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Document,
    Node(&'a NodeHandle),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Session: Send + Sync {
    /// Wait up to `strategy.timeout` for a node satisfying `strategy.kind`.
    /// `Ok(None)` means the wait expired; `Err` is a transport failure.
    async fn locate(&self, strategy: &Strategy, scope: Scope<'_>) -> Result<Option<NodeHandle>>;

    /// Every node currently matching, without waiting.
    async fn locate_all(&self, selector: &Selector, scope: Scope<'_>) -> Result<Vec<NodeHandle>>;

    async fn click(&self, node: &NodeHandle) -> Result<()>;

    async fn text(&self, node: &NodeHandle) -> Result<String>;

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>>;

    /// Run a script with node arguments (`arguments[0]`, ...).
    async fn run_script(&self, script: &str, args: &[NodeHandle]) -> Result<()>;

    async fn current_address(&self) -> Result<String>;

    /// Release the session. Must tolerate being called more than once.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Open a session already navigated to `address`.
    async fn open_session(&self, address: &str) -> Result<Arc<dyn Session>>;
}
