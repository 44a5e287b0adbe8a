// Test doubles for the harvester.
//
// MockSurface (RenderSurface) opens MockSessions over one scripted document:
// - a listing of MockReviews that grows by `batch` items per scroll
// - optional navigational elements (consent, reviews tab, sort control,
//   lowest-rating option, scroll container)
// - an optional sort that reorders the listing ascending by score
//
// Selectors are mapped to document roles through the SiteProfile, so the
// engine runs unmodified against it. Interactions are recorded for asserts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use harvest_common::HarvestConfig;

use crate::profile::SiteProfile;
use crate::traits::{NodeHandle, RenderSurface, Scope, Selector, Session, Strategy};

// ---------------------------------------------------------------------------
// Scripted content
// ---------------------------------------------------------------------------

/// One review in the scripted listing. Every part is optional.
/// Builder pattern: `MockReview::stars("r1", 2).author("Ana").body("...")`.
#[derive(Debug, Clone, Default)]
pub struct MockReview {
    pub id: Option<String>,
    pub star_label: Option<String>,
    pub fraction: Option<String>,
    pub scan_text: Option<String>,
    pub author: Option<String>,
    pub direct_date: Option<String>,
    pub combined_date: Option<String>,
    pub legacy_date: Option<String>,
    pub body: Option<String>,
    pub expandable: bool,
    /// Every read on this review's fields fails.
    pub broken: bool,
    /// Ordering key used when the page is sorted lowest first.
    pub score_hint: u8,
}

impl MockReview {
    /// Review scored through the labelled star node.
    pub fn stars(id: &str, score: u8) -> Self {
        Self {
            id: Some(id.to_string()),
            star_label: Some(if score == 1 {
                "1 star".to_string()
            } else {
                format!("{score} stars")
            }),
            score_hint: score,
            ..Self::default()
        }
    }

    /// Review scored only through the fractional label ("3/5").
    pub fn fraction(id: &str, fraction: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            fraction: Some(fraction.to_string()),
            score_hint: leading_digit(fraction),
            ..Self::default()
        }
    }

    /// Review scored only through a loose span mentioning "/5".
    pub fn scanned(id: &str, text: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            scan_text: Some(text.to_string()),
            score_hint: leading_digit(text),
            ..Self::default()
        }
    }

    pub fn unscored(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn direct_date(mut self, text: &str) -> Self {
        self.direct_date = Some(text.to_string());
        self
    }

    pub fn combined_date(mut self, text: &str) -> Self {
        self.combined_date = Some(text.to_string());
        self
    }

    pub fn legacy_date(mut self, text: &str) -> Self {
        self.legacy_date = Some(text.to_string());
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Body is truncated until the "see more" control is clicked.
    pub fn expandable(mut self) -> Self {
        self.expandable = true;
        self
    }

    pub fn without_identity(mut self) -> Self {
        self.id = None;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

fn leading_digit(text: &str) -> u8 {
    text.chars()
        .find_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .unwrap_or(0)
}

/// Scripted document. `Default` has every navigational element present and an
/// empty listing.
#[derive(Debug, Clone)]
pub struct MockPage {
    pub reviews: Vec<MockReview>,
    /// Items rendered before the first scroll.
    pub initial: usize,
    /// Items added per scroll.
    pub batch: usize,
    pub has_consent: bool,
    pub has_reviews_tab: bool,
    pub has_sort_control: bool,
    pub has_sort_option: bool,
    /// When false, picking the lowest-rating option succeeds but the order
    /// does not change.
    pub sort_reorders: bool,
    pub has_scroll_container: bool,
    pub subject_name: Option<String>,
    pub average_score: Option<String>,
    pub total_count: Option<String>,
    /// Address the session reports once navigated.
    pub address: String,
    pub fail_open: bool,
    /// Listing enumerations (1-based, counted per surface) that fail.
    pub failing_enumerations: Vec<u32>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            reviews: Vec::new(),
            initial: 10,
            batch: 5,
            has_consent: true,
            has_reviews_tab: true,
            has_sort_control: true,
            has_sort_option: true,
            sort_reorders: true,
            has_scroll_container: true,
            subject_name: Some("Cafe Lumen".to_string()),
            average_score: Some("4.1".to_string()),
            total_count: Some("(312)".to_string()),
            address: "https://maps.example/place/cafe?entry=ttu".to_string(),
            fail_open: false,
            failing_enumerations: Vec::new(),
        }
    }
}

impl MockPage {
    pub fn with_reviews(reviews: Vec<MockReview>) -> Self {
        Self {
            reviews,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Document roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ScoreLabel,
    ScoreFraction,
    ScoreScan,
    Author,
    DateDirect,
    DateCombined,
    DateLegacy,
    Expand,
    Body,
}

impl Field {
    const ALL: [Field; 9] = [
        Field::ScoreLabel,
        Field::ScoreFraction,
        Field::ScoreScan,
        Field::Author,
        Field::DateDirect,
        Field::DateCombined,
        Field::DateLegacy,
        Field::Expand,
        Field::Body,
    ];

    fn name(self) -> &'static str {
        match self {
            Field::ScoreLabel => "score_label",
            Field::ScoreFraction => "score_fraction",
            Field::ScoreScan => "score_scan",
            Field::Author => "author",
            Field::DateDirect => "date_direct",
            Field::DateCombined => "date_combined",
            Field::DateLegacy => "date_legacy",
            Field::Expand => "expand",
            Field::Body => "body",
        }
    }

    fn selector(self, profile: &SiteProfile) -> &Selector {
        match self {
            Field::ScoreLabel => &profile.score_label,
            Field::ScoreFraction => &profile.score_fraction,
            Field::ScoreScan => &profile.score_scan,
            Field::Author => &profile.author,
            Field::DateDirect => &profile.date_direct,
            Field::DateCombined => &profile.date_combined,
            Field::DateLegacy => &profile.date_legacy,
            Field::Expand => &profile.expand,
            Field::Body => &profile.body,
        }
    }

    fn for_selector(profile: &SiteProfile, selector: &Selector) -> Option<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.selector(profile) == selector)
    }

    fn parse(name: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Document-level roles, named as their handles.
const CONSENT: &str = "consent";
const SUBJECT_NAME: &str = "subject_name";
const AVERAGE_SCORE: &str = "average_score";
const TOTAL_COUNT: &str = "total_count";
const REVIEWS_TAB: &str = "reviews_tab";
const SORT_CONTROL: &str = "sort_control";
const SORT_LOWEST: &str = "sort_lowest";
const SCROLL_CONTAINER: &str = "scroll_container";

enum Node {
    Document(String),
    Item(usize),
    Field(usize, Field),
}

fn parse_handle(handle: &NodeHandle) -> Option<Node> {
    let mut parts = handle.0.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("item"), Some(pos), None) => pos.parse().ok().map(Node::Item),
        (Some("item"), Some(pos), Some(field)) => {
            Some(Node::Field(pos.parse().ok()?, Field::parse(field)?))
        }
        (Some(role), None, None) => Some(Node::Document(role.to_string())),
        _ => None,
    }
}

fn item_handle(pos: usize) -> NodeHandle {
    NodeHandle(format!("item/{pos}"))
}

fn field_handle(pos: usize, field: Field) -> NodeHandle {
    NodeHandle(format!("item/{pos}/{}", field.name()))
}

fn truncated(body: &str) -> String {
    let head: String = body.chars().take(12).collect();
    format!("{head}…")
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct MockState {
    page: MockPage,
    /// Display order: position -> index into `page.reviews`.
    order: Vec<usize>,
    loaded: usize,
    sorted: bool,
    sort_menu_open: bool,
    consent_dismissed: bool,
    expanded: HashSet<usize>,
    clicks: Vec<String>,
    scrolls: u32,
    enumerations: u32,
    opened: Vec<String>,
    closes: u32,
}

impl MockState {
    fn review_at(&self, pos: usize) -> Result<&MockReview> {
        if pos >= self.loaded {
            bail!("stale element reference: item/{pos}");
        }
        self.order
            .get(pos)
            .and_then(|&i| self.page.reviews.get(i))
            .ok_or_else(|| anyhow!("stale element reference: item/{pos}"))
    }

    fn document_present(&self, role: &str) -> bool {
        let page = &self.page;
        match role {
            CONSENT => page.has_consent && !self.consent_dismissed,
            SUBJECT_NAME => page.subject_name.is_some(),
            AVERAGE_SCORE => page.average_score.is_some(),
            TOTAL_COUNT => page.total_count.is_some(),
            REVIEWS_TAB => page.has_reviews_tab,
            SORT_CONTROL => page.has_sort_control,
            SORT_LOWEST => page.has_sort_option && self.sort_menu_open,
            SCROLL_CONTAINER => page.has_scroll_container,
            _ => false,
        }
    }

    fn field_value(&self, pos: usize, field: Field) -> Result<Option<String>> {
        let review = self.review_at(pos)?;
        if review.broken {
            bail!("renderer crashed reading item/{pos}");
        }
        let value = match field {
            Field::ScoreLabel => review.star_label.clone(),
            Field::ScoreFraction => review.fraction.clone(),
            Field::ScoreScan => review.scan_text.clone(),
            Field::Author => review.author.clone(),
            Field::DateDirect => review.direct_date.clone(),
            Field::DateCombined => review.combined_date.clone(),
            Field::DateLegacy => review.legacy_date.clone(),
            Field::Expand => {
                let collapsed = review.expandable && !self.expanded.contains(&pos);
                collapsed.then(|| "See more".to_string())
            }
            Field::Body => review.body.as_ref().map(|b| {
                if review.expandable && !self.expanded.contains(&pos) {
                    truncated(b)
                } else {
                    b.clone()
                }
            }),
        };
        Ok(value)
    }

    fn apply_sort(&mut self) {
        self.sort_menu_open = false;
        self.sorted = true;
        if self.page.sort_reorders {
            let reviews = &self.page.reviews;
            self.order.sort_by_key(|&i| reviews[i].score_hint);
        }
    }
}

// ---------------------------------------------------------------------------
// MockSurface
// ---------------------------------------------------------------------------

pub struct MockSurface {
    profile: SiteProfile,
    state: Arc<Mutex<MockState>>,
}

impl MockSurface {
    pub fn new(config: &HarvestConfig, page: MockPage) -> Self {
        let order = (0..page.reviews.len()).collect();
        Self {
            profile: SiteProfile::maps(config),
            state: Arc::new(Mutex::new(MockState {
                page,
                order,
                loaded: 0,
                sorted: false,
                sort_menu_open: false,
                consent_dismissed: false,
                expanded: HashSet::new(),
                clicks: Vec::new(),
                scrolls: 0,
                enumerations: 0,
                opened: Vec::new(),
                closes: 0,
            })),
        }
    }

    /// The profile whose selectors this document answers to.
    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn scrolls(&self) -> u32 {
        self.state.lock().unwrap().scrolls
    }

    pub fn opened_addresses(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn opened_count(&self) -> usize {
        self.state.lock().unwrap().opened.len()
    }

    pub fn closed_count(&self) -> u32 {
        self.state.lock().unwrap().closes
    }

    pub fn sorted(&self) -> bool {
        self.state.lock().unwrap().sorted
    }
}

#[async_trait]
impl RenderSurface for MockSurface {
    async fn open_session(&self, address: &str) -> Result<Arc<dyn Session>> {
        let mut state = self.state.lock().unwrap();
        if state.page.fail_open {
            bail!("session not created: browser unavailable");
        }
        state.opened.push(address.to_string());
        state.loaded = state.page.initial.min(state.page.reviews.len());
        Ok(Arc::new(MockSession {
            profile: self.profile.clone(),
            state: self.state.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

pub struct MockSession {
    profile: SiteProfile,
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn document_role(&self, selector: &Selector) -> Option<&'static str> {
        let p = &self.profile;
        [
            (CONSENT, &p.consent),
            (SUBJECT_NAME, &p.subject_name),
            (AVERAGE_SCORE, &p.average_score),
            (TOTAL_COUNT, &p.total_count),
            (REVIEWS_TAB, &p.reviews_tab),
            (SORT_CONTROL, &p.sort_control),
            (SORT_LOWEST, &p.sort_lowest),
            (SCROLL_CONTAINER, &p.scroll_container),
        ]
        .into_iter()
        .find(|(_, chain)| chain.contains(selector))
        .map(|(role, _)| role)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn locate(&self, strategy: &Strategy, scope: Scope<'_>) -> Result<Option<NodeHandle>> {
        // Every rendered node is displayed and enabled, so both kinds resolve
        // alike and nothing waits.
        let state = self.state.lock().unwrap();
        match scope {
            Scope::Document => Ok(self
                .document_role(&strategy.selector)
                .filter(|role| state.document_present(role))
                .map(|role| NodeHandle(role.to_string()))),
            Scope::Node(parent) => {
                let Some(Node::Item(pos)) = parse_handle(parent) else {
                    return Ok(None);
                };
                let Some(field) = Field::for_selector(&self.profile, &strategy.selector) else {
                    return Ok(None);
                };
                let present = state.field_value(pos, field)?.is_some();
                Ok(present.then(|| field_handle(pos, field)))
            }
        }
    }

    async fn locate_all(&self, selector: &Selector, scope: Scope<'_>) -> Result<Vec<NodeHandle>> {
        let mut state = self.state.lock().unwrap();
        match scope {
            Scope::Document if *selector == self.profile.item => {
                state.enumerations += 1;
                if state.page.failing_enumerations.contains(&state.enumerations) {
                    bail!("renderer disconnected listing items");
                }
                Ok((0..state.loaded).map(item_handle).collect())
            }
            Scope::Node(parent) if *selector == self.profile.score_scan => {
                let Some(Node::Item(pos)) = parse_handle(parent) else {
                    return Ok(Vec::new());
                };
                let found = state.field_value(pos, Field::ScoreScan)?;
                Ok(found
                    .map(|_| vec![field_handle(pos, Field::ScoreScan)])
                    .unwrap_or_default())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match parse_handle(node) {
            Some(Node::Document(role)) => {
                if !state.document_present(&role) {
                    bail!("element not interactable: {role}");
                }
                match role.as_str() {
                    CONSENT => state.consent_dismissed = true,
                    SORT_CONTROL => state.sort_menu_open = true,
                    SORT_LOWEST => state.apply_sort(),
                    _ => {}
                }
            }
            Some(Node::Field(pos, Field::Expand)) => {
                state.review_at(pos)?;
                state.expanded.insert(pos);
            }
            Some(Node::Item(_)) | Some(Node::Field(..)) => {}
            None => bail!("no such element: {}", node.0),
        }
        state.clicks.push(node.0.clone());
        Ok(())
    }

    async fn text(&self, node: &NodeHandle) -> Result<String> {
        let state = self.state.lock().unwrap();
        let page = &state.page;
        let value = match parse_handle(node) {
            Some(Node::Document(role)) => match role.as_str() {
                SUBJECT_NAME => page.subject_name.clone(),
                AVERAGE_SCORE => page.average_score.clone(),
                TOTAL_COUNT => page.total_count.clone(),
                _ => Some(String::new()),
            },
            Some(Node::Field(pos, field)) => state.field_value(pos, field)?,
            Some(Node::Item(pos)) => {
                state.review_at(pos)?;
                Some(String::new())
            }
            None => None,
        };
        value.ok_or_else(|| anyhow!("stale element reference: {}", node.0))
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        match parse_handle(node) {
            Some(Node::Item(pos)) if name == self.profile.identity_attribute => {
                Ok(state.review_at(pos)?.id.clone())
            }
            Some(Node::Field(pos, Field::ScoreLabel))
                if name == self.profile.score_label_attribute =>
            {
                state.field_value(pos, Field::ScoreLabel)
            }
            Some(_) => Ok(None),
            None => bail!("no such element: {}", node.0),
        }
    }

    async fn run_script(&self, script: &str, args: &[NodeHandle]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let targets_container = args.first().map(|a| a.0.as_str()) == Some(SCROLL_CONTAINER);
        if script != self.profile.scroll_script || !targets_container {
            bail!("javascript error: unexpected script");
        }
        state.scrolls += 1;
        state.loaded = (state.loaded + state.page.batch).min(state.page.reviews.len());
        Ok(())
    }

    async fn current_address(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().page.address.clone())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}
