pub mod error;

pub use error::{Result, WebDriverError};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// W3C key under which element references are serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Headless Chrome flags that keep the browser usable inside containers.
const DEFAULT_CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-notifications",
    "--disable-infobars",
    "--disable-extensions",
    "--window-size=1920,1080",
];

/// How an element is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Using {
    #[serde(rename = "xpath")]
    XPath,
    #[serde(rename = "css selector")]
    Css,
}

/// Opaque element reference handed out by the remote end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

impl ElementId {
    fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }

    fn from_json(value: &Value) -> Result<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementId(id.to_string()))
            .ok_or_else(|| WebDriverError::Decode(format!("not an element reference: {value}")))
    }
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub browser_name: String,
    pub args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            browser_name: "chrome".to_string(),
            args: DEFAULT_CHROME_ARGS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Client for a W3C WebDriver endpoint (chromedriver, geckodriver, Selenium).
pub struct WebDriverClient {
    client: reqwest::Client,
    base_url: String,
    options: BrowserOptions,
}

impl WebDriverClient {
    pub fn new(base_url: &str, options: BrowserOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }

    /// Start a new browser session.
    pub async fn new_session(&self) -> Result<WebDriverSession> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.options.browser_name,
                    "goog:chromeOptions": { "args": self.options.args },
                }
            }
        });

        let value = send(
            self.client
                .post(format!("{}/session", self.base_url))
                .json(&body),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Decode(format!("missing sessionId in {value}")))?
            .to_string();

        debug!(session_id = session_id.as_str(), "WebDriver session created");

        Ok(WebDriverSession {
            client: self.client.clone(),
            endpoint: format!("{}/session/{}", self.base_url, session_id),
            session_id,
        })
    }
}

/// One live browser session. Cheap to clone; all clones share the session.
#[derive(Clone)]
pub struct WebDriverSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.post("url", json!({ "url": url })).await.map(|_| ())
    }

    pub async fn current_url(&self) -> Result<String> {
        let value = self.get("url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::Decode(format!("url is not a string: {value}")))
    }

    /// Find the first match, or `None` when nothing matches right now.
    pub async fn find(
        &self,
        using: Using,
        selector: &str,
        parent: Option<&ElementId>,
    ) -> Result<Option<ElementId>> {
        let path = match parent {
            Some(p) => format!("element/{}/element", p.0),
            None => "element".to_string(),
        };
        match self
            .post(&path, json!({ "using": using, "value": selector }))
            .await
        {
            Ok(value) => ElementId::from_json(&value).map(Some),
            Err(e) if e.is_missing_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn find_all(
        &self,
        using: Using,
        selector: &str,
        parent: Option<&ElementId>,
    ) -> Result<Vec<ElementId>> {
        let path = match parent {
            Some(p) => format!("element/{}/elements", p.0),
            None => "elements".to_string(),
        };
        let value = match self
            .post(&path, json!({ "using": using, "value": selector }))
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_missing_element() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        value
            .as_array()
            .ok_or_else(|| WebDriverError::Decode(format!("elements is not an array: {value}")))?
            .iter()
            .map(ElementId::from_json)
            .collect()
    }

    pub async fn click(&self, element: &ElementId) -> Result<()> {
        self.post(&format!("element/{}/click", element.0), json!({}))
            .await
            .map(|_| ())
    }

    pub async fn text(&self, element: &ElementId) -> Result<String> {
        let value = self.get(&format!("element/{}/text", element.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>> {
        let value = self
            .get(&format!("element/{}/attribute/{}", element.0, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn is_displayed(&self, element: &ElementId) -> Result<bool> {
        let value = self.get(&format!("element/{}/displayed", element.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn is_enabled(&self, element: &ElementId) -> Result<bool> {
        let value = self.get(&format!("element/{}/enabled", element.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Run a synchronous script. Element arguments are passed as references
    /// and arrive in the page as `arguments[i]`.
    pub async fn execute(&self, script: &str, args: &[ElementId]) -> Result<Value> {
        let args: Vec<Value> = args.iter().map(ElementId::to_json).collect();
        self.post("execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// End the session and close the browser.
    pub async fn delete(&self) -> Result<()> {
        send(self.client.delete(&self.endpoint)).await.map(|_| ())
    }

    async fn get(&self, path: &str) -> Result<Value> {
        send(self.client.get(format!("{}/{}", self.endpoint, path))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        send(
            self.client
                .post(format!("{}/{}", self.endpoint, path))
                .json(&body),
        )
        .await
    }
}

/// Send a request and unwrap the `value` envelope every WebDriver response uses.
async fn send(request: reqwest::RequestBuilder) -> Result<Value> {
    let resp = request
        .header("Content-Type", "application/json")
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;
    let parsed: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body)?
    };
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(protocol_error(status.as_u16(), &value));
    }

    Ok(value)
}

fn protocol_error(status: u16, value: &Value) -> WebDriverError {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    WebDriverError::Protocol {
        status,
        error: field("error"),
        message: field("message"),
    }
}
