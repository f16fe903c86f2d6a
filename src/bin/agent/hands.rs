use anyhow::Result;
use async_trait::async_trait;
use browser_pilot::{AgentError, Browser, NodeRef, SnapshotProvider, StructuralSnapshot};
use headless_chrome::{Browser as Chrome, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dom;

/// Persistent browser session. Created once, reused for all tasks.
pub struct BrowserSession {
    browser: Chrome,
    tab: Mutex<Arc<Tab>>,
}

impl BrowserSession {
    pub fn launch(debug_port: u16, headless: bool) -> Result<Self> {
        // 1. Try to connect to existing Chrome (Attach Mode)
        tracing::info!(debug_port, "attempting to attach to existing Chrome");
        if let Ok(browser) = Chrome::connect(format!("http://127.0.0.1:{debug_port}")) {
            tracing::info!("attached to existing Chrome");

            let existing = {
                let tabs_lock = browser.get_tabs();
                let tabs = tabs_lock
                    .lock()
                    .map_err(|_| anyhow::anyhow!("tab list lock poisoned"))?;
                tabs.first().cloned()
            };
            let tab = match existing {
                Some(t) => t,
                None => browser.new_tab()?,
            };

            return Ok(Self {
                browser,
                tab: Mutex::new(tab),
            });
        }

        tracing::warn!("could not attach, launching Chrome with the agent profile");

        let chrome_path = find_chrome()?;

        // A dedicated profile so the user's own Chrome stays unlocked.
        // It persists, so logins done during a handoff survive restarts.
        let agent_profile = profile_dir(dirs::data_local_dir())?;
        tracing::info!(profile = ?agent_profile, "using agent profile");
        std::fs::create_dir_all(&agent_profile)?;

        let options = LaunchOptions {
            headless,
            path: Some(chrome_path),
            user_data_dir: Some(agent_profile),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
                std::ffi::OsStr::new("--disable-infobars"),
                std::ffi::OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Chrome::new(options)
            .map_err(|e| anyhow::anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        tracing::info!("Chrome ready");

        Ok(Self {
            browser,
            tab: Mutex::new(tab),
        })
    }

    fn current_tab(&self) -> Result<Arc<Tab>, AgentError> {
        self.tab
            .lock()
            .map(|tab| tab.clone())
            .map_err(|_| AgentError::Execution("tab lock poisoned".to_string()))
    }

    /// Runs a blocking CDP call off the async runtime.
    async fn on_tab<T, F>(&self, op: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T> + Send + 'static,
    {
        let tab = self.current_tab()?;
        tokio::task::spawn_blocking(move || op(tab))
            .await
            .map_err(|e| AgentError::Execution(format!("browser task panicked: {e}")))?
            .map_err(|e| AgentError::Execution(format!("{e:#}")))
    }
}

#[async_trait]
impl SnapshotProvider for BrowserSession {
    async fn snapshot(&self, node: &NodeRef) -> Result<StructuralSnapshot, AgentError> {
        let node = node.clone();
        self.on_tab(move |tab| dom::capture_structure(&tab, &node)).await
    }
}

#[async_trait]
impl Browser for BrowserSession {
    async fn open_url(&self, url: &str) -> Result<(), AgentError> {
        let url = url.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            tab.wait_for_element("body")?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &NodeRef) -> Result<(), AgentError> {
        let selector = selector.clone();
        self.on_tab(move |tab| {
            tab.find_element(selector.as_str())?.click()?;
            Ok(())
        })
        .await
    }

    async fn type_into(&self, selector: &NodeRef, text: &str) -> Result<(), AgentError> {
        let selector = selector.clone();
        let text = text.to_string();
        self.on_tab(move |tab| {
            tab.find_element(selector.as_str())?.click()?;
            dom::clear_value(&tab, &selector)?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press(&self, key: &str, selector: Option<&NodeRef>) -> Result<(), AgentError> {
        let key = key.to_string();
        let selector = selector.cloned();
        self.on_tab(move |tab| {
            if let Some(selector) = selector {
                tab.find_element(selector.as_str())?.click()?;
            }
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn new_page(&self) -> Result<(), AgentError> {
        let browser = self.browser.clone();
        let tab = tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .map_err(|e| AgentError::Execution(format!("browser task panicked: {e}")))?
            .map_err(|e| AgentError::Execution(format!("{e:#}")))?;
        let mut current = self
            .tab
            .lock()
            .map_err(|_| AgentError::Execution("tab lock poisoned".to_string()))?;
        *current = tab;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AgentError> {
        self.on_tab(|tab| dom::get_current_url(&tab)).await
    }
}

/// Profile directory for the launched Chrome: under the platform data dir,
/// or the working directory when there is none.
fn profile_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    let base = match data_dir {
        Some(dir) => dir.join("browser-pilot"),
        None => std::env::current_dir()?,
    };
    Ok(base.join("agent_profile"))
}

// Helper to find Chrome executable
fn find_chrome() -> Result<PathBuf> {
    let candidates = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    for path in &candidates {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    anyhow::bail!("Chrome executable not found. Please ensure Google Chrome is installed.")
}
