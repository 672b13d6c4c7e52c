//! Browser engine probe
//!
//! The browser capability has three scopes:
//!
//! ```text
//! Browser::launch(proxy server)          -> BrowserInstance
//!   BrowserInstance::new_context(creds)  -> BrowserContext
//!     BrowserContext::navigate(url) / body_text()
//!   BrowserInstance::close()             (always called)
//! ```
//!
//! Proxy credentials are only accepted at context scope so they never end
//! up in the launch arguments. Tunnels are unauthenticated, so the probe
//! itself passes none.

use super::{extract_address, Probe, ProbeResult, ProbeTier};
use crate::config::BrowserProbeConfig;
use crate::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use headless_chrome::{Browser as Chrome, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Proxy server a browser instance routes all traffic through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProxy {
    pub server: String,
}

/// Credentials for an authenticated proxy, scoped to one context
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Headless browser launcher
#[async_trait]
pub trait Browser: Send + Sync {
    async fn launch(&self, proxy: &BrowserProxy) -> Result<Box<dyn BrowserInstance>>;
}

/// A launched browser
#[async_trait]
pub trait BrowserInstance: Send {
    async fn new_context(
        &mut self,
        credentials: Option<&ProxyCredentials>,
    ) -> Result<Box<dyn BrowserContext>>;

    /// Tear down the instance and everything it owns
    async fn close(&mut self) -> Result<()>;
}

/// An isolated browsing session
#[async_trait]
pub trait BrowserContext: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Rendered text of the current page body
    async fn body_text(&mut self) -> Result<String>;
}

/// Navigates an IP echo page through the tunnel
pub struct BrowserProbe {
    browser: Arc<dyn Browser>,
    url: String,
    timeout: Duration,
}

impl BrowserProbe {
    pub fn new(browser: Arc<dyn Browser>, url: String, timeout: Duration) -> Self {
        BrowserProbe {
            browser,
            url,
            timeout,
        }
    }

    pub fn from_config(config: &BrowserProbeConfig) -> Self {
        Self::new(
            Arc::new(ChromiumBrowser::from_config(config)),
            config.url.clone(),
            config.timeout(),
        )
    }

    async fn visit(&self, instance: &mut dyn BrowserInstance) -> Result<String> {
        let mut context = instance.new_context(None).await?;
        let text = timeout(self.timeout, async {
            context.navigate(&self.url, self.timeout).await?;
            context.body_text().await
        })
        .await
        .map_err(|_| Error::timeout(format!("navigation exceeded {:?}", self.timeout)))??;

        extract_address(&text).ok_or_else(|| Error::browser_probe("page body is empty"))
    }
}

#[async_trait]
impl Probe for BrowserProbe {
    fn tier(&self) -> ProbeTier {
        ProbeTier::Browser
    }

    async fn probe(&self, proxy_url: &str) -> ProbeResult {
        let start = Instant::now();
        let proxy = BrowserProxy {
            server: proxy_url.to_string(),
        };

        let mut instance = match self.browser.launch(&proxy).await {
            Ok(instance) => instance,
            Err(e) => return ProbeResult::failed(ProbeTier::Browser, e, start.elapsed()),
        };

        let visited = AssertUnwindSafe(self.visit(instance.as_mut()))
            .catch_unwind()
            .await;

        if let Err(e) = instance.close().await {
            warn!("Failed to close browser for {}: {}", proxy_url, e);
        }

        match visited {
            Ok(Ok(address)) => ProbeResult::passed(ProbeTier::Browser, address, start.elapsed()),
            Ok(Err(e)) => ProbeResult::failed(ProbeTier::Browser, e, start.elapsed()),
            Err(_) => ProbeResult::failed(
                ProbeTier::Browser,
                "browser session panicked",
                start.elapsed(),
            ),
        }
    }
}

/// Slack added to the navigation timeout before an idle browser shuts itself down
const IDLE_MARGIN: Duration = Duration::from_secs(10);

/// Headless Chromium driven over the DevTools protocol
///
/// Every launch starts a fresh browser process with its own temporary
/// profile. Each context is an isolated browser context with one tab.
#[derive(Debug, Clone)]
pub struct ChromiumBrowser {
    /// `None` lets `headless_chrome` locate an installed Chrome/Chromium
    executable: Option<PathBuf>,
    extra_args: Vec<String>,
    nav_timeout: Duration,
}

impl ChromiumBrowser {
    pub fn new(
        executable: Option<PathBuf>,
        extra_args: Vec<String>,
        nav_timeout: Duration,
    ) -> Self {
        ChromiumBrowser {
            executable,
            extra_args,
            nav_timeout,
        }
    }

    pub fn from_config(config: &BrowserProbeConfig) -> Self {
        Self::new(
            config.executable.clone(),
            config.extra_args.clone(),
            config.timeout(),
        )
    }

    /// Launch options routing all traffic through `proxy`
    pub fn launch_options<'a>(&'a self, proxy: &'a BrowserProxy) -> LaunchOptions<'a> {
        LaunchOptions {
            headless: true,
            path: self.executable.clone(),
            proxy_server: Some(proxy.server.as_str()),
            args: self.extra_args.iter().map(OsStr::new).collect(),
            idle_browser_timeout: self.nav_timeout + IDLE_MARGIN,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn launch(&self, proxy: &BrowserProxy) -> Result<Box<dyn BrowserInstance>> {
        let browser = self.clone();
        let proxy = proxy.clone();
        let chrome = blocking(move || {
            let chrome =
                Chrome::new(browser.launch_options(&proxy)).context("failed to launch browser")?;
            debug!("Browser launched via {}", proxy.server);
            Ok(chrome)
        })
        .await?;

        Ok(Box::new(ChromiumInstance {
            chrome: Some(chrome),
            tabs: Vec::new(),
        }))
    }
}

struct ChromiumInstance {
    chrome: Option<Chrome>,
    tabs: Vec<Arc<Tab>>,
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    async fn new_context(
        &mut self,
        credentials: Option<&ProxyCredentials>,
    ) -> Result<Box<dyn BrowserContext>> {
        let chrome = self
            .chrome
            .clone()
            .ok_or_else(|| Error::browser_probe("browser instance already closed"))?;
        let credentials = credentials.cloned();

        let tab = blocking(move || {
            let context = chrome.new_context()?;
            let tab = context.new_tab()?;
            // Answers proxy auth challenges for this context's tab only
            if let Some(creds) = credentials {
                tab.authenticate(Some(creds.username), Some(creds.password))?;
            }
            Ok(tab)
        })
        .await?;

        self.tabs.push(tab.clone());
        Ok(Box::new(ChromiumContext { tab }))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(chrome) = self.chrome.take() else {
            return Ok(());
        };
        let tabs = std::mem::take(&mut self.tabs);

        // Dropping the browser kills its process and removes the profile
        blocking(move || {
            for tab in &tabs {
                if let Err(e) = tab.close(false) {
                    debug!("Failed to close tab: {}", e);
                }
            }
            drop(chrome);
            Ok(())
        })
        .await
    }
}

struct ChromiumContext {
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, nav_timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let target = url.to_string();
        let navigation = blocking(move || {
            tab.set_default_timeout(nav_timeout);
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(tab.get_url())
        });

        let landed = timeout(nav_timeout, navigation).await.map_err(|_| {
            Error::timeout(format!("navigation to {} exceeded {:?}", url, nav_timeout))
        })??;

        check_landing(url, &landed)
    }

    async fn body_text(&mut self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || {
            let text = tab.find_element("body")?.get_inner_text()?;
            Ok(text)
        })
        .await
    }
}

/// Fails when the browser ended up on its own error page instead of `url`
fn check_landing(url: &str, landed: &str) -> Result<()> {
    if landed.starts_with("chrome-error://") {
        return Err(Error::browser_probe(format!(
            "navigation to {} failed, browser showed {}",
            url, landed
        )));
    }
    Ok(())
}

/// Run a blocking DevTools call off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::browser_probe(format!("browser task failed: {}", e)))?
        .map_err(|e| Error::browser_probe(format!("{:#}", e)))
}
