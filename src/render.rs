//! Headless rendering for script-heavy listing pages.
//!
//! Rendering is the last resort of the fetch chain. [`PageRenderer`] is the
//! contract; [`NoRenderer`] is used when the crate is built without the
//! `render` feature and simply reports the capability as unavailable.
//!
//! With `--features render`, [`ChromeRenderer`] drives a headless Chrome via
//! `headless_chrome`. The browser is launched lazily on the first render and
//! owned by the renderer, so dropping the renderer at the end of a run shuts
//! the browser process down on every exit path. A browser whose connection
//! has died (Chrome drops idle sessions) is discarded and relaunched once.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// A capability that turns a script-heavy URL into its rendered HTML.
pub trait PageRenderer {
    /// Load `url`, wait for `wait_selector` and return the resulting HTML.
    async fn render(&self, url: &str, wait_selector: &str, timeout: Duration) -> Result<String>;
}

/// Renderer used when headless rendering is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRenderer;

impl PageRenderer for NoRenderer {
    async fn render(&self, url: &str, _wait_selector: &str, _timeout: Duration) -> Result<String> {
        Err(PipelineError::network(url, "headless rendering not available"))
    }
}

/// Where a headless render failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(feature = "render"), allow(dead_code))]
enum RenderFailure {
    /// The browser session is unusable; a fresh browser may succeed.
    Session(String),
    /// The page itself failed to load or render.
    Page(String),
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "browser session: {e}"),
            Self::Page(e) => write!(f, "{e}"),
        }
    }
}

/// Run `attempt`; on a session failure call `reset` and try exactly once more.
#[cfg_attr(not(feature = "render"), allow(dead_code))]
async fn relaunch_on_dead_session<T, Fut>(
    mut attempt: impl FnMut() -> Fut,
    reset: impl FnOnce(),
) -> std::result::Result<T, RenderFailure>
where
    Fut: Future<Output = std::result::Result<T, RenderFailure>>,
{
    match attempt().await {
        Err(RenderFailure::Session(e)) => {
            warn!(error = %e, "Headless browser session lost; relaunching");
            reset();
            attempt().await
        }
        other => other,
    }
}

#[cfg(feature = "render")]
pub use chrome::ChromeRenderer;

#[cfg(feature = "render")]
mod chrome {
    use super::{relaunch_on_dead_session, PageRenderer, RenderFailure};
    use crate::error::{PipelineError, Result};
    use headless_chrome::{Browser, LaunchOptions};
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::{info, instrument, warn};

    /// Pause after the wait selector appears, for late client-side updates.
    const SETTLE_DELAY: Duration = Duration::from_secs(3);

    pub struct ChromeRenderer {
        browser: Mutex<Option<Browser>>,
        idle_timeout: Duration,
    }

    impl ChromeRenderer {
        pub fn new(idle_timeout: Duration) -> Self {
            Self {
                browser: Mutex::new(None),
                idle_timeout,
            }
        }

        fn browser(&self, url: &str) -> Result<Browser> {
            let mut slot = self
                .browser
                .lock()
                .map_err(|_| PipelineError::network(url, "renderer lock poisoned"))?;
            if let Some(browser) = slot.as_ref() {
                return Ok(browser.clone());
            }
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .idle_browser_timeout(self.idle_timeout)
                .build()
                .map_err(|e| PipelineError::network(url, format!("launch options: {e}")))?;
            let browser = Browser::new(options)
                .map_err(|e| PipelineError::network(url, format!("launch chrome: {e}")))?;
            info!("Headless Chrome launched");
            *slot = Some(browser.clone());
            Ok(browser)
        }

        /// Release the browser now rather than at drop.
        pub fn close(&self) {
            if let Ok(mut slot) = self.browser.lock() {
                if slot.take().is_some() {
                    info!("Headless Chrome closed");
                }
            }
        }
    }

    impl Drop for ChromeRenderer {
        fn drop(&mut self) {
            self.close();
        }
    }

    impl ChromeRenderer {
        async fn render_once(
            &self,
            url: &str,
            wait_selector: &str,
            timeout: Duration,
        ) -> std::result::Result<String, RenderFailure> {
            let browser = self
                .browser(url)
                .map_err(|e| RenderFailure::Session(e.to_string()))?;
            let target = url.to_string();
            let selector = wait_selector.to_string();

            let job = tokio::task::spawn_blocking(move || -> std::result::Result<String, RenderFailure> {
                let tab = browser
                    .new_tab()
                    .map_err(|e| RenderFailure::Session(e.to_string()))?;
                tab.set_default_timeout(timeout);
                tab.navigate_to(&target)
                    .map_err(|e| RenderFailure::Page(e.to_string()))?;
                if let Err(e) = tab.wait_for_element_with_custom_timeout(&selector, timeout) {
                    warn!(url = %target, error = %e, "Wait selector never appeared; using current DOM");
                } else {
                    std::thread::sleep(SETTLE_DELAY);
                }
                let html = tab.get_content().map_err(|e| RenderFailure::Page(e.to_string()));
                let _ = tab.close(true);
                html
            });

            match tokio::time::timeout(timeout + SETTLE_DELAY * 2, job).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(RenderFailure::Page(join.to_string())),
                Err(_) => Err(RenderFailure::Page("render timed out".to_string())),
            }
        }
    }

    impl PageRenderer for ChromeRenderer {
        #[instrument(level = "info", skip_all, fields(%url))]
        async fn render(&self, url: &str, wait_selector: &str, timeout: Duration) -> Result<String> {
            relaunch_on_dead_session(
                move || self.render_once(url, wait_selector, timeout),
                || self.close(),
            )
            .await
            .map_err(|e| PipelineError::network(url, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_dead_session_relaunches_once() {
        let attempts = Cell::new(0);
        let resets = Cell::new(0);
        let result = relaunch_on_dead_session(
            || {
                attempts.set(attempts.get() + 1);
                let n = attempts.get();
                async move {
                    if n == 1 {
                        Err(RenderFailure::Session("connection closed".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            || resets.set(resets.get() + 1),
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(resets.get(), 1);
    }

    #[tokio::test]
    async fn test_page_failure_is_not_retried() {
        let attempts = Cell::new(0);
        let resets = Cell::new(0);
        let result: std::result::Result<(), _> = relaunch_on_dead_session(
            || {
                attempts.set(attempts.get() + 1);
                async { Err(RenderFailure::Page("net::ERR_NAME_NOT_RESOLVED".into())) }
            },
            || resets.set(resets.get() + 1),
        )
        .await;
        assert!(matches!(result, Err(RenderFailure::Page(_))));
        assert_eq!((attempts.get(), resets.get()), (1, 0));
    }

    #[tokio::test]
    async fn test_second_dead_session_gives_up() {
        let attempts = Cell::new(0);
        let result: std::result::Result<(), _> = relaunch_on_dead_session(
            || {
                attempts.set(attempts.get() + 1);
                async { Err(RenderFailure::Session("connection closed".into())) }
            },
            || {},
        )
        .await;
        assert!(matches!(result, Err(RenderFailure::Session(_))));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn test_no_renderer_fails_softly() {
        let err = NoRenderer
            .render("https://a.example/", "main", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
