//! Collaborators a view drives: the content handler that fetches and shows
//! a locator, the selector that picks a handler for a service type, and the
//! sinks that receive display and navigation updates.

use crate::net::loader::LoadError;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),
    #[error("Invalid state snapshot: {0}")]
    InvalidState(#[from] serde_json::Error),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Parameters attached to a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlArgs {
    /// Bypass any cache and refetch.
    pub reload: bool,
    pub x_offset: i32,
    pub y_offset: i32,
    pub service_type: String,
}

impl UrlArgs {
    pub fn reload() -> Self {
        Self {
            reload: true,
            ..Self::default()
        }
    }
}

/// Notifications a handler raises while loading, drained by
/// [`NavigationController::poll_loading`](super::view::NavigationController::poll_loading).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    Started,
    Completed,
    Canceled(String),
    /// The handler wants a different address shown (e.g. after a redirect).
    LocationChanged(String),
    TitleChanged(String),
    /// The handler navigated by itself (in-page anchor and the like).
    OpenUrlNotify,
}

/// A pluggable component that fetches and presents one kind of content.
pub trait ContentHandler {
    /// Name of the service this handler was created for.
    fn service_name(&self) -> &str;

    /// Whether this handler can present `service_type`.
    fn supports(&self, service_type: &str) -> bool;

    fn open_locator(&mut self, url: &Url, args: &UrlArgs) -> Result<(), HandlerError>;

    /// Abort any in-flight load.
    fn close_current(&mut self);

    fn current_locator(&self) -> Option<&Url>;

    /// Whether [`ContentHandler::capture_state`] and
    /// [`ContentHandler::restore_state`] are meaningful for this handler.
    fn supports_state(&self) -> bool {
        false
    }

    fn capture_state(&self) -> Option<Vec<u8>> {
        None
    }

    fn restore_state(&mut self, _state: &[u8]) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported("restore_state".to_string()))
    }

    /// Current scroll offsets, carried in the fetch parameters on reload.
    fn scroll_offset(&self) -> (i32, i32) {
        (0, 0)
    }

    /// Fraction (0.0-1.0) of the in-flight load received, if known.
    fn load_progress(&self) -> Option<f32> {
        None
    }

    fn set_name_filter(&mut self, filter: &str) {
        if !filter.is_empty() {
            log::trace!("{} ignores name filter {}", self.service_name(), filter);
        }
    }

    fn poll_event(&mut self) -> Option<HandlerEvent> {
        None
    }
}

/// Picks (and creates) the handler for a service type.
pub trait HandlerSelector {
    /// `service_name` may be empty to accept any handler supporting the type.
    fn select_handler(
        &mut self,
        service_type: &str,
        service_name: &str,
        url: Option<&Url>,
    ) -> Option<Box<dyn ContentHandler>>;
}

/// Receives what the location bar and title should show.
pub trait DisplaySink {
    fn set_displayed_locator(&mut self, locator: &str);
    fn set_title(&mut self, title: &str);
}

/// Observers told about every navigation, fresh or replayed.
pub trait NavigationObserver {
    fn navigation_occurred(&mut self, url: &Url, args: &UrlArgs);

    fn view_completed(&mut self) {}
}

/// Display sink that only logs, for headless views.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn set_displayed_locator(&mut self, locator: &str) {
        log::debug!("Location bar: {}", locator);
    }

    fn set_title(&mut self, title: &str) {
        log::debug!("Title: {}", title);
    }
}

/// Observer that only logs.
#[derive(Debug, Default)]
pub struct LogObserver;

impl NavigationObserver for LogObserver {
    fn navigation_occurred(&mut self, url: &Url, args: &UrlArgs) {
        log::info!("Navigated to {} (reload: {})", url, args.reload);
    }

    fn view_completed(&mut self) {
        log::info!("View completed");
    }
}
