use super::handler::{
    ContentHandler, DisplaySink, HandlerError, HandlerEvent, HandlerSelector, NavigationObserver,
    UrlArgs,
};
use super::history::{HistoryEntry, HistoryError, HistoryList};
use super::settings::ViewSettings;
use crate::net::CancelToken;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
    #[error("No handler for {service_type} (service {service_name:?})")]
    HandlerUnavailable {
        service_type: String,
        service_name: String,
    },
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("Nothing to reload")]
    NothingToReload,
}

/// Whether a navigation records a new history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// A new location: forward history is dropped and an entry appended.
    Fresh,
    /// A location that already has an entry: the current one is overwritten.
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    /// The last load was stopped before it completed. Reopening the same
    /// locator from here bypasses any cache.
    Aborted,
}

/// One view: its handler, its history, and the load lifecycle tying them.
pub struct NavigationController {
    history: HistoryList,
    handler: Box<dyn ContentHandler>,
    selector: Box<dyn HandlerSelector>,
    display: Box<dyn DisplaySink>,
    observer: Box<dyn NavigationObserver>,
    settings: ViewSettings,
    service_type: String,
    location_bar_url: String,
    title: String,
    typed_url: Option<String>,
    state: LoadState,
    pending_resolution: Option<CancelToken>,
}

impl NavigationController {
    /// Create a view whose first handler is picked by `selector` for `service_type`.
    pub fn new(
        service_type: &str,
        mut selector: Box<dyn HandlerSelector>,
        display: Box<dyn DisplaySink>,
        observer: Box<dyn NavigationObserver>,
        settings: ViewSettings,
    ) -> Result<Self, NavigationError> {
        let handler = selector.select_handler(service_type, "", None).ok_or_else(|| {
            NavigationError::HandlerUnavailable {
                service_type: service_type.to_string(),
                service_name: String::new(),
            }
        })?;

        Ok(Self {
            history: HistoryList::new(),
            handler,
            selector,
            display,
            observer,
            settings,
            service_type: service_type.to_string(),
            location_bar_url: String::new(),
            title: String::new(),
            typed_url: None,
            state: LoadState::Idle,
            pending_resolution: None,
        })
    }

    /// Open a new location, recording it in history.
    pub fn open(
        &mut self,
        locator: &str,
        display_locator: Option<&str>,
        name_filter: &str,
    ) -> Result<(), NavigationError> {
        self.open_with(NavigationKind::Fresh, locator, display_locator, name_filter)
    }

    /// Like [`NavigationController::open`], but a `Replay` overwrites the
    /// current entry instead of appending one.
    pub fn open_with(
        &mut self,
        kind: NavigationKind,
        locator: &str,
        display_locator: Option<&str>,
        name_filter: &str,
    ) -> Result<(), NavigationError> {
        let url = match parse_locator(locator) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Cannot open {:?}: {}", locator, e);
                self.set_display_locator(locator);
                return Err(NavigationError::InvalidLocator(format!("{}: {}", locator, e)));
            }
        };

        // Done first so the entry exists if the handler completes right away.
        if kind == NavigationKind::Fresh {
            self.history.create_entry();
        }
        self.pending_resolution = None;

        self.handler.set_name_filter(name_filter);
        let shown = match display_locator {
            Some(shown) => shown.to_string(),
            None => display_form(&url, locator),
        };
        self.set_display_locator(&shown);

        let mut args = UrlArgs {
            service_type: self.service_type.clone(),
            ..UrlArgs::default()
        };
        if self.state == LoadState::Aborted && self.handler.current_locator() == Some(&url) {
            log::debug!("Last load of {} was aborted, forcing reload", url);
            args.reload = true;
        }
        self.state = LoadState::Idle;

        if let Err(e) = self.handler.open_locator(&url, &args) {
            log::warn!("{} failed to open {}: {}", self.handler.service_name(), url, e);
            self.history.update_current(HistoryEntry {
                locator: Some(url),
                display_locator: self.location_bar_url.clone(),
                title: self.title.clone(),
                service_type: self.service_type.clone(),
                service_name: self.handler.service_name().to_string(),
                state: None,
            });
            return Err(e.into());
        }
        self.state = LoadState::Loading;

        self.observer.navigation_occurred(&url, &args);

        // After the handler call, so a canonical locator it announced is kept.
        self.update_history_entry();

        log::debug!("Current position: {:?}", self.history.cursor());
        Ok(())
    }

    /// Move `steps` through history (negative is back) and replay that entry.
    pub fn go_to(&mut self, steps: isize) -> Result<(), NavigationError> {
        // Checked before stop() so a bad offset has no side effects.
        self.history.target(steps)?;
        if steps == 0 {
            return Ok(());
        }

        self.stop();

        let entry = self.history.move_to(steps)?.clone();
        log::debug!(
            "go: steps={} new position={:?} count={}",
            steps,
            self.history.cursor(),
            self.history.len()
        );

        self.set_display_locator(&entry.display_locator);
        self.typed_url = None;

        if !entry.service_type.is_empty() {
            if let Err(e) = self.change_view_mode(&entry.service_type, &entry.service_name) {
                log::warn!(
                    "Couldn't change view mode to {} {}",
                    entry.service_type,
                    entry.service_name
                );
                self.history.move_to(-steps)?;
                if let Some(shown) = self.history.current().map(|e| e.display_locator.clone()) {
                    self.set_display_locator(&shown);
                }
                return Err(e);
            }
        }

        self.set_title(&entry.title);

        let args = UrlArgs {
            service_type: self.service_type.clone(),
            ..UrlArgs::default()
        };

        if !self.restore_entry_state(&entry) {
            match &entry.locator {
                Some(url) => self.handler.open_locator(url, &args)?,
                None => {
                    log::warn!("History entry {:?} has no locator", self.history.cursor());
                    return Ok(());
                }
            }
        }
        self.state = LoadState::Loading;

        if let Some(url) = &entry.locator {
            self.observer.navigation_occurred(url, &args);
        }
        Ok(())
    }

    pub fn go_back(&mut self) -> Result<(), NavigationError> {
        self.go_to(-1)
    }

    pub fn go_forward(&mut self) -> Result<(), NavigationError> {
        self.go_to(1)
    }

    /// Halt any load and save the current entry's state.
    pub fn stop(&mut self) {
        log::debug!("stop");
        if self.state == LoadState::Loading {
            self.handler.close_current();
            self.state = LoadState::Aborted;
        } else if let Some(token) = self.pending_resolution.take() {
            log::debug!("Cancelling pending resolution");
            token.cancel();
        }

        if !self.history.is_empty() {
            self.update_history_entry();
        }
    }

    /// Refetch the current locator bypassing caches, keeping scroll position.
    pub fn reload(&mut self) -> Result<(), NavigationError> {
        let url = self
            .handler
            .current_locator()
            .cloned()
            .ok_or(NavigationError::NothingToReload)?;
        let (x_offset, y_offset) = self.handler.scroll_offset();
        let args = UrlArgs {
            reload: true,
            x_offset,
            y_offset,
            service_type: self.service_type.clone(),
        };

        self.handler.open_locator(&url, &args)?;
        self.state = LoadState::Loading;
        Ok(())
    }

    /// Switch to a handler for `service_type` unless the active one fits.
    pub fn change_view_mode(
        &mut self,
        service_type: &str,
        service_name: &str,
    ) -> Result<(), NavigationError> {
        if self.state == LoadState::Loading {
            self.stop();
        }

        log::debug!(
            "change_view_mode: service type {} service name {:?} current {}",
            service_type,
            service_name,
            self.handler.service_name()
        );

        let fits = self.handler.supports(service_type)
            && (service_name.is_empty() || service_name == self.handler.service_name());
        if fits {
            return Ok(());
        }
        if self.settings.locked_view_mode {
            log::debug!("View mode is locked, keeping {}", self.handler.service_name());
            return Ok(());
        }

        let url = self.handler.current_locator().cloned();
        match self
            .selector
            .select_handler(service_type, service_name, url.as_ref())
        {
            Some(handler) => {
                log::debug!("Switching view mode to {}", handler.service_name());
                let mut old = std::mem::replace(&mut self.handler, handler);
                old.close_current();
                self.service_type = service_type.to_string();
                Ok(())
            }
            None => {
                // Revert the location bar to the working entry.
                if let Some(shown) = self.history.current().map(|e| e.display_locator.clone()) {
                    self.set_display_locator(&shown);
                }
                Err(NavigationError::HandlerUnavailable {
                    service_type: service_type.to_string(),
                    service_name: service_name.to_string(),
                })
            }
        }
    }

    /// Drain the handler's pending notifications. Returns how many were handled.
    pub fn poll_loading(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.handler.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: HandlerEvent) {
        match event {
            HandlerEvent::Started => self.on_started(),
            HandlerEvent::Completed => self.on_completed(),
            HandlerEvent::Canceled(message) => self.on_canceled(&message),
            HandlerEvent::LocationChanged(shown) => self.set_display_locator(&shown),
            HandlerEvent::TitleChanged(title) => self.set_title(&title),
            HandlerEvent::OpenUrlNotify => self.open_url_notify(),
        }
    }

    pub fn on_started(&mut self) {
        self.state = LoadState::Loading;
    }

    pub fn on_completed(&mut self) {
        log::debug!("Load completed");
        self.state = LoadState::Idle;
        self.update_history_entry();
        self.observer.view_completed();
    }

    pub fn on_canceled(&mut self, message: &str) {
        log::warn!("Load canceled: {}", message);
        self.on_completed();
        self.state = LoadState::Aborted;
    }

    /// The handler moved by itself; record where it went.
    pub fn open_url_notify(&mut self) {
        self.history.create_entry();
        self.update_history_entry();
    }

    pub fn set_display_locator(&mut self, locator: &str) {
        self.location_bar_url = locator.to_string();
        self.display.set_displayed_locator(locator);
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.display.set_title(title);
    }

    /// Register a lookup that must finish before a handler is chosen;
    /// [`NavigationController::stop`] cancels it.
    pub fn set_pending_resolution(&mut self, token: CancelToken) {
        self.pending_resolution = Some(token);
    }

    pub fn set_typed_url(&mut self, typed: &str) {
        self.typed_url = Some(typed.to_string());
    }

    pub fn typed_url(&self) -> Option<&str> {
        self.typed_url.as_deref()
    }

    pub fn history(&self) -> &HistoryList {
        &self.history
    }

    pub fn handler(&self) -> &dyn ContentHandler {
        self.handler.as_ref()
    }

    pub fn handler_mut(&mut self) -> &mut dyn ContentHandler {
        self.handler.as_mut()
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn load_state(&self) -> LoadState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    /// Fraction of the current load received, when the handler knows it.
    pub fn load_progress(&self) -> Option<f32> {
        if self.is_loading() {
            self.handler.load_progress()
        } else {
            None
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state == LoadState::Aborted
    }

    pub fn displayed_locator(&self) -> &str {
        &self.location_bar_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn url(&self) -> Option<&Url> {
        self.handler.current_locator()
    }

    pub fn can_go_back(&self) -> bool {
        self.history.can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.history.can_go_forward()
    }

    fn update_history_entry(&mut self) {
        let state = if self.handler.supports_state() {
            self.handler.capture_state()
        } else {
            None
        };

        self.history.update_current(HistoryEntry {
            locator: self.handler.current_locator().cloned(),
            display_locator: self.location_bar_url.clone(),
            title: self.title.clone(),
            service_type: self.service_type.clone(),
            service_name: self.handler.service_name().to_string(),
            state,
        });
    }

    /// Hand a saved snapshot back to the handler. Returns false when the
    /// caller has to open the locator instead.
    fn restore_entry_state(&mut self, entry: &HistoryEntry) -> bool {
        let Some(state) = entry.state.as_deref().filter(|s| !s.is_empty()) else {
            return false;
        };
        if !self.handler.supports_state() {
            return false;
        }

        log::debug!("Restoring view from saved state");
        match self.handler.restore_state(state) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not restore saved state: {}", e);
                false
            }
        }
    }
}

/// Parse user input as a URL, assuming `https` when no scheme is given.
pub fn parse_locator(input: &str) -> Result<Url, url::ParseError> {
    let input = input.trim();
    match Url::parse(input) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{}", input)),
        result => result,
    }
}

/// Human-facing form of `url`; the raw input when it does not decode.
pub fn display_form(url: &Url, input: &str) -> String {
    match urlencoding::decode(url.as_str()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => input.to_string(),
    }
}
