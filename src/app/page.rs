use super::handler::{ContentHandler, HandlerError, HandlerEvent, UrlArgs};
use super::settings::ViewSettings;
use crate::net::{AsyncLoader, Cache, CancelToken, LoadError, LoadProgress, Loader};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle as NodeHandle, NodeData, RcDom};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use url::Url;

pub const SERVICE_NAME: &str = "page";
pub const SERVICE_TYPES: &[&str] = &["text/html", "text/plain"];

/// What a page saves into history: where it was and how far it was scrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PageState {
    url: Url,
    x_offset: i32,
    y_offset: i32,
}

/// Loading progress information
#[derive(Debug, Clone)]
pub struct LoadingProgress {
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
}

impl LoadingProgress {
    /// Returns progress as a fraction 0.0-1.0, or `None` while the total is unknown.
    pub fn fraction(&self) -> Option<f32> {
        match self.total_bytes {
            Some(total) if total > 0 => Some((self.bytes_received as f32 / total as f32).min(1.0)),
            _ => None,
        }
    }
}

/// Content handler for text pages fetched over `http`, `https`, `file` or `data`.
pub struct PageHandler {
    loader: Loader,
    async_loader: AsyncLoader,
    cache: Cache,
    cache_enabled: bool,
    url: Option<Url>,
    body: String,
    x_offset: i32,
    y_offset: i32,
    progress_rx: Option<mpsc::UnboundedReceiver<LoadProgress>>,
    cancel_token: Option<CancelToken>,
    loading_progress: Option<LoadingProgress>,
    events: VecDeque<HandlerEvent>,
}

impl PageHandler {
    pub fn new(runtime: Handle, settings: &ViewSettings) -> Result<Self, LoadError> {
        Ok(Self {
            loader: Loader::new(),
            async_loader: AsyncLoader::new(runtime, &settings.user_agent)?,
            cache: Cache::with_limits(settings.cache_capacity, settings.cache_ttl),
            cache_enabled: settings.cache_enabled,
            url: None,
            body: String::new(),
            x_offset: 0,
            y_offset: 0,
            progress_rx: None,
            cancel_token: None,
            loading_progress: None,
            events: VecDeque::new(),
        })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn scroll_to(&mut self, x: i32, y: i32) {
        self.x_offset = x;
        self.y_offset = y;
    }

    fn complete_load(&mut self, body: String, final_url: Url) {
        if self.cache_enabled {
            self.cache.insert(final_url.to_string(), body.clone().into_bytes());
        }

        if self.url.as_ref() != Some(&final_url) {
            self.events
                .push_back(HandlerEvent::LocationChanged(final_url.to_string()));
        }
        self.events.push_back(HandlerEvent::TitleChanged(page_title(&body, &final_url)));
        self.events.push_back(HandlerEvent::Completed);

        self.body = body;
        self.url = Some(final_url);
        self.finish();
    }

    fn fail_load(&mut self, message: String) {
        self.events.push_back(HandlerEvent::Canceled(message));
        self.finish();
    }

    fn finish(&mut self) {
        self.progress_rx = None;
        self.cancel_token = None;
        self.loading_progress = None;
    }

    fn open_local(&mut self, url: &Url) {
        match self.loader.fetch(url) {
            Ok(body) => self.complete_load(body, url.clone()),
            Err(e) => self.fail_load(format!("Failed to load: {}", e)),
        }
    }

    fn poll_progress(&mut self) {
        let Some(rx) = &mut self.progress_rx else {
            return;
        };

        let Ok(progress) = rx.try_recv() else {
            return;
        };

        match progress {
            LoadProgress::Started { url, content_length } => {
                log::info!("Loading started for {}, content_length: {:?}", url, content_length);
                self.loading_progress = Some(LoadingProgress {
                    bytes_received: 0,
                    total_bytes: content_length,
                });
            }
            LoadProgress::Progress {
                bytes_received,
                total_bytes,
            } => {
                log::debug!("Loading progress: {} / {:?}", bytes_received, total_bytes);
                if let Some(lp) = &mut self.loading_progress {
                    lp.bytes_received = bytes_received;
                    lp.total_bytes = total_bytes;
                }
            }
            LoadProgress::Complete { body, final_url } => {
                log::info!("Loading complete, body length: {}, final_url: {}", body.len(), final_url);
                self.complete_load(body, final_url);
            }
            LoadProgress::Error { message } => self.fail_load(message),
            LoadProgress::Cancelled => self.fail_load("Cancelled".to_string()),
        }
    }
}

impl ContentHandler for PageHandler {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn supports(&self, service_type: &str) -> bool {
        SERVICE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(service_type))
    }

    fn open_locator(&mut self, url: &Url, args: &UrlArgs) -> Result<(), HandlerError> {
        let remote = matches!(url.scheme(), "http" | "https");
        if !remote && !Loader::is_local(url) {
            return Err(LoadError::UnsupportedScheme(url.scheme().to_string()).into());
        }

        self.close_current();

        self.url = Some(url.clone());
        self.x_offset = args.x_offset;
        self.y_offset = args.y_offset;
        self.events.push_back(HandlerEvent::Started);

        if args.reload {
            self.cache.remove(url.as_str());
        } else if let Some(cached) = self.cache.get(url.as_str()) {
            log::debug!("Serving {} from cache", url);
            let body = String::from_utf8_lossy(cached).into_owned();
            self.complete_load(body, url.clone());
            return Ok(());
        }

        if remote {
            let cancel_token = CancelToken::new();
            self.progress_rx = Some(self.async_loader.load(url.clone(), cancel_token.clone()));
            self.cancel_token = Some(cancel_token);
        } else {
            self.open_local(url);
        }
        Ok(())
    }

    fn close_current(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.finish();
        self.events.clear();
    }

    fn current_locator(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn supports_state(&self) -> bool {
        true
    }

    fn capture_state(&self) -> Option<Vec<u8>> {
        let state = PageState {
            url: self.url.clone()?,
            x_offset: self.x_offset,
            y_offset: self.y_offset,
        };
        match serde_json::to_vec(&state) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Could not save page state: {}", e);
                None
            }
        }
    }

    fn restore_state(&mut self, state: &[u8]) -> Result<(), HandlerError> {
        let state: PageState = serde_json::from_slice(state)?;
        let args = UrlArgs {
            x_offset: state.x_offset,
            y_offset: state.y_offset,
            ..UrlArgs::default()
        };
        self.open_locator(&state.url, &args)
    }

    fn scroll_offset(&self) -> (i32, i32) {
        (self.x_offset, self.y_offset)
    }

    fn load_progress(&self) -> Option<f32> {
        self.loading_progress.as_ref()?.fraction()
    }

    fn poll_event(&mut self) -> Option<HandlerEvent> {
        if self.events.is_empty() {
            self.poll_progress();
        }
        self.events.pop_front()
    }
}

/// The `<title>` of an HTML body, else the host (or last path segment).
fn page_title(body: &str, url: &Url) -> String {
    if let Some(title) = html_title(body) {
        return title;
    }

    url.host_str()
        .map(str::to_string)
        .or_else(|| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| url.to_string())
}

fn html_title(body: &str) -> Option<String> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut body.as_bytes())
        .ok()?;
    find_title(&dom.document)
}

fn find_title(handle: &NodeHandle) -> Option<String> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == "title" {
            let mut text = String::new();
            for child in handle.children.borrow().iter() {
                if let NodeData::Text { contents } = &child.data {
                    text.push_str(&contents.borrow());
                }
            }
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            return Some(text).filter(|t| !t.is_empty());
        }
    }

    handle.children.borrow().iter().find_map(find_title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    fn handler(runtime: &Runtime) -> PageHandler {
        PageHandler::new(runtime.handle().clone(), &ViewSettings::default()).unwrap()
    }

    fn drain(handler: &mut PageHandler) -> Vec<HandlerEvent> {
        std::iter::from_fn(|| handler.poll_event()).collect()
    }

    fn temp_page(name: &str, body: &str) -> Url {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, body).unwrap();
        Url::from_file_path(&path).unwrap()
    }

    #[test]
    fn test_data_url_completes_with_title() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        let url = Url::parse("data:text/html,<title>Hi</title><p>x</p>").unwrap();

        page.open_locator(&url, &UrlArgs::default()).unwrap();

        assert_eq!(
            drain(&mut page),
            vec![
                HandlerEvent::Started,
                HandlerEvent::TitleChanged("Hi".to_string()),
                HandlerEvent::Completed,
            ]
        );
        assert_eq!(page.body(), "<title>Hi</title><p>x</p>");
        assert_eq!(page.current_locator(), Some(&url));
    }

    #[test]
    fn test_cache_is_bypassed_on_reload() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        let url = temp_page("konq_view_page_cache.html", "first");

        page.open_locator(&url, &UrlArgs::default()).unwrap();
        drain(&mut page);
        std::fs::write(url.to_file_path().unwrap(), "second").unwrap();

        page.open_locator(&url, &UrlArgs::default()).unwrap();
        drain(&mut page);
        assert_eq!(page.body(), "first");

        page.open_locator(&url, &UrlArgs::reload()).unwrap();
        drain(&mut page);
        assert_eq!(page.body(), "second");

        std::fs::remove_file(url.to_file_path().unwrap()).unwrap();
    }

    #[test]
    fn test_missing_file_cancels_load() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        let url = Url::parse("file:///nonexistent/konq_view/missing.html").unwrap();

        page.open_locator(&url, &UrlArgs::default()).unwrap();

        let events = drain(&mut page);
        assert_eq!(events[0], HandlerEvent::Started);
        assert!(matches!(events[1], HandlerEvent::Canceled(_)));
    }

    #[test]
    fn test_unsupported_scheme_fails() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        let url = Url::parse("ftp://example.com/").unwrap();

        assert!(page.open_locator(&url, &UrlArgs::default()).is_err());
        assert!(drain(&mut page).is_empty());
    }

    #[test]
    fn test_state_round_trip_keeps_scroll() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        let url = Url::parse("data:text/plain,hello").unwrap();
        page.open_locator(&url, &UrlArgs::default()).unwrap();
        drain(&mut page);
        page.scroll_to(0, 250);

        let state = page.capture_state().unwrap();
        page.scroll_to(0, 0);
        page.restore_state(&state).unwrap();

        assert_eq!(page.scroll_offset(), (0, 250));
        assert_eq!(page.current_locator(), Some(&url));
        assert_eq!(drain(&mut page).last(), Some(&HandlerEvent::Completed));
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        assert!(matches!(
            page.restore_state(b"not json"),
            Err(HandlerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_page_title_falls_back_to_host() {
        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(page_title("<TITLE> Example </TITLE>", &url), "Example");
        assert_eq!(page_title("<p>no title</p>", &url), "example.com");

        let file = Url::parse("file:///tmp/index.html").unwrap();
        assert_eq!(page_title("", &file), "index.html");
    }

    #[test]
    fn test_page_title_from_parsed_document() {
        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(page_title("<title lang=\"en\">Real Title</title>", &url), "Real Title");
        assert_eq!(page_title("<title>Tom &amp; Jerry</title>", &url), "Tom & Jerry");
        assert_eq!(
            page_title("<html><head><title>\n  Two\n  lines </title></head></html>", &url),
            "Two lines"
        );
        assert_eq!(page_title("<title></title><p>x</p>", &url), "example.com");
    }

    #[test]
    fn test_load_progress_follows_stream() {
        let runtime = Runtime::new().unwrap();
        let mut page = handler(&runtime);
        assert_eq!(page.load_progress(), None);

        page.loading_progress = Some(LoadingProgress {
            bytes_received: 30,
            total_bytes: Some(120),
        });
        assert_eq!(page.load_progress(), Some(0.25));

        page.close_current();
        assert_eq!(page.load_progress(), None);
    }

    #[test]
    fn test_loading_progress_fraction() {
        let progress = LoadingProgress {
            bytes_received: 50,
            total_bytes: Some(200),
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(
            LoadingProgress {
                bytes_received: 50,
                total_bytes: None
            }
            .fraction(),
            None
        );
    }
}
