pub mod handler;
pub mod history;
pub mod page;
pub mod registry;
pub mod settings;
pub mod view;

pub use handler::{ContentHandler, DisplaySink, HandlerEvent, HandlerSelector, NavigationObserver, UrlArgs};
pub use history::{HistoryEntry, HistoryList};
pub use page::PageHandler;
pub use registry::HandlerRegistry;
pub use settings::ViewSettings;
pub use view::{LoadState, NavigationController, NavigationError, NavigationKind};
