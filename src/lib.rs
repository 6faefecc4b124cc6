pub mod app;
pub mod net;

pub use app::view::NavigationController;
