use clap::Parser;
use konq_view::app::handler::{ContentHandler, LogDisplay, LogObserver};
use konq_view::app::{page, HandlerRegistry, NavigationController, PageHandler, ViewSettings};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "konq-view")]
#[command(about = "Drive a browser view through a navigation session")]
struct Args {
    /// URLs to open, in order
    urls: Vec<String>,

    /// Go back this many steps after opening every URL
    #[arg(long = "back", default_value_t = 0)]
    back: usize,

    /// Reload the current page at the end of the session
    #[arg(long = "reload", default_value_t = false, action = clap::ArgAction::SetTrue)]
    reload: bool,

    /// Disable the response cache
    #[arg(long = "no-cache", default_value_t = false, action = clap::ArgAction::SetTrue)]
    no_cache: bool,

    /// Never switch handlers when replaying history
    #[arg(long = "lock-view-mode", default_value_t = false, action = clap::ArgAction::SetTrue)]
    lock_view_mode: bool,

    /// Seconds to wait for each load (default: 30)
    #[arg(long = "timeout", default_value_t = 30)]
    timeout: u64,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let settings = ViewSettings {
        locked_view_mode: args.lock_view_mode,
        cache_enabled: !args.no_cache,
        load_timeout: Duration::from_secs(args.timeout),
        ..ViewSettings::default()
    };

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut registry = HandlerRegistry::new();
    let handle = runtime.handle().clone();
    let page_settings = settings.clone();
    registry.register(page::SERVICE_NAME, page::SERVICE_TYPES, move || {
        PageHandler::new(handle.clone(), &page_settings)
            .map(|h| Box::new(h) as Box<dyn ContentHandler>)
            .map_err(Into::into)
    });

    let mut view = match NavigationController::new(
        "text/html",
        Box::new(registry),
        Box::new(LogDisplay),
        Box::new(LogObserver),
        settings,
    ) {
        Ok(view) => view,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for url in &args.urls {
        if let Err(e) = view.open(url, None, "") {
            eprintln!("Error: {}", e);
            continue;
        }
        wait_for_load(&mut view);
    }

    if args.back > 0 {
        let steps = -(args.back as isize);
        if view.history().can_move(steps) {
            if let Err(e) = view.go_to(steps) {
                eprintln!("Error: {}", e);
            }
            wait_for_load(&mut view);
        } else {
            eprintln!(
                "Error: cannot go back {} steps, only {} available",
                args.back,
                view.history().back_count()
            );
        }
    }

    if args.reload {
        if let Err(e) = view.reload() {
            eprintln!("Error: {}", e);
        }
        wait_for_load(&mut view);
    }

    print_history(&view);
    ExitCode::SUCCESS
}

/// Poll until the view stops loading, stopping it on timeout.
fn wait_for_load(view: &mut NavigationController) {
    let start = Instant::now();
    let timeout = view.settings().load_timeout;

    let mut reported = 0;

    view.poll_loading();
    while view.is_loading() && start.elapsed() < timeout {
        std::thread::sleep(Duration::from_millis(10));
        view.poll_loading();

        if let Some(fraction) = view.load_progress() {
            let percent = (fraction * 100.0) as u32;
            if percent >= reported + 25 {
                log::info!("Loading {}: {}%", view.displayed_locator(), percent);
                reported = percent;
            }
        }
    }

    if view.is_loading() {
        eprintln!("Warning: loading timed out after {} seconds", timeout.as_secs());
        view.stop();
    }
}

fn print_history(view: &NavigationController) {
    println!("=== HISTORY ===");
    for (i, entry) in view.history().entries().iter().enumerate() {
        let marker = if Some(i) == view.history().cursor() { '>' } else { ' ' };
        let state = entry.state.as_ref().map(Vec::len).unwrap_or(0);
        println!(
            "{} {}. {} [{}] {} ({} bytes of state)",
            marker, i, entry.display_locator, entry.service_name, entry.title, state
        );
    }
    println!("Displayed: {}", view.displayed_locator());
    println!("State: {:?}", view.load_state());
}
