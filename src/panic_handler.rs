use std::panic;

/// Install `better_panic` and make sure panics also reach the log file.
///
/// A panic on the render worker thread would otherwise only show up as a
/// disconnected channel in the session.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        log::error!(
            "Panic on thread {}: {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );
        log::logger().flush();

        default_hook(panic_info);
    }));
}
