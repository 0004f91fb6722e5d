//! `log` backend forwarding to the host console callback installed through LinkDebug.

use std::ffi::{c_char, CString};

use parking_lot::RwLock;

pub type DebugLogFn = extern "system" fn(message: *const c_char);

pub const LOG_PREFIX: &str = "[OSVR Rendering Plugin]";

static SINK: RwLock<Option<DebugLogFn>> = parking_lot::const_rwlock(None);
static LOGGER: HostConsoleLogger = HostConsoleLogger;

/// Replace the host callback. None silences the bridge.
pub fn link(sink: Option<DebugLogFn>) {
    *SINK.write() = sink;
}

/// Route `log` records to the host console. A logger installed earlier (tests, debug loop) wins.
pub fn install(level: log::LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn format_line(message: &str) -> CString {
    let line = format!("{LOG_PREFIX} {message}");
    CString::new(line.replace('\0', " ")).unwrap_or_default()
}

fn forward(message: &str) {
    if let Some(sink) = *SINK.read() {
        let line = format_line(message);
        sink(line.as_ptr());
    }
}

pub struct HostConsoleLogger;

impl log::Log for HostConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            forward(&record.args().to_string());
        }
    }

    fn flush(&self) {}
}
