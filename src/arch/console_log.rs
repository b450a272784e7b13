//! `log::Log` backend that writes through whichever UART is active.
//!
//! Mini UART (`uart.rs`) talks to a real Pi Zero 2 W's GPIO 14/15 header;
//! PL011 (`uart_pl011.rs`) is the UART QEMU's `raspi3b` machine actually
//! emulates. Selected at compile time by the `qemu-virt` feature, same as
//! the rest of the board-specific arch code.

use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(not(feature = "qemu-virt"))]
use super::uart as console_uart;
#[cfg(feature = "qemu-virt")]
use super::uart_pl011 as console_uart;

struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        console_uart::send_str(s);
        Ok(())
    }
}

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(ConsoleWriter, "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Bring up the board's UART and install it as the `log` crate's global
/// backend. Idempotent against a second call within the same boot (the
/// underlying `log::set_logger` failure is swallowed, not propagated) since
/// nothing here needs to distinguish "already installed" from "failed".
///
/// # Safety
///
/// Must run once, early in boot, with interrupts disabled, before anything
/// on the timer or interrupt path can call into `log::*!`.
pub unsafe fn init() {
    unsafe { console_uart::init() };
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
}
