//! Line-oriented log writer.
//!
//! One [`Logger`] binds a prefix, a set of [`LogFlags`], and an output sink
//! together at construction. Each call to [`Logger::output`] formats one line
//! and hands it to the sink in a single `write_all`, under a mutex, so lines
//! from concurrent recoveries never interleave.
//!
//! The line layout follows the classic `log` convention:
//!
//! ```text
//! [app] 2026/10/19 14:03:27 handlers.rs:42: Recovering from Panic: boom
//! ^^^^^ ^^^^^^^^^^ ^^^^^^^^ ^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^
//! prefix   DATE      TIME     SHORT_FILE    message
//! ```

use std::fmt::Write as _;
use std::io::{self, Write};
use std::ops::BitOr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, TimeZone, Utc};

// ── LogFlags ──────────────────────────────────────────────────────────────────

/// Metadata toggles for each log line.
///
/// Bit values match the conventional `log` flag layout, so a configuration
/// ported from elsewhere keeps its meaning.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct LogFlags(u32);

impl LogFlags {
    /// `2009/01/23` in the local time zone.
    pub const DATE: Self = Self(1);
    /// `01:23:23` in the local time zone.
    pub const TIME: Self = Self(1 << 1);
    /// `01:23:23.123123`. Assumes `TIME`.
    pub const MICROSECONDS: Self = Self(1 << 2);
    /// Full file path and line number: `/a/b/c/d.rs:23`.
    pub const LONG_FILE: Self = Self(1 << 3);
    /// Final path component and line number: `d.rs:23`. Overrides `LONG_FILE`.
    pub const SHORT_FILE: Self = Self(1 << 4);
    /// Use UTC rather than the local time zone.
    pub const UTC: Self = Self(1 << 5);
    /// Move the prefix from the start of the line to just before the message.
    pub const MSG_PREFIX: Self = Self(1 << 6);
    /// Initial values for the standard logger: `DATE | TIME`.
    pub const STD: Self = Self(Self::DATE.0 | Self::TIME.0);
    /// Sentinel: no metadata at all. Wins over every other bit.
    pub const DISABLED: Self = Self(1 << 31);

    /// The empty set. As a configuration value it means "use [`LogFlags::STD`]".
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Applies the configuration rules: `DISABLED` → nothing, empty → `STD`,
    /// anything else as given.
    pub(crate) fn resolve(self) -> Self {
        if self.contains(Self::DISABLED) {
            Self::empty()
        } else if self.is_empty() {
            Self::STD
        } else {
            self
        }
    }
}

impl BitOr for LogFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// Source location reported by the `LONG_FILE` / `SHORT_FILE` flags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Caller {
    pub(crate) file: String,
    pub(crate) line: u32,
}

impl From<&std::panic::Location<'_>> for Caller {
    fn from(loc: &std::panic::Location<'_>) -> Self {
        Self { file: loc.file().to_owned(), line: loc.line() }
    }
}

/// A prefix, a flag set, and a sink bound together once.
pub(crate) struct Logger {
    prefix: String,
    flags: LogFlags,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    /// `flags` must already be resolved; the prefix is used verbatim.
    pub(crate) fn new(out: Box<dyn Write + Send>, prefix: String, flags: LogFlags) -> Self {
        Self { prefix, flags, out: Mutex::new(out) }
    }

    /// Formats and writes one line. A trailing newline is added if `msg`
    /// lacks one.
    pub(crate) fn output(&self, caller: &Caller, msg: &str) -> io::Result<()> {
        let line = self.format(Utc::now(), caller, msg);
        // A poisoned sink is still a usable sink; the lock only orders writes.
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())?;
        out.flush()
    }

    fn format(&self, now: DateTime<Utc>, caller: &Caller, msg: &str) -> String {
        let mut line = String::with_capacity(self.prefix.len() + msg.len() + 48);
        let flags = self.flags;

        if !flags.contains(LogFlags::MSG_PREFIX) {
            line.push_str(&self.prefix);
        }
        if flags.intersects(LogFlags::DATE | LogFlags::TIME | LogFlags::MICROSECONDS) {
            if flags.contains(LogFlags::UTC) {
                write_timestamp(&mut line, flags, &now);
            } else {
                write_timestamp(&mut line, flags, &now.with_timezone(&Local));
            }
        }
        if flags.intersects(LogFlags::SHORT_FILE | LogFlags::LONG_FILE) {
            let file = if flags.contains(LogFlags::SHORT_FILE) {
                short_file(&caller.file)
            } else {
                caller.file.as_str()
            };
            let _ = write!(line, "{file}:{}: ", caller.line);
        }
        if flags.contains(LogFlags::MSG_PREFIX) {
            line.push_str(&self.prefix);
        }

        line.push_str(msg);
        if !msg.ends_with('\n') {
            line.push('\n');
        }
        line
    }
}

fn write_timestamp<Tz>(line: &mut String, flags: LogFlags, t: &DateTime<Tz>)
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if flags.contains(LogFlags::DATE) {
        let _ = write!(line, "{} ", t.format("%Y/%m/%d"));
    }
    if flags.intersects(LogFlags::TIME | LogFlags::MICROSECONDS) {
        let _ = write!(line, "{}", t.format("%H:%M:%S"));
        if flags.contains(LogFlags::MICROSECONDS) {
            let _ = write!(line, "{}", t.format("%.6f"));
        }
        line.push(' ');
    }
}

/// Final path component, for either separator.
fn short_file(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn caller() -> Caller {
        Caller { file: "src/handlers/users.rs".to_owned(), line: 42 }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 12, 5, 23, 15, 11).unwrap()
    }

    fn logger(prefix: &str, flags: LogFlags) -> Logger {
        Logger::new(Box::new(io::sink()), prefix.to_owned(), flags)
    }

    #[test]
    fn resolve_applies_default_and_sentinel() {
        assert_eq!(LogFlags::empty().resolve(), LogFlags::STD);
        assert_eq!(LogFlags::DISABLED.resolve(), LogFlags::empty());
        assert_eq!((LogFlags::DISABLED | LogFlags::DATE).resolve(), LogFlags::empty());
        assert_eq!(LogFlags::SHORT_FILE.resolve(), LogFlags::SHORT_FILE);
    }

    #[test]
    fn utc_date_and_time_follow_the_prefix() {
        let log = logger("[app] ", LogFlags::STD | LogFlags::UTC);
        let line = log.format(fixed_time(), &caller(), "hello");
        assert_eq!(line, "[app] 2014/12/05 23:15:11 hello\n");
    }

    #[test]
    fn microseconds_extend_the_time() {
        let log = logger("", LogFlags::TIME | LogFlags::MICROSECONDS | LogFlags::UTC);
        let line = log.format(fixed_time(), &caller(), "m");
        assert_eq!(line, "23:15:11.000000 m\n");
    }

    #[test]
    fn short_file_overrides_long_file() {
        let log = logger("", LogFlags::SHORT_FILE | LogFlags::LONG_FILE);
        assert_eq!(log.format(fixed_time(), &caller(), "m"), "users.rs:42: m\n");

        let log = logger("", LogFlags::LONG_FILE);
        assert_eq!(log.format(fixed_time(), &caller(), "m"), "src/handlers/users.rs:42: m\n");
    }

    #[test]
    fn msg_prefix_moves_prefix_after_metadata() {
        let log = logger("[app] ", LogFlags::SHORT_FILE | LogFlags::MSG_PREFIX);
        assert_eq!(log.format(fixed_time(), &caller(), "m"), "users.rs:42: [app] m\n");
    }

    #[test]
    fn no_extra_newline_when_message_has_one() {
        let log = logger("", LogFlags::empty());
        assert_eq!(log.format(fixed_time(), &caller(), "done\n"), "done\n");
    }

    #[test]
    fn output_writes_one_line_to_the_sink() {
        let sink = Sink::default();
        let log = Logger::new(Box::new(sink.clone()), "p ".to_owned(), LogFlags::empty());
        log.output(&caller(), "first").unwrap();
        log.output(&caller(), "second").unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), b"p first\np second\n");
    }

    #[test]
    fn short_file_handles_both_separators() {
        assert_eq!(short_file("a/b/c.rs"), "c.rs");
        assert_eq!(short_file(r"a\b\c.rs"), "c.rs");
        assert_eq!(short_file("c.rs"), "c.rs");
    }
}
