//! Stack capture at the panic site.
//!
//! By the time `catch_unwind` hands back a payload the stack has already been
//! unwound, so the interesting frames are gone. A process-wide panic hook
//! records them while they still exist: when the panicking thread is inside a
//! [`Scope`], the hook stores a [`PanicRecord`] in a thread-local slot. The
//! recovery middleware collects the record on the same thread right after
//! unwinding stops.
//!
//! The hook that was installed before ours still sees every panic, unless
//! the innermost boundaries asked for silence.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::panic::{self, Location};
use std::sync::Once;
use std::thread;

use super::logger::Caller;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static SILENCED: Cell<usize> = const { Cell::new(0) };
    static PENDING: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

/// What the hook saw at the moment of the panic.
#[derive(Debug)]
pub(crate) struct PanicRecord {
    pub(crate) thread: String,
    pub(crate) location: Option<Caller>,
    pub(crate) backtrace: String,
}

/// Installs the recording hook. Idempotent; the previously installed hook is
/// kept and runs after ours.
pub(crate) fn install_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) > 0 {
                let record = PanicRecord {
                    thread: thread_name(),
                    location: info.location().map(Caller::from),
                    backtrace: Backtrace::force_capture().to_string(),
                };
                PENDING.with(|slot| *slot.borrow_mut() = Some(record));
                if SILENCED.with(Cell::get) > 0 {
                    return;
                }
            }
            previous(info);
        }));
    });
}

/// Marks the current thread as inside a recovery boundary while alive.
///
/// Dropped on every exit path, unwinding included, so the depth never leaks.
/// Entering the outermost scope discards any record an earlier panic left on
/// this thread, so a panic that skips the hook (`resume_unwind`) is never
/// paired with someone else's stack.
pub(crate) struct Scope {
    silenced: bool,
}

impl Scope {
    /// `silenced` keeps panics inside this scope away from the previous hook.
    pub(crate) fn enter(silenced: bool) -> Self {
        let outermost = DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth == 0
        });
        if outermost {
            discard_record();
        }
        if silenced {
            SILENCED.with(|s| s.set(s.get() + 1));
        }
        Self { silenced }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
        if self.silenced {
            SILENCED.with(|s| s.set(s.get().saturating_sub(1)));
        }
    }
}

/// Takes the record left by the hook on this thread, if any.
pub(crate) fn take_record() -> Option<PanicRecord> {
    PENDING.with(|slot| slot.borrow_mut().take())
}

/// Drops whatever a panic caught elsewhere left on this thread.
pub(crate) fn discard_record() {
    drop(take_record());
}

/// The message carried by a panic payload.
///
/// `panic!("literal")` carries a `&'static str`, formatted panics carry a
/// `String`; anything else comes from `panic_any` and has no text.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// Builds the stack text for one recovered panic, at most `limit` bytes.
///
/// The faulting thread comes first. With `full`, the recovering context's own
/// backtrace and a header per other thread of the process are appended.
pub(crate) fn snapshot(record: Option<&PanicRecord>, full: bool, limit: usize) -> String {
    let current = thread_name();

    let mut text = String::new();
    match record {
        Some(record) => {
            let _ = write!(text, "thread '{}' [running]:\n{}", record.thread, record.backtrace);
        }
        // No record means another hook replaced ours; this point is the best
        // remaining view of the stack.
        None => {
            let _ = write!(text, "thread '{current}' [running]:\n{}", Backtrace::force_capture());
        }
    }

    if full {
        let _ = write!(
            text,
            "\nthread '{current}' [recovering]:\n{}",
            Backtrace::force_capture(),
        );
        for other in other_threads() {
            let _ = write!(text, "\n{other}\n");
        }
    }

    truncate(&mut text, limit);
    text
}

fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_owned()
}

/// Headers for every other thread of this process.
#[cfg(target_os = "linux")]
fn other_threads() -> Vec<String> {
    let this = std::fs::read_link("/proc/thread-self")
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

    let Ok(tasks) = std::fs::read_dir("/proc/self/task") else {
        return Vec::new();
    };
    let mut headers: Vec<(u64, String)> = tasks
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let tid = entry.file_name().to_string_lossy().into_owned();
            if this.as_deref() == Some(tid.as_str()) {
                return None;
            }
            let comm = std::fs::read_to_string(entry.path().join("comm")).unwrap_or_default();
            let n = tid.parse().ok()?;
            Some((n, format!("thread '{}' [tid {tid}]", comm.trim_end())))
        })
        .collect();
    headers.sort_unstable_by_key(|(tid, _)| *tid);
    headers.into_iter().map(|(_, header)| header).collect()
}

#[cfg(not(target_os = "linux"))]
fn other_threads() -> Vec<String> {
    Vec::new()
}

/// Cuts `text` to at most `limit` bytes without splitting a character.
fn truncate(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// Where the panic happened, or the caller of this function when unknown.
#[track_caller]
pub(crate) fn caller_of(record: Option<&PanicRecord>) -> Caller {
    record
        .and_then(|r| r.location.clone())
        .unwrap_or_else(|| Caller::from(Location::caller()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_message_reads_str_and_string() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let formatted: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(payload_message(&*literal), "boom");
        assert_eq!(payload_message(&*formatted), "code 7");
        assert_eq!(payload_message(&*other), "Box<dyn Any>");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut s = "aé".to_owned();
        truncate(&mut s, 2);
        assert_eq!(s, "a");

        let mut s = "abc".to_owned();
        truncate(&mut s, 8);
        assert_eq!(s, "abc");
    }

    #[test]
    fn scope_depth_unwinds_with_the_stack() {
        let result = std::panic::catch_unwind(|| {
            let _outer = Scope::enter(false);
            let _inner = Scope::enter(false);
            assert_eq!(DEPTH.with(Cell::get), 2);
            panic!("unwind through both scopes");
        });
        assert!(result.is_err());
        assert_eq!(DEPTH.with(Cell::get), 0);
        // Leave no record behind for other tests sharing this thread.
        let _ = take_record();
    }

    #[test]
    fn hook_records_inside_a_scope() {
        install_hook();
        let result = std::panic::catch_unwind(|| {
            let _scope = Scope::enter(false);
            panic!("recorded");
        });
        assert!(result.is_err());

        let record = take_record().expect("hook should leave a record");
        assert!(record.location.unwrap().file.ends_with("stack.rs"));
        assert!(!record.backtrace.is_empty());
        assert!(take_record().is_none());
    }

    #[inline(never)]
    fn panic_and_get_caught() {
        let _ = std::panic::catch_unwind(|| {
            let _scope = Scope::enter(false);
            panic!("left behind");
        });
    }

    #[test]
    fn outermost_scope_discards_a_leftover_record() {
        install_hook();
        panic_and_get_caught();
        {
            let _outer = Scope::enter(false);
            let _inner = Scope::enter(false);
        }
        assert!(take_record().is_none());
    }

    #[test]
    fn inner_scope_keeps_the_pending_record() {
        install_hook();
        let _outer = Scope::enter(false);
        let _ = std::panic::catch_unwind(|| panic!("inside the boundary"));
        let _inner = Scope::enter(false);
        assert!(take_record().is_some());
    }

    #[test]
    fn silenced_scopes_nest_and_unwind() {
        {
            let _loud = Scope::enter(false);
            let _quiet = Scope::enter(true);
            assert_eq!(SILENCED.with(Cell::get), 1);
        }
        assert_eq!(SILENCED.with(Cell::get), 0);
        assert_eq!(DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn snapshot_is_bounded_and_full_is_larger() {
        let record = PanicRecord {
            thread: "worker".to_owned(),
            location: None,
            backtrace: "frame\n".repeat(10),
        };
        let short = snapshot(Some(&record), false, 8192);
        let full = snapshot(Some(&record), true, 8192);
        assert!(short.starts_with("thread 'worker' [running]:\nframe\n"));
        assert!(full.len() > short.len());
        assert!(full.starts_with(&short));

        assert_eq!(snapshot(Some(&record), true, 50).len(), 50);
    }

    #[test]
    fn caller_prefers_the_panic_site() {
        let record = PanicRecord {
            thread: "worker".to_owned(),
            location: Some(Caller { file: "src/app.rs".to_owned(), line: 9 }),
            backtrace: String::new(),
        };
        assert_eq!(caller_of(Some(&record)).line, 9);
        assert!(caller_of(None).file.ends_with("stack.rs"));
    }
}
