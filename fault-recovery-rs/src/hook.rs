//! Process-wide panic hook feeding the recovery boundaries.
//!
//! By the time `catch_unwind` returns, the faulting frames are gone. The hook
//! runs on the panicking thread before unwinding starts, so it walks the
//! stack there and parks the result in a thread-local slot. A boundary arms
//! its thread only while it polls the downstream future and picks the slot
//! up on the same thread once the unwind reaches it.
//!
//! The slot only ever describes the panic currently unwinding through the
//! armed poll. Arming clears it, and so does a poll that returns normally,
//! so a panic the handler swallowed itself never leaks into a later fault.

use std::cell::RefCell;
use std::panic;

use once_cell::sync::OnceCell;

use crate::inspector;
use crate::types::FrameDescriptor;

pub(crate) const HOOK_SOURCE: &str = file!();

static INSTALLED: OnceCell<()> = OnceCell::new();

thread_local! {
    // Skip depth of every boundary currently polling on this thread, innermost last.
    static ARMED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static CAPTURED: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

/// Raw material collected by the hook for one panic
#[derive(Debug, Default)]
pub(crate) struct CapturedPanic {
    pub frames: Vec<FrameDescriptor>,
    pub site: Option<String>,
}

/// Installs the hook once per process, chaining to the hook it replaces.
///
/// The previous hook sees every panic. Whether an armed panic is recovered
/// is only known once it reaches a boundary, which may never happen when
/// the handler catches it itself.
pub(crate) fn install() {
    INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if let Some(skip) = armed_skip() {
                let captured = CapturedPanic {
                    frames: inspector::walk(skip),
                    site: info
                        .location()
                        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                };
                let _ = CAPTURED.try_with(|slot| *slot.borrow_mut() = Some(captured));
            }
            previous(info);
        }));
        tracing::debug!("panic capture hook installed");
    });
}

fn armed_skip() -> Option<usize> {
    ARMED.try_with(|armed| armed.borrow().last().copied()).ok().flatten()
}

/// Marks the current thread as inside a recovery boundary until dropped.
///
/// Dropped on every exit from a poll, unwinding included.
pub(crate) struct ArmGuard(());

pub(crate) fn arm(skip: usize) -> ArmGuard {
    discard_captured();
    ARMED.with(|armed| armed.borrow_mut().push(skip));
    ArmGuard(())
}

impl Drop for ArmGuard {
    fn drop(&mut self) {
        let _ = ARMED.try_with(|armed| armed.borrow_mut().pop());
        // A capture survives the poll only while its panic is unwinding.
        if !std::thread::panicking() {
            discard_captured();
        }
    }
}

/// Takes whatever the hook captured on this thread
pub(crate) fn take_captured() -> Option<CapturedPanic> {
    CAPTURED.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

pub(crate) fn discard_captured() {
    let _ = CAPTURED.try_with(|slot| slot.borrow_mut().take());
}
