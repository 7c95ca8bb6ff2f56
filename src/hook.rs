//! Panic hook that records the stack at the panic site.
//!
//! [`Recoverer::wrap`](crate::Recoverer::wrap) runs its operation inside a
//! [`RecoveryScope`]. While a scope is open on the current thread, the hook
//! captures the stack before unwinding starts and leaves it for the recoverer
//! to pick up with [`take_captured`]. The previously installed hook is not
//! called for such panics, so recovered panics are not printed. Panics outside
//! a scope are forwarded to the previous hook unchanged.
//!
//! A hook installed by the application after the first recovery replaces this
//! one; the recoverer then falls back to capturing the stack after unwinding.

use std::{cell::RefCell, panic, sync::Once};

use crate::StackCapture;

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<StackCapture>> = const { RefCell::new(Vec::new()) };
    static CAPTURED_STACK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Marks the current thread as recovering panics until dropped.
#[must_use]
pub(crate) struct RecoveryScope {
    _priv: (),
}

/// Opens a recovery scope, installing the hook on first use.
///
/// The innermost open scope decides how the stack is captured.
pub(crate) fn enter(stack_capture: StackCapture) -> RecoveryScope {
    static ONCE: Once = Once::new();
    ONCE.call_once(install);

    ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(stack_capture));
    RecoveryScope { _priv: () }
}

impl Drop for RecoveryScope {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

/// Takes the stack recorded by the most recent panic in a recovery scope.
pub(crate) fn take_captured() -> Option<Vec<String>> {
    CAPTURED_STACK.with(|slot| slot.borrow_mut().take())
}

fn innermost_scope() -> Option<StackCapture> {
    ACTIVE_SCOPES
        .try_with(|scopes| scopes.try_borrow().ok()?.last().copied())
        .ok()
        .flatten()
}

fn install() {
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let Some(stack_capture) = innermost_scope() else {
            previous_hook(panic_info);
            return;
        };

        let stack = stack_capture.capture_at_panic();
        let stored = CAPTURED_STACK
            .try_with(|slot| {
                slot.try_borrow_mut()
                    .map(|mut slot| *slot = Some(stack))
                    .is_ok()
            })
            .unwrap_or(false);
        if !stored {
            previous_hook(panic_info);
        }
    }));
}
