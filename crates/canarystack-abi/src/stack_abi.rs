//! Stack lifecycle and operations exported with C linkage.

use libc::{c_int, size_t};

use canarystack_core::{ErrorSet, Stack, StackConfig};

/// Opaque handle handed to C callers.
#[derive(Debug)]
pub struct CanaryStack {
    inner: Stack,
}

#[inline]
unsafe fn handle_mut<'a>(handle: *mut CanaryStack) -> Option<&'a mut Stack> {
    // SAFETY: callers pass either null or a pointer obtained from
    // `canarystack_new` that has not been freed.
    unsafe { handle.as_mut() }.map(|h| &mut h.inner)
}

#[inline]
unsafe fn handle_ref<'a>(handle: *const CanaryStack) -> Option<&'a Stack> {
    // SAFETY: see `handle_mut`.
    unsafe { handle.as_ref() }.map(|h| &h.inner)
}

/// Allocate an uninitialized handle. Returns null if the configuration
/// from the environment is rejected.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn canarystack_new() -> *mut CanaryStack {
    match Stack::with_config(StackConfig::from_env()) {
        Ok(inner) => Box::into_raw(Box::new(CanaryStack { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Release a handle from `canarystack_new`. Null is ignored.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_free(handle: *mut CanaryStack) {
    if handle.is_null() {
        return;
    }
    // SAFETY: non-null handles come from `Box::into_raw` in `canarystack_new`.
    drop(unsafe { Box::from_raw(handle) });
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_init(handle: *mut CanaryStack, preset: size_t) -> u32 {
    match unsafe { handle_mut(handle) } {
        Some(stack) => stack.create(preset).bits(),
        None => ErrorSet::NULL_REFERENCE.bits(),
    }
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_push(handle: *mut CanaryStack, value: c_int) -> u32 {
    match unsafe { handle_mut(handle) } {
        Some(stack) => stack.push(value).bits(),
        None => ErrorSet::NULL_REFERENCE.bits(),
    }
}

/// Pop into `*out`. A null `out` reports `NULL_ARGUMENT` after the handle
/// has been verified.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_pop(handle: *mut CanaryStack, out: *mut c_int) -> u32 {
    let Some(stack) = (unsafe { handle_mut(handle) }) else {
        return ErrorSet::NULL_REFERENCE.bits();
    };
    // SAFETY: a non-null `out` must point to writable `int` storage.
    let out = unsafe { out.as_mut() };
    stack.pop(out).bits()
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_destroy(handle: *mut CanaryStack) -> u32 {
    match unsafe { handle_mut(handle) } {
        Some(stack) => stack.destroy().bits(),
        None => ErrorSet::NULL_REFERENCE.bits(),
    }
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_verify(handle: *const CanaryStack) -> u32 {
    canarystack_core::verify(unsafe { handle_ref(handle) }).bits()
}

/// Live element count, or 0 for a null handle.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_size(handle: *const CanaryStack) -> size_t {
    unsafe { handle_ref(handle) }.map_or(0, Stack::size)
}

/// Allocated element count, or 0 for a null handle.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn canarystack_capacity(handle: *const CanaryStack) -> size_t {
    unsafe { handle_ref(handle) }.map_or(0, Stack::capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn lifecycle_through_the_boundary() {
        let h = canarystack_new();
        assert!(!h.is_null());
        unsafe {
            assert_eq!(canarystack_push(h, 1), ErrorSet::USE_BEFORE_INITIALIZE.bits());
            assert_eq!(canarystack_init(h, 10), 0);
            assert_eq!(canarystack_capacity(h), 16);
            for v in [1, 2, 3] {
                assert_eq!(canarystack_push(h, v), 0);
            }
            assert_eq!(canarystack_size(h), 3);

            let mut out: c_int = 0;
            assert_eq!(canarystack_pop(h, &mut out), 0);
            assert_eq!(out, 3);
            assert_eq!(canarystack_verify(h), 0);

            assert_eq!(canarystack_destroy(h), 0);
            assert_eq!(canarystack_destroy(h), ErrorSet::DOUBLE_DESTROY.bits());
            assert_eq!(canarystack_push(h, 4), ErrorSet::USE_AFTER_DESTROY.bits());
            canarystack_free(h);
        }
    }

    #[test]
    fn null_handle_is_null_reference() {
        let null = ptr::null_mut::<CanaryStack>();
        let bits = ErrorSet::NULL_REFERENCE.bits();
        unsafe {
            assert_eq!(canarystack_init(null, 0), bits);
            assert_eq!(canarystack_push(null, 1), bits);
            let mut out: c_int = 0;
            assert_eq!(canarystack_pop(null, &mut out), bits);
            assert_eq!(canarystack_destroy(null), bits);
            assert_eq!(canarystack_verify(null), bits);
            assert_eq!(canarystack_size(null), 0);
            assert_eq!(canarystack_capacity(null), 0);
            canarystack_free(null);
        }
    }

    #[test]
    fn null_out_is_null_argument() {
        let h = canarystack_new();
        unsafe {
            assert_eq!(canarystack_init(h, 0), 0);
            assert_eq!(canarystack_push(h, 9), 0);
            assert_eq!(
                canarystack_pop(h, ptr::null_mut()),
                ErrorSet::NULL_ARGUMENT.bits()
            );
            assert_eq!(canarystack_size(h), 1);
            canarystack_free(h);
        }
    }

    #[test]
    fn pop_empty_reports_flag() {
        let h = canarystack_new();
        unsafe {
            assert_eq!(canarystack_init(h, 0), 0);
            let mut out: c_int = 7;
            assert_eq!(canarystack_pop(h, &mut out), ErrorSet::POP_FROM_EMPTY.bits());
            assert_eq!(out, 7);
            canarystack_free(h);
        }
    }
}
