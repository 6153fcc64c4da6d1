//! Custom assertions for `RippleResult`/`RippleError`. Each is
//! `#[track_caller]` so a failure panics at the call site, not inside the
//! helper.

use ripple_core::{ErrorKind, RippleError, RippleResult};

#[track_caller]
pub fn assert_ok<T: std::fmt::Debug>(result: &RippleResult<T>) {
    assert!(result.is_ok(), "expected Ok, got Err: {:?}", result);
}

#[track_caller]
pub fn assert_err<T: std::fmt::Debug>(result: &RippleResult<T>) {
    assert!(result.is_err(), "expected Err, got Ok: {:?}", result);
}

#[track_caller]
pub fn assert_error_kind<T: std::fmt::Debug>(result: &RippleResult<T>, expected: ErrorKind) {
    match result {
        Err(err) => assert_eq!(err.kind(), expected, "wrong error kind for {:?}", err),
        Ok(value) => panic!("expected an error of kind {:?}, got Ok({:?})", expected, value),
    }
}

#[track_caller]
pub fn assert_not_ready<T: std::fmt::Debug>(result: &RippleResult<T>) {
    assert_error_kind(result, ErrorKind::NotReady);
}

#[track_caller]
pub fn assert_retryable(err: &RippleError) {
    assert!(err.is_retryable(), "expected a retryable error, got: {:?}", err);
}

#[track_caller]
pub fn assert_not_retryable(err: &RippleError) {
    assert!(!err.is_retryable(), "expected a non-retryable error, got: {:?}", err);
}
