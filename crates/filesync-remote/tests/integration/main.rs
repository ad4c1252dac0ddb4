//! Integration tests for filesync-remote
//!
//! Uses wiremock to simulate the remote block service and verifies the
//! request shapes and error classification of `HttpRemoteStore`.

mod common;

mod test_check;
mod test_delete;
mod test_push;
