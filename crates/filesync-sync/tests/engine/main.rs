//! Integration tests for the sync engine
//!
//! Each test drives a real `FileSync` over SQLite stores against an
//! in-process remote.

mod test_delete;
mod test_recovery;
mod test_upload;
