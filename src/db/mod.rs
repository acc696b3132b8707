//! Local SQLite notification store.
//!
//! Mirrors the Supabase side with an `email_notifications` table and an
//! `emails_to_be_sent` view standing in for the `get_emails_to_be_sent`
//! procedure, so the dispatcher can run without a Supabase project.

pub mod repo;

pub use repo::*;
