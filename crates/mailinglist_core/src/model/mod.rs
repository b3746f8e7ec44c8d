//! Domain vocabulary for mailing lists and their subscriptions.
//!
//! # Responsibility
//! - Define the closed enumerations every other layer speaks in.
//! - Keep list records, actors and log entries as plain data.
//!
//! # Invariants
//! - Subscription state `none` is never a value; it is row absence
//!   (`Option<SubscriptionState>::None`).
//! - Every enumeration has one stable string (or numeric) id used in storage.

pub mod log;
pub mod mailinglist;
pub mod subscription;
pub mod user;

/// Persona identifier owned by the external persona directory.
pub type PersonaId = i64;
/// Mailing list identifier assigned by the store.
pub type MailinglistId = i64;
/// Event identifier owned by the external event registry.
pub type EventId = i64;
/// Assembly identifier owned by the external assembly registry.
pub type AssemblyId = i64;
