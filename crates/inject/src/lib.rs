//! Prompt injection for chat-site composers.
//!
//! Each provider is described by a row in [`providers`]: ordered locator
//! chains for the composer and send control, plus optional mode toggles.
//! [`Injector`] walks those chains against any [`PageDom`] and reports soft
//! failures as warnings instead of errors.

pub mod chain;
pub mod dom;
pub mod engine;
pub mod outcome;
pub mod providers;
pub mod toggle;

#[cfg(test)]
pub(crate) mod fake;

pub use chain::{resolve_chain, resolve_with_budget, Budget, Lookup, Resolved, Strategy};
pub use dom::{ElementHandle, Key, Locator, PageDom};
pub use engine::{Injector, SubmitOptions};
pub use outcome::{InjectOutcome, SoftDegradation};
pub use providers::{profile, ProviderProfile, ToggleSpec, Verify};
