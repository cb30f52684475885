//! Bastion Policy Crate
//!
//! Whitelist data for the sanitizer: the immutable model, the definition
//! loader, the shared snapshot store and the URL scheme guard.

pub mod error;
pub mod loader;
pub mod scheme;
pub mod store;
pub mod whitelist;

pub use error::{PolicyError, PolicyResult};
pub use loader::{parse_named, parse_whitelist, DEFAULT_DEFINITION, DEFAULT_POLICY_NAME};
pub use scheme::{scheme_of, UrlSchemeGuard, ALWAYS_ALLOWED_SCHEMES, DEFAULT_SCHEMES};
pub use store::{
    BuiltinPolicySource, PolicySet, PolicySource, ReloadOutcome, StaticPolicySource, WhitelistStore,
};
pub use whitelist::{
    AttributeRules, StyleRule, StyleWhitelist, TagRule, ValueConstraint, ValueKind, Whitelist,
    STRUCTURAL_TAGS,
};
