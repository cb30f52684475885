//! Shared, atomically replaceable policy snapshots.
//!
//! Readers clone an `Arc` under a short read lock and keep using that snapshot
//! for the rest of their call. Reloads build a complete new [`PolicySet`] and
//! publish it with a single pointer swap, so nobody ever sees a half-built map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{PolicyError, PolicyResult};
use crate::loader::{parse_named, DEFAULT_DEFINITION, DEFAULT_POLICY_NAME};
use crate::scheme::UrlSchemeGuard;
use crate::whitelist::Whitelist;

/// Configuration provider seam: supplies policy text and the scheme list.
pub trait PolicySource: Send + Sync {
    /// Definition text for a named policy, or the default one for `None`.
    fn definition(&self, name: Option<&str>) -> Option<String>;

    /// Comma separated list of allowed URL schemes.
    fn allowed_url_schemes(&self) -> Option<String> {
        None
    }
}

/// Source that only knows the compiled-in default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPolicySource;

impl PolicySource for BuiltinPolicySource {
    fn definition(&self, name: Option<&str>) -> Option<String> {
        match name {
            None => Some(DEFAULT_DEFINITION.to_string()),
            Some(_) => None,
        }
    }
}

/// In-memory source, mostly useful for hosts that already hold their config.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    default: Option<String>,
    named: HashMap<String, String>,
    schemes: Option<String>,
}

impl StaticPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, definition: impl Into<String>) -> Self {
        self.default = Some(definition.into());
        self
    }

    pub fn with_policy(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.named.insert(name.into(), definition.into());
        self
    }

    pub fn with_schemes(mut self, schemes: impl Into<String>) -> Self {
        self.schemes = Some(schemes.into());
        self
    }
}

impl PolicySource for StaticPolicySource {
    fn definition(&self, name: Option<&str>) -> Option<String> {
        match name {
            None => self.default.clone(),
            Some(name) => self.named.get(name).cloned(),
        }
    }

    fn allowed_url_schemes(&self) -> Option<String> {
        self.schemes.clone()
    }
}

/// One consistent generation of policies.
#[derive(Debug, Clone)]
pub struct PolicySet {
    default: Arc<Whitelist>,
    named: HashMap<String, Arc<Whitelist>>,
    schemes: Arc<UrlSchemeGuard>,
    generation: u64,
}

impl PolicySet {
    pub fn default_whitelist(&self) -> &Arc<Whitelist> {
        &self.default
    }

    /// A named whitelist already loaded into this generation.
    pub fn named(&self, name: &str) -> Option<&Arc<Whitelist>> {
        self.named.get(name)
    }

    pub fn scheme_guard(&self) -> &Arc<UrlSchemeGuard> {
        &self.schemes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Summary of a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Generation number now published
    pub generation: u64,
    /// Whether the compiled-in default had to be substituted
    pub used_builtin_default: bool,
    /// Non-fatal problems met while loading
    pub warnings: Vec<String>,
}

/// Holds the current [`PolicySet`] and swaps it on reload.
pub struct WhitelistStore {
    source: Arc<dyn PolicySource>,
    current: RwLock<Arc<PolicySet>>,
    /// Serializes reloads and lazy loading of named policies
    writer: Mutex<()>,
}

impl WhitelistStore {
    /// Build a store and load the default policy from `source`.
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        let (set, outcome) = build_set(source.as_ref(), 1);
        for warning in &outcome.warnings {
            log::warn!("{}", warning);
        }
        Self {
            source,
            current: RwLock::new(Arc::new(set)),
            writer: Mutex::new(()),
        }
    }

    /// Store backed by the compiled-in default policy only.
    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinPolicySource))
    }

    /// Consistent snapshot of the current generation.
    pub fn snapshot(&self) -> Arc<PolicySet> {
        self.current.read().clone()
    }

    /// The whitelist to use for `policy`, loading a named policy on first use.
    ///
    /// An unknown or unreadable named policy falls back to the default one.
    pub fn whitelist(&self, policy: Option<&str>) -> Arc<Whitelist> {
        let Some(name) = policy else {
            return Arc::clone(self.snapshot().default_whitelist());
        };

        if let Some(found) = self.snapshot().named(name) {
            return Arc::clone(found);
        }

        let _guard = self.writer.lock();
        let current = self.snapshot();
        if let Some(found) = current.named(name) {
            return Arc::clone(found);
        }

        let loaded = match load_named(self.source.as_ref(), name) {
            Ok(whitelist) => Arc::new(whitelist),
            Err(err) => {
                log::warn!("{}; using the default policy for `{}`", err, name);
                Arc::clone(current.default_whitelist())
            }
        };

        let mut next = (*current).clone();
        next.named.insert(name.to_string(), Arc::clone(&loaded));
        *self.current.write() = Arc::new(next);
        loaded
    }

    pub fn scheme_guard(&self) -> Arc<UrlSchemeGuard> {
        Arc::clone(self.snapshot().scheme_guard())
    }

    /// Rebuild every policy from the source and publish the result.
    ///
    /// Named policies are dropped and reloaded lazily on their next use.
    pub fn reload(&self) -> ReloadOutcome {
        let _guard = self.writer.lock();
        let generation = self.current.read().generation + 1;
        let (set, outcome) = build_set(self.source.as_ref(), generation);
        for warning in &outcome.warnings {
            log::warn!("{}", warning);
        }
        *self.current.write() = Arc::new(set);
        log::info!("whitelist store reloaded, generation {}", generation);
        outcome
    }
}

impl std::fmt::Debug for WhitelistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistStore")
            .field("generation", &self.current.read().generation)
            .finish()
    }
}

fn load_named(source: &dyn PolicySource, name: &str) -> PolicyResult<Whitelist> {
    let text = source
        .definition(Some(name))
        .ok_or_else(|| PolicyError::Unavailable { name: name.to_string() })?;
    parse_named(name, &text)
}

fn builtin_default() -> Whitelist {
    // The embedded definition always parses; see the loader tests.
    parse_named(DEFAULT_POLICY_NAME, DEFAULT_DEFINITION)
        .unwrap_or_else(|_| Whitelist::new(HashMap::new(), Default::default()))
}

fn build_set(source: &dyn PolicySource, generation: u64) -> (PolicySet, ReloadOutcome) {
    let mut warnings = Vec::new();
    let mut used_builtin_default = false;

    let default = match source.definition(None) {
        Some(text) => match parse_named(DEFAULT_POLICY_NAME, &text) {
            Ok(whitelist) => whitelist,
            Err(err) => {
                warnings.push(format!("{}; falling back to the built-in whitelist", err));
                used_builtin_default = true;
                builtin_default()
            }
        },
        None => {
            let err = PolicyError::Unavailable { name: DEFAULT_POLICY_NAME.to_string() };
            warnings.push(format!("{}; falling back to the built-in whitelist", err));
            used_builtin_default = true;
            builtin_default()
        }
    };

    let schemes = match source.allowed_url_schemes() {
        Some(list) => UrlSchemeGuard::from_list(&list).unwrap_or_else(|err| {
            warnings.push(format!("{}; using the default scheme list", err));
            UrlSchemeGuard::default()
        }),
        None => UrlSchemeGuard::default(),
    };

    let set = PolicySet {
        default: Arc::new(default),
        named: HashMap::new(),
        schemes: Arc::new(schemes),
        generation,
    };
    let outcome = ReloadOutcome {
        generation,
        used_builtin_default,
        warnings,
    };
    (set, outcome)
}
