use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::error::StepError;
use super::events::EventBus;
use super::vu::VuContext;

pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + 'a>>;

/// A user hook invoked by a `Function` step. Resolving the returned future
/// continues the pipeline; an `Err` aborts the VU.
pub type HookFn =
    Arc<dyn for<'a> Fn(&'a mut VuContext, &'a EventBus) -> HookFuture<'a> + Send + Sync>;

/// A user predicate driving `Loop { over: Predicate(..) }` steps.
pub type PredicateFn = Arc<dyn Fn(&VuContext) -> bool + Send + Sync>;

/// Registry of user-supplied functions and predicates, injected into the
/// runner and resolved once at scenario compile time.
#[derive(Default, Clone)]
pub struct Hooks {
    functions: HashMap<String, HookFn>,
    predicates: HashMap<String, PredicateFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn function(
        mut self,
        name: impl Into<String>,
        f: impl for<'a> Fn(&'a mut VuContext, &'a EventBus) -> HookFuture<'a>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn predicate(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&VuContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.insert(name.into(), Arc::new(f));
        self
    }

    pub(crate) fn get_function(&self, name: &str) -> Option<HookFn> {
        self.functions.get(name).cloned()
    }

    pub(crate) fn get_predicate(&self, name: &str) -> Option<PredicateFn> {
        self.predicates.get(name).cloned()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}
