//! The configuration registry
//!
//! [`Configuration`] owns everything statements are built from: caches by
//! namespace, `<sql>` fragments, mapped statements and the expression
//! evaluator. Elements that refer to something not registered yet (a cache
//! of another namespace, a fragment defined later) are queued as incomplete
//! and retried by [`resolve_pending`](Configuration::resolve_pending).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use sqlweave_cache::{Cache, CacheError};
use sqlweave_scripting::{
    ExpressionEvaluator, FragmentRegistry, SimpleExpressionEvaluator, XElement,
};
use tracing::{debug, info, warn};

use crate::caching::CachingExecutor;
use crate::error::{Result, SessionError};
use crate::executor::Executor;
use crate::mapping::MappedStatement;
use crate::settings::Settings;

/// Outcome of one attempt to complete a deferred element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Pending,
}

/// Retry closure for a deferred element. Returns `Pending` while its
/// dependency is still missing; an error aborts configuration.
pub type Resolver = Box<dyn FnMut(&mut Configuration) -> Result<Resolution> + Send>;

struct IncompleteElement {
    name: String,
    resolver: Resolver,
}

enum ShortName {
    Unique(String),
    Ambiguous(Vec<String>),
}

pub struct Configuration {
    settings: Settings,
    evaluator: Arc<dyn ExpressionEvaluator>,
    caches: HashMap<String, Arc<dyn Cache>>,
    cache_refs: HashMap<String, String>,
    fragments: FragmentRegistry,
    mapped_statements: HashMap<String, Arc<MappedStatement>>,
    short_names: HashMap<String, ShortName>,
    loaded_namespaces: HashSet<String>,
    incomplete: Vec<IncompleteElement>,
}

impl Configuration {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            evaluator: Arc::new(SimpleExpressionEvaluator::new()),
            caches: HashMap::new(),
            cache_refs: HashMap::new(),
            fragments: FragmentRegistry::new(),
            mapped_statements: HashMap::new(),
            short_names: HashMap::new(),
            loaded_namespaces: HashSet::new(),
            incomplete: Vec::new(),
        }
    }

    /// Replace the evaluator used by statements built from now on
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        Arc::clone(&self.evaluator)
    }

    pub fn database_id(&self) -> Option<&str> {
        self.settings.database_id.as_deref()
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.settings.cache_enabled
    }

    // caches

    pub fn add_cache(&mut self, cache: Arc<dyn Cache>) -> Result<()> {
        let id = cache.id().to_string();
        if self.caches.contains_key(&id) {
            return Err(CacheError::DuplicateCache { id }.into());
        }
        debug!(cache = %id, "registered cache");
        self.caches.insert(id, cache);
        Ok(())
    }

    pub fn cache(&self, id: &str) -> Option<Arc<dyn Cache>> {
        self.caches.get(id).cloned()
    }

    pub fn has_cache(&self, id: &str) -> bool {
        self.caches.contains_key(id)
    }

    pub fn cache_ids(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    /// Record that `namespace` shares the cache of `referenced`
    pub fn add_cache_ref(&mut self, namespace: impl Into<String>, referenced: impl Into<String>) {
        self.cache_refs.insert(namespace.into(), referenced.into());
    }

    pub fn cache_ref(&self, namespace: &str) -> Option<&str> {
        self.cache_refs.get(namespace).map(String::as_str)
    }

    // fragments

    pub fn add_fragment(&mut self, id: impl Into<String>, fragment: XElement) -> Result<()> {
        let id = id.into();
        if self.fragments.contains_key(&id) {
            return Err(SessionError::configuration(format!(
                "XML fragments parsed from previous mappers already contains value for {}",
                id
            )));
        }
        self.fragments.insert(id, fragment);
        Ok(())
    }

    pub fn fragments(&self) -> &FragmentRegistry {
        &self.fragments
    }

    // statements

    /// Register a statement under its full id. The part after the last `.`
    /// also resolves as long as no other statement shares it.
    pub fn add_mapped_statement(&mut self, statement: MappedStatement) -> Result<()> {
        let id = statement.id().to_string();
        if self.mapped_statements.contains_key(&id) {
            return Err(SessionError::configuration(format!(
                "Mapped Statements collection already contains value for {}",
                id
            )));
        }

        if let Some((_, short)) = id.rsplit_once('.') {
            match self.short_names.entry(short.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(ShortName::Unique(id.clone()));
                }
                Entry::Occupied(mut slot) => {
                    let candidates = match slot.get() {
                        ShortName::Unique(existing) => vec![existing.clone(), id.clone()],
                        ShortName::Ambiguous(existing) => {
                            let mut candidates = existing.clone();
                            candidates.push(id.clone());
                            candidates
                        }
                    };
                    slot.insert(ShortName::Ambiguous(candidates));
                }
            }
        }

        debug!(statement = %id, "registered mapped statement");
        self.mapped_statements.insert(id, Arc::new(statement));
        Ok(())
    }

    pub fn has_statement(&self, id: &str) -> bool {
        self.mapped_statements.contains_key(id)
    }

    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        if let Some(statement) = self.mapped_statements.get(id) {
            return Ok(Arc::clone(statement));
        }
        match self.short_names.get(id) {
            Some(ShortName::Unique(full)) => self
                .mapped_statements
                .get(full)
                .cloned()
                .ok_or_else(|| missing_statement(id)),
            Some(ShortName::Ambiguous(candidates)) => Err(SessionError::configuration(format!(
                "{} is ambiguous in Mapped Statements collection (try using the full name including the namespace, or rename one of the entries): {}",
                id,
                candidates.join(", ")
            ))),
            None => Err(missing_statement(id)),
        }
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.mapped_statements.keys().map(String::as_str)
    }

    // namespaces

    pub fn is_namespace_loaded(&self, namespace: &str) -> bool {
        self.loaded_namespaces.contains(namespace)
    }

    pub fn mark_namespace_loaded(&mut self, namespace: impl Into<String>) {
        self.loaded_namespaces.insert(namespace.into());
    }

    // deferred resolution

    /// Queue an element to be retried once more of the configuration exists
    pub fn add_incomplete(&mut self, name: impl Into<String>, resolver: Resolver) {
        let name = name.into();
        debug!(element = %name, "deferring incomplete element");
        self.incomplete.push(IncompleteElement { name, resolver });
    }

    pub fn pending_count(&self) -> usize {
        self.incomplete.len()
    }

    pub fn pending_names(&self) -> Vec<&str> {
        self.incomplete.iter().map(|e| e.name.as_str()).collect()
    }

    /// Retry queued elements until a pass resolves nothing. Returns how many
    /// remain. An element whose resolver fails is dropped and the error
    /// returned; the rest stay queued.
    pub fn resolve_pending(&mut self) -> Result<usize> {
        let mut pass = 0;
        loop {
            let queue = std::mem::take(&mut self.incomplete);
            if queue.is_empty() {
                return Ok(0);
            }
            pass += 1;

            let mut waiting = Vec::with_capacity(queue.len());
            let mut resolved = 0;
            let mut failure = None;
            for mut element in queue {
                if failure.is_some() {
                    waiting.push(element);
                    continue;
                }
                match (element.resolver)(self) {
                    Ok(Resolution::Resolved) => {
                        debug!(element = %element.name, pass, "resolved incomplete element");
                        resolved += 1;
                    }
                    Ok(Resolution::Pending) => waiting.push(element),
                    Err(e) => {
                        warn!(element = %element.name, error = %e, "incomplete element failed");
                        failure = Some(e);
                    }
                }
            }

            // elements deferred during this pass queue behind the survivors
            waiting.append(&mut self.incomplete);
            self.incomplete = waiting;

            if let Some(e) = failure {
                return Err(e);
            }
            if resolved == 0 {
                return Ok(self.incomplete.len());
            }
        }
    }

    /// Resolve what can be resolved; anything left is a configuration error
    pub fn finish(&mut self) -> Result<()> {
        let remaining = self.resolve_pending()?;
        if remaining > 0 {
            return Err(SessionError::configuration(format!(
                "unresolved configuration elements: {}",
                self.pending_names().join(", ")
            )));
        }
        info!(
            statements = self.mapped_statements.len(),
            caches = self.caches.len(),
            "configuration complete"
        );
        Ok(())
    }

    /// Decorate a session executor with the second-level cache when enabled
    pub fn wrap_executor<E>(&self, delegate: E, auto_commit: bool) -> Box<dyn Executor>
    where
        E: Executor + 'static,
    {
        if self.settings.cache_enabled {
            Box::new(CachingExecutor::new(delegate, auto_commit))
        } else {
            Box::new(delegate)
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .field("fragments", &self.fragments.len())
            .field("statements", &self.mapped_statements.len())
            .field("pending", &self.pending_names())
            .finish()
    }
}

fn missing_statement(id: &str) -> SessionError {
    SessionError::configuration(format!(
        "Mapped Statements collection does not contain value for {}",
        id
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sqlweave_cache::CacheBuilder;
    use sqlweave_scripting::{SqlSource, StaticSqlSource};

    use super::*;
    use crate::mapping::SqlCommandType;

    fn statement(id: &str) -> MappedStatement {
        MappedStatement::builder(
            id,
            SqlSource::Static(StaticSqlSource::new("select 1", Vec::new())),
            SqlCommandType::Select,
        )
        .build()
    }

    #[test]
    fn test_duplicate_cache_rejected() {
        let mut config = Configuration::default();
        config.add_cache(CacheBuilder::new("blog").build().unwrap()).unwrap();
        let err = config
            .add_cache(CacheBuilder::new("blog").build().unwrap())
            .unwrap_err();
        assert!(matches!(err, SessionError::Cache(CacheError::DuplicateCache { .. })));
        assert!(config.has_cache("blog"));
    }

    #[test]
    fn test_statement_lookup_by_full_and_short_name() {
        let mut config = Configuration::default();
        config.add_mapped_statement(statement("blog.select")).unwrap();
        config.add_mapped_statement(statement("blog.count")).unwrap();
        config.add_mapped_statement(statement("author.count")).unwrap();

        assert_eq!(config.mapped_statement("blog.select").unwrap().id(), "blog.select");
        assert_eq!(config.mapped_statement("select").unwrap().id(), "blog.select");
        assert_eq!(config.mapped_statement("author.count").unwrap().id(), "author.count");

        let err = config.mapped_statement("count").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        assert!(config.mapped_statement("missing").is_err());
    }

    #[test]
    fn test_duplicate_statement_rejected() {
        let mut config = Configuration::default();
        config.add_mapped_statement(statement("blog.select")).unwrap();
        assert!(matches!(
            config.add_mapped_statement(statement("blog.select")),
            Err(SessionError::Configuration { .. })
        ));
    }

    #[test]
    fn test_resolve_pending_in_dependency_order() {
        let mut config = Configuration::default();
        // "b" waits for a cache that "a" registers only once it is itself resolved
        config.add_incomplete(
            "b",
            Box::new(|cfg: &mut Configuration| -> Result<Resolution> {
                Ok(if cfg.has_cache("a") {
                    Resolution::Resolved
                } else {
                    Resolution::Pending
                })
            }),
        );
        config.add_incomplete(
            "a",
            Box::new(|cfg: &mut Configuration| -> Result<Resolution> {
                cfg.add_cache(CacheBuilder::new("a").build()?)?;
                Ok(Resolution::Resolved)
            }),
        );

        assert_eq!(config.resolve_pending().unwrap(), 0);
        assert_eq!(config.pending_count(), 0);
        config.finish().unwrap();
    }

    #[test]
    fn test_resolve_pending_stops_without_progress() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut config = Configuration::default();
        let counter = Arc::clone(&attempts);
        config.add_incomplete(
            "blog.select",
            Box::new(move |_: &mut Configuration| -> Result<Resolution> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Resolution::Pending)
            }),
        );

        assert_eq!(config.resolve_pending().unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let err = config.finish().unwrap_err();
        assert!(err.to_string().contains("blog.select"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolver_error_is_fatal() {
        let mut config = Configuration::default();
        config.add_incomplete(
            "broken",
            Box::new(|_: &mut Configuration| -> Result<Resolution> {
                Err(SessionError::configuration("bad template"))
            }),
        );
        config.add_incomplete(
            "waiting",
            Box::new(|_: &mut Configuration| -> Result<Resolution> { Ok(Resolution::Pending) }),
        );
        assert!(config.resolve_pending().is_err());
        assert_eq!(config.pending_names(), vec!["waiting"]);
    }

    #[test]
    fn test_wrap_executor_respects_setting() {
        let enabled = Configuration::default();
        assert!(!enabled.wrap_executor(NoopExecutor, false).is_closed());

        let mut settings = Settings::default();
        settings.cache_enabled = false;
        let disabled = Configuration::new(settings);
        assert!(!disabled.is_cache_enabled());
        assert!(!disabled.wrap_executor(NoopExecutor, true).is_closed());
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl Executor for NoopExecutor {
        async fn update(&mut self, _: &MappedStatement, _: &serde_json::Value) -> Result<u64> {
            Ok(0)
        }

        async fn query_with_key(
            &mut self,
            _: &MappedStatement,
            _: &serde_json::Value,
            _: crate::mapping::RowBounds,
            _: sqlweave_cache::CacheKey,
            _: &sqlweave_scripting::BoundSql<'_>,
        ) -> Result<sqlweave_cache::CacheValue> {
            Ok(Arc::new(serde_json::Value::Array(Vec::new())))
        }

        async fn commit(&mut self, _: bool) -> Result<()> {
            Ok(())
        }

        async fn rollback(&mut self, _: bool) -> Result<()> {
            Ok(())
        }

        fn is_cached(&self, _: &MappedStatement, _: &sqlweave_cache::CacheKey) -> Result<bool> {
            Ok(false)
        }

        fn defer_load(
            &mut self,
            _: &MappedStatement,
            _: &str,
            _: &sqlweave_cache::CacheKey,
        ) -> Result<()> {
            Ok(())
        }

        fn clear_local_cache(&mut self) {}

        async fn close(&mut self, _: bool) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }
}
