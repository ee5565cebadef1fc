//! Namespace-scoped registration
//!
//! A [`NamespaceBuilder`] registers one namespace's cache, fragments and
//! statements, qualifying every id with the namespace. Statements whose
//! cache reference or `<include>` target is not registered yet are queued on
//! the [`Configuration`] and retried as later namespaces load.

use std::sync::Arc;

use sqlweave_cache::{Cache, CacheConfig};
use sqlweave_scripting::{apply_namespace, parse_fragment, ScriptBuilder, ScriptError};
use tracing::{debug, info};

use crate::configuration::{Configuration, Resolution};
use crate::definition::{NamespaceDefinition, StatementDefinition};
use crate::error::{Result, SessionError};
use crate::mapping::MappedStatement;

/// Where a statement gets its cache from
#[derive(Clone)]
enum CacheSource {
    Resolved(Option<Arc<dyn Cache>>),
    Ref(String),
}

pub struct NamespaceBuilder<'c> {
    configuration: &'c mut Configuration,
    namespace: String,
    current_cache: Option<Arc<dyn Cache>>,
    unresolved_cache_ref: Option<String>,
}

impl<'c> NamespaceBuilder<'c> {
    pub fn new(configuration: &'c mut Configuration, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(SessionError::configuration("The mapper element requires a namespace"));
        }
        Ok(Self {
            configuration,
            namespace,
            current_cache: None,
            unresolved_cache_ref: None,
        })
    }

    /// Register a whole mapper document, then retry everything still pending.
    /// A namespace that is already loaded is skipped.
    pub fn load(configuration: &'c mut Configuration, definition: NamespaceDefinition) -> Result<()> {
        if configuration.is_namespace_loaded(&definition.namespace) {
            debug!(namespace = %definition.namespace, "namespace already loaded");
            return Ok(());
        }

        let mut builder = Self::new(configuration, definition.namespace)?;
        if let Some(referenced) = &definition.cache_ref {
            builder.use_cache_ref(referenced)?;
        }
        if let Some(cache) = definition.cache {
            builder.use_new_cache(Some(cache))?;
        }
        for fragment in &definition.fragments {
            builder.add_fragment(&fragment.id, &fragment.script)?;
        }

        // vendor-specific statements first so they win over generic ones
        let (specific, generic): (Vec<_>, Vec<_>) = definition
            .statements
            .into_iter()
            .partition(|statement| statement.database_id.is_some());
        for statement in specific.into_iter().chain(generic) {
            builder.add_statement(statement)?;
        }

        let namespace = builder.namespace;
        let configuration = builder.configuration;
        configuration.mark_namespace_loaded(namespace.clone());
        let pending = configuration.resolve_pending()?;
        info!(namespace = %namespace, pending, "loaded namespace");
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn current_cache(&self) -> Option<&Arc<dyn Cache>> {
        self.current_cache.as_ref()
    }

    /// Qualify an element id declared in this namespace
    pub fn qualify(&self, id: &str) -> Result<String> {
        qualify(&self.namespace, id)
    }

    /// Qualify a reference, which may already name another namespace
    pub fn qualify_reference(&self, reference: &str) -> String {
        apply_namespace(Some(&self.namespace), reference)
    }

    /// Build and register this namespace's own cache. Without an explicit
    /// configuration the settings entry for the namespace applies.
    pub fn use_new_cache(&mut self, config: Option<CacheConfig>) -> Result<Arc<dyn Cache>> {
        let config =
            config.unwrap_or_else(|| self.configuration.settings().cache_config(&self.namespace));
        let cache = config.builder(self.namespace.clone()).build()?;
        self.configuration.add_cache(Arc::clone(&cache))?;
        info!(
            namespace = %self.namespace,
            eviction = ?config.eviction,
            size = config.size,
            "created namespace cache"
        );
        self.current_cache = Some(Arc::clone(&cache));
        self.unresolved_cache_ref = None;
        Ok(cache)
    }

    /// Share the cache of another namespace. If that namespace has not
    /// registered its cache yet the reference is recorded as incomplete.
    pub fn use_cache_ref(&mut self, referenced: &str) -> Result<Resolution> {
        self.configuration
            .add_cache_ref(self.namespace.clone(), referenced.to_string());
        match self.configuration.cache(referenced) {
            Some(cache) => {
                self.current_cache = Some(cache);
                self.unresolved_cache_ref = None;
                Ok(Resolution::Resolved)
            }
            None => {
                let target = referenced.to_string();
                self.unresolved_cache_ref = Some(target.clone());
                self.configuration.add_incomplete(
                    format!("cache-ref {} -> {}", self.namespace, referenced),
                    Box::new(move |cfg: &mut Configuration| -> Result<Resolution> {
                        Ok(if cfg.has_cache(&target) {
                            Resolution::Resolved
                        } else {
                            Resolution::Pending
                        })
                    }),
                );
                Ok(Resolution::Pending)
            }
        }
    }

    pub fn add_fragment(&mut self, id: &str, script: &str) -> Result<String> {
        let id = self.qualify(id)?;
        let fragment = parse_fragment(&id, script)?;
        self.configuration.add_fragment(id.clone(), fragment)?;
        Ok(id)
    }

    /// Build and register a statement, or queue it when something it needs
    /// is not registered yet
    pub fn add_statement(&mut self, definition: StatementDefinition) -> Result<Resolution> {
        if !self.database_id_matches(&definition)? {
            debug!(
                statement = %definition.id,
                database_id = ?definition.database_id,
                "skipping statement for another database"
            );
            return Ok(Resolution::Resolved);
        }

        let source = match &self.unresolved_cache_ref {
            Some(referenced) => CacheSource::Ref(referenced.clone()),
            None => CacheSource::Resolved(self.current_cache.clone()),
        };
        let namespace = self.namespace.clone();

        match build_statement(self.configuration, &namespace, &definition, &source) {
            Ok(statement) => {
                self.configuration.add_mapped_statement(statement)?;
                Ok(Resolution::Resolved)
            }
            Err(e) if e.is_incomplete() => {
                debug!(statement = %definition.id, reason = %e, "statement incomplete");
                let name = apply_namespace(Some(&namespace), &definition.id);
                self.configuration.add_incomplete(
                    name,
                    Box::new(move |cfg: &mut Configuration| -> Result<Resolution> {
                        match build_statement(cfg, &namespace, &definition, &source) {
                            Ok(statement) => {
                                cfg.add_mapped_statement(statement)?;
                                Ok(Resolution::Resolved)
                            }
                            Err(e) if e.is_incomplete() => Ok(Resolution::Pending),
                            Err(e) => Err(e),
                        }
                    }),
                );
                Ok(Resolution::Pending)
            }
            Err(e) => Err(e),
        }
    }

    /// A vendor-specific statement needs a matching database id; a generic
    /// one is dropped when a vendor-specific variant is already registered
    fn database_id_matches(&self, definition: &StatementDefinition) -> Result<bool> {
        match definition.database_id.as_deref() {
            Some(required) => Ok(self.configuration.database_id() == Some(required)),
            None => {
                let id = self.qualify(&definition.id)?;
                Ok(!self.configuration.has_statement(&id))
            }
        }
    }
}

fn qualify(namespace: &str, id: &str) -> Result<String> {
    if let Some(local) = id.strip_prefix(namespace).and_then(|rest| rest.strip_prefix('.')) {
        if !local.contains('.') {
            return Ok(id.to_string());
        }
    }
    if id.contains('.') {
        return Err(SessionError::configuration(format!(
            "Dots are not allowed in element names, please remove it from {}",
            id
        )));
    }
    Ok(format!("{}.{}", namespace, id))
}

fn build_statement(
    configuration: &Configuration,
    namespace: &str,
    definition: &StatementDefinition,
    source: &CacheSource,
) -> Result<MappedStatement> {
    let cache = match source {
        CacheSource::Resolved(cache) => cache.clone(),
        CacheSource::Ref(referenced) => Some(configuration.cache(referenced).ok_or_else(|| {
            SessionError::incomplete(format!(
                "No cache for namespace '{}' could be found.",
                referenced
            ))
        })?),
    };

    let id = qualify(namespace, &definition.id)?;
    let sql_source = ScriptBuilder::new(configuration.evaluator())
        .fragments(configuration.fragments())
        .namespace(namespace)
        .database_id(configuration.database_id().map(str::to_string))
        .build(&id, &definition.script)
        .map_err(|e| match e {
            ScriptError::UnknownFragment { refid } => SessionError::incomplete(format!(
                "Could not find SQL statement to include with refid '{}'",
                refid
            )),
            other => other.into(),
        })?;

    let is_select = definition.command.is_select();
    Ok(MappedStatement::builder(id, sql_source, definition.command)
        .statement_type(definition.statement_type)
        .cache(cache)
        .flush_cache_required(definition.flush_cache.unwrap_or(!is_select))
        .use_cache(definition.use_cache.unwrap_or(is_select))
        .timeout(
            definition
                .timeout
                .or(configuration.settings().default_statement_timeout),
        )
        .database_id(definition.database_id.clone())
        .build())
}
