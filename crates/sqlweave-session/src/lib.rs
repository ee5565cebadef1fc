//! # sqlweave session
//!
//! Mapped statements, the configuration registry and the caching executor.
//!
//! Mapper documents declare a namespace's cache, fragments and statements;
//! [`NamespaceBuilder::load`] registers them on a [`Configuration`]. A
//! session executor supplied by the application is wrapped with
//! [`Configuration::wrap_executor`] so selects go through the namespace's
//! transactional second-level cache.

pub mod assistant;
pub mod caching;
pub mod configuration;
pub mod definition;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod settings;

pub use assistant::NamespaceBuilder;
pub use caching::CachingExecutor;
pub use configuration::{Configuration, Resolution, Resolver};
pub use definition::{FragmentDefinition, NamespaceDefinition, StatementDefinition};
pub use error::{Result, SessionError};
pub use executor::{statement_cache_key, Executor};
pub use mapping::{MappedStatement, MappedStatementBuilder, RowBounds, SqlCommandType, StatementType};
pub use settings::{Settings, SettingsLoader, DEFAULT_ENV_PREFIX};
