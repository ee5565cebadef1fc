//! End-to-end tests for the transactional second-level cache
//!
//! Mapper documents are loaded into a shared configuration and several
//! sessions run against it, each with its own executor backed by a
//! recording fake database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlweave_cache::{CacheConfig, CacheKey, CacheValue};
use sqlweave_scripting::BoundSql;
use sqlweave_session::{
    Configuration, Executor, MappedStatement, NamespaceBuilder, NamespaceDefinition, Result,
    RowBounds, SessionError, Settings,
};

const BLOG_MAPPER: &str = r#"
namespace: blog
cache:
  eviction: lru
  size: 64
fragments:
  - id: columns
    script: "id, title"
statements:
  - id: byId
    command: select
    script: "select <include refid='columns'/> from blog where id = #{id}"
  - id: rename
    command: update
    script: "update blog <set><if test='title != null'>title = #{title},</if></set> where id = #{id}"
  - id: uncached
    command: select
    use_cache: false
    script: "select count(*) from blog"
"#;

const COMMENT_MAPPER: &str = r#"
namespace = "comment"
cache_ref = "blog"

[[statements]]
id = "byPost"
command = "select"
script = "select * from comment where post_id = #{postId}"
"#;

/// Answers queries with the composed statement and counts round trips
struct RecordingExecutor {
    queries: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    closed: bool,
}

impl RecordingExecutor {
    fn new(queries: &Arc<AtomicUsize>, updates: &Arc<AtomicUsize>) -> Self {
        Self {
            queries: Arc::clone(queries),
            updates: Arc::clone(updates),
            closed: false,
        }
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn update(&mut self, _ms: &MappedStatement, _parameter: &Value) -> Result<u64> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn query_with_key(
        &mut self,
        _ms: &MappedStatement,
        _parameter: &Value,
        _bounds: RowBounds,
        _key: CacheKey,
        bound: &BoundSql<'_>,
    ) -> Result<CacheValue> {
        let call = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        let params = bound
            .parameter_values()
            .map_err(|e| SessionError::executor(e.to_string()))?;
        Ok(Arc::new(json!([{ "sql": bound.sql(), "params": params, "call": call }])))
    }

    async fn commit(&mut self, _required: bool) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self, _required: bool) -> Result<()> {
        Ok(())
    }

    fn is_cached(&self, _ms: &MappedStatement, _key: &CacheKey) -> Result<bool> {
        Ok(false)
    }

    fn defer_load(&mut self, _ms: &MappedStatement, _property: &str, _key: &CacheKey) -> Result<()> {
        Ok(())
    }

    fn clear_local_cache(&mut self) {}

    async fn close(&mut self, _force_rollback: bool) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct Fixture {
    configuration: Configuration,
    queries: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(settings: Settings) -> Self {
        let mut configuration = Configuration::new(settings);
        // the comment mapper loads first and waits for the blog cache
        NamespaceBuilder::load(
            &mut configuration,
            NamespaceDefinition::from_toml_str(COMMENT_MAPPER).unwrap(),
        )
        .unwrap();
        NamespaceBuilder::load(
            &mut configuration,
            NamespaceDefinition::from_yaml_str(BLOG_MAPPER).unwrap(),
        )
        .unwrap();
        configuration.finish().unwrap();

        Self {
            configuration,
            queries: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn session(&self) -> Box<dyn Executor> {
        self.configuration
            .wrap_executor(RecordingExecutor::new(&self.queries, &self.updates), false)
    }

    fn statement(&self, id: &str) -> Arc<MappedStatement> {
        self.configuration.mapped_statement(id).unwrap()
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_committed_results_shared_across_sessions() {
    let fixture = Fixture::new(Settings::default());
    let by_id = fixture.statement("blog.byId");
    let param = json!({"id": 1});

    let mut first = fixture.session();
    let rows = first.query(&by_id, &param, RowBounds::default()).await.unwrap();
    let sql = rows[0]["sql"].as_str().unwrap();
    assert_eq!(
        sql.split_whitespace().collect::<Vec<_>>().join(" "),
        "select id, title from blog where id = ?"
    );
    assert_eq!(rows[0]["params"], json!([1]));

    // uncommitted: another session still goes to the database
    let mut second = fixture.session();
    second.query(&by_id, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 2);

    first.commit(true).await.unwrap();
    let cached = second.query(&by_id, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 2);
    assert_eq!(cached, rows);
}

#[tokio::test]
async fn test_referenced_cache_is_shared() {
    let fixture = Fixture::new(Settings::default());
    let by_post = fixture.statement("comment.byPost");
    assert_eq!(by_post.cache().unwrap().id(), "blog");

    let mut session = fixture.session();
    let param = json!({"postId": 9});
    session.query(&by_post, &param, RowBounds::default()).await.unwrap();
    session.commit(true).await.unwrap();
    session.query(&by_post, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 1);

    // a blog write flushes the shared cache for comments too
    let rename = fixture.statement("blog.rename");
    session
        .update(&rename, &json!({"id": 1, "title": "new"}))
        .await
        .unwrap();
    session.commit(true).await.unwrap();
    session.query(&by_post, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 2);
}

#[tokio::test]
async fn test_dirty_session_never_reads_shared_entry() {
    let fixture = Fixture::new(Settings::default());
    let by_id = fixture.statement("blog.byId");
    let rename = fixture.statement("blog.rename");
    let param = json!({"id": 1, "title": "t"});

    let mut warm = fixture.session();
    warm.query(&by_id, &param, RowBounds::default()).await.unwrap();
    warm.commit(true).await.unwrap();
    assert_eq!(fixture.queries(), 1);

    let mut writer = fixture.session();
    writer.update(&rename, &param).await.unwrap();
    writer.query(&by_id, &param, RowBounds::default()).await.unwrap();
    writer.query(&by_id, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 3);

    // the matching entry is still there for clean sessions
    let mut reader = fixture.session();
    reader.query(&by_id, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 3);

    writer.rollback(true).await.unwrap();
    writer.query(&by_id, &param, RowBounds::default()).await.unwrap();
    assert_eq!(fixture.queries(), 3);
}

#[tokio::test]
async fn test_close_dirty_session_discards_pending_writes() {
    let fixture = Fixture::new(Settings::default());
    let by_id = fixture.statement("blog.byId");
    let rename = fixture.statement("blog.rename");
    let param = json!({"id": 1, "title": "t"});

    let mut warm = fixture.session();
    warm.query(&by_id, &param, RowBounds::default()).await.unwrap();
    warm.close(false).await.unwrap();
    assert!(warm.is_closed());

    let cache = fixture.configuration.cache("blog").unwrap();
    assert_eq!(cache.size(), 1);

    let mut writer = fixture.session();
    writer.update(&rename, &param).await.unwrap();
    writer.close(false).await.unwrap();
    assert_eq!(cache.size(), 1);
    assert_eq!(fixture.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_use_cache_false_always_hits_database() {
    let fixture = Fixture::new(Settings::default());
    let uncached = fixture.statement("blog.uncached");
    let mut session = fixture.session();
    for _ in 0..2 {
        session.query(&uncached, &Value::Null, RowBounds::default()).await.unwrap();
        session.commit(true).await.unwrap();
    }
    assert_eq!(fixture.queries(), 2);
}

#[tokio::test]
async fn test_cache_disabled_by_settings() {
    let mut settings = Settings::default();
    settings.cache_enabled = false;
    let fixture = Fixture::new(settings);
    let by_id = fixture.statement("blog.byId");

    let mut session = fixture.session();
    for _ in 0..3 {
        session.query(&by_id, &json!({"id": 1}), RowBounds::default()).await.unwrap();
        session.commit(true).await.unwrap();
    }
    assert_eq!(fixture.queries(), 3);
}

#[tokio::test]
async fn test_row_bounds_are_part_of_the_fingerprint() {
    let fixture = Fixture::new(Settings::default());
    let by_id = fixture.statement("blog.byId");
    let param = json!({"id": 1});
    let mut session = fixture.session();

    session.query(&by_id, &param, RowBounds::default()).await.unwrap();
    session.commit(true).await.unwrap();
    session.query(&by_id, &param, RowBounds::new(0, 1)).await.unwrap();
    assert_eq!(fixture.queries(), 2);
}

#[tokio::test]
async fn test_least_recently_used_entry_evicted() {
    let mut configuration = Configuration::default();
    let mut definition = NamespaceDefinition::from_yaml_str(BLOG_MAPPER).unwrap();
    definition.cache = Some(CacheConfig {
        size: 2,
        ..CacheConfig::default()
    });
    NamespaceBuilder::load(&mut configuration, definition).unwrap();

    let queries = Arc::new(AtomicUsize::new(0));
    let updates = Arc::new(AtomicUsize::new(0));
    let by_id = configuration.mapped_statement("blog.byId").unwrap();
    let mut session =
        configuration.wrap_executor(RecordingExecutor::new(&queries, &updates), false);

    for id in [1, 2, 1, 3] {
        session.query(&by_id, &json!({ "id": id }), RowBounds::default()).await.unwrap();
        session.commit(true).await.unwrap();
    }
    // 1 was a hit on its second read
    assert_eq!(queries.load(Ordering::SeqCst), 3);

    session.query(&by_id, &json!({"id": 1}), RowBounds::default()).await.unwrap();
    assert_eq!(queries.load(Ordering::SeqCst), 3);
    session.query(&by_id, &json!({"id": 2}), RowBounds::default()).await.unwrap();
    assert_eq!(queries.load(Ordering::SeqCst), 4);
}

#[test]
fn test_unresolved_reference_fails_configuration() {
    let mut configuration = Configuration::default();
    NamespaceBuilder::load(
        &mut configuration,
        NamespaceDefinition::from_toml_str(COMMENT_MAPPER).unwrap(),
    )
    .unwrap();
    assert!(!configuration.has_statement("comment.byPost"));

    let err = configuration.finish().unwrap_err();
    assert!(matches!(err, SessionError::Configuration { .. }));
    assert!(err.to_string().contains("comment.byPost"));
}
