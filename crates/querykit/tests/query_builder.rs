//! End-to-end: JSON request → builder → executor.

use querykit::{
    CompiledQuery, DbResult, Dialect, Executor, OrderSpec, Pagination, QueryConfig, RenderRequest,
    SearchGroup, SearchSpec, SortableFields, Value, compare_fields, get_fields_to_search,
};
use serde_json::json;
use std::sync::Mutex;

/// Records every statement and answers with one row per bound value.
struct Recorder {
    dialect: Dialect,
    seen: Mutex<Vec<CompiledQuery>>,
}

impl Recorder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn statements(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|q| q.sql.clone()).collect()
    }
}

impl Executor for Recorder {
    type Row = Value;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<Value>> {
        self.seen.lock().unwrap().push(query.clone());
        Ok(query.values.clone())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("querykit=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn list_and_count_from_one_request() {
    init_tracing();
    let request = json!({
        "filter": {
            "status": "active",
            "age": [{"$gte": 18}, {"$lt": 65}],
            "deleted_at": null
        },
        "or": [{"name": {"$ilike": "%kim%"}}, {"email": {"$ilike": "%kim%"}}],
        "order": [{"orderBy": "created_at", "ordering": "desc"}],
        "page": {"limit": "25", "offset": 50}
    });

    let spec = SearchSpec::from_json(&request["filter"]).unwrap();
    let alternatives = SearchSpec::from_json_list(&request["or"]).unwrap();
    let order: OrderSpec = serde_json::from_value(request["order"].clone()).unwrap();
    let page = Pagination::from_json(&request["page"]);

    let exec = Recorder::new(Dialect::Numbered);
    let base = querykit::select("users", &exec).filter(SearchGroup::new(spec).or(alternatives));

    let rows = base
        .clone()
        .select(&["id", "name"])
        .sortable(SortableFields::new(["id", "name"]).with_extra(["created_at"]))
        .order_by(order)
        .pagination(page)
        .execute()
        .await
        .unwrap();
    let count = base.into_count().execute().await.unwrap();

    assert_eq!(rows.len(), 5);
    assert_eq!(count.len(), 5);
    assert_eq!(
        exec.statements(),
        vec![
            "SELECT id, name FROM users WHERE status = $1 AND age >= $2 AND age < $3 \
             AND deleted_at IS NULL AND ((name ILIKE $4) OR (email ILIKE $5)) \
             ORDER BY created_at DESC LIMIT 25 OFFSET 50",
            "SELECT COUNT(*) FROM users WHERE status = $1 AND age >= $2 AND age < $3 \
             AND deleted_at IS NULL AND ((name ILIKE $4) OR (email ILIKE $5))",
        ]
    );
    assert_eq!(
        rows,
        vec![
            Value::Text("active".into()),
            Value::Int(18),
            Value::Int(65),
            Value::Text("%kim%".into()),
            Value::Text("%kim%".into()),
        ]
    );
}

#[tokio::test]
async fn unnumbered_executor_gets_question_marks() {
    let exec = Recorder::new(Dialect::Unnumbered);
    let spec = SearchSpec::from_json(&json!({
        "role": {"$in": ["admin", "owner"]},
        "name": {"$ilike": "a%"}
    }))
    .unwrap();
    querykit::select("users", &exec).filter(spec).execute().await.unwrap();

    assert_eq!(
        exec.statements(),
        vec!["SELECT * FROM users WHERE role IN (?) AND LOWER(name) LIKE LOWER(?)"]
    );
}

#[tokio::test]
async fn invalid_request_never_reaches_executor() {
    let exec = Recorder::new(Dialect::Numbered);
    let spec = SearchSpec::from_json(&json!({"age": {"$gt": null}})).unwrap();
    let err = querykit::select("users", &exec).filter(spec).execute().await.unwrap_err();

    assert!(err.is_validation());
    assert!(exec.statements().is_empty());
}

#[test]
fn standalone_renderer_for_hand_written_sql() {
    let spec =
        SearchSpec::from_json(&json!({"team_id": 3, "score": {"$between": [10, 20]}})).unwrap();
    let group = compare_fields(&spec, None).unwrap();
    let selected = vec!["id".to_string(), "score".to_string()];
    let page = Pagination::from_json(&json!({"limit": 500}));

    let clauses = get_fields_to_search(
        &group,
        &RenderRequest::new(Dialect::Numbered)
            .selected(&selected)
            .pagination(&page)
            .config(QueryConfig::new().max_limit(100))
            .cursor(2),
    )
    .unwrap();

    let sql = format!(
        "SELECT {} FROM scores {} {}",
        clauses.selected_fields, clauses.search_fields, clauses.pagination_fields
    );
    assert_eq!(
        sql,
        "SELECT id, score FROM scores WHERE team_id = $3 AND score BETWEEN $4 AND $5 \
         LIMIT 100 OFFSET 0"
    );
    assert_eq!(clauses.end_cursor, 5);
    assert_eq!(group.values.len(), 3);
}
