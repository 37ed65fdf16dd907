use staffdb_storage::{ConnectRetry, Database};

/// Reference ids seeded into every test database.
pub struct SeededRefs {
    pub engineering: i64,
    pub operations: i64,
    pub developer: i64,
    pub analyst: i64,
}

/// Opens a named in-memory database, applies migrations and seeds two
/// divisions and two job titles. Each test passes a unique name so tests
/// never share state.
pub async fn seeded_db(name: &str) -> (Database, SeededRefs) {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let db = Database::connect(&url, &ConnectRetry::default())
        .await
        .expect("connect");
    db.run_migrations().await.expect("migrations");

    let engineering = db
        .divisions()
        .insert("Engineering")
        .await
        .expect("seed division");
    let operations = db
        .divisions()
        .insert("Operations")
        .await
        .expect("seed division");
    let developer = db
        .job_titles()
        .insert("Developer")
        .await
        .expect("seed job title");
    let analyst = db
        .job_titles()
        .insert("Analyst")
        .await
        .expect("seed job title");

    (
        db,
        SeededRefs {
            engineering: engineering.division_id,
            operations: operations.division_id,
            developer: developer.job_title_id,
            analyst: analyst.job_title_id,
        },
    )
}

/// Counts the rows of a table; test-only introspection helper.
pub async fn count_rows(db: &Database, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db.pool())
        .await
        .expect("count rows");
    count
}
