use docket::errors::{DocketError, DocketResult, ErrorKind};
use docket::{doc, CollectionSpec, Docket, Document};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

pub const DATABASE: &str = "hr";
pub const EMPLOYEES: &str = "employees";
pub const CITIES: [&str; 5] = ["Chennai", "Pune", "Delhi", "Mumbai", "Kolkata"];
pub const DEPARTMENTS: [&str; 3] = ["engineering", "sales", "support"];

/// Runs a test between its setup and teardown, retrying a failed attempt.
///
/// The teardown also runs when the test body fails, so temp folders do not
/// pile up.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DocketResult<()> + std::panic::RefUnwindSafe,
    B: Fn() -> DocketResult<TestContext> + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DocketResult<()> + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error = String::new();

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();
        let result = std::panic::catch_unwind(|| -> Result<(), String> {
            let ctx = before().map_err(|e| format!("Before run failed: {:?}", e))?;
            let outcome = test(ctx.clone());
            let teardown = after(ctx);
            outcome.map_err(|e| format!("Test failed: {:?}", e))?;
            teardown.map_err(|e| format!("After run failed: {:?}", e))
        });

        match result {
            Ok(Ok(())) => return,
            Ok(Err(err)) => last_error = err,
            Err(payload) => {
                last_error = if let Some(s) = payload.downcast_ref::<&str>() {
                    format!("Panic: {}", s)
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    format!("Panic: {}", s)
                } else {
                    "Panic: unknown payload".to_string()
                };
            }
        }

        if attempt < MAX_RETRIES {
            eprintln!(
                "Test attempt {}/{} failed after {:?}: {}",
                attempt,
                MAX_RETRIES,
                start_time.elapsed(),
                last_error
            );
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
    }

    panic!("Test failed after {} attempts. Last error: {}", MAX_RETRIES, last_error);
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    batch_size: usize,
    docket: Docket,
}

impl TestContext {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn docket(&self) -> Docket {
        self.docket.clone()
    }

    /// Closes the instance and opens a fresh one on the same folder.
    pub fn reopen(&self) -> DocketResult<TestContext> {
        self.docket.close()?;
        open_at(&self.path, self.batch_size)
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir()
        .join(format!("docket-{}", id))
        .to_string_lossy()
        .to_string()
}

fn open_at(path: &str, batch_size: usize) -> DocketResult<TestContext> {
    let docket = Docket::builder()
        .storage_path(path)
        .batch_size(batch_size)
        .flush_interval(Duration::ZERO)
        .open()?;
    Ok(TestContext {
        path: path.to_string(),
        batch_size,
        docket,
    })
}

/// An on-disk instance on a random temp folder with the default batch size.
pub fn create_test_context() -> DocketResult<TestContext> {
    open_at(&random_path(), docket::common::DEFAULT_BATCH_SIZE)
}

/// Like [create_test_context] with small batches so rollover is cheap to hit.
pub fn create_small_batch_context() -> DocketResult<TestContext> {
    open_at(&random_path(), 10)
}

pub fn cleanup(ctx: TestContext) -> DocketResult<()> {
    if let Err(e) = ctx.docket().close() {
        eprintln!("Warning: Failed to close docket: {:?}", e);
    }

    for retry in 0..10u64 {
        match fs::remove_dir_all(ctx.path()) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(_) => thread::sleep(Duration::from_millis(20 * (retry + 1))),
        }
    }
    Err(DocketError::new(
        &format!("Failed to remove {}", ctx.path()),
        ErrorKind::IOError,
    ))
}

/// Creates the `hr` database with an `employees` collection indexed by
/// `city` and `dept`.
pub fn create_employees(docket: &Docket) -> DocketResult<()> {
    docket.create_database(DATABASE)?;
    docket.create_collections(
        DATABASE,
        &[CollectionSpec::new(EMPLOYEES).with_indexes(["city", "dept"])],
    )
}

/// Deterministic employee documents cycling through cities and departments.
pub fn employee_docs(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            doc! {
                "name": (format!("employee-{}", i)),
                "city": (CITIES[i % CITIES.len()]),
                "dept": (DEPARTMENTS[i % DEPARTMENTS.len()]),
                "salary": ((30_000 + (i % 7) * 5_000) as i64),
                "remote": (i % 2 == 0)
            }
        })
        .collect()
}

pub fn insert_employees(docket: &Docket, count: usize) -> DocketResult<Vec<Document>> {
    employee_docs(count)
        .into_iter()
        .map(|document| docket.insert_document(DATABASE, EMPLOYEES, document))
        .collect()
}

/// Blocks until the collection holds `count` documents.
pub fn wait_for_count(docket: &Docket, database: &str, collection: &str, count: usize) {
    awaitility::at_most(Duration::from_secs(10)).until(|| {
        docket
            .collection_stats(database, collection)
            .map(|stats| stats.document_count == count)
            .unwrap_or(false)
    });
}

pub fn ids(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .filter_map(|d| d.id().map(str::to_string))
        .collect()
}

pub fn is_sorted<T: Ord>(iterable: impl IntoIterator<Item = T>, ascending: bool) -> bool {
    let mut iter = iterable.into_iter();
    if let Some(mut prev) = iter.next() {
        for current in iter {
            if (ascending && prev > current) || (!ascending && prev < current) {
                return false;
            }
            prev = current;
        }
    }
    true
}
