use docket::errors::ErrorKind;
use docket::{doc, CollectionSpec, Document, FilterSpec, Value};
use docket_int_test::test_util::{
    cleanup, create_employees, create_test_context, ids, insert_employees, is_sorted, run_test, CITIES,
    DATABASE, DEPARTMENTS, EMPLOYEES,
};
use rand::Rng;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn scan(documents: &[Document], field: &str, value: &Value) -> Vec<String> {
    let expected = value.index_key();
    let matching: Vec<Document> = documents
        .iter()
        .filter(|d| d.get(field).map(Value::index_key) == Some(expected.clone()))
        .cloned()
        .collect();
    ids(&matching)
}

#[test]
fn test_indexed_filter_matches_linear_scan() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            insert_employees(&docket, 120)?;
            let all = docket.get_all_documents(DATABASE, EMPLOYEES)?;

            for city in CITIES {
                let filtered = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().eq("city", city))?;
                assert_eq!(ids(&filtered), scan(&all, "city", &Value::from(city)));
                assert!(!filtered.is_empty());
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_residual_filter_matches_linear_scan() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            insert_employees(&docket, 150)?;
            let all = docket.get_all_documents(DATABASE, EMPLOYEES)?;

            // salary is not indexed
            let filtered = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().eq("salary", 45000))?;
            assert_eq!(ids(&filtered), scan(&all, "salary", &Value::from(45000)));
            assert!(!filtered.is_empty());

            // float and integer forms select the same documents
            let as_float = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().eq("salary", 45000.0))?;
            assert_eq!(ids(&as_float), ids(&filtered));

            let remote = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().eq("remote", true))?;
            assert_eq!(remote.len(), 75);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_mixed_conditions_are_conjunctive() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            insert_employees(&docket, 150)?;
            let all = docket.get_all_documents(DATABASE, EMPLOYEES)?;

            let spec = FilterSpec::new()
                .eq("city", "Pune")
                .eq("dept", "sales")
                .eq("remote", false);
            let filtered = docket.filter_documents(DATABASE, EMPLOYEES, &spec)?;
            let expected: Vec<Document> = all
                .iter()
                .filter(|d| {
                    d.get("city") == Some(&Value::from("Pune"))
                        && d.get("dept") == Some(&Value::from("sales"))
                        && d.get("remote") == Some(&Value::from(false))
                })
                .cloned()
                .collect();
            assert_eq!(ids(&filtered), ids(&expected));
            assert!(!filtered.is_empty());

            let none = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().eq("city", "Atlantis"))?;
            assert!(none.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_default_limit_returns_first_thousand_in_order() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            for i in 0..2000 {
                docket.insert_document(DATABASE, EMPLOYEES, doc! { "seq": i })?;
            }

            let filtered = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new())?;
            let indexes: Vec<u64> = filtered.iter().filter_map(Document::index).collect();
            assert_eq!(indexes, (1..=1000).collect::<Vec<u64>>());

            let limited = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().with_limit(5))?;
            let indexes: Vec<u64> = limited.iter().filter_map(Document::index).collect();
            assert_eq!(indexes, vec![1, 2, 3, 4, 5]);

            let wide = docket.filter_documents(DATABASE, EMPLOYEES, &FilterSpec::new().with_limit(5000))?;
            assert_eq!(wide.len(), 2000);
            assert!(is_sorted(wide.iter().filter_map(Document::index), true));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_non_scalar_filter_value_is_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            insert_employees(&docket, 3)?;

            let spec = FilterSpec::new().eq("city", doc! { "name": "Chennai" });
            let err = docket.filter_documents(DATABASE, EMPLOYEES, &spec).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidFilter);

            let err = FilterSpec::from_document(&doc! { "tags": ["a"] }).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidFilter);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_consistent_after_random_mutations() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            docket.create_database(DATABASE)?;
            docket.create_collections(DATABASE, &[CollectionSpec::new("people").with_index("city")])?;

            let mut rng = rand::rng();
            let mut live: Vec<String> = Vec::new();
            for _ in 0..400 {
                let city = CITIES[rng.random_range(0..CITIES.len())];
                match rng.random_range(0..10) {
                    0..=4 => {
                        let created = docket.insert_document(DATABASE, "people", doc! { "city": city })?;
                        live.push(created.id().unwrap_or_default().to_string());
                    }
                    5..=7 if !live.is_empty() => {
                        let id = &live[rng.random_range(0..live.len())];
                        docket.update_document(DATABASE, "people", id, doc! { "city": city })?;
                    }
                    8 if !live.is_empty() => {
                        let id = live.swap_remove(rng.random_range(0..live.len()));
                        docket.delete_document(DATABASE, "people", &id)?;
                    }
                    _ => {
                        // documents without the indexed field are never indexed
                        let dept = DEPARTMENTS[rng.random_range(0..DEPARTMENTS.len())];
                        let created = docket.insert_document(DATABASE, "people", doc! { "dept": dept })?;
                        live.push(created.id().unwrap_or_default().to_string());
                    }
                }
            }

            let all = docket.get_all_documents(DATABASE, "people")?;
            assert_eq!(all.len(), live.len());
            let mut indexed_total = 0;
            for city in CITIES {
                let spec = FilterSpec::new().eq("city", city).with_limit(10_000);
                let filtered = docket.filter_documents(DATABASE, "people", &spec)?;
                assert_eq!(ids(&filtered), scan(&all, "city", &Value::from(city)));
                indexed_total += filtered.len();
            }
            let with_city = all.iter().filter(|d| d.contains_key("city")).count();
            assert_eq!(indexed_total, with_city);
            Ok(())
        },
        cleanup,
    )
}
