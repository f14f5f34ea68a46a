use docket::errors::ErrorKind;
use docket::{doc, Value};
use docket_int_test::test_util::{
    cleanup, create_employees, create_test_context, insert_employees, run_test, DATABASE, EMPLOYEES,
};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_insert_assigns_reserved_fields() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;

            let first = docket.insert_document(DATABASE, EMPLOYEES, doc! { "name": "Asha" })?;
            let second = docket.insert_document(DATABASE, EMPLOYEES, doc! { "name": "Ravi" })?;

            assert!(first.id().is_some());
            assert_ne!(first.id(), second.id());
            assert_eq!(first.index(), Some(1));
            assert_eq!(second.index(), Some(2));
            assert!(first.created().is_some());
            assert_eq!(first.get("name"), Some(&Value::from("Asha")));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_caller_supplied_id_is_kept() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;

            let created = docket.insert_document(DATABASE, EMPLOYEES, doc! { "id": "emp-42", "name": "Asha" })?;
            assert_eq!(created.id(), Some("emp-42"));
            assert!(created.created().is_some());

            let read = docket.read_document(DATABASE, EMPLOYEES, "emp-42")?;
            assert_eq!(read, created);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_merges_and_keeps_reserved_fields() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            let created = docket.insert_document(
                DATABASE,
                EMPLOYEES,
                doc! { "name": "Asha", "city": "Chennai", "salary": 50000 },
            )?;
            let id = created.id().unwrap_or_default().to_string();

            let updated = docket.update_document(
                DATABASE,
                EMPLOYEES,
                &id,
                doc! { "city": "Pune", "index": 99, "id": "other", "created": "never" },
            )?;

            assert_eq!(updated.get("city"), Some(&Value::from("Pune")));
            assert_eq!(updated.get("salary"), Some(&Value::from(50000)));
            assert_eq!(updated.get("name"), Some(&Value::from("Asha")));
            assert_eq!(updated.id(), created.id());
            assert_eq!(updated.index(), created.index());
            assert_eq!(updated.created(), created.created());
            assert_eq!(docket.read_document(DATABASE, EMPLOYEES, &id)?, updated);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_missing_document_fails() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            let err = docket
                .update_document(DATABASE, EMPLOYEES, "missing", doc! { "a": 1 })
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_semantics() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            let created = insert_employees(&docket, 5)?;
            let id = created[2].id().unwrap_or_default().to_string();

            let deleted = docket.delete_document(DATABASE, EMPLOYEES, &id)?;
            assert_eq!(deleted, created[2]);
            let err = docket.read_document(DATABASE, EMPLOYEES, &id).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);

            let before = docket.get_all_documents(DATABASE, EMPLOYEES)?;
            let err = docket.delete_document(DATABASE, EMPLOYEES, "missing").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            assert_eq!(docket.get_all_documents(DATABASE, EMPLOYEES)?, before);
            assert_eq!(before.len(), 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_is_never_reused_after_delete() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            let created = insert_employees(&docket, 3)?;
            for document in &created {
                docket.delete_document(DATABASE, EMPLOYEES, document.id().unwrap_or_default())?;
            }

            let next = docket.insert_document(DATABASE, EMPLOYEES, doc! { "name": "late" })?;
            assert_eq!(next.index(), Some(4));
            assert_eq!(docket.collection_stats(DATABASE, EMPLOYEES)?.last_index, 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_nested_values_survive() {
    run_test(
        create_test_context,
        |ctx| {
            let docket = ctx.docket();
            create_employees(&docket)?;
            let created = docket.insert_document(
                DATABASE,
                EMPLOYEES,
                doc! {
                    "name": "Asha",
                    "address": { "street": "MG Road", "pin": 600001 },
                    "skills": ["rust", "sql"],
                    "manager": (Value::Null)
                },
            )?;

            let read = docket.read_document(DATABASE, EMPLOYEES, created.id().unwrap_or_default())?;
            match read.get("address") {
                Some(Value::Document(address)) => {
                    assert_eq!(address.get("street"), Some(&Value::from("MG Road")));
                }
                other => panic!("unexpected address {:?}", other),
            }
            assert_eq!(
                read.get("skills"),
                Some(&Value::Array(vec![Value::from("rust"), Value::from("sql")]))
            );
            assert_eq!(read.get("manager"), Some(&Value::Null));
            Ok(())
        },
        cleanup,
    )
}
