use opsdeck_core::{
    ChangeSpec, FieldValue, ItemKey, ItemOutcome, OperationStatus, ResourceRef,
};
use opsdeck_harness::TestConsole;

#[test]
fn patch_then_rollback_restores_exact_prior_value() {
    let t = TestConsole::new();
    let user = t.seed_user("u1", "Alice", [("title", FieldValue::Text("Agent".into()))]);

    let record = t
        .console
        .run(
            &user,
            ChangeSpec::patch_fields([("title".to_string(), FieldValue::Text("Lead".into()))]),
        )
        .unwrap();
    assert_eq!(t.remote.field(&user, "title"), FieldValue::Text("Lead".into()));
    assert_eq!(
        record.before.fields["title"],
        FieldValue::Text("Agent".into())
    );

    t.console.rollback(record.id, false).unwrap();
    assert_eq!(t.remote.field(&user, "title"), FieldValue::Text("Agent".into()));
}

#[test]
fn field_absent_before_patch_is_cleared_on_rollback() {
    let t = TestConsole::new();
    let user = t.seed_user("u1", "Alice", []);

    let record = t
        .console
        .run(
            &user,
            ChangeSpec::patch_fields([("department".to_string(), FieldValue::Text("Support".into()))]),
        )
        .unwrap();
    assert_eq!(record.before.fields["department"], FieldValue::Absent);

    t.console.rollback(record.id, false).unwrap();
    assert_eq!(t.remote.field(&user, "department"), FieldValue::Absent);
}

#[test]
fn unclearable_field_surfaces_unsupported_on_rollback() {
    let t = TestConsole::new();
    let user = t.seed_user("u1", "Alice", [("title", FieldValue::Text("Agent".into()))]);
    t.remote.deny_clear("proficiency");

    // proficiency did not exist before; restoring it means clearing, which
    // the remote refuses.
    let record = t
        .console
        .run(
            &user,
            ChangeSpec::patch_fields([
                ("title".to_string(), FieldValue::Text("Lead".into())),
                ("proficiency".to_string(), FieldValue::Float(0.8)),
            ]),
        )
        .unwrap();
    assert_eq!(record.status(), OperationStatus::Succeeded);

    let rollback = t.console.rollback(record.id, false).unwrap();
    assert_eq!(rollback.status(), OperationStatus::Partial);
    let proficiency = rollback
        .items
        .iter()
        .find(|i| i.item == ItemKey::Field("proficiency".to_string()))
        .unwrap();
    assert_eq!(proficiency.outcome, ItemOutcome::Unsupported);

    // The supported field was still restored, and the partial rollback
    // consumed the original's single rollback.
    assert_eq!(t.remote.field(&user, "title"), FieldValue::Text("Agent".into()));
    let original = t.console.record(record.id).unwrap().unwrap();
    assert_eq!(original.rolled_back_by, Some(rollback.id));
}

#[test]
fn null_and_absent_are_distinct_values() {
    let t = TestConsole::new();
    let user = t.seed_user("u1", "Alice", [("manager", FieldValue::Null)]);

    let record = t
        .console
        .run(
            &user,
            ChangeSpec::patch_fields([("manager".to_string(), FieldValue::Text("u9".into()))]),
        )
        .unwrap();
    assert_eq!(record.before.fields["manager"], FieldValue::Null);

    // Rollback restores the explicit null rather than clearing the field.
    t.console.rollback(record.id, false).unwrap();
    assert_eq!(t.remote.field(&user, "manager"), FieldValue::Null);
}

#[test]
fn patch_on_missing_user_aborts_before_any_write() {
    let t = TestConsole::new();
    let ghost = ResourceRef::user("ghost");
    let err = t
        .console
        .run(
            &ghost,
            ChangeSpec::patch_fields([("title".to_string(), FieldValue::Text("Lead".into()))]),
        )
        .unwrap_err();
    assert!(matches!(err, opsdeck_engine::EngineError::RemoteFetch { .. }));
    assert_eq!(t.remote.mutation_calls(), 0);
    assert!(t.console.history(&ghost).unwrap().is_empty());
}
