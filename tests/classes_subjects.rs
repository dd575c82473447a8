mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn built_in_classes_are_listed_first_and_protected() {
    let workspace = temp_dir("schoold-classes");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Every data method requires a selected workspace.
    let early = request(&mut stdin, &mut reader, "0", "classes.list", json!({}));
    assert_eq!(early.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        early
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    let classes = listed
        .get("classes")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("classes");
    assert_eq!(classes.len(), 13);
    assert_eq!(classes[0].get("id").and_then(|v| v.as_str()), Some("PG"));
    assert_eq!(classes[12].get("id").and_then(|v| v.as_str()), Some("10"));
    assert!(classes
        .iter()
        .all(|c| c.get("isDefault").and_then(|v| v.as_bool()) == Some(true)));

    let custom = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "O-Level" }),
    );
    let custom_id = custom
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    // Shadowing a built-in name is rejected.
    let shadow = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "5" }),
    );
    assert_eq!(shadow.get("code").and_then(|v| v.as_str()), Some("conflict"));

    let relisted = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    let classes = relisted
        .get("classes")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("classes");
    assert_eq!(classes.len(), 14);
    assert_eq!(
        classes[13].get("name").and_then(|v| v.as_str()),
        Some("O-Level")
    );
    assert_eq!(
        classes[13].get("isDefault").and_then(|v| v.as_bool()),
        Some(false)
    );

    let protected = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "classes.delete",
        json!({ "classId": "PG" }),
    );
    assert_eq!(
        protected.get("code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.delete",
        json!({ "classId": custom_id.clone() }),
    );
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "classes.delete",
        json!({ "classId": custom_id }),
    );
    assert_eq!(missing.get("code").and_then(|v| v.as_str()), Some("not_found"));
}

#[test]
fn subject_names_are_unique_per_class_case_insensitively() {
    let workspace = temp_dir("schoold-subjects");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let math5 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "subjectName": "Math", "classId": "5" }),
    );
    let math5_id = math5
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    // Same name in the same class, regardless of case or padding, collides.
    let dup = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "subjectName": "  math ", "classId": "5" }),
    );
    assert_eq!(dup.get("code").and_then(|v| v.as_str()), Some("conflict"));

    // The same name in another class is fine.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "subjectName": "Math", "classId": "6" }),
    );
    let english5 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.create",
        json!({ "subjectName": "English", "classId": "5" }),
    );
    let english5_id = english5
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    // Renaming onto an existing sibling collides; renaming to itself is a
    // no-op update, not a collision.
    let rename_clash = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.update",
        json!({ "subjectId": english5_id.clone(), "subjectName": "MATH", "classId": "5" }),
    );
    assert_eq!(
        rename_clash.get("code").and_then(|v| v.as_str()),
        Some("conflict")
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.update",
        json!({ "subjectId": english5_id, "subjectName": "English", "classId": "5" }),
    );

    let by_class = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "subjects.listByClass",
        json!({ "classId": "5" }),
    );
    let subjects = by_class
        .get("subjects")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("subjects");
    assert_eq!(subjects.len(), 2);
    assert_eq!(
        subjects[0].get("subjectName").and_then(|v| v.as_str()),
        Some("English")
    );
    assert_eq!(
        subjects[1].get("subjectName").and_then(|v| v.as_str()),
        Some("Math")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "subjects.delete",
        json!({ "subjectId": math5_id.clone() }),
    );
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "subjects.delete",
        json!({ "subjectId": math5_id }),
    );
    assert_eq!(missing.get("code").and_then(|v| v.as_str()), Some("not_found"));
}

#[test]
fn notices_are_stamped_and_listed_newest_first() {
    let workspace = temp_dir("schoold-notices");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "notices.add",
        json!({ "title": "Sports Day", "body": "Friday at 9am" }),
    );
    let first_id = first
        .get("noticeId")
        .and_then(|v| v.as_str())
        .expect("noticeId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "notices.add",
        json!({ "title": "Parent Meeting" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "4", "notices.list", json!({}));
    let notices = listed
        .get("notices")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("notices");
    assert_eq!(notices.len(), 2);
    assert!(notices[0].get("createdAt").and_then(|v| v.as_str()).is_some());

    let untitled = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "notices.add",
        json!({ "title": "   " }),
    );
    assert_eq!(
        untitled.get("code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "notices.delete",
        json!({ "noticeId": first_id.clone() }),
    );
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "notices.delete",
        json!({ "noticeId": first_id }),
    );
    assert_eq!(missing.get("code").and_then(|v| v.as_str()), Some("not_found"));
}
