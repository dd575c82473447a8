mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn teachers_crud_with_prefix_search_and_not_found_lookups() {
    let workspace = temp_dir("schoold-teachers");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // A caller-supplied status is overridden: new teachers start active.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.add",
        json!({ "name": "Nadia Hussain", "subject": "Math", "status": "inactive" }),
    );
    let teacher_id = added
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.add",
        json!({ "name": "Imran Qureshi", "subject": "English" }),
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.get",
        json!({ "teacherId": teacher_id.clone() }),
    );
    let doc = fetched.get("teacher").expect("teacher");
    assert_eq!(doc.get("status").and_then(|v| v.as_str()), Some("active"));
    assert!(doc.get("createdAt").and_then(|v| v.as_str()).is_some());

    // A missed id lookup is an error, unlike attendance/results point reads.
    let missing = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.get",
        json!({ "teacherId": "no-such-teacher" }),
    );
    assert_eq!(missing.get("code").and_then(|v| v.as_str()), Some("not_found"));

    let searched = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.list",
        json!({ "search": "Nad" }),
    );
    let teachers = searched
        .get("teachers")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("teachers");
    assert_eq!(teachers.len(), 1);
    assert_eq!(
        teachers[0].get("name").and_then(|v| v.as_str()),
        Some("Nadia Hussain")
    );

    let all = request_ok(&mut stdin, &mut reader, "7", "teachers.list", json!({}));
    assert_eq!(
        all.get("teachers").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.update",
        json!({ "teacherId": teacher_id.clone(), "fields": { "subject": "Physics" } }),
    );
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "teachers.get",
        json!({ "teacherId": teacher_id.clone() }),
    );
    let doc = updated.get("teacher").expect("teacher");
    assert_eq!(doc.get("subject").and_then(|v| v.as_str()), Some("Physics"));
    assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Nadia Hussain"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "teachers.delete",
        json!({ "teacherId": teacher_id.clone() }),
    );
    let gone = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(gone.get("code").and_then(|v| v.as_str()), Some("not_found"));
}

#[test]
fn staff_records_carry_update_stamps() {
    let workspace = temp_dir("schoold-staff");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "staff.add",
        json!({ "name": "Rashid Mehmood", "role": "Accountant" }),
    );
    let record = added.get("staff").expect("staff");
    let staff_id = record.get("id").and_then(|v| v.as_str()).expect("id").to_string();
    assert!(record.get("createdAt").and_then(|v| v.as_str()).is_some());
    assert!(record.get("updatedAt").and_then(|v| v.as_str()).is_some());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "staff.update",
        json!({ "staffId": staff_id.clone(), "fields": { "role": "Head Accountant" } }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "4", "staff.list", json!({}));
    let staff = listed
        .get("staff")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("staff");
    assert_eq!(staff.len(), 1);
    assert_eq!(
        staff[0].get("role").and_then(|v| v.as_str()),
        Some("Head Accountant")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "staff.delete",
        json!({ "staffId": staff_id.clone() }),
    );
    let gone = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "staff.delete",
        json!({ "staffId": staff_id }),
    );
    assert_eq!(gone.get("code").and_then(|v| v.as_str()), Some("not_found"));
}

#[test]
fn diary_entries_query_by_class_and_date_sorted_by_subject() {
    let workspace = temp_dir("schoold-diary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (id, subject, date, class_id) in [
        ("2", "Math", "2025-04-01", "5"),
        ("3", "English", "2025-04-01", "5"),
        ("4", "Math", "2025-04-02", "5"),
        ("5", "Math", "2025-04-01", "6"),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "diary.add",
            json!({
                "classId": class_id,
                "subject": subject,
                "text": "Exercise 4.1, questions 1-10",
                "date": date
            }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "diary.listByClassDate",
        json!({ "classId": "5", "date": "2025-04-01" }),
    );
    let entries = listed
        .get("entries")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].get("subject").and_then(|v| v.as_str()),
        Some("English")
    );
    assert_eq!(
        entries[1].get("subject").and_then(|v| v.as_str()),
        Some("Math")
    );

    // Omitting the date stamps today's.
    let today = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "diary.add",
        json!({ "classId": "5", "subject": "Urdu", "text": "Read page 12" }),
    );
    let date = today
        .get("entry")
        .and_then(|v| v.get("date"))
        .and_then(|v| v.as_str())
        .expect("date");
    assert_eq!(date.len(), 10);

    let bad = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "diary.listByClassDate",
        json!({ "classId": "5", "date": "April 1st" }),
    );
    assert_eq!(bad.get("code").and_then(|v| v.as_str()), Some("bad_params"));
}
