use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    f64_or_zero, now_iso, optional_str, required_f64, required_str, required_string_array, with_id,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::seq;
use crate::store::{Predicate, Store};
use chrono::Datelike;
use serde_json::{json, Value};

/// Fields that must be present and non-empty before any write happens.
const REQUIRED_FIELDS: [&str; 6] = [
    "fullName",
    "dob",
    "fatherName",
    "fatherCnic",
    "fatherPhone",
    "classId",
];

const FEE_FIELDS: [&str; 6] = [
    "monthlyFee",
    "admissionFee",
    "transportFee",
    "hostelFee",
    "otherCharges",
    "discount",
];

const STUDENT_STATUSES: [&str; 4] = ["active", "inactive", "graduated", "expelled"];

fn validate_student(params: &Value) -> Result<(), HandlerErr> {
    for key in REQUIRED_FIELDS {
        let present = params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !present {
            return Err(HandlerErr::bad_params(format!("missing {}", key)));
        }
    }
    required_f64(params, "monthlyFee")?;
    if let Some(status) = optional_str(params, "status") {
        if !STUDENT_STATUSES.contains(&status.as_str()) {
            return Err(HandlerErr::bad_params(format!(
                "invalid status: {}",
                status
            )));
        }
    }
    Ok(())
}

fn computed_total_fee(doc: &Value) -> f64 {
    calc::total_fee(
        f64_or_zero(doc, "monthlyFee"),
        f64_or_zero(doc, "admissionFee"),
        f64_or_zero(doc, "transportFee"),
        f64_or_zero(doc, "hostelFee"),
        f64_or_zero(doc, "otherCharges"),
        f64_or_zero(doc, "discount"),
    )
}

/// Admission numbers are scoped by enrollment year: the admissionDate's year
/// when given, the current year otherwise.
fn enrollment_year(params: &Value) -> i32 {
    optional_str(params, "admissionDate")
        .and_then(|d| d.get(..4).and_then(|y| y.parse::<i32>().ok()))
        .unwrap_or_else(|| chrono::Utc::now().year())
}

/// Validates, allocates identifiers, and persists one student. Validation
/// and allocation both happen before the write; a failure in either leaves
/// the store untouched.
fn create_one(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    validate_student(params)?;
    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of student fields"))?;

    let class_id = required_str(params, "classId")?;
    let year = enrollment_year(params);
    let admission_no =
        seq::next_admission_no(store, year).map_err(HandlerErr::query_failed)?;
    let roll_no = seq::next_roll_no(store, &class_id).map_err(HandlerErr::query_failed)?;
    let total_fee = computed_total_fee(params);

    // Identifiers are always assigned here; client-supplied values are
    // ignored so they stay immutable from creation on.
    doc.insert("admissionNo".to_string(), json!(admission_no));
    doc.insert("rollNo".to_string(), json!(roll_no));
    doc.insert("totalFee".to_string(), json!(total_fee));
    doc.entry("status".to_string()).or_insert(json!("active"));
    doc.insert("createdAt".to_string(), json!(now_iso()));

    let id = store
        .add("students", &Value::Object(doc))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({
        "studentId": id,
        "admissionNo": admission_no,
        "rollNo": roll_no,
        "totalFee": total_fee
    }))
}

fn students_create(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    create_one(store, params)
}

fn students_get(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "studentId")?;
    let Some(doc) = store.get("students", &id).map_err(HandlerErr::query_failed)? else {
        return Err(HandlerErr::not_found("student not found"));
    };
    Ok(json!({ "student": with_id(&id, doc) }))
}

fn students_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let search = optional_str(params, "admissionNo");
    let mut predicates = Vec::new();
    if let Some(no) = &search {
        predicates.push(Predicate::eq("admissionNo", json!(no)));
    } else {
        if let Some(class_id) = optional_str(params, "classId") {
            predicates.push(Predicate::eq("classId", json!(class_id)));
        }
        if let Some(year) = params.get("admissionYear").and_then(|v| v.as_i64()) {
            predicates.push(Predicate::ge("admissionDate", json!(format!("{}-01-01", year))));
            predicates.push(Predicate::le("admissionDate", json!(format!("{}-12-31", year))));
        }
    }

    let mut rows = store
        .query("students", &predicates, None, None)
        .map_err(HandlerErr::query_failed)?;
    if search.is_none() {
        // Newest first; createdAt is ISO-8601 so string order works.
        rows.sort_by(|(_, a), (_, b)| {
            let a = a.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
            let b = b.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
            b.cmp(a)
        });
    }
    let students: Vec<Value> = rows
        .into_iter()
        .map(|(id, doc)| with_id(&id, doc))
        .collect();
    Ok(json!({ "students": students }))
}

fn students_update(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "studentId")?;
    let Some(fields) = params.get("fields").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing fields"));
    };
    let Some(existing) = store.get("students", &id).map_err(HandlerErr::query_failed)? else {
        return Err(HandlerErr::not_found("student not found"));
    };

    if let Some(status) = fields.get("status").and_then(|v| v.as_str()) {
        if !STUDENT_STATUSES.contains(&status) {
            return Err(HandlerErr::bad_params(format!("invalid status: {}", status)));
        }
    }

    let mut doc = existing.as_object().cloned().unwrap_or_default();
    let mut patch = fields.clone();
    // Identity fields are immutable after creation.
    patch.remove("admissionNo");
    patch.remove("rollNo");
    patch.remove("createdAt");
    let fee_touched = FEE_FIELDS.iter().any(|k| patch.contains_key(*k));
    for (k, v) in patch {
        doc.insert(k, v);
    }
    if fee_touched {
        let total = computed_total_fee(&Value::Object(doc.clone()));
        doc.insert("totalFee".to_string(), json!(total));
    }

    store
        .put("students", &id, &Value::Object(doc.clone()), false)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "student": with_id(&id, Value::Object(doc)) }))
}

fn delete_one(store: &Store, id: &str) -> Result<(), HandlerErr> {
    let exists = store
        .get("students", id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }
    store.delete("students", id).map_err(HandlerErr::write_failed)
}

fn students_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "studentId")?;
    delete_one(store, &id)?;
    Ok(json!({ "ok": true }))
}

/// Fan-out per id. A failed sub-operation never aborts its siblings and
/// nothing is rolled back; the batch as a whole is reported failed if any
/// id failed.
fn students_delete_many(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let ids = required_string_array(params, "studentIds")?;
    let mut deleted: Vec<String> = Vec::new();
    let mut failed: Vec<Value> = Vec::new();
    for id in &ids {
        match delete_one(store, id) {
            Ok(()) => deleted.push(id.clone()),
            Err(e) => failed.push(json!({
                "studentId": id,
                "code": e.code,
                "message": e.message
            })),
        }
    }
    if failed.is_empty() {
        Ok(json!({ "deleted": deleted }))
    } else {
        Err(HandlerErr::with_details(
            "batch_failed",
            "one or more deletions failed",
            json!({ "deleted": deleted, "failed": failed }),
        ))
    }
}

fn students_bulk_create(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let Some(rows) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };
    let mut created: Vec<Value> = Vec::new();
    let mut failed: Vec<Value> = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match create_one(store, row) {
            Ok(result) => created.push(result),
            Err(e) => failed.push(json!({
                "index": index,
                "code": e.code,
                "message": e.message
            })),
        }
    }
    if failed.is_empty() {
        Ok(json!({ "created": created }))
    } else {
        Err(HandlerErr::with_details(
            "batch_failed",
            "one or more rows failed",
            json!({ "created": created, "failed": failed }),
        ))
    }
}

enum PromotionOutcome {
    Promoted(String),
    Graduated,
    Unchanged,
}

fn promote_one(store: &Store, id: &str) -> Result<PromotionOutcome, HandlerErr> {
    let Some(doc) = store.get("students", id).map_err(HandlerErr::query_failed)? else {
        return Err(HandlerErr::not_found("student not found"));
    };
    let class_id = doc
        .get("classId")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let stored_status = doc.get("status").and_then(|v| v.as_str());
    let effective_status = stored_status.unwrap_or("active");

    let (next_class, next_status, outcome) = match calc::promotion_step(&class_id) {
        calc::PromotionStep::Advance(next) => (
            next.to_string(),
            effective_status.to_string(),
            PromotionOutcome::Promoted(next.to_string()),
        ),
        calc::PromotionStep::Graduate => (
            // Class stays; only the status moves to the terminal state.
            class_id.clone(),
            "graduated".to_string(),
            PromotionOutcome::Graduated,
        ),
        calc::PromotionStep::Unchanged => (
            class_id.clone(),
            effective_status.to_string(),
            PromotionOutcome::Unchanged,
        ),
    };

    // No-op when neither field would change; skip the write entirely.
    if next_class == class_id && stored_status == Some(next_status.as_str()) {
        return Ok(PromotionOutcome::Unchanged);
    }

    store
        .put(
            "students",
            id,
            &json!({
                "classId": next_class,
                "status": next_status,
                "lastPromotedAt": now_iso()
            }),
            true,
        )
        .map_err(HandlerErr::write_failed)?;
    Ok(outcome)
}

/// Roll numbers are deliberately untouched by promotion; the allocator's
/// count-based scheme already tolerates duplicates after deletions.
fn students_promote(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let ids = required_string_array(params, "studentIds")?;
    let mut promoted: Vec<Value> = Vec::new();
    let mut graduated: Vec<String> = Vec::new();
    let mut unchanged: Vec<String> = Vec::new();
    let mut failed: Vec<Value> = Vec::new();
    for id in &ids {
        match promote_one(store, id) {
            Ok(PromotionOutcome::Promoted(next)) => {
                promoted.push(json!({ "studentId": id, "classId": next }));
            }
            Ok(PromotionOutcome::Graduated) => graduated.push(id.clone()),
            Ok(PromotionOutcome::Unchanged) => unchanged.push(id.clone()),
            Err(e) => failed.push(json!({
                "studentId": id,
                "code": e.code,
                "message": e.message
            })),
        }
    }
    let summary = json!({
        "promoted": promoted,
        "graduated": graduated,
        "unchanged": unchanged
    });
    if failed.is_empty() {
        Ok(summary)
    } else {
        let mut details = summary;
        details["failed"] = json!(failed);
        Err(HandlerErr::with_details(
            "batch_failed",
            "one or more promotions failed",
            details,
        ))
    }
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Store, &Value) -> Result<Value, HandlerErr>,
) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.get" => Some(dispatch(state, req, students_get)),
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.update" => Some(dispatch(state, req, students_update)),
        "students.delete" => Some(dispatch(state, req, students_delete)),
        "students.deleteMany" => Some(dispatch(state, req, students_delete_many)),
        "students.bulkCreate" => Some(dispatch(state, req, students_bulk_create)),
        "students.promote" => Some(dispatch(state, req, students_promote)),
        _ => None,
    }
}
