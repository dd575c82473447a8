use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Predicate, Store};
use chrono::NaiveDate;
use serde_json::{json, Value};

fn parse_day(value: &str, key: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))?;
    Ok(value.to_string())
}

fn parse_month(value: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("month must be YYYY-MM"))?;
    Ok(value.to_string())
}

/// Whole-roster upsert for one (date, class) day. The records map is
/// replaced wholesale; there is no per-student patch operation, which keeps
/// stale entries from surviving a re-mark.
fn attendance_mark(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let date = parse_day(&required_str(params, "date")?, "date")?;
    let class_id = required_str(params, "classId")?;
    let Some(records) = params.get("records").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    for (student_id, status) in records {
        let valid = status
            .as_str()
            .map(|s| calc::ATTENDANCE_STATUSES.contains(&s))
            .unwrap_or(false);
        if !valid {
            return Err(HandlerErr::bad_params(format!(
                "invalid status for student {}",
                student_id
            )));
        }
    }

    let doc_id = calc::attendance_doc_id(&date, &class_id);
    let body = json!({
        "date": date,
        "classId": class_id,
        "records": records,
        "updatedAt": now_iso()
    });
    store
        .put("attendance", &doc_id, &body, true)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "attendanceId": doc_id }))
}

/// Absence of a day's record is a normal case, returned as null rather than
/// an error.
fn attendance_get(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let date = parse_day(&required_str(params, "date")?, "date")?;
    let class_id = required_str(params, "classId")?;
    let doc_id = calc::attendance_doc_id(&date, &class_id);
    let attendance = store
        .get("attendance", &doc_id)
        .map_err(HandlerErr::query_failed)?
        .map(|doc| with_id(&doc_id, doc))
        .unwrap_or(Value::Null);
    Ok(json!({ "attendance": attendance }))
}

/// One aggregated row per calendar date across every class in range.
fn attendance_range(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let start = parse_day(&required_str(params, "start")?, "start")?;
    let end = parse_day(&required_str(params, "end")?, "end")?;
    let rows = store
        .query(
            "attendance",
            &[
                Predicate::ge("date", json!(start)),
                Predicate::le("date", json!(end)),
            ],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;

    let entries = rows.into_iter().filter_map(|(_, doc)| {
        let date = doc.get("date").and_then(|v| v.as_str())?.to_string();
        let statuses = doc
            .get("records")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.values()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some((date, statuses))
    });
    let days = calc::fold_attendance_days(entries);
    Ok(json!({ "days": days }))
}

/// Per-student projection over a month of per-class documents. A student id
/// that appears in no record (or no longer exists) just yields an empty
/// list; orphaned map keys for deleted students are equally tolerated.
fn attendance_student_month(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let month = parse_month(&required_str(params, "month")?)?;
    let rows = store
        .query(
            "attendance",
            &[
                Predicate::ge("date", json!(format!("{}-01", month))),
                // Crude month upper bound; document dates never exceed 31.
                Predicate::le("date", json!(format!("{}-31", month))),
            ],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;

    let mut records: Vec<(String, String)> = rows
        .into_iter()
        .filter_map(|(_, doc)| {
            let date = doc.get("date").and_then(|v| v.as_str())?.to_string();
            let status = doc
                .get("records")
                .and_then(|v| v.get(&student_id))
                .and_then(|v| v.as_str())?
                .to_string();
            Some((date, status))
        })
        .collect();
    records.sort();
    let records: Vec<Value> = records
        .into_iter()
        .map(|(date, status)| json!({ "date": date, "status": status }))
        .collect();
    Ok(json!({ "records": records }))
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
        "attendance.mark" => Some(dispatch(state, req, attendance_mark)),
        "attendance.get" => Some(dispatch(state, req, attendance_get)),
        "attendance.range" => Some(dispatch(state, req, attendance_range)),
        "attendance.studentMonth" => Some(dispatch(state, req, attendance_student_month)),
        _ => None,
    }
}
