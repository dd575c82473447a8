use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, optional_str, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Predicate, Store};
use chrono::NaiveDate;
use serde_json::{json, Value};

/// Daily homework diary: one entry per (class, subject, date), written by
/// the class teacher at the end of the day.
fn diary_add(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let subject = required_str(params, "subject")?;
    let text = required_str(params, "text")?;
    let date = match optional_str(params, "date") {
        Some(d) => {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
            d
        }
        None => chrono::Utc::now().format("%Y-%m-%d").to_string(),
    };

    let doc = json!({
        "classId": class_id,
        "subject": subject,
        "text": text,
        "date": date,
        "createdAt": now_iso()
    });
    let id = store.add("diary", &doc).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "entry": with_id(&id, doc) }))
}

/// Class-scoped scan used when the composite (classId, date) query form is
/// unavailable; the date filter then runs locally.
fn scan_class_for_date(
    store: &Store,
    class_id: &str,
    date: &str,
) -> Result<Vec<(String, Value)>, HandlerErr> {
    let rows = store
        .query(
            "diary",
            &[Predicate::eq("classId", json!(class_id))],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;
    Ok(rows
        .into_iter()
        .filter(|(_, doc)| doc.get("date").and_then(|v| v.as_str()) == Some(date))
        .collect())
}

fn diary_list_by_class_date(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = required_str(params, "date")?;
    NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;

    let composite = store.query(
        "diary",
        &[
            Predicate::eq("classId", json!(class_id)),
            Predicate::eq("date", json!(date)),
        ],
        None,
        None,
    );
    let mut rows = match composite {
        Ok(rows) => rows,
        Err(_) => scan_class_for_date(store, &class_id, &date)?,
    };
    rows.sort_by(|(_, a), (_, b)| {
        let a = a.get("subject").and_then(|v| v.as_str()).unwrap_or("");
        let b = b.get("subject").and_then(|v| v.as_str()).unwrap_or("");
        a.cmp(b)
    });
    let entries: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "entries": entries }))
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
        "diary.add" => Some(dispatch(state, req, diary_add)),
        "diary.listByClassDate" => Some(dispatch(state, req, diary_list_by_class_date)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    #[test]
    fn class_scan_filters_by_date_locally() {
        let s = store::open_in_memory().expect("open store");
        for (class_id, date, subject) in [
            ("5", "2025-04-01", "Math"),
            ("5", "2025-04-02", "Math"),
            ("6", "2025-04-01", "Math"),
            ("5", "2025-04-01", "English"),
        ] {
            s.add(
                "diary",
                &json!({ "classId": class_id, "date": date, "subject": subject, "text": "t" }),
            )
            .expect("add");
        }

        let rows = scan_class_for_date(&s, "5", "2025-04-01").expect("scan");
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|(_, doc)| doc.get("classId").and_then(|v| v.as_str()) == Some("5")
                && doc.get("date").and_then(|v| v.as_str()) == Some("2025-04-01")));
    }
}
