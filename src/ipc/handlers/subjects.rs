use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Predicate, Store};
use serde_json::{json, Value};

/// Case-insensitive uniqueness check within one class. The composite
/// equality query is preferred; when the store cannot serve it, the class's
/// subjects are scanned and compared locally.
fn duplicate_exists(
    store: &Store,
    class_id: &str,
    name_lower: &str,
    exclude_id: Option<&str>,
) -> Result<bool, HandlerErr> {
    let composite = store.query(
        "subjects",
        &[
            Predicate::eq("classId", json!(class_id)),
            Predicate::eq("subjectNameLower", json!(name_lower)),
        ],
        None,
        None,
    );
    match composite {
        Ok(rows) => Ok(rows.iter().any(|(id, _)| exclude_id != Some(id.as_str()))),
        Err(_) => scan_for_duplicate(store, class_id, name_lower, exclude_id),
    }
}

/// Fallback duplicate check: scan the class's subjects and compare the
/// normalized names locally.
fn scan_for_duplicate(
    store: &Store,
    class_id: &str,
    name_lower: &str,
    exclude_id: Option<&str>,
) -> Result<bool, HandlerErr> {
    let rows = store
        .query(
            "subjects",
            &[Predicate::eq("classId", json!(class_id))],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;
    Ok(rows.iter().any(|(id, doc)| {
        exclude_id != Some(id.as_str())
            && doc
                .get("subjectNameLower")
                .and_then(|v| v.as_str())
                .map(|s| s.trim() == name_lower)
                .unwrap_or(false)
    }))
}

fn subjects_create(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let subject_name = required_str(params, "subjectName")?.trim().to_string();
    let class_id = required_str(params, "classId")?;
    if subject_name.is_empty() {
        return Err(HandlerErr::bad_params("subjectName must not be empty"));
    }
    let name_lower = subject_name.to_lowercase();
    if duplicate_exists(store, &class_id, &name_lower, None)? {
        return Err(HandlerErr::new(
            "conflict",
            "subject name already exists in this class",
        ));
    }

    let doc = json!({
        "subjectName": subject_name,
        "subjectNameLower": name_lower,
        "classId": class_id,
        "createdAt": now_iso()
    });
    let id = store.add("subjects", &doc).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "subjectId": id, "subjectName": subject_name, "classId": class_id }))
}

fn subjects_update(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "subjectId")?;
    let subject_name = required_str(params, "subjectName")?.trim().to_string();
    let class_id = required_str(params, "classId")?;
    if subject_name.is_empty() {
        return Err(HandlerErr::bad_params("subjectName must not be empty"));
    }
    let exists = store
        .get("subjects", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("subject not found"));
    }
    let name_lower = subject_name.to_lowercase();
    if duplicate_exists(store, &class_id, &name_lower, Some(&id))? {
        return Err(HandlerErr::new(
            "conflict",
            "subject name already exists in this class",
        ));
    }

    store
        .put(
            "subjects",
            &id,
            &json!({
                "subjectName": subject_name,
                "subjectNameLower": name_lower,
                "classId": class_id
            }),
            true,
        )
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "subjectId": id, "subjectName": subject_name, "classId": class_id }))
}

fn sort_by_name(rows: &mut [(String, Value)]) {
    rows.sort_by(|(_, a), (_, b)| {
        let a = a.get("subjectName").and_then(|v| v.as_str()).unwrap_or("");
        let b = b.get("subjectName").and_then(|v| v.as_str()).unwrap_or("");
        a.cmp(b)
    });
}

fn subjects_list(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let mut rows = store.list("subjects").map_err(HandlerErr::query_failed)?;
    sort_by_name(&mut rows);
    let subjects: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "subjects": subjects }))
}

fn subjects_list_by_class(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let mut rows = store
        .query(
            "subjects",
            &[Predicate::eq("classId", json!(class_id))],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;
    sort_by_name(&mut rows);
    let subjects: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "subjects": subjects }))
}

fn subjects_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "subjectId")?;
    let exists = store
        .get("subjects", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("subject not found"));
    }
    store
        .delete("subjects", &id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
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
        "subjects.create" => Some(dispatch(state, req, subjects_create)),
        "subjects.update" => Some(dispatch(state, req, subjects_update)),
        "subjects.list" => Some(dispatch(state, req, subjects_list)),
        "subjects.listByClass" => Some(dispatch(state, req, subjects_list_by_class)),
        "subjects.delete" => Some(dispatch(state, req, subjects_delete)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    #[test]
    fn duplicate_scan_is_class_scoped_and_skips_the_excluded_id() {
        let s = store::open_in_memory().expect("open store");
        let math5 = s
            .add(
                "subjects",
                &json!({ "subjectName": "Math", "subjectNameLower": "math", "classId": "5" }),
            )
            .expect("add");
        s.add(
            "subjects",
            &json!({ "subjectName": "Math", "subjectNameLower": "math", "classId": "6" }),
        )
        .expect("add");

        assert!(scan_for_duplicate(&s, "5", "math", None).expect("scan"));
        assert!(!scan_for_duplicate(&s, "5", "english", None).expect("scan"));
        // The record being renamed does not collide with itself.
        assert!(!scan_for_duplicate(&s, "5", "math", Some(&math5)).expect("scan"));
        assert!(scan_for_duplicate(&s, "6", "math", None).expect("scan"));
    }
}
