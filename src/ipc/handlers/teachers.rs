use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, optional_str, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Order, Predicate, Store};
use serde_json::{json, Value};

fn teachers_add(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of teacher fields"))?;
    doc.insert("name".to_string(), json!(name));
    // New teachers always start active, whatever the caller sent.
    doc.insert("status".to_string(), json!("active"));
    doc.insert("createdAt".to_string(), json!(now_iso()));
    let id = store
        .add("teachers", &Value::Object(doc))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "teacherId": id }))
}

fn teachers_get(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "teacherId")?;
    let Some(doc) = store.get("teachers", &id).map_err(HandlerErr::query_failed)? else {
        return Err(HandlerErr::not_found("teacher not found"));
    };
    Ok(json!({ "teacher": with_id(&id, doc) }))
}

/// With a search term: name-prefix range, alphabetical. Without one: the
/// whole directory, newest first.
fn teachers_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let search = optional_str(params, "search").filter(|s| !s.is_empty());
    let rows = match &search {
        Some(term) => store
            .query(
                "teachers",
                &[
                    Predicate::ge("name", json!(term)),
                    Predicate::le("name", json!(format!("{}\u{f8ff}", term))),
                ],
                Some(("name", Order::Asc)),
                None,
            )
            .map_err(HandlerErr::query_failed)?,
        None => {
            let mut rows = store.list("teachers").map_err(HandlerErr::query_failed)?;
            rows.sort_by(|(_, a), (_, b)| {
                let a = a.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
                let b = b.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
                b.cmp(a)
            });
            rows
        }
    };
    let teachers: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "teachers": teachers }))
}

fn teachers_update(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "teacherId")?;
    let Some(fields) = params.get("fields").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing fields"));
    };
    let exists = store
        .get("teachers", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    let mut patch = fields.clone();
    patch.remove("createdAt");
    store
        .put("teachers", &id, &Value::Object(patch), true)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "teacherId": id }))
}

fn teachers_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "teacherId")?;
    let exists = store
        .get("teachers", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    store
        .delete("teachers", &id)
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
        "teachers.add" => Some(dispatch(state, req, teachers_add)),
        "teachers.get" => Some(dispatch(state, req, teachers_get)),
        "teachers.list" => Some(dispatch(state, req, teachers_list)),
        "teachers.update" => Some(dispatch(state, req, teachers_update)),
        "teachers.delete" => Some(dispatch(state, req, teachers_delete)),
        _ => None,
    }
}
