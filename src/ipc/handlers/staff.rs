use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::{json, Value};

/// Non-teaching staff directory. Unlike teachers there is no status field
/// or search; records carry both creation and update stamps.
fn staff_add(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of staff fields"))?;
    doc.insert("name".to_string(), json!(name));
    let now = now_iso();
    doc.insert("createdAt".to_string(), json!(now));
    doc.insert("updatedAt".to_string(), json!(now));
    let id = store
        .add("staff", &Value::Object(doc.clone()))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "staff": with_id(&id, Value::Object(doc)) }))
}

fn staff_list(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let mut rows = store.list("staff").map_err(HandlerErr::query_failed)?;
    rows.sort_by(|(_, a), (_, b)| {
        let a = a.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
        let b = b.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
        b.cmp(a)
    });
    let staff: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "staff": staff }))
}

fn staff_update(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "staffId")?;
    let Some(fields) = params.get("fields").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing fields"));
    };
    let exists = store
        .get("staff", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("staff member not found"));
    }
    let mut patch = fields.clone();
    patch.remove("createdAt");
    patch.insert("updatedAt".to_string(), json!(now_iso()));
    store
        .put("staff", &id, &Value::Object(patch), true)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "staffId": id }))
}

fn staff_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "staffId")?;
    let exists = store
        .get("staff", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("staff member not found"));
    }
    store.delete("staff", &id).map_err(HandlerErr::write_failed)?;
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
        "staff.add" => Some(dispatch(state, req, staff_add)),
        "staff.list" => Some(dispatch(state, req, staff_list)),
        "staff.update" => Some(dispatch(state, req, staff_update)),
        "staff.delete" => Some(dispatch(state, req, staff_delete)),
        _ => None,
    }
}
