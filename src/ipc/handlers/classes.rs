use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Order, Store};
use serde_json::{json, Value};

/// Built-ins first in promotion order, then customs by creation time.
fn classes_list(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let mut classes: Vec<Value> = calc::DEFAULT_CLASSES
        .iter()
        .map(|(value, label)| {
            json!({
                "id": value,
                "name": value,
                "label": label,
                "isDefault": true
            })
        })
        .collect();

    let customs = store
        .query("classes", &[], Some(("createdAt", Order::Asc)), None)
        .map_err(HandlerErr::query_failed)?;
    for (id, doc) in customs {
        let name = doc.get("name").and_then(|v| v.as_str()).unwrap_or("");
        classes.push(json!({
            "id": id,
            "name": name,
            "label": name,
            "isDefault": false
        }));
    }
    Ok(json!({ "classes": classes }))
}

fn classes_create(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    if calc::CLASS_ORDER.contains(&name.as_str()) {
        return Err(HandlerErr::new(
            "conflict",
            "this class already exists as a built-in class",
        ));
    }
    let doc = json!({ "name": name, "createdAt": now_iso() });
    let id = store.add("classes", &doc).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "classId": id, "name": name }))
}

/// Custom classes only; built-ins are immutable. No cascade: students,
/// attendance days, and result sheets referencing the name stay behind.
fn classes_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "classId")?;
    if calc::CLASS_ORDER.contains(&id.as_str()) {
        return Err(HandlerErr::bad_params("built-in classes cannot be deleted"));
    }
    let exists = store
        .get("classes", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("class not found"));
    }
    store.delete("classes", &id).map_err(HandlerErr::write_failed)?;
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
        "classes.list" => Some(dispatch(state, req, classes_list)),
        "classes.create" => Some(dispatch(state, req, classes_create)),
        "classes.delete" => Some(dispatch(state, req, classes_delete)),
        _ => None,
    }
}
