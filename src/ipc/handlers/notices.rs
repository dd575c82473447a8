use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str, with_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Order, Store};
use serde_json::{json, Value};

fn notices_add(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let title = required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of notice fields"))?;
    doc.insert("title".to_string(), json!(title));
    doc.insert("createdAt".to_string(), json!(now_iso()));
    let id = store
        .add("notices", &Value::Object(doc))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "noticeId": id }))
}

fn notices_list(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let rows = store
        .query("notices", &[], Some(("createdAt", Order::Desc)), None)
        .map_err(HandlerErr::query_failed)?;
    let notices: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "notices": notices }))
}

fn notices_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "noticeId")?;
    let exists = store
        .get("notices", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("notice not found"));
    }
    store
        .delete("notices", &id)
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
        "notices.add" => Some(dispatch(state, req, notices_add)),
        "notices.list" => Some(dispatch(state, req, notices_list)),
        "notices.delete" => Some(dispatch(state, req, notices_delete)),
        _ => None,
    }
}
