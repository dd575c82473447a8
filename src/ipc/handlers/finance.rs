use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    f64_or_zero, now_iso, required_f64, required_str, with_id, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{Order, Store};
use chrono::NaiveDate;
use serde_json::{json, Value};

const DEFAULT_LIST_LIMIT: usize = 50;

/// Time-derived receipt token, matching what is already printed on paper
/// receipts. Unique in practice at this scale, not guaranteed under clock
/// collisions; see DESIGN.md.
fn receipt_no() -> String {
    let ms = chrono::Utc::now().timestamp_millis();
    format!("REC-{:06}", ms.rem_euclid(1_000_000))
}

fn list_limit(params: &Value) -> Option<usize> {
    match params.get("limit").and_then(|v| v.as_u64()) {
        Some(0) => None,
        Some(n) => Some(n as usize),
        None => Some(DEFAULT_LIST_LIMIT),
    }
}

/// Creates one immutable fee record: receipt number, derived due amount and
/// status, creation timestamp. There is no update operation for fees.
fn fees_collect(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let _student_id = required_str(params, "studentId")?;
    let paid = required_f64(params, "paid")?;
    let total = required_f64(params, "total")?;

    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of fee fields"))?;
    doc.insert("paid".to_string(), json!(paid));
    doc.insert("total".to_string(), json!(total));
    doc.insert("due".to_string(), json!(calc::fee_due(paid, total)));
    doc.insert(
        "status".to_string(),
        json!(calc::fee_status(paid, total).as_str()),
    );
    doc.insert("receiptNo".to_string(), json!(receipt_no()));
    doc.insert("createdAt".to_string(), json!(now_iso()));

    let id = store
        .add("fees", &Value::Object(doc.clone()))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "fee": with_id(&id, Value::Object(doc)) }))
}

fn fees_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let rows = store
        .query(
            "fees",
            &[],
            Some(("createdAt", Order::Desc)),
            list_limit(params),
        )
        .map_err(HandlerErr::query_failed)?;
    let fees: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "fees": fees }))
}

fn expenses_add(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let category = required_str(params, "category")?;
    let amount = required_f64(params, "amount")?;
    let date = required_str(params, "date")?;
    NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;

    let mut doc = params
        .as_object()
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("expected an object of expense fields"))?;
    doc.insert("category".to_string(), json!(category));
    doc.insert("amount".to_string(), json!(amount));
    doc.insert("createdAt".to_string(), json!(now_iso()));

    let id = store
        .add("expenses", &Value::Object(doc.clone()))
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "expense": with_id(&id, Value::Object(doc)) }))
}

fn expenses_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    // Expenses order by their explicit date, not by creation time.
    let rows = store
        .query(
            "expenses",
            &[],
            Some(("date", Order::Desc)),
            list_limit(params),
        )
        .map_err(HandlerErr::query_failed)?;
    let expenses: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "expenses": expenses }))
}

fn expenses_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "expenseId")?;
    let exists = store
        .get("expenses", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("expense not found"));
    }
    store
        .delete("expenses", &id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

/// Pure aggregation over already-persisted records: fee income by month and
/// ISO week of the payment's createdAt, expenses by their own date field.
fn revenue_summary(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let fees: Vec<(String, f64)> = store
        .list("fees")
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .map(|(_, doc)| {
            let created_at = doc
                .get("createdAt")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            (created_at, f64_or_zero(&doc, "paid"))
        })
        .collect();
    let expenses: Vec<(String, f64)> = store
        .list("expenses")
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .map(|(_, doc)| {
            let date = doc
                .get("date")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            (date, f64_or_zero(&doc, "amount"))
        })
        .collect();
    let summary = calc::revenue_summary(&fees, &expenses);
    Ok(json!({ "summary": summary }))
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
        "fees.collect" => Some(dispatch(state, req, fees_collect)),
        "fees.list" => Some(dispatch(state, req, fees_list)),
        "expenses.add" => Some(dispatch(state, req, expenses_add)),
        "expenses.list" => Some(dispatch(state, req, expenses_list)),
        "expenses.delete" => Some(dispatch(state, req, expenses_delete)),
        "finance.revenueSummary" => Some(dispatch(state, req, revenue_summary)),
        _ => None,
    }
}
