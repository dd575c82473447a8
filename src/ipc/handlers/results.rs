use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    as_f64, now_iso, required_f64, required_str, required_string_array, with_id, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{Predicate, Store};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

fn exams_create(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let classes = if params.get("classes").is_some() {
        required_string_array(params, "classes")?
    } else {
        Vec::new()
    };
    let doc = json!({
        "name": name,
        "classes": classes,
        "createdAt": now_iso()
    });
    let id = store.add("exams", &doc).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "examId": id, "name": name }))
}

fn exams_list(store: &Store, _params: &Value) -> Result<Value, HandlerErr> {
    let mut rows = store.list("exams").map_err(HandlerErr::query_failed)?;
    rows.sort_by(|(_, a), (_, b)| {
        let a = a.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
        let b = b.get("createdAt").and_then(|v| v.as_str()).unwrap_or("");
        a.cmp(b)
    });
    let exams: Vec<Value> = rows.into_iter().map(|(id, doc)| with_id(&id, doc)).collect();
    Ok(json!({ "exams": exams }))
}

/// Deleting an exam leaves its saved per-subject result documents behind;
/// they stay reachable by exam name. Known inconsistency, kept (DESIGN.md).
fn exams_delete(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "examId")?;
    let exists = store
        .get("exams", &id)
        .map_err(HandlerErr::query_failed)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("exam not found"));
    }
    store.delete("exams", &id).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn parse_marks(params: &Value) -> Result<Map<String, Value>, HandlerErr> {
    let Some(records) = params.get("records").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    let mut normalized = Map::new();
    for (student_id, marks) in records {
        let Some(value) = as_f64(marks) else {
            return Err(HandlerErr::bad_params(format!(
                "marks for student {} must be a number",
                student_id
            )));
        };
        normalized.insert(student_id.clone(), json!(value));
    }
    Ok(normalized)
}

/// Whole-document upsert of one (exam, class, subject) marks sheet. The
/// records map and maxMarks are replaced wholesale, like attendance days.
fn results_save_subject(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let exam_name = required_str(params, "examName")?;
    let class_id = required_str(params, "classId")?;
    let subject = required_str(params, "subject")?;
    let max_marks = required_f64(params, "maxMarks")?;
    let records = parse_marks(params)?;

    let doc_id = calc::result_doc_id(&exam_name, &class_id, &subject);
    let body = json!({
        "examName": exam_name,
        "classId": class_id,
        "subject": subject,
        "maxMarks": max_marks,
        "records": records,
        "updatedAt": now_iso()
    });
    store
        .put("results", &doc_id, &body, true)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "resultId": doc_id }))
}

fn results_get_subject(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let exam_name = required_str(params, "examName")?;
    let class_id = required_str(params, "classId")?;
    let subject = required_str(params, "subject")?;
    let doc_id = calc::result_doc_id(&exam_name, &class_id, &subject);
    let result = store
        .get("results", &doc_id)
        .map_err(HandlerErr::query_failed)?
        .map(|doc| with_id(&doc_id, doc))
        .unwrap_or(Value::Null);
    Ok(json!({ "result": result }))
}

fn class_exam_docs(
    store: &Store,
    exam_name: &str,
    class_id: &str,
) -> Result<Vec<(String, Value)>, HandlerErr> {
    store
        .query(
            "results",
            &[
                Predicate::eq("examName", json!(exam_name)),
                Predicate::eq("classId", json!(class_id)),
            ],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)
}

fn results_class_exam(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let exam_name = required_str(params, "examName")?;
    let class_id = required_str(params, "classId")?;
    let results: Vec<Value> = class_exam_docs(store, &exam_name, &class_id)?
        .into_iter()
        .map(|(id, doc)| with_id(&id, doc))
        .collect();
    Ok(json!({ "results": results }))
}

fn subject_marks(docs: &[(String, Value)]) -> Vec<calc::SubjectMarks> {
    docs.iter()
        .filter_map(|(_, doc)| {
            let subject = doc.get("subject")?.as_str()?.to_string();
            let marks: HashMap<String, f64> = doc
                .get("records")
                .and_then(|v| v.as_object())
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| Some((k.clone(), as_f64(v)?)))
                        .collect()
                })
                .unwrap_or_default();
            Some(calc::SubjectMarks { subject, marks })
        })
        .collect()
}

/// Tabulation over the current class roster, ordered by roll number. Mark
/// entries for students no longer on the roster are skipped silently.
fn results_tabulation(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let exam_name = required_str(params, "examName")?;
    let class_id = required_str(params, "classId")?;
    let docs = class_exam_docs(store, &exam_name, &class_id)?;
    let subject_docs = subject_marks(&docs);

    let mut students = store
        .query(
            "students",
            &[Predicate::eq("classId", json!(class_id))],
            None,
            None,
        )
        .map_err(HandlerErr::query_failed)?;
    students.sort_by_key(|(_, doc)| {
        doc.get("rollNo").and_then(|v| v.as_i64()).unwrap_or(i64::MAX)
    });

    let roster: Vec<String> = students.iter().map(|(id, _)| id.clone()).collect();
    let (subjects, tab_rows) = calc::tabulate(&subject_docs, &roster);

    // tabulate preserves roster order, so rows and students zip 1:1.
    let rows: Vec<Value> = tab_rows
        .into_iter()
        .zip(students.iter())
        .map(|(row, (id, doc))| {
            json!({
                "studentId": id,
                "fullName": doc.get("fullName").and_then(|v| v.as_str()).unwrap_or(""),
                "rollNo": doc.get("rollNo").cloned().unwrap_or(Value::Null),
                "marks": row.marks,
                "total": row.total,
                "percentage": row.percentage,
                "grade": row.grade
            })
        })
        .collect();

    Ok(json!({
        "examName": exam_name,
        "classId": class_id,
        "subjects": subjects,
        "rows": rows
    }))
}

/// Per-student report card. Every subject counts out of a fixed 100, the
/// same assumption the class tabulation makes; the stored per-document
/// maxMarks is ignored on this path too. Unmarked subjects appear with null
/// marks and contribute nothing to the totals.
fn results_report_card(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exam_name = required_str(params, "examName")?;
    let class_id = required_str(params, "classId")?;
    let docs = class_exam_docs(store, &exam_name, &class_id)?;

    let mut rows: Vec<(String, Option<f64>)> = docs
        .into_iter()
        .filter_map(|(_, doc)| {
            let subject = doc.get("subject")?.as_str()?.to_string();
            let obtained = doc
                .get("records")
                .and_then(|r| r.get(&student_id))
                .and_then(as_f64);
            Some((subject, obtained))
        })
        .collect();
    rows.sort_by(|(a, _), (b, _)| a.cmp(b));

    let subject_count = rows.len();
    let total: f64 = rows.iter().filter_map(|(_, m)| *m).sum();
    let total_max = subject_count as f64 * 100.0;
    let percentage = if subject_count == 0 {
        0.0
    } else {
        calc::round2(total / total_max * 100.0)
    };

    let report: Vec<Value> = rows
        .into_iter()
        .map(|(subject, obtained)| match obtained {
            Some(marks) => json!({
                "subject": subject,
                "obtained": marks,
                "max": 100.0,
                "grade": calc::grade_for(marks)
            }),
            None => json!({
                "subject": subject,
                "obtained": Value::Null,
                "max": 100.0,
                "grade": Value::Null
            }),
        })
        .collect();
    Ok(json!({
        "reportCard": report,
        "total": total,
        "totalMax": total_max,
        "percentage": percentage,
        "grade": calc::grade_for(percentage)
    }))
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
        "exams.create" => Some(dispatch(state, req, exams_create)),
        "exams.list" => Some(dispatch(state, req, exams_list)),
        "exams.delete" => Some(dispatch(state, req, exams_delete)),
        "results.saveSubject" => Some(dispatch(state, req, results_save_subject)),
        "results.getSubject" => Some(dispatch(state, req, results_get_subject)),
        "results.classExam" => Some(dispatch(state, req, results_class_exam)),
        "results.tabulation" => Some(dispatch(state, req, results_tabulation)),
        "results.reportCard" => Some(dispatch(state, req, results_report_card)),
        _ => None,
    }
}
