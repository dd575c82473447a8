use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Built-in class sequence, lowest to highest. The order defines the
/// promotion successor; promoting out of the last entry graduates the
/// student. Custom classes sit outside this sequence and have no successor.
pub const CLASS_ORDER: [&str; 13] = [
    "PG", "Nursery", "Prep", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10",
];

/// (value, display label) pairs for the built-in classes.
pub const DEFAULT_CLASSES: [(&str, &str); 13] = [
    ("PG", "Play Group"),
    ("Nursery", "Nursery"),
    ("Prep", "Prep"),
    ("1", "Class 1"),
    ("2", "Class 2"),
    ("3", "Class 3"),
    ("4", "Class 4"),
    ("5", "Class 5"),
    ("6", "Class 6"),
    ("7", "Class 7"),
    ("8", "Class 8"),
    ("9", "Class 9"),
    ("10", "Class 10"),
];

pub const ATTENDANCE_STATUSES: [&str; 4] = ["present", "absent", "leave", "late"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromotionStep {
    Advance(&'static str),
    Graduate,
    Unchanged,
}

/// Successor function over CLASS_ORDER. Custom classes are Unchanged: they
/// have no defined next class.
pub fn promotion_step(class_id: &str) -> PromotionStep {
    match CLASS_ORDER.iter().position(|c| *c == class_id) {
        Some(i) if i + 1 < CLASS_ORDER.len() => PromotionStep::Advance(CLASS_ORDER[i + 1]),
        Some(_) => PromotionStep::Graduate,
        None => PromotionStep::Unchanged,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeStatus {
    Unpaid,
    Partial,
    Paid,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Unpaid => "unpaid",
            FeeStatus::Partial => "partial",
            FeeStatus::Paid => "paid",
        }
    }
}

pub fn fee_status(paid: f64, total: f64) -> FeeStatus {
    if paid >= total {
        FeeStatus::Paid
    } else if paid > 0.0 {
        FeeStatus::Partial
    } else {
        FeeStatus::Unpaid
    }
}

/// Due amount is clamped at zero; overpayment never goes negative.
pub fn fee_due(paid: f64, total: f64) -> f64 {
    (total - paid).max(0.0)
}

/// Negative inputs are not rejected here; presence/type checks happen at the
/// handler boundary and the formula itself is applied verbatim.
pub fn total_fee(
    monthly: f64,
    admission: f64,
    transport: f64,
    hostel: f64,
    other: f64,
    discount: f64,
) -> f64 {
    monthly + admission + transport + hostel + other - discount
}

pub fn grade_for(percentage: f64) -> &'static str {
    if percentage >= 80.0 {
        "A+"
    } else if percentage >= 70.0 {
        "A"
    } else if percentage >= 60.0 {
        "B"
    } else if percentage >= 50.0 {
        "C"
    } else if percentage >= 40.0 {
        "D"
    } else {
        "F"
    }
}

pub fn attendance_doc_id(date: &str, class_id: &str) -> String {
    format!("{}_{}", date, class_id)
}

/// `{examName}_{classId}_{subject}` with every run of whitespace collapsed
/// to a single underscore. Must match existing persisted ids exactly.
pub fn result_doc_id(exam_name: &str, class_id: &str, subject: &str) -> String {
    let raw = format!("{}_{}_{}", exam_name, class_id, subject);
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayCounts {
    pub present: i64,
    pub absent: i64,
    pub leave: i64,
    pub late: i64,
}

/// Pure fold of a status map into per-status counts. Unknown statuses are
/// ignored rather than rejected; old documents may carry retired codes.
pub fn day_counts<'a>(statuses: impl IntoIterator<Item = &'a str>) -> DayCounts {
    let mut counts = DayCounts::default();
    for status in statuses {
        match status {
            "present" => counts.present += 1,
            "absent" => counts.absent += 1,
            "leave" => counts.leave += 1,
            // Late is its own bucket at the ledger level. Display layers may
            // fold it into present; that is their decision, not ours.
            "late" => counts.late += 1,
            _ => {}
        }
    }
    counts
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendance {
    pub date: String,
    #[serde(flatten)]
    pub counts: DayCounts,
}

/// One aggregated row per calendar date across all classes in range.
pub fn fold_attendance_days(
    entries: impl IntoIterator<Item = (String, Vec<String>)>,
) -> Vec<DailyAttendance> {
    let mut by_date: BTreeMap<String, DayCounts> = BTreeMap::new();
    for (date, statuses) in entries {
        let counts = by_date.entry(date).or_default();
        let folded = day_counts(statuses.iter().map(|s| s.as_str()));
        counts.present += folded.present;
        counts.absent += folded.absent;
        counts.leave += folded.leave;
        counts.late += folded.late;
    }
    by_date
        .into_iter()
        .map(|(date, counts)| DailyAttendance { date, counts })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SubjectMarks {
    pub subject: String,
    pub marks: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabulationRow {
    pub student_id: String,
    pub marks: BTreeMap<String, f64>,
    pub total: f64,
    pub percentage: f64,
    pub grade: &'static str,
}

/// Cross-subject tabulation for a class roster.
///
/// The percentage divides by `subjectCount * 100`: every subject is assumed
/// to be out of 100 regardless of the document's own maxMarks. That matches
/// the numbers the school has already published, so it stays; see DESIGN.md.
pub fn tabulate(
    subject_docs: &[SubjectMarks],
    roster: &[String],
) -> (Vec<String>, Vec<TabulationRow>) {
    let subjects: Vec<String> = subject_docs
        .iter()
        .map(|d| d.subject.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = roster
        .iter()
        .map(|student_id| {
            let mut marks = BTreeMap::new();
            let mut total = 0.0;
            for doc in subject_docs {
                if let Some(obtained) = doc.marks.get(student_id) {
                    marks.insert(doc.subject.clone(), *obtained);
                    total += *obtained;
                }
            }
            let percentage = if subjects.is_empty() {
                0.0
            } else {
                let max_total = subjects.len() as f64 * 100.0;
                round2(total / max_total * 100.0)
            };
            TabulationRow {
                student_id: student_id.clone(),
                marks,
                total,
                percentage,
                grade: grade_for(percentage),
            }
        })
        .collect();

    (subjects, rows)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub income_by_month: BTreeMap<String, f64>,
    pub income_by_week: BTreeMap<String, f64>,
    pub expenses_by_month: BTreeMap<String, f64>,
}

/// Fee income buckets by the payment's creation timestamp; expenses bucket
/// by their explicit date field. Rows with unparseable dates are skipped.
pub fn revenue_summary(fees: &[(String, f64)], expenses: &[(String, f64)]) -> RevenueSummary {
    let mut summary = RevenueSummary::default();
    for (created_at, paid) in fees {
        if let Some(date) = parse_date_prefix(created_at) {
            *summary
                .income_by_month
                .entry(format!("{:04}-{:02}", date.year(), date.month()))
                .or_insert(0.0) += paid;
            let week = date.iso_week();
            *summary
                .income_by_week
                .entry(format!("{:04}-W{:02}", week.year(), week.week()))
                .or_insert(0.0) += paid;
        }
    }
    for (date_str, amount) in expenses {
        if let Some(date) = parse_date_prefix(date_str) {
            *summary
                .expenses_by_month
                .entry(format!("{:04}-{:02}", date.year(), date.month()))
                .or_insert(0.0) += amount;
        }
    }
    summary
}

/// Accepts both bare dates and full ISO-8601 timestamps.
fn parse_date_prefix(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}
