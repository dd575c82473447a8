use crate::store::{Order, Predicate, Store};
use serde_json::json;

/// Admission and roll number allocation.
///
/// Both allocators are read-then-write with no transaction around the gap:
/// two simultaneous enrollments for the same scope can collide. The school
/// runs one admin at a time; the weaker contract is accepted and documented
/// in DESIGN.md rather than papered over with a counter document.

pub fn format_admission_no(year: i32, seq: u32) -> String {
    format!("ADM-{}-{:04}", year, seq)
}

/// Parses the 4-digit tail of an admission number belonging to `year`.
/// Numbers from other years (or foreign formats) return None.
pub fn admission_seq(admission_no: &str, year: i32) -> Option<u32> {
    let prefix = format!("ADM-{}-", year);
    admission_no.strip_prefix(prefix.as_str())?.parse().ok()
}

/// Next admission number for the enrollment year, formatted
/// `ADM-{year}-{seq:04}`. Prefers a descending range query over the stored
/// admission numbers; if the store cannot serve that form, every student is
/// scanned and the maximum computed locally.
pub fn next_admission_no(store: &Store, year: i32) -> anyhow::Result<String> {
    let low = format_admission_no(year, 0);
    let high = format!("ADM-{}-9999", year);

    let ordered = store.query(
        "students",
        &[
            Predicate::ge("admissionNo", json!(low)),
            Predicate::le("admissionNo", json!(high)),
        ],
        Some(("admissionNo", Order::Desc)),
        Some(1),
    );

    let highest = match ordered {
        Ok(rows) => rows
            .first()
            .and_then(|(_, doc)| doc.get("admissionNo"))
            .and_then(|v| v.as_str())
            .and_then(|no| admission_seq(no, year)),
        // Ordered range form unavailable; scan everything.
        Err(_) => scan_admission_seq(store, year)?,
    };

    Ok(format_admission_no(year, highest.unwrap_or(0) + 1))
}

/// Fallback for stores that cannot serve the ordered range form: list every
/// student and take the maximum sequence for the year locally. Records with
/// missing or foreign-format admission numbers are skipped.
fn scan_admission_seq(store: &Store, year: i32) -> anyhow::Result<Option<u32>> {
    let mut max = None;
    for (_, doc) in store.list("students")? {
        let Some(no) = doc.get("admissionNo").and_then(|v| v.as_str()) else {
            continue;
        };
        if let Some(seq) = admission_seq(no, year) {
            max = Some(max.map_or(seq, |m: u32| m.max(seq)));
        }
    }
    Ok(max)
}

/// Count of students currently in the class, plus one. Count-based, not
/// max-based: after a deletion the next allocation can duplicate a surviving
/// roll number. Known gap, preserved (see DESIGN.md) and pinned by tests.
pub fn next_roll_no(store: &Store, class_id: &str) -> anyhow::Result<i64> {
    let rows = store.query(
        "students",
        &[Predicate::eq("classId", json!(class_id))],
        None,
        None,
    )?;
    Ok(rows.len() as i64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use serde_json::json;

    #[test]
    fn admission_numbers_increment_per_year() {
        let store = store::open_in_memory().expect("open store");
        assert_eq!(
            next_admission_no(&store, 2025).expect("first"),
            "ADM-2025-0001"
        );
        store
            .add("students", &json!({ "admissionNo": "ADM-2025-0001" }))
            .expect("add");
        assert_eq!(
            next_admission_no(&store, 2025).expect("second"),
            "ADM-2025-0002"
        );
        // A different year has its own sequence.
        assert_eq!(
            next_admission_no(&store, 2026).expect("other year"),
            "ADM-2026-0001"
        );
    }

    #[test]
    fn admission_sequence_is_gap_tolerant() {
        let store = store::open_in_memory().expect("open store");
        store
            .add("students", &json!({ "admissionNo": "ADM-2025-0007" }))
            .expect("add");
        assert_eq!(
            next_admission_no(&store, 2025).expect("next"),
            "ADM-2025-0008"
        );
    }

    #[test]
    fn roll_no_is_count_plus_one() {
        let store = store::open_in_memory().expect("open store");
        assert_eq!(next_roll_no(&store, "5").expect("empty"), 1);
        let first = store
            .add("students", &json!({ "classId": "5", "rollNo": 1 }))
            .expect("add");
        store
            .add("students", &json!({ "classId": "5", "rollNo": 2 }))
            .expect("add");
        assert_eq!(next_roll_no(&store, "5").expect("two"), 3);

        // Deleting the first student shrinks the count; the next allocation
        // duplicates the surviving roll number 2. Accepted gap.
        store.delete("students", &first).expect("delete");
        assert_eq!(next_roll_no(&store, "5").expect("after delete"), 2);
    }

    #[test]
    fn scan_fallback_finds_year_max_in_unordered_listing() {
        let store = store::open_in_memory().expect("open store");
        for no in [
            json!({ "admissionNo": "ADM-2025-0003" }),
            json!({ "admissionNo": "ADM-2025-0011" }),
            json!({ "admissionNo": "ADM-2024-0042" }),
            json!({ "admissionNo": "LEGACY-17" }),
            json!({ "fullName": "no admission number" }),
        ] {
            store.add("students", &no).expect("add");
        }

        assert_eq!(
            scan_admission_seq(&store, 2025).expect("scan"),
            Some(11)
        );
        assert_eq!(scan_admission_seq(&store, 2026).expect("scan"), None);
        // The scan agrees with what the ordered query path allocates next.
        assert_eq!(
            next_admission_no(&store, 2025).expect("next"),
            "ADM-2025-0012"
        );
    }

    #[test]
    fn parse_rejects_foreign_years() {
        assert_eq!(admission_seq("ADM-2025-0042", 2025), Some(42));
        assert_eq!(admission_seq("ADM-2024-0042", 2025), None);
        assert_eq!(admission_seq("REC-123456", 2025), None);
    }
}
