use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;

use crate::gpa;
use crate::models::{GradeScaleEntry, GradeSettings, RawEntry, Semester, Summary};

/// A local plan file for guest mode: raw entries plus an optional scale
/// and settings carried inside the file. No database is involved; the
/// same resolver and aggregator run over the file's contents.
#[derive(Debug, Deserialize)]
pub struct GuestPlan {
    #[serde(default)]
    pub settings: Option<GradeSettings>,
    #[serde(default)]
    pub grade_scale: Vec<GradeScaleEntry>,
    pub semesters: Vec<GuestSemester>,
}

#[derive(Debug, Deserialize)]
pub struct GuestSemester {
    pub term_name: String,
    #[serde(default)]
    pub entries: Vec<RawEntry>,
}

pub fn load_plan(path: &std::path::Path) -> anyhow::Result<GuestPlan> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let plan: GuestPlan = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid plan file", path.display()))?;
    Ok(plan)
}

/// Resolve and summarize a guest plan. Semesters keep file order; term
/// position spaces the fallback attempt stamps so entries in a later
/// term always rank as later attempts than same-batch entries in an
/// earlier one. Entries carrying their own `created_at` keep it.
pub fn summarize_plan(plan: &GuestPlan, precision_override: Option<u32>) -> (Summary, u32) {
    let settings = plan.settings.clone().unwrap_or_default();
    let precision = precision_override.unwrap_or(settings.cgpa_precision);

    let base = Utc::now();
    let courses = std::collections::HashMap::new();
    let semesters: Vec<Semester> = plan
        .semesters
        .iter()
        .enumerate()
        .map(|(index, semester)| Semester {
            term_name: semester.term_name.clone(),
            enrollments: gpa::resolve_batch(
                &semester.entries,
                &plan.grade_scale,
                &settings,
                &courses,
                base + chrono::Duration::seconds(index as i64),
            ),
        })
        .collect();

    (gpa::compute_summary(&semesters, precision), precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(plan: &str) -> GuestPlan {
        serde_json::from_str(plan).unwrap()
    }

    #[test]
    fn minimal_plan_parses_with_defaults() {
        let plan = parse(
            r#"{
                "semesters": [
                    {
                        "term_name": "Fall 2025",
                        "entries": [
                            {
                                "course_code": "CSE110",
                                "credits": 3.0,
                                "input_method": "points",
                                "grade_point": 4.0
                            }
                        ]
                    }
                ]
            }"#,
        );

        let (summary, precision) = summarize_plan(&plan, Some(2));
        assert_eq!(precision, 2);
        assert_eq!(summary.cgpa, 4.0);
        assert_eq!(summary.total_credits, 3.0);
        assert_eq!(summary.total_courses, 1);
        assert_eq!(summary.per_semester[0].term_name, "Fall 2025");
    }

    #[test]
    fn plan_scale_resolves_letter_and_percentage_entries() {
        let plan = parse(
            r#"{
                "grade_scale": [
                    {"letter": "A-", "min_percentage": 85, "max_percentage": 89.99, "grade_point": 3.7}
                ],
                "semesters": [
                    {
                        "term_name": "Fall 2025",
                        "entries": [
                            {"course_code": "CSE110", "credits": 3.0, "input_method": "percentage", "percentage": 87},
                            {"course_code": "MAT110", "credits": 3.0, "input_method": "letter", "grade_letter": "a-"}
                        ]
                    }
                ]
            }"#,
        );

        let (summary, _) = summarize_plan(&plan, Some(2));
        assert_eq!(summary.cgpa, 3.7);
        assert_eq!(summary.per_semester[0].gpa, 3.7);
        assert_eq!(summary.total_credits, 6.0);
    }

    #[test]
    fn later_terms_win_retakes_without_explicit_stamps() {
        let plan = parse(
            r#"{
                "semesters": [
                    {
                        "term_name": "Fall 2025",
                        "entries": [
                            {"course_code": "CSE110", "credits": 3.0, "input_method": "points", "grade_point": 2.0}
                        ]
                    },
                    {
                        "term_name": "Spring 2026",
                        "entries": [
                            {"course_code": "CSE110", "credits": 3.0, "input_method": "points", "grade_point": 3.7}
                        ]
                    }
                ]
            }"#,
        );

        let (summary, _) = summarize_plan(&plan, Some(2));
        assert_eq!(summary.cgpa, 3.7);
        assert_eq!(summary.total_courses, 1);
    }

    #[test]
    fn file_settings_supply_precision_when_not_overridden() {
        let plan = parse(
            r#"{
                "settings": {
                    "cgpa_precision": 3,
                    "lab_counts_towards_cgpa": false,
                    "lab_counts_towards_credits": true
                },
                "semesters": [
                    {
                        "term_name": "Fall 2025",
                        "entries": [
                            {"course_code": "A1", "credits": 1.0, "input_method": "points", "grade_point": 4.0},
                            {"course_code": "A2", "credits": 2.0, "input_method": "points", "grade_point": 3.0}
                        ]
                    }
                ]
            }"#,
        );

        let (summary, precision) = summarize_plan(&plan, None);
        assert_eq!(precision, 3);
        assert_eq!(summary.cgpa, 3.333);
    }
}
