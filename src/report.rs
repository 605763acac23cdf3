use std::fmt::Write;

use crate::gpa;
use crate::models::{Semester, Summary};

/// Course codes attempted more than once, with attempt counts, most
/// retaken first. Only counting attempts participate, mirroring the
/// latest-attempt race in the aggregator.
pub fn retake_counts(semesters: &[Semester]) -> Vec<(String, usize)> {
    let mut attempts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for semester in semesters {
        for enrollment in semester.enrollments.iter() {
            if !enrollment.counts_towards_cgpa && !enrollment.counts_towards_credits {
                continue;
            }
            *attempts.entry(enrollment.course_code.clone()).or_insert(0) += 1;
        }
    }

    let mut retaken: Vec<(String, usize)> = attempts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .collect();
    retaken.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    retaken
}

pub fn build_report(
    student_label: &str,
    semesters: &[Semester],
    summary: &Summary,
    precision: u32,
    credits_required: Option<f64>,
) -> String {
    let places = gpa::display_precision(precision);
    let mut output = String::new();

    let _ = writeln!(output, "# Academic Progress Report");
    let _ = writeln!(output, "Generated for {student_label}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cumulative Standing");
    let _ = writeln!(output, "- CGPA: {:.places$}", summary.cgpa, places = places);
    let _ = writeln!(output, "- Credits earned: {}", summary.total_credits);
    let _ = writeln!(output, "- Courses counted: {}", summary.total_courses);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semester Breakdown");

    if summary.per_semester.is_empty() {
        let _ = writeln!(output, "No semesters recorded yet.");
    } else {
        for standing in summary.per_semester.iter() {
            let _ = writeln!(
                output,
                "- {}: GPA {:.places$} over {} credits",
                standing.term_name,
                standing.gpa,
                standing.credits,
                places = places
            );
        }
    }

    let retaken = retake_counts(semesters);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Retaken Courses");

    if retaken.is_empty() {
        let _ = writeln!(output, "No retakes; every course counted once.");
    } else {
        for (course_code, count) in retaken.iter() {
            let _ = writeln!(
                output,
                "- {course_code}: {count} attempts, latest attempt counted"
            );
        }
    }

    if let Some(required) = credits_required {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Graduation Progress");
        if required > 0.0 {
            let percent =
                gpa::round_half_up((summary.total_credits / required) * 100.0, 1).min(100.0);
            let _ = writeln!(
                output,
                "- {} of {} required credits ({percent}%)",
                summary.total_credits, required
            );
        } else {
            let _ = writeln!(output, "- Credit requirement not set.");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enrollment, GradeInputMethod};
    use chrono::{TimeZone, Utc};

    fn enrollment(code: &str, grade_point: f64, offset_secs: i64) -> Enrollment {
        Enrollment {
            course_code: code.to_string(),
            course_title: format!("{code} title"),
            credits: 3.0,
            grade_letter: None,
            grade_point,
            percentage: None,
            input_method: GradeInputMethod::Points,
            counts_towards_cgpa: true,
            counts_towards_credits: true,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(offset_secs),
        }
    }

    fn semesters_with_retake() -> Vec<Semester> {
        vec![
            Semester {
                term_name: "Fall 2025".to_string(),
                enrollments: vec![enrollment("CSE110", 2.0, 0), enrollment("MAT110", 3.3, 1)],
            },
            Semester {
                term_name: "Spring 2026".to_string(),
                enrollments: vec![enrollment("CSE110", 3.7, 2)],
            },
        ]
    }

    #[test]
    fn counts_only_repeated_courses() {
        let retaken = retake_counts(&semesters_with_retake());
        assert_eq!(retaken, vec![("CSE110".to_string(), 2)]);
    }

    #[test]
    fn fully_excluded_attempts_do_not_count_as_retakes() {
        let mut semesters = semesters_with_retake();
        semesters[1].enrollments[0].counts_towards_cgpa = false;
        semesters[1].enrollments[0].counts_towards_credits = false;
        assert!(retake_counts(&semesters).is_empty());
    }

    #[test]
    fn report_covers_standing_semesters_and_retakes() {
        let semesters = semesters_with_retake();
        let summary = gpa::compute_summary(&semesters, 2);
        let report = build_report("avery.lee@example.edu", &semesters, &summary, 2, None);

        assert!(report.contains("# Academic Progress Report"));
        assert!(report.contains("Generated for avery.lee@example.edu"));
        assert!(report.contains("- CGPA: 3.50"));
        assert!(report.contains("- Fall 2025: GPA 2.65 over 6 credits"));
        assert!(report.contains("- Spring 2026: GPA 3.70 over 3 credits"));
        assert!(report.contains("- CSE110: 2 attempts"));
    }

    #[test]
    fn graduation_progress_appears_when_requirement_given() {
        let semesters = semesters_with_retake();
        let summary = gpa::compute_summary(&semesters, 2);
        let report =
            build_report("avery.lee@example.edu", &semesters, &summary, 2, Some(120.0));
        assert!(report.contains("## Graduation Progress"));
        assert!(report.contains("- 6 of 120 required credits (5%)"));
    }

    #[test]
    fn empty_history_renders_without_panicking() {
        let summary = gpa::compute_summary(&[], 2);
        let report = build_report("guest", &[], &summary, 2, None);
        assert!(report.contains("No semesters recorded yet."));
        assert!(report.contains("- CGPA: 0.00"));
    }
}
