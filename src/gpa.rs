use chrono::{DateTime, Utc};

use crate::models::{
    CourseCategory, CourseRecord, Enrollment, GradeInputMethod, GradeScaleEntry, GradeSettings,
    RawEntry, Semester, SemesterStanding, Summary,
};

/// Round half up to `precision` decimal places. The epsilon bias counters
/// binary representation error on nominal .5 boundaries so 2.345 at two
/// places lands on 2.35 instead of 2.34.
pub fn round_half_up(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor + f64::EPSILON).round() / factor
}

/// Decimal places to show. Stored values keep the full configured
/// precision; display caps at ten digits.
pub fn display_precision(precision: u32) -> usize {
    precision.min(10) as usize
}

fn resolve_grade(entry: &RawEntry, scale: &[GradeScaleEntry]) -> (f64, Option<String>) {
    match entry.input_method {
        Some(GradeInputMethod::Points) => {
            (entry.grade_point.unwrap_or(0.0), entry.grade_letter.clone())
        }
        Some(GradeInputMethod::Letter) => match &entry.grade_letter {
            Some(letter) if !letter.is_empty() => {
                match scale
                    .iter()
                    .find(|band| band.letter.eq_ignore_ascii_case(letter))
                {
                    Some(band) => (band.grade_point, Some(letter.to_uppercase())),
                    None => (0.0, Some(letter.clone())),
                }
            }
            _ => (0.0, entry.grade_letter.clone()),
        },
        Some(GradeInputMethod::Percentage) => match entry.percentage {
            Some(percentage) => {
                // First matching band in scale order wins; overlapping
                // bands are an admin concern, not resolved here.
                match scale.iter().find(|band| {
                    !band.is_special
                        && percentage >= band.min_percentage
                        && percentage <= band.max_percentage
                }) {
                    Some(band) => (band.grade_point, Some(band.letter.clone())),
                    None => (0.0, entry.grade_letter.clone()),
                }
            }
            None => (0.0, entry.grade_letter.clone()),
        },
        None => (0.0, entry.grade_letter.clone()),
    }
}

/// Resolve a submitted entry into a persistable enrollment: authoritative
/// grade point, display letter, and effective counting flags. A linked
/// catalog course supplies the denormalized code/title/credits snapshot
/// and flag defaults; a Lab course forces both flags to the settings
/// values regardless of what the entry asked for. Never fails; missing or
/// unmatched grade data degrades to a zero grade point.
pub fn resolve_entry(
    entry: &RawEntry,
    scale: &[GradeScaleEntry],
    settings: &GradeSettings,
    course: Option<&CourseRecord>,
    created_at: DateTime<Utc>,
) -> Enrollment {
    let (grade_point, grade_letter) = resolve_grade(entry, scale);

    let counts_towards_cgpa = entry
        .counts_towards_cgpa
        .unwrap_or_else(|| course.map(|c| c.counts_towards_cgpa).unwrap_or(true));
    let counts_towards_credits = entry
        .counts_towards_credits
        .unwrap_or_else(|| course.map(|c| c.counts_towards_credits).unwrap_or(true));

    let is_lab = course.map(|c| c.category == CourseCategory::Lab).unwrap_or(false);

    Enrollment {
        course_code: course
            .map(|c| c.code.clone())
            .unwrap_or_else(|| entry.course_code.clone()),
        course_title: course
            .map(|c| c.title.clone())
            .unwrap_or_else(|| entry.course_title.clone()),
        credits: course.map(|c| c.credits).unwrap_or(entry.credits),
        grade_letter: grade_letter.or_else(|| entry.grade_letter.clone()),
        grade_point,
        percentage: entry.percentage,
        input_method: entry.input_method.unwrap_or(GradeInputMethod::Letter),
        counts_towards_cgpa: if is_lab {
            settings.lab_counts_towards_cgpa
        } else {
            counts_towards_cgpa
        },
        counts_towards_credits: if is_lab {
            settings.lab_counts_towards_credits
        } else {
            counts_towards_credits
        },
        created_at,
    }
}

/// Resolve a submitted batch against one scale/settings/courses
/// snapshot. Entries without their own stamp get `base` plus a
/// per-entry millisecond offset, so attempt ordering within the batch
/// is strictly increasing and retake ties cannot arise from a single
/// submission. Both the synced write path and the guest path go
/// through here.
pub fn resolve_batch(
    entries: &[RawEntry],
    scale: &[GradeScaleEntry],
    settings: &GradeSettings,
    courses: &std::collections::HashMap<String, CourseRecord>,
    base: DateTime<Utc>,
) -> Vec<Enrollment> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let course = courses.get(&entry.course_code.to_uppercase());
            let created_at = entry
                .created_at
                .unwrap_or(base + chrono::Duration::milliseconds(index as i64));
            resolve_entry(entry, scale, settings, course, created_at)
        })
        .collect()
}

/// GPA and credit total for one semester in isolation. Credits are summed
/// only for enrollments that also count towards CGPA: an attempt excluded
/// from CGPA contributes nothing to the semester denominator.
pub fn semester_gpa(semester: &Semester, precision: u32) -> (f64, f64) {
    let mut total_points = 0.0;
    let mut total_credits = 0.0;

    for enrollment in semester.enrollments.iter() {
        if !enrollment.counts_towards_cgpa {
            continue;
        }
        total_points += enrollment.grade_point * enrollment.credits;
        if enrollment.counts_towards_credits {
            total_credits += enrollment.credits;
        }
    }

    let gpa = if total_credits > 0.0 {
        round_half_up(total_points / total_credits, precision)
    } else {
        0.0
    };
    (gpa, total_credits)
}

/// Cumulative summary over resolved semesters. Retakes are resolved by
/// latest attempt per course code (greatest `created_at`, strict, so an
/// equal stamp keeps the attempt seen first). Cumulative credits are NOT
/// nested inside the CGPA filter, unlike the per-semester sum: a course
/// can earn credits without entering the CGPA average.
pub fn compute_summary(semesters: &[Semester], precision: u32) -> Summary {
    let per_semester = semesters
        .iter()
        .map(|semester| {
            let (gpa, credits) = semester_gpa(semester, precision);
            SemesterStanding {
                term_name: semester.term_name.clone(),
                gpa,
                credits,
            }
        })
        .collect();

    let mut latest_attempts: std::collections::HashMap<&str, &Enrollment> =
        std::collections::HashMap::new();

    for semester in semesters.iter() {
        for enrollment in semester.enrollments.iter() {
            if !enrollment.counts_towards_cgpa && !enrollment.counts_towards_credits {
                continue;
            }
            match latest_attempts.get(enrollment.course_code.as_str()) {
                Some(existing) if existing.created_at >= enrollment.created_at => {}
                _ => {
                    latest_attempts.insert(enrollment.course_code.as_str(), enrollment);
                }
            }
        }
    }

    let mut total_points = 0.0;
    let mut total_credits = 0.0;
    for enrollment in latest_attempts.values() {
        if enrollment.counts_towards_cgpa {
            total_points += enrollment.grade_point * enrollment.credits;
        }
        if enrollment.counts_towards_credits {
            total_credits += enrollment.credits;
        }
    }

    let cgpa = if total_credits > 0.0 {
        round_half_up(total_points / total_credits, precision)
    } else {
        0.0
    };

    Summary {
        cgpa,
        total_credits,
        total_courses: latest_attempts.len(),
        per_semester,
    }
}
