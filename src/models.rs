use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One band of the institution's letter-grade scale, or a special
/// non-graded outcome (Withdraw, Incomplete) when `is_special` is set.
/// Band order matters: percentage lookup takes the first match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeScaleEntry {
    pub letter: String,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub grade_point: f64,
    #[serde(default)]
    pub is_special: bool,
}

/// Singleton configuration consumed on every computation. The persistence
/// layer creates the row lazily; the core only ever sees it as a parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeSettings {
    pub cgpa_precision: u32,
    pub lab_counts_towards_cgpa: bool,
    pub lab_counts_towards_credits: bool,
}

impl Default for GradeSettings {
    fn default() -> Self {
        GradeSettings {
            cgpa_precision: 10,
            lab_counts_towards_cgpa: false,
            lab_counts_towards_credits: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseCategory {
    Core,
    Elective,
    Major,
    Minor,
    Lab,
    #[serde(rename = "GED")]
    Ged,
}

impl CourseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseCategory::Core => "Core",
            CourseCategory::Elective => "Elective",
            CourseCategory::Major => "Major",
            CourseCategory::Minor => "Minor",
            CourseCategory::Lab => "Lab",
            CourseCategory::Ged => "GED",
        }
    }

    pub fn parse(value: &str) -> Option<CourseCategory> {
        match value {
            "Core" => Some(CourseCategory::Core),
            "Elective" => Some(CourseCategory::Elective),
            "Major" => Some(CourseCategory::Major),
            "Minor" => Some(CourseCategory::Minor),
            "Lab" => Some(CourseCategory::Lab),
            "GED" => Some(CourseCategory::Ged),
            _ => None,
        }
    }
}

/// Catalog course. Supplies flag defaults and the Lab category that
/// triggers the settings override during resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub code: String,
    pub title: String,
    pub credits: f64,
    pub category: CourseCategory,
    pub counts_towards_cgpa: bool,
    pub counts_towards_credits: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeInputMethod {
    Letter,
    Points,
    Percentage,
}

impl GradeInputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeInputMethod::Letter => "letter",
            GradeInputMethod::Points => "points",
            GradeInputMethod::Percentage => "percentage",
        }
    }

    pub fn parse(value: &str) -> Option<GradeInputMethod> {
        match value {
            "letter" => Some(GradeInputMethod::Letter),
            "points" => Some(GradeInputMethod::Points),
            "percentage" => Some(GradeInputMethod::Percentage),
            _ => None,
        }
    }
}

/// An enrollment as submitted, before grade resolution. Optional fields
/// stay optional: the resolver degrades missing data to a zero grade
/// rather than rejecting the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub course_code: String,
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub credits: f64,
    #[serde(default)]
    pub grade_letter: Option<String>,
    #[serde(default)]
    pub grade_point: Option<f64>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub input_method: Option<GradeInputMethod>,
    #[serde(default)]
    pub counts_towards_cgpa: Option<bool>,
    #[serde(default)]
    pub counts_towards_credits: Option<bool>,
    /// Guest plan files may carry their own attempt history; persisted
    /// entries get a server-assigned stamp instead.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A fully resolved course attempt. `grade_point` is the authoritative
/// value in every aggregation; letter and percentage are provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub course_code: String,
    pub course_title: String,
    pub credits: f64,
    pub grade_letter: Option<String>,
    pub grade_point: f64,
    pub percentage: Option<f64>,
    pub input_method: GradeInputMethod,
    pub counts_towards_cgpa: bool,
    pub counts_towards_credits: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Semester {
    pub term_name: String,
    pub enrollments: Vec<Enrollment>,
}

/// Per-semester slice of a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterStanding {
    pub term_name: String,
    pub gpa: f64,
    pub credits: f64,
}

/// Derived cumulative figures. Recomputed on every read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub cgpa: f64,
    pub total_credits: f64,
    pub total_courses: usize,
    pub per_semester: Vec<SemesterStanding>,
}
