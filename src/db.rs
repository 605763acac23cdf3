use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    CourseCategory, CourseRecord, Enrollment, GradeInputMethod, GradeScaleEntry, GradeSettings,
    Semester,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    let statements = [
        "CREATE SCHEMA IF NOT EXISTS cgpa_tracker",
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.students (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT ''
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.grade_scale (
            letter TEXT PRIMARY KEY,
            min_percentage DOUBLE PRECISION NOT NULL,
            max_percentage DOUBLE PRECISION NOT NULL,
            grade_point DOUBLE PRECISION NOT NULL,
            is_special BOOLEAN NOT NULL DEFAULT FALSE,
            position INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.settings (
            singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
            cgpa_precision INTEGER NOT NULL DEFAULT 10,
            lab_counts_towards_cgpa BOOLEAN NOT NULL DEFAULT FALSE,
            lab_counts_towards_credits BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.courses (
            code TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            credits DOUBLE PRECISION NOT NULL DEFAULT 3,
            category TEXT NOT NULL DEFAULT 'Core',
            counts_towards_cgpa BOOLEAN NOT NULL DEFAULT TRUE,
            counts_towards_credits BOOLEAN NOT NULL DEFAULT TRUE,
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.semesters (
            id UUID PRIMARY KEY,
            student_id UUID NOT NULL REFERENCES cgpa_tracker.students (id),
            term_name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (student_id, term_name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS cgpa_tracker.enrollments (
            id UUID PRIMARY KEY,
            semester_id UUID NOT NULL
                REFERENCES cgpa_tracker.semesters (id) ON DELETE CASCADE,
            course_code TEXT NOT NULL,
            course_title TEXT NOT NULL,
            credits DOUBLE PRECISION NOT NULL,
            grade_letter TEXT,
            grade_point DOUBLE PRECISION NOT NULL DEFAULT 0,
            percentage DOUBLE PRECISION,
            input_method TEXT NOT NULL DEFAULT 'letter',
            counts_towards_cgpa BOOLEAN NOT NULL DEFAULT TRUE,
            counts_towards_credits BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let bands: Vec<(&str, f64, f64, f64, bool)> = vec![
        ("A+", 97.0, 100.0, 4.0, false),
        ("A", 90.0, 96.0, 4.0, false),
        ("A-", 85.0, 89.99, 3.7, false),
        ("B+", 80.0, 84.99, 3.3, false),
        ("B", 75.0, 79.99, 3.0, false),
        ("B-", 70.0, 74.99, 2.7, false),
        ("C+", 65.0, 69.99, 2.3, false),
        ("C", 60.0, 64.99, 2.0, false),
        ("C-", 57.0, 59.99, 1.7, false),
        ("D+", 55.0, 56.99, 1.3, false),
        ("D", 52.0, 54.99, 1.0, false),
        ("D-", 50.0, 51.99, 0.7, false),
        ("F", 0.0, 49.99, 0.0, false),
        ("W", 0.0, 100.0, 0.0, true),
        ("I", 0.0, 100.0, 0.0, true),
    ];

    for (position, (letter, min, max, point, special)) in bands.into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cgpa_tracker.grade_scale
            (letter, min_percentage, max_percentage, grade_point, is_special, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (letter) DO UPDATE
            SET min_percentage = EXCLUDED.min_percentage,
                max_percentage = EXCLUDED.max_percentage,
                grade_point = EXCLUDED.grade_point,
                is_special = EXCLUDED.is_special,
                position = EXCLUDED.position
            "#,
        )
        .bind(letter)
        .bind(min)
        .bind(max)
        .bind(point)
        .bind(special)
        .bind(position as i32)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO cgpa_tracker.settings (singleton) VALUES (TRUE) ON CONFLICT DO NOTHING",
    )
    .execute(pool)
    .await?;

    let courses: Vec<(&str, &str, f64, &str)> = vec![
        ("CSE110", "Programming Language I", 3.0, "Core"),
        ("CSE110L", "Programming Language I Lab", 1.0, "Lab"),
        ("MAT110", "Differential Calculus", 3.0, "Core"),
        ("PHY111", "Principles of Physics", 3.0, "Core"),
        ("ENG101", "English Fundamentals", 3.0, "GED"),
    ];

    for (code, title, credits, category) in courses {
        sqlx::query(
            r#"
            INSERT INTO cgpa_tracker.courses (code, title, credits, category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE
            SET title = EXCLUDED.title,
                credits = EXCLUDED.credits,
                category = EXCLUDED.category
            "#,
        )
        .bind(code)
        .bind(title)
        .bind(credits)
        .bind(category)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.students (id, email, full_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(Uuid::parse_str("7c3f0a2e-55d1-4b3a-9a0e-6f8b2f1c4d90")?)
    .bind("avery.lee@example.edu")
    .bind("Avery Lee")
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_grade_scale(pool: &PgPool) -> anyhow::Result<Vec<GradeScaleEntry>> {
    let rows = sqlx::query(
        "SELECT letter, min_percentage, max_percentage, grade_point, is_special \
         FROM cgpa_tracker.grade_scale ORDER BY position",
    )
    .fetch_all(pool)
    .await?;

    let mut scale = Vec::new();
    for row in rows {
        scale.push(GradeScaleEntry {
            letter: row.get("letter"),
            min_percentage: row.get("min_percentage"),
            max_percentage: row.get("max_percentage"),
            grade_point: row.get("grade_point"),
            is_special: row.get("is_special"),
        });
    }

    Ok(scale)
}

/// Replace the grade scale from an admin CSV. Row order becomes band
/// position, which is the order percentage lookup honors.
pub async fn import_scale_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        letter: String,
        min_percentage: f64,
        max_percentage: f64,
        grade_point: f64,
        is_special: Option<bool>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut bands = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        bands.push(result?);
    }
    if bands.is_empty() {
        bail!("grade scale CSV contains no rows");
    }

    sqlx::query("DELETE FROM cgpa_tracker.grade_scale")
        .execute(pool)
        .await?;

    for (position, band) in bands.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cgpa_tracker.grade_scale
            (letter, min_percentage, max_percentage, grade_point, is_special, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(band.letter.to_uppercase())
        .bind(band.min_percentage)
        .bind(band.max_percentage)
        .bind(band.grade_point)
        .bind(band.is_special.unwrap_or(false))
        .bind(position as i32)
        .execute(pool)
        .await?;
    }

    Ok(bands.len())
}

/// Read the settings singleton, creating the default row on first read.
pub async fn fetch_settings(pool: &PgPool) -> anyhow::Result<GradeSettings> {
    let row = sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.settings (singleton) VALUES (TRUE)
        ON CONFLICT (singleton) DO UPDATE SET singleton = TRUE
        RETURNING cgpa_precision, lab_counts_towards_cgpa, lab_counts_towards_credits
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(GradeSettings {
        cgpa_precision: row.get::<i32, _>("cgpa_precision") as u32,
        lab_counts_towards_cgpa: row.get("lab_counts_towards_cgpa"),
        lab_counts_towards_credits: row.get("lab_counts_towards_credits"),
    })
}

pub async fn update_settings(
    pool: &PgPool,
    precision: Option<u32>,
    lab_cgpa: Option<bool>,
    lab_credits: Option<bool>,
) -> anyhow::Result<GradeSettings> {
    // Make sure the singleton exists before patching it.
    fetch_settings(pool).await?;

    let row = sqlx::query(
        r#"
        UPDATE cgpa_tracker.settings
        SET cgpa_precision = COALESCE($1, cgpa_precision),
            lab_counts_towards_cgpa = COALESCE($2, lab_counts_towards_cgpa),
            lab_counts_towards_credits = COALESCE($3, lab_counts_towards_credits)
        WHERE singleton
        RETURNING cgpa_precision, lab_counts_towards_cgpa, lab_counts_towards_credits
        "#,
    )
    .bind(precision.map(|p| p as i32))
    .bind(lab_cgpa)
    .bind(lab_credits)
    .fetch_one(pool)
    .await?;

    Ok(GradeSettings {
        cgpa_precision: row.get::<i32, _>("cgpa_precision") as u32,
        lab_counts_towards_cgpa: row.get("lab_counts_towards_cgpa"),
        lab_counts_towards_credits: row.get("lab_counts_towards_credits"),
    })
}

pub async fn fetch_courses(pool: &PgPool) -> anyhow::Result<HashMap<String, CourseRecord>> {
    let rows = sqlx::query(
        "SELECT code, title, credits, category, counts_towards_cgpa, counts_towards_credits, \
         active FROM cgpa_tracker.courses WHERE active",
    )
    .fetch_all(pool)
    .await?;

    let mut courses = HashMap::new();
    for row in rows {
        let code: String = row.get("code");
        let category: String = row.get("category");
        courses.insert(
            code.to_uppercase(),
            CourseRecord {
                code,
                title: row.get("title"),
                credits: row.get("credits"),
                category: CourseCategory::parse(&category).unwrap_or(CourseCategory::Core),
                counts_towards_cgpa: row.get("counts_towards_cgpa"),
                counts_towards_credits: row.get("counts_towards_credits"),
                active: row.get("active"),
            },
        );
    }

    Ok(courses)
}

/// Everything grade resolution needs, fetched as one logical read so a
/// semester write resolves against a single consistent snapshot.
pub async fn fetch_calc_snapshot(
    pool: &PgPool,
) -> anyhow::Result<(Vec<GradeScaleEntry>, GradeSettings, HashMap<String, CourseRecord>)> {
    let scale = fetch_grade_scale(pool).await?;
    let settings = fetch_settings(pool).await?;
    let courses = fetch_courses(pool).await?;
    Ok((scale, settings, courses))
}

pub async fn ensure_student(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.students (id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}

pub async fn find_student(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM cgpa_tracker.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(row.get("id")),
        None => bail!("no student with email {email}"),
    }
}

/// Persisted semesters with their resolved enrollments, oldest term
/// first. Stored grade points and flags are trusted as-is; this is the
/// compute-on-read input.
pub async fn fetch_semesters(pool: &PgPool, student_id: Uuid) -> anyhow::Result<Vec<Semester>> {
    let semester_rows = sqlx::query(
        "SELECT id, term_name FROM cgpa_tracker.semesters \
         WHERE student_id = $1 ORDER BY created_at, term_name",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut semesters = Vec::new();
    for semester_row in semester_rows {
        let semester_id: Uuid = semester_row.get("id");
        let rows = sqlx::query(
            "SELECT course_code, course_title, credits, grade_letter, grade_point, percentage, \
             input_method, counts_towards_cgpa, counts_towards_credits, created_at \
             FROM cgpa_tracker.enrollments WHERE semester_id = $1 ORDER BY created_at",
        )
        .bind(semester_id)
        .fetch_all(pool)
        .await?;

        let mut enrollments = Vec::new();
        for row in rows {
            let input_method: String = row.get("input_method");
            enrollments.push(Enrollment {
                course_code: row.get("course_code"),
                course_title: row.get("course_title"),
                credits: row.get("credits"),
                grade_letter: row.get("grade_letter"),
                grade_point: row.get("grade_point"),
                percentage: row.get("percentage"),
                input_method: GradeInputMethod::parse(&input_method)
                    .unwrap_or(GradeInputMethod::Letter),
                counts_towards_cgpa: row.get("counts_towards_cgpa"),
                counts_towards_credits: row.get("counts_towards_credits"),
                created_at: row.get("created_at"),
            });
        }

        semesters.push(Semester {
            term_name: semester_row.get("term_name"),
            enrollments,
        });
    }

    Ok(semesters)
}

async fn insert_enrollments(
    pool: &PgPool,
    semester_id: Uuid,
    enrollments: &[Enrollment],
) -> anyhow::Result<()> {
    for enrollment in enrollments {
        sqlx::query(
            r#"
            INSERT INTO cgpa_tracker.enrollments
            (id, semester_id, course_code, course_title, credits, grade_letter, grade_point,
             percentage, input_method, counts_towards_cgpa, counts_towards_credits, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(semester_id)
        .bind(&enrollment.course_code)
        .bind(&enrollment.course_title)
        .bind(enrollment.credits)
        .bind(&enrollment.grade_letter)
        .bind(enrollment.grade_point)
        .bind(enrollment.percentage)
        .bind(enrollment.input_method.as_str())
        .bind(enrollment.counts_towards_cgpa)
        .bind(enrollment.counts_towards_credits)
        .bind(enrollment.created_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn create_semester(
    pool: &PgPool,
    student_id: Uuid,
    term_name: &str,
    enrollments: &[Enrollment],
) -> anyhow::Result<()> {
    let semester_id = Uuid::new_v4();
    let inserted = sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.semesters (id, student_id, term_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_id, term_name) DO NOTHING
        "#,
    )
    .bind(semester_id)
    .bind(student_id)
    .bind(term_name)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        bail!("semester {term_name} already exists; use update-semester");
    }

    insert_enrollments(pool, semester_id, enrollments).await
}

/// Replace a semester's enrollments with a freshly resolved set. Attempt
/// stamps for course codes already in the semester are carried over so a
/// re-submitted edit cannot reorder the original attempt history; only
/// genuinely new entries keep their fresh stamps.
pub async fn update_semester(
    pool: &PgPool,
    student_id: Uuid,
    term_name: &str,
    enrollments: &[Enrollment],
) -> anyhow::Result<()> {
    let row = sqlx::query(
        "SELECT id FROM cgpa_tracker.semesters WHERE student_id = $1 AND term_name = $2",
    )
    .bind(student_id)
    .bind(term_name)
    .fetch_optional(pool)
    .await?;

    let semester_id: Uuid = match row {
        Some(row) => row.get("id"),
        None => bail!("no semester named {term_name}; use add-semester"),
    };

    let stamp_rows = sqlx::query(
        "SELECT course_code, MIN(created_at) AS created_at \
         FROM cgpa_tracker.enrollments WHERE semester_id = $1 GROUP BY course_code",
    )
    .bind(semester_id)
    .fetch_all(pool)
    .await?;

    let mut original_stamps: HashMap<String, DateTime<Utc>> = HashMap::new();
    for row in stamp_rows {
        original_stamps.insert(row.get("course_code"), row.get("created_at"));
    }

    let mut replacements = enrollments.to_vec();
    for enrollment in replacements.iter_mut() {
        if let Some(stamp) = original_stamps.get(&enrollment.course_code) {
            enrollment.created_at = *stamp;
        }
    }

    sqlx::query("DELETE FROM cgpa_tracker.enrollments WHERE semester_id = $1")
        .bind(semester_id)
        .execute(pool)
        .await?;

    insert_enrollments(pool, semester_id, &replacements).await
}
