use std::collections::HashMap;

use course_core::model::{Course, CourseId, QuizCounts, Section, Video};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    conn, course_id, course_id_from_i64, map_video_row, section_id,
    section_id_from_i64, ser, video_id, write_err,
};
use crate::repository::{CourseRepository, StorageError};

fn position(i: usize) -> Result<i64, StorageError> {
    i64::try_from(i).map_err(|_| StorageError::Serialization("position overflow".into()))
}

/// `?start, ?start+1, ...` for `n` bind slots.
fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fails with `Conflict` if any of `ids` already belongs to another course.
async fn ensure_owned(
    db: &mut SqliteConnection,
    table: &'static str,
    course: i64,
    ids: &[i64],
) -> Result<(), StorageError> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "SELECT id, course_id FROM {table} WHERE course_id != ?1 AND id IN ({}) LIMIT 1",
        placeholders(2, ids.len())
    );
    let mut q = sqlx::query(&sql).bind(course);
    for id in ids {
        q = q.bind(*id);
    }
    if let Some(row) = q.fetch_optional(db).await.map_err(conn)? {
        let id: i64 = row.try_get("id").map_err(ser)?;
        let owner: i64 = row.try_get("course_id").map_err(ser)?;
        tracing::warn!(table, id, owner, course, "outline id already used by another course");
        return Err(StorageError::Conflict);
    }
    Ok(())
}

/// Deletes rows of `table` belonging to `course` whose id is not in `keep`.
async fn delete_missing(
    db: &mut SqliteConnection,
    table: &'static str,
    course: i64,
    keep: &[i64],
) -> Result<u64, StorageError> {
    let mut sql = format!("DELETE FROM {table} WHERE course_id = ?1");
    if !keep.is_empty() {
        sql.push_str(&format!(" AND id NOT IN ({})", placeholders(2, keep.len())));
    }

    let mut q = sqlx::query(&sql).bind(course);
    for id in keep {
        q = q.bind(*id);
    }
    let res = q.execute(db).await.map_err(conn)?;
    Ok(res.rows_affected())
}

async fn upsert_question_count(
    db: &mut SqliteConnection,
    video: i64,
    questions: u32,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO quiz_questions (video_id, question_count)
        VALUES (?1, ?2)
        ON CONFLICT(video_id) DO UPDATE SET question_count = excluded.question_count
        ",
    )
    .bind(video)
    .bind(i64::from(questions))
    .execute(db)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn upsert_video(
    db: &mut SqliteConnection,
    course: i64,
    video: &Video,
    pos: usize,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO videos (id, course_id, section_id, title, sort_order, position)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            section_id = excluded.section_id,
            title = excluded.title,
            sort_order = excluded.sort_order,
            position = excluded.position
        ",
    )
    .bind(video_id(video.id)?)
    .bind(course)
    .bind(video.section_id.map(section_id).transpose()?)
    .bind(video.title.as_str())
    .bind(video.order)
    .bind(position(pos)?)
    .execute(db)
    .await
    .map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_course(
        &self,
        course: &Course,
        quizzes: &QuizCounts,
    ) -> Result<(), StorageError> {
        let cid = course_id(course.id())?;
        let section_ids = course
            .sections()
            .iter()
            .map(|s| section_id(s.id))
            .collect::<Result<Vec<_>, _>>()?;
        let video_ids = course
            .videos()
            .map(|v| video_id(v.id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        ensure_owned(&mut *tx, "sections", cid, &section_ids).await?;
        ensure_owned(&mut *tx, "videos", cid, &video_ids).await?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(cid)
        .bind(course.title())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (pos, section) in course.sections().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO sections (id, course_id, title, sort_order, position)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    sort_order = excluded.sort_order,
                    position = excluded.position
                ",
            )
            .bind(section_id(section.id)?)
            .bind(cid)
            .bind(section.title.as_str())
            .bind(section.order)
            .bind(position(pos)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (vpos, video) in section.videos.iter().enumerate() {
                upsert_video(&mut *tx, cid, video, vpos).await?;
            }
        }

        for (pos, video) in course.legacy_videos().iter().enumerate() {
            upsert_video(&mut *tx, cid, video, pos).await?;
        }

        for video in course.videos() {
            upsert_question_count(&mut *tx, video_id(video.id)?, quizzes.get(video.id)).await?;
        }

        // Runs after the upserts so videos moved out of a removed section are
        // re-parented before the section's cascade fires.
        let dropped_videos = delete_missing(&mut *tx, "videos", cid, &video_ids).await?;
        let dropped_sections = delete_missing(&mut *tx, "sections", cid, &section_ids).await?;
        if dropped_videos > 0 || dropped_sections > 0 {
            tracing::info!(
                course = %course.id(),
                dropped_videos,
                dropped_sections,
                "course outline shrank"
            );
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let cid = course_id(id)?;

        let Some(row) = sqlx::query("SELECT id, title FROM courses WHERE id = ?1")
            .bind(cid)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
        else {
            return Ok(None);
        };
        let title: String = row.try_get("title").map_err(ser)?;

        let section_rows = sqlx::query(
            r"
            SELECT id, title, sort_order
            FROM sections
            WHERE course_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(cid)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let video_rows = sqlx::query(
            r"
            SELECT id, section_id, title, sort_order
            FROM videos
            WHERE course_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(cid)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut by_section: HashMap<_, Vec<Video>> = HashMap::new();
        let mut legacy = Vec::new();
        for row in &video_rows {
            let video = map_video_row(row)?;
            match video.section_id {
                Some(sid) => by_section.entry(sid).or_default().push(video),
                None => legacy.push(video),
            }
        }

        let mut sections = Vec::with_capacity(section_rows.len());
        for row in &section_rows {
            let sid = section_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            sections.push(Section {
                id: sid,
                title: row.try_get("title").map_err(ser)?,
                order: row.try_get("sort_order").map_err(ser)?,
                videos: by_section.remove(&sid).unwrap_or_default(),
            });
        }

        Course::new(id, title, sections, legacy)
            .map(Some)
            .map_err(ser)
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query("SELECT id FROM courses ORDER BY id ASC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            let id = course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            if let Some(course) = self.get_course(id).await? {
                courses.push(course);
            }
        }
        Ok(courses)
    }
}
