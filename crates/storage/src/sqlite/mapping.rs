use course_core::model::{CourseId, LearnerId, SectionId, Video, VideoId, VideoProgress};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn course_id(v: CourseId) -> Result<i64, StorageError> {
    id_to_i64("course_id", v.value())
}

pub(crate) fn video_id(v: VideoId) -> Result<i64, StorageError> {
    id_to_i64("video_id", v.value())
}

pub(crate) fn learner_id(v: LearnerId) -> Result<i64, StorageError> {
    id_to_i64("learner_id", v.value())
}

pub(crate) fn section_id(v: SectionId) -> Result<i64, StorageError> {
    id_to_i64("section_id", v.value())
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn section_id_from_i64(v: i64) -> Result<SectionId, StorageError> {
    Ok(SectionId::new(i64_to_u64("section_id", v)?))
}

pub(crate) fn video_id_from_i64(v: i64) -> Result<VideoId, StorageError> {
    Ok(VideoId::new(i64_to_u64("video_id", v)?))
}

pub(crate) fn map_video_row(row: &SqliteRow) -> Result<Video, StorageError> {
    Ok(Video {
        id: video_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        order: row.try_get("sort_order").map_err(ser)?,
        section_id: row
            .try_get::<Option<i64>, _>("section_id")
            .map_err(ser)?
            .map(section_id_from_i64)
            .transpose()?,
    })
}

/// Maps a `video_progress` row. Booleans are stored as 0/1 integers.
pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<(VideoId, VideoProgress), StorageError> {
    let video = video_id_from_i64(row.try_get::<i64, _>("video_id").map_err(ser)?)?;

    let test_score = row
        .try_get::<Option<i64>, _>("test_score")
        .map_err(ser)?
        .map(|s| u8::try_from(s).map_err(|_| ser(format!("invalid test_score: {s}"))))
        .transpose()?;

    let progress = VideoProgress {
        completed: row.try_get::<i64, _>("completed").map_err(ser)? != 0,
        test_passed: row.try_get::<i64, _>("test_passed").map_err(ser)? != 0,
        watch_time_secs: u32_from_i64(
            "watch_time",
            row.try_get::<i64, _>("watch_time").map_err(ser)?,
        )?,
        test_score,
        test_attempts: u32_from_i64(
            "test_attempts",
            row.try_get::<i64, _>("test_attempts").map_err(ser)?,
        )?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    };

    Ok((video, progress))
}

/// Maps write failures; a foreign-key violation means the referenced course
/// or video does not exist.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => conn(e),
    }
}
