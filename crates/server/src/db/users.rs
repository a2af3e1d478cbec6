use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::User;

const USER_COLUMNS: &str = "id, name, color, created_at";

/// Roommates seeded on first boot. Users are otherwise created by admin
/// action only; there is no signup flow.
const DEFAULT_ROOMMATES: [(&str, &str); 3] = [
    ("Alex", "#e07a5f"),
    ("Sam", "#3d84a8"),
    ("Jordan", "#81b29a"),
];

pub async fn list(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY name ASC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?"))
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Update a user's display color, returning the updated row, or `None` for
/// an unknown user.
pub async fn update_color(
    pool: &SqlitePool,
    id: i64,
    color: &str,
) -> Result<Option<User>, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET color = ? WHERE id = ?")
        .bind(color)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}

pub async fn insert(pool: &SqlitePool, name: &str, color: &str) -> Result<User, sqlx::Error> {
    let result = sqlx::query("INSERT INTO users (name, color, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(color)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    let id = result.last_insert_rowid();
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_one(pool)
        .await
}

/// Seed the default roommates on a fresh database.
pub async fn seed_if_empty(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Ok(());
    }

    for (name, color) in DEFAULT_ROOMMATES {
        insert(pool, name, color).await?;
    }
    tracing::info!("seeded {} default roommates", DEFAULT_ROOMMATES.len());
    Ok(())
}
