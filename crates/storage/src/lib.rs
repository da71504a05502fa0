use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Subscription, VerificationReport};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts or replaces the whole subscription record. Subscribing again
    /// resets any previously recorded verification verdict, the address is
    /// treated as fresh.
    pub async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let report = subscription.verification.as_ref();
        sqlx::query(
            "INSERT INTO subscriptions (email, full_name, format_valid, score, did_you_mean, checked_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                full_name=excluded.full_name,
                format_valid=excluded.format_valid,
                score=excluded.score,
                did_you_mean=excluded.did_you_mean,
                checked_at=excluded.checked_at",
        )
        .bind(&subscription.email)
        .bind(&subscription.name)
        .bind(report.and_then(|r| r.format_valid))
        .bind(report.and_then(|r| r.score))
        .bind(report.and_then(|r| r.did_you_mean.clone()))
        .bind(report.and_then(|r| r.checked_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes a checker verdict onto an existing subscription. Returns false
    /// when no subscription exists for the address.
    pub async fn record_verification(
        &self,
        email: &str,
        report: &VerificationReport,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions
             SET format_valid = ?, score = ?, did_you_mean = ?, checked_at = ?
             WHERE email = ?",
        )
        .bind(report.format_valid)
        .bind(report.score)
        .bind(report.did_you_mean.clone())
        .bind(report.checked_at)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT email, full_name, format_valid, score, did_you_mean, checked_at
             FROM subscriptions
             ORDER BY created_at DESC, email ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(subscription_from_row).collect())
    }

    pub async fn find_subscription(&self, email: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query(
            "SELECT email, full_name, format_valid, score, did_you_mean, checked_at
             FROM subscriptions
             WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(subscription_from_row))
    }

    /// Returns false when no row matched the address.
    pub async fn remove_subscription(&self, email: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn subscription_from_row(row: &SqliteRow) -> Subscription {
    let email: String = row.get("email");
    let checked_at: Option<DateTime<Utc>> = row.get("checked_at");
    let format_valid: Option<bool> = row.get("format_valid");
    let score: Option<f64> = row.get("score");
    let did_you_mean: Option<String> = row.get("did_you_mean");

    // A row with no verification columns set has never been checked.
    let verification = if format_valid.is_none()
        && score.is_none()
        && did_you_mean.is_none()
        && checked_at.is_none()
    {
        None
    } else {
        Some(VerificationReport {
            email: email.clone(),
            format_valid,
            score,
            did_you_mean,
            checked_at,
        })
    };

    Subscription {
        email,
        name: row.get("full_name"),
        verification,
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
