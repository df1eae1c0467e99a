use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::models::UserRow;
use crate::db::to_ms;
use crate::error::{AppError, Result};
use crate::pricing::money::{from_cents, to_cents};
use crate::types::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, wallet_balance_cents, created_at_ms";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

pub async fn register(
    conn: &mut SqliteConnection,
    new_user: &NewUser,
    opening_balance: Decimal,
    now: DateTime<Utc>,
) -> Result<User> {
    let username = new_user.username.trim();
    let email = new_user.email.trim().to_ascii_lowercase();
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("email address is invalid".to_string()));
    }
    if new_user.password.is_empty() {
        return Err(AppError::Validation("password must not be empty".to_string()));
    }

    let username_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(&mut *conn)
        .await?;
    if username_taken > 0 {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }
    let email_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&mut *conn)
        .await?;
    if email_taken > 0 {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let balance_cents = cents(opening_balance)?;
    let password_hash = hash_password(&new_user.password)?;

    let id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, wallet_balance_cents, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(&email)
    .bind(&password_hash)
    .bind(new_user.full_name.as_deref())
    .bind(balance_cents)
    .bind(to_ms(now))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    info!(user_id = id, username, "Registered user");
    require_user(conn, id).await
}

/// Look up by email and check the password. Unknown email and wrong password
/// are reported identically.
pub async fn authenticate(conn: &mut SqliteConnection, email: &str, password: &str) -> Result<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email.trim().to_ascii_lowercase())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) if verify_password(password, &row.password_hash) => User::try_from(row),
        _ => Err(AppError::Unauthorized("Invalid email or password".to_string())),
    }
}

pub async fn fetch_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(User::try_from).transpose()
}

pub async fn require_user(conn: &mut SqliteConnection, user_id: i64) -> Result<User> {
    fetch_user(conn, user_id).await?.ok_or(AppError::UserNotFound(user_id))
}

pub async fn fetch_user_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(User::try_from).transpose()
}

pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at_ms DESC, id DESC"
    ))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(User::try_from).collect()
}

/// Credit the wallet. Single atomic UPDATE; returns the new balance.
pub async fn top_up(conn: &mut SqliteConnection, user_id: i64, amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be > 0".to_string()));
    }
    let amount_cents = cents(amount)?;
    if amount_cents == 0 {
        return Err(AppError::Validation("Amount must be at least 0.01".to_string()));
    }

    let new_balance: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET wallet_balance_cents = wallet_balance_cents + ? WHERE id = ? RETURNING wallet_balance_cents",
    )
    .bind(amount_cents)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let new_balance = new_balance.ok_or(AppError::UserNotFound(user_id))?;
    info!(user_id, amount = %amount, "Wallet topped up");
    Ok(from_cents(new_balance))
}

/// Debit the wallet only if it covers `amount`. The balance check and the
/// write are one conditional UPDATE, so a stale read can never overdraw.
pub async fn debit(conn: &mut SqliteConnection, user_id: i64, amount: Decimal) -> Result<Decimal> {
    let amount_cents = cents(amount)?;

    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users SET wallet_balance_cents = wallet_balance_cents - ?1
        WHERE id = ?2 AND wallet_balance_cents >= ?1
        RETURNING wallet_balance_cents
        "#,
    )
    .bind(amount_cents)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    match new_balance {
        Some(balance) => Ok(from_cents(balance)),
        None => {
            let user = require_user(conn, user_id).await?;
            Err(AppError::InsufficientBalance {
                required: amount,
                available: user.wallet_balance,
            })
        }
    }
}

fn cents(amount: Decimal) -> Result<i64> {
    to_cents(amount).ok_or_else(|| AppError::Validation(format!("amount out of range: {amount}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use std::str::FromStr;

    fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: "Alice@Example.com".to_string(),
            full_name: Some("Alice A".to_string()),
            password: "hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = register(&mut conn, &alice(), Decimal::from(50_000), Utc::now()).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.wallet_balance, Decimal::from(50_000));

        let logged_in = authenticate(&mut conn, "alice@example.com", "hunter2").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let err = authenticate(&mut conn, "alice@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        register(&mut conn, &alice(), Decimal::ZERO, Utc::now()).await.unwrap();

        let mut again = alice();
        again.email = "other@example.com".to_string();
        let err = register(&mut conn, &again, Decimal::ZERO, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn top_up_requires_positive_amount() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = register(&mut conn, &alice(), Decimal::from(100), Utc::now()).await.unwrap();

        assert!(top_up(&mut conn, user.id, Decimal::ZERO).await.is_err());
        let balance = top_up(&mut conn, user.id, Decimal::from_str("25.50").unwrap()).await.unwrap();
        assert_eq!(balance, Decimal::from_str("125.50").unwrap());
    }

    #[tokio::test]
    async fn debit_refuses_overdraft_and_leaves_balance() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = register(&mut conn, &alice(), Decimal::from(100), Utc::now()).await.unwrap();

        let err = debit(&mut conn, user.id, Decimal::from(150)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(require_user(&mut conn, user.id).await.unwrap().wallet_balance, Decimal::from(100));

        let left = debit(&mut conn, user.id, Decimal::from(100)).await.unwrap();
        assert_eq!(left, Decimal::ZERO);
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("demo123").unwrap();
        assert!(verify_password("demo123", &hash));
        assert!(!verify_password("demo124", &hash));
        assert!(!verify_password("demo123", "not-a-hash"));
    }
}
