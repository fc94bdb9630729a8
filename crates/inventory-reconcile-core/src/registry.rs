//! Registry administration: adding users and locations.
//!
//! User codes are uppercase alphanumeric; e-mail addresses must match
//! [`EMAIL_PATTERN`]. Names must normalize to something, otherwise the user
//! could never be matched by an import.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{LedgerError, LedgerResult};
use crate::log::LogSink;
use crate::models::{NewUser, UserId};
use crate::normalize::normalize;
use crate::store::Store;

pub fn validate_user(user: &NewUser) -> LedgerResult<()> {
    let code = user.code.as_str();
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(LedgerError::validation(format!(
            "user code '{}' must be uppercase letters and digits only",
            code
        )));
    }

    if normalize(&user.name).is_empty() {
        return Err(LedgerError::validation(format!(
            "user name '{}' has no letters",
            user.name
        )));
    }

    if !is_email(&user.email) {
        return Err(LedgerError::validation(format!(
            "'{}' is not a valid e-mail address",
            user.email
        )));
    }

    Ok(())
}

/// Accepted e-mail shape: `local@domain.tld`, ASCII only, a TLD of two or
/// more letters.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("invalid e-mail regex"));

fn is_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

pub async fn add_user(store: &dyn Store, user: NewUser, log: &dyn LogSink) -> LedgerResult<UserId> {
    let user = NewUser {
        code: user.code.trim().to_string(),
        name: user.name.trim().to_string(),
        email: user.email.trim().to_lowercase(),
        ..user
    };
    validate_user(&user)?;
    let id = store.insert_user(&user).await?;
    log.info(
        "user_added",
        &[
            ("id", id.to_string()),
            ("code", user.code.clone()),
            ("role", user.role.as_str().to_string()),
        ],
    );
    Ok(id)
}

pub async fn add_location(store: &dyn Store, name: &str, log: &dyn LogSink) -> LedgerResult<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("location name is empty"));
    }
    if let Some(existing) = store.find_location_id(name).await? {
        return Err(LedgerError::Conflict {
            message: format!("location '{}' already exists with id {}", name, existing),
            names: vec![name.to_string()],
        });
    }
    let id = store.insert_location(name).await?;
    log.info("location_added", &[("id", id.to_string()), ("name", name.to_string())]);
    Ok(id)
}
