//! Password hashing and policy.
//!
//! bcrypt with a configurable cost factor; verification is the
//! library's constant-time comparison.

/// Newtype for password to prevent accidental logging
#[derive(Debug, Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password with bcrypt at the given cost factor.
pub fn hash_password(password: &Password, cost: u32) -> Result<PasswordHashString, anyhow::Error> {
    let hash = bcrypt::hash(password.as_str(), cost)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(PasswordHashString::new(hash))
}

/// Verify a password against a stored bcrypt hash.
///
/// Returns Ok(()) if the password matches, Err otherwise.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let matches = bcrypt::verify(password.as_str(), password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
    if matches {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Password verification failed"))
    }
}

/// Validate a password against the project policy:
/// - at least 8 characters
/// - at least 1 uppercase letter
/// - at least 1 digit
/// - at least 1 symbol
pub fn validate_password_policy(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

pub fn password_policy_message() -> &'static str {
    "Password must be at least 8 characters long, include 1 uppercase letter, 1 digit and 1 symbol."
}
