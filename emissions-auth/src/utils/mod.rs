pub mod password;

pub use password::{
    hash_password, password_policy_message, validate_password_policy, verify_password, Password,
    PasswordHashString,
};
