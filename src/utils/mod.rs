pub mod email_crypto;

pub use email_crypto::{decrypt_object, decrypt_string, encrypt_object, encrypt_string};
