//! Password hashing for the simple mapper.
//!
//! PBKDF2-HMAC-SHA256, 100,000 iterations, fixed salt `"IGNORED"`, hex
//! output — deliberately weak salt-wise, kept for compatibility with
//! existing configs (see design notes on password hashing).
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

const ITERATIONS: u32 = 100_000;
const SALT: &[u8] = b"IGNORED";
const OUTPUT_LEN: usize = 32;

pub fn hash_password(password: &str) -> String {
    let mut output = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), SALT, ITERATIONS, &mut output);
    hex::encode(output)
}
