use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

/// Human-shareable alphabet: no `0`/`O` or `1`/`I`.
pub const PROJECT_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const PROJECT_CODE_LEN: usize = 6;

const ACCESS_TOKEN_BYTES: usize = 32;

pub fn random_project_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PROJECT_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..PROJECT_CODE_ALPHABET.len());
            PROJECT_CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn normalize_project_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
