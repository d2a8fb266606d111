//! Opaque per-user identifier used for rate limiting.
//!
//! Stable across restarts: the first run generates a random identifier and
//! persists it; later runs read it back.

use std::fs;
use std::io;
use std::path::Path;

use rand::RngCore;

/// Identifier length in hex characters.
pub const IDENTIFIER_LEN: usize = 32;

/// Read the identifier stored at `path`, creating one if missing or corrupt.
pub fn load_or_create(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(stored) if is_identifier(stored.trim()) => return Ok(stored.trim().to_string()),
        Ok(_) => log::warn!("ignoring malformed identifier in {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let id = generate_identifier();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &id)?;
    log::info!("created user identifier at {}", path.display());
    Ok(id)
}

/// 16 random bytes as lowercase hex.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; IDENTIFIER_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_identifier(s: &str) -> bool {
    s.len() == IDENTIFIER_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
