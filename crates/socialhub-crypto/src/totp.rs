use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use qrcode::{QrCode, render::svg};
use rand::RngCore;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const DIGITS: u32 = 6;
pub const STEP_SECS: u64 = 30;
/// Steps accepted on either side of the current one (clock drift).
pub const WINDOW: u64 = 2;
const SECRET_LEN: usize = 32;

/// Generate a random secret, base32 encoded without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Decode a base32 secret, tolerating lowercase, spaces and padding.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| anyhow!("Invalid TOTP secret: {}", e))
}

/// HOTP value (RFC 4226) for `counter`, zero padded to `digits`.
pub fn hotp(key: &[u8], counter: u64, digits: u32) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(digits);

    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// The code for the 30 second step containing `unix_secs`.
pub fn code_at(secret: &str, unix_secs: u64) -> Result<String> {
    let key = decode_secret(secret)?;
    hotp(&key, unix_secs / STEP_SECS, DIGITS)
}

/// Check `code` against the steps within `WINDOW` of `unix_secs`.
pub fn verify_at(secret: &str, code: &str, unix_secs: u64) -> Result<bool> {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }

    let key = decode_secret(secret)?;
    let current = unix_secs / STEP_SECS;
    let first = current.saturating_sub(WINDOW);

    for counter in first..=current + WINDOW {
        if hotp(&key, counter, DIGITS)? == code {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn verify_now(secret: &str, code: &str) -> Result<bool> {
    verify_at(secret, code, unix_now())
}

/// `otpauth://` URI understood by authenticator apps.
pub fn otpauth_url(secret: &str, account: &str, issuer: &str) -> String {
    let label: String = url::form_urlencoded::byte_serialize(format!("{}:{}", issuer, account).as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("secret", secret)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &DIGITS.to_string())
        .append_pair("period", &STEP_SECS.to_string())
        .finish();
    format!("otpauth://totp/{}?{}", label, query)
}

/// Render `otpauth_url` as a QR code, returned as an SVG `data:` URL that
/// can go straight into an `<img src>`.
pub fn qr_data_url(otpauth_url: &str) -> Result<String> {
    let code = QrCode::new(otpauth_url.as_bytes()).map_err(|e| anyhow!("QR encoding failed: {}", e))?;
    let image = code.render::<svg::Color>().min_dimensions(200, 200).build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B, SHA1 seed "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn rfc6238_vectors() {
        let key = decode_secret(RFC_SECRET).unwrap();
        assert_eq!(key, b"12345678901234567890");

        assert_eq!(hotp(&key, 59 / 30, 8).unwrap(), "94287082");
        assert_eq!(hotp(&key, 1111111109 / 30, 8).unwrap(), "07081804");
        assert_eq!(hotp(&key, 1234567890 / 30, 8).unwrap(), "89005924");
        assert_eq!(code_at(RFC_SECRET, 59).unwrap(), "287082");
    }

    #[test]
    fn accepts_codes_within_window() {
        let now = 1_700_000_000;
        let two_steps_ago = code_at(RFC_SECRET, now - 2 * STEP_SECS).unwrap();
        let three_steps_ago = code_at(RFC_SECRET, now - 3 * STEP_SECS).unwrap();

        assert!(verify_at(RFC_SECRET, &code_at(RFC_SECRET, now).unwrap(), now).unwrap());
        assert!(verify_at(RFC_SECRET, &two_steps_ago, now).unwrap());
        if three_steps_ago != two_steps_ago {
            assert!(!verify_at(RFC_SECRET, &three_steps_ago, now).unwrap());
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(!verify_at(RFC_SECRET, "12345", 59).unwrap());
        assert!(!verify_at(RFC_SECRET, "abcdef", 59).unwrap());
        assert!(!verify_at(RFC_SECRET, "", 59).unwrap());
    }

    #[test]
    fn generated_secret_round_trips() {
        let secret = generate_secret();
        assert_eq!(decode_secret(&secret).unwrap().len(), SECRET_LEN);
        assert_eq!(decode_secret(&secret.to_lowercase()).unwrap().len(), SECRET_LEN);
        assert!(verify_now(&secret, &code_at(&secret, unix_now()).unwrap()).unwrap());
    }

    #[test]
    fn otpauth_url_shape() {
        let url = otpauth_url("ABC", "alice@example.com", "SocialHub");
        assert!(url.starts_with("otpauth://totp/SocialHub%3Aalice%40example.com?"));
        assert!(url.contains("secret=ABC"));
        assert!(url.contains("issuer=SocialHub"));
        assert!(url.contains("digits=6"));
    }

    #[test]
    fn qr_code_is_an_svg_data_url() {
        let url = otpauth_url(RFC_SECRET, "alice@example.com", "SocialHub");
        let data_url = qr_data_url(&url).unwrap();

        let payload = data_url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }
}
