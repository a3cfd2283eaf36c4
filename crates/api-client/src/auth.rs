use crate::error::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

/// Creates the `ACCESS-SIGN` header value for one request.
///
/// Bitget signs `timestamp + METHOD + path[?query] + body` with HMAC-SHA256 and expects
/// the raw digest base64-encoded.
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
) -> Result<String, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::RequestBuild(e.to_string()))?;

    let request_path = if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    };
    let prehash = format!("{}{}{}{}", timestamp, method.to_uppercase(), request_path, body);
    mac.update(prehash.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_depends_on_every_part_of_the_prehash() {
        let base = sign_request("secret", "1700000000000", "get", "/api/v2/mix/market/tickers", "productType=USDT-FUTURES", "").unwrap();
        let other_query = sign_request("secret", "1700000000000", "GET", "/api/v2/mix/market/tickers", "", "").unwrap();
        let upper = sign_request("secret", "1700000000000", "GET", "/api/v2/mix/market/tickers", "productType=USDT-FUTURES", "").unwrap();

        assert_eq!(base, upper);
        assert_ne!(base, other_query);
        // 32-byte digest, base64 with padding.
        assert_eq!(base.len(), 44);
    }
}
