use std::sync::Once;

pub mod datetime;
pub mod http;
pub mod map;
pub mod text;

static RUSTLS_PROVIDER: Once = Once::new();

/// reqwest 使用 rustls-no-provider，建立 client 前需先安裝 crypto provider
pub fn ensure_rustls_crypto_provider() {
    RUSTLS_PROVIDER.call_once(|| {
        // 已有其他地方安裝過時會回傳 Err，忽略即可
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
