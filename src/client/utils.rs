use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::SERVICE_PATH;

pub fn build_url(config: &Config) -> String {
    format!(
        "{}/{}?key={}",
        config.base_url(),
        SERVICE_PATH,
        config.api_key().expose_secret()
    )
}

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    build_url(config).into_client_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let config = Config::builder()
            .with_base_url("wss://example.test/ws")
            .with_api_key("k")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(
            request.uri().to_string(),
            format!("wss://example.test/ws/{}?key=k", SERVICE_PATH)
        );
    }
}
