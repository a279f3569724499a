use async_trait::async_trait;
use std::sync::Mutex;

use super::{ProxyEndpoint, ProxyRotator};
use crate::config::RotatingProxyConfig;
use crate::Result;

/// Rotates through numbered residential proxies (`base-1`, `base-2`, ...)
///
/// The provider exposes a fixed number of endpoints behind one host, keyed by
/// a numeric username suffix. The cursor advances modulo the pool size on
/// every call; losing a race on the cursor only means two requests share an
/// endpoint, so a plain mutex is enough.
pub struct NumberedPool {
    host: String,
    port: u16,
    base_username: String,
    password: String,
    pool_size: u32,
    counter: Mutex<u32>,
}

impl NumberedPool {
    pub fn new(config: &RotatingProxyConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            base_username: strip_numeric_suffix(&config.username),
            password: config.password.clone(),
            pool_size: config.pool_size.max(1),
            counter: Mutex::new(0),
        }
    }

    fn endpoint_for(&self, number: u32) -> ProxyEndpoint {
        ProxyEndpoint {
            host: self.host.clone(),
            port: self.port,
            username: format!("{}-{}", self.base_username, number),
            password: self.password.clone(),
            country_code: None,
            city: None,
        }
    }
}

#[async_trait]
impl ProxyRotator for NumberedPool {
    async fn next(&self) -> Result<Option<ProxyEndpoint>> {
        let number = {
            let mut counter = self.counter.lock().unwrap();
            *counter = (*counter % self.pool_size) + 1;
            *counter
        };

        Ok(Some(self.endpoint_for(number)))
    }

    async fn endpoints(&self) -> Result<Vec<ProxyEndpoint>> {
        Ok((1..=self.pool_size).map(|n| self.endpoint_for(n)).collect())
    }

    fn strategy_name(&self) -> &'static str {
        "numbered"
    }
}

/// The configured username may already carry a number (`residential-3`);
/// rotation needs the bare base to append its own.
fn strip_numeric_suffix(username: &str) -> String {
    if let Some((base, suffix)) = username.rsplit_once('-') {
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return base.to_string();
        }
    }
    username.to_string()
}
