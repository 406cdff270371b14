// Session persistence seam - operator token and identity
use std::sync::Arc;

const TOKEN_KEY: &str = "derms.token";
const USER_KEY: &str = "derms.user";

/// Opaque string key-value storage that survives restarts.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn clear(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<String> {
        self.store.get(USER_KEY)
    }

    pub fn set_token(&self, token: &str) -> anyhow::Result<()> {
        self.store.set(TOKEN_KEY, token)
    }

    pub fn sign_in(&self, token: &str, user: &str) -> anyhow::Result<()> {
        self.store.set(TOKEN_KEY, token)?;
        self.store.set(USER_KEY, user)
    }

    pub fn sign_out(&self) -> anyhow::Result<()> {
        self.store.clear(TOKEN_KEY)?;
        self.store.clear(USER_KEY)
    }
}
