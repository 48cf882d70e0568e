use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "blind_clock";

/// Where the CouchDB backend lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL without the database segment.
    pub base_url: String,
    /// Database holding tournaments and clocks.
    pub database: String,
    /// Basic-auth `(username, password)` pair.
    pub credentials: Option<(String, String)>,
}

impl CouchConfig {
    /// Anonymous access to `database` on `base_url`.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            database: database.into(),
            credentials: None,
        }
    }

    /// Authenticate with basic auth.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Read `COUCH_BASE_URL` plus the optional `COUCH_DB` (defaults to
    /// `blind_clock`) and `COUCH_USERNAME`/`COUCH_PASSWORD`.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = std::env::var("COUCH_BASE_URL").map_err(|_| {
            CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            }
        })?;
        let database = std::env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.into());

        let config = Self::new(base_url, database);
        Ok(
            match (std::env::var("COUCH_USERNAME"), std::env::var("COUCH_PASSWORD")) {
                (Ok(username), Ok(password)) => config.with_credentials(username, password),
                _ => config,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let config = CouchConfig::new("http://couch:5984/", "clocks").with_credentials("u", "p");
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.credentials, Some(("u".into(), "p".into())));
    }
}
