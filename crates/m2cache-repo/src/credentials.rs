//! Deploy credentials for a remote repository
//!
//! Most repository managers accept a deploy user with a password, or a
//! user token sent as a bearer header. Either can be written into the
//! repository entry or named through environment variables, so a build
//! agent can release without the secret ever landing in `repositories.yaml`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RepoError, Result};

/// Variable read for the deploy user when none is named
pub const DEPLOY_USER_VAR: &str = "M2CACHE_DEPLOY_USER";

/// Variable read for the deploy password when none is named
pub const DEPLOY_PASSWORD_VAR: &str = "M2CACHE_DEPLOY_PASSWORD";

/// How to authenticate against a repository, as stored in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Deploy user and password, sent as HTTP basic auth
    Basic { username: String, password: String },

    /// User token
    Bearer { token: String },

    /// Deploy user and password read from the environment at resolve time
    Env {
        #[serde(default = "default_user_var")]
        username_var: String,
        #[serde(default = "default_password_var")]
        password_var: String,
    },
}

fn default_user_var() -> String {
    DEPLOY_USER_VAR.to_string()
}

fn default_password_var() -> String {
    DEPLOY_PASSWORD_VAR.to_string()
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Deploy user and password taken from the named variables
    pub fn from_env(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Credentials::Env {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }

    /// Deploy user and password taken from `M2CACHE_DEPLOY_USER` and
    /// `M2CACHE_DEPLOY_PASSWORD`
    pub fn deploy_env() -> Self {
        Self::from_env(DEPLOY_USER_VAR, DEPLOY_PASSWORD_VAR)
    }

    /// Resolve against the process environment
    pub fn resolve(&self) -> Result<ResolvedCredentials> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve, looking variables up through `lookup`
    ///
    /// A variable that is unset or empty fails with `AuthFailed`, naming
    /// the variable but never its value.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedCredentials> {
        match self {
            Credentials::Basic { username, password } => Ok(ResolvedCredentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            Credentials::Bearer { token } => Ok(ResolvedCredentials::Bearer {
                token: token.clone(),
            }),
            Credentials::Env {
                username_var,
                password_var,
            } => {
                let read = |name: &str| {
                    lookup(name)
                        .filter(|value| !value.is_empty())
                        .ok_or_else(|| RepoError::AuthFailed {
                            message: format!("deploy credential variable {} is not set", name),
                        })
                };
                Ok(ResolvedCredentials::Basic {
                    username: read(username_var)?,
                    password: read(password_var)?,
                })
            }
        }
    }
}

/// Credentials with every secret filled in
#[derive(Clone)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl ResolvedCredentials {
    /// Value of the `Authorization` header
    pub fn auth_header(&self) -> String {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                format!("Basic {}", encoded)
            }
            ResolvedCredentials::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

// secrets stay out of logs
impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            ResolvedCredentials::Bearer { .. } => {
                f.debug_struct("Bearer").field("token", &"***").finish()
            }
        }
    }
}
