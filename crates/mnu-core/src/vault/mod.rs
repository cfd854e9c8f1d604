//! Vault access.
//!
//! Two interchangeable backends implement [`VaultManager`]:
//!
//! - [`ApiVault`] talks to the REST server started by `bw serve`
//! - [`CliVault`] runs the `bw` executable for every request
//!
//! Secrets leave this module wrapped in [`Zeroizing`].

mod api;
mod process;

pub use api::ApiVault;
pub use process::{CliVault, PASSWORD_ENV};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// A vault entry as listed, without secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItem {
    /// Item identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Login data, absent for notes and cards
    #[serde(default)]
    pub login: Option<LoginSummary>,
}

/// Non-secret login fields of a [`VaultItem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSummary {
    /// Login username
    #[serde(default)]
    pub username: Option<String>,
}

impl VaultItem {
    /// Login username, if any.
    pub fn username(&self) -> Option<&str> {
        self.login.as_ref()?.username.as_deref()
    }
}

/// Item field that can be handed to the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    /// Login password
    Password,
    /// Current TOTP code
    Totp,
    /// Login username
    Username,
}

impl ItemField {
    /// Lowercase field name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Totp => "totp",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "totp" => Ok(Self::Totp),
            "username" => Ok(Self::Username),
            other => Err(Error::Vault(format!("unknown item field '{other}'"))),
        }
    }
}

/// Operations the menus need from a password vault.
#[async_trait]
pub trait VaultManager: Send + Sync {
    /// Whether the vault is unlocked and usable.
    async fn is_logged_in(&self) -> Result<bool>;

    /// All items in the vault.
    async fn get_items(&self) -> Result<Vec<VaultItem>>;

    /// Password of item `id`.
    async fn get_password(&self, id: &str) -> Result<Zeroizing<String>>;

    /// Current TOTP code of item `id`.
    async fn get_totp(&self, id: &str) -> Result<Zeroizing<String>>;

    /// Unlock the vault, returning the session key.
    async fn unlock(&self, password: &str) -> Result<Zeroizing<String>>;

    /// Username of item `id`.
    async fn get_username(&self, id: &str) -> Result<String> {
        self.get_items()
            .await?
            .into_iter()
            .find(|item| item.id == id)
            .and_then(|item| item.login?.username)
            .ok_or_else(|| Error::FieldNotFound {
                field: "username",
                id: id.to_string(),
            })
    }

    /// Value of `field` for item `id`.
    async fn get_field(&self, field: ItemField, id: &str) -> Result<Zeroizing<String>> {
        match field {
            ItemField::Password => self.get_password(id).await,
            ItemField::Totp => self.get_totp(id).await,
            ItemField::Username => self.get_username(id).await.map(Zeroizing::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_parses_bw_listing() {
        let json = r#"[
            {"object":"item","id":"a1","type":1,"name":"GitHub",
             "login":{"username":"octo","password":"hunter2","totp":null}},
            {"object":"item","id":"b2","type":2,"name":"Note","login":null}
        ]"#;

        let items: Vec<VaultItem> = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].username(), Some("octo"));
        assert_eq!(items[1].username(), None);
        assert!(!serde_json::to_string(&items[0]).unwrap().contains("hunter2"));
    }

    #[test]
    fn test_item_field_parsing() {
        assert_eq!("password".parse::<ItemField>().unwrap(), ItemField::Password);
        assert_eq!("TOTP".parse::<ItemField>().unwrap(), ItemField::Totp);
        assert_eq!(ItemField::Username.to_string(), "username");
        assert!("pin".parse::<ItemField>().is_err());
    }
}
