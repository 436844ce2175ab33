use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

/// A user account from the backup. The user name doubles as the old id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUser {
    pub name: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

impl ExternalUser {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }
}

impl FromElement for ExternalUser {
    const ENTITY: &'static str = names::USER;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            name: el.require("userName")?,
            full_name: el.optional("displayName"),
            email: el.optional("emailAddress"),
            active: el.flag("active", true)?,
        })
    }
}
