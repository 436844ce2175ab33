use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

/// Attachment metadata. The file itself lives under the attachment directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAttachment {
    pub id: String,
    pub issue_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub attacher: Option<String>,
    pub created: Option<String>,
}

impl ExternalAttachment {
    /// Location of the attachment file: `<root>/<project key>/<issue key>/<attachment id>`.
    pub fn file_path(&self, root: &Path, project_key: &str, issue_key: &str) -> PathBuf {
        root.join(project_key).join(issue_key).join(&self.id)
    }
}

impl FromElement for ExternalAttachment {
    const ENTITY: &'static str = names::FILE_ATTACHMENT;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            issue_id: el.require("issue")?,
            file_name: el.require("filename")?,
            mime_type: el.optional("mimetype"),
            file_size: el.parse_optional("filesize")?,
            attacher: el.optional("author"),
            created: el.optional("created"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_follows_project_and_issue_key() {
        let attachment = ExternalAttachment {
            id: "10200".into(),
            ..Default::default()
        };
        let path = attachment.file_path(Path::new("/data/attachments"), "MNK", "MNK-1");
        assert_eq!(path, PathBuf::from("/data/attachments/MNK/MNK-1/10200"));
    }
}
