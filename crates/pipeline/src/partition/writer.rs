use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use carryover_core::external::{names, BackupElement};

/// Writes backup elements into a standalone entity-engine document.
pub struct PartitionWriter {
    path: PathBuf,
    out: BufWriter<File>,
    count: usize,
}

impl PartitionWriter {
    pub async fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path).await?;
        let mut out = BufWriter::new(file);
        out.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n").await?;
        out.write_all(format!("<{}>\n", names::ROOT).as_bytes()).await?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
            count: 0,
        })
    }

    pub async fn write_element(&mut self, element: &BackupElement) -> std::io::Result<()> {
        self.out.write_all(render_element(element).as_bytes()).await?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Close the root element and flush. Returns the file path and element count.
    pub async fn finish(mut self) -> std::io::Result<(PathBuf, usize)> {
        self.out
            .write_all(format!("</{}>\n", names::ROOT).as_bytes())
            .await?;
        self.out.flush().await?;
        Ok((self.path, self.count))
    }
}

/// Values with line breaks or tabs would not survive as attributes; they
/// become child elements.
fn needs_child_element(value: &str) -> bool {
    value.contains(['\n', '\r', '\t'])
}

pub(crate) fn render_element(element: &BackupElement) -> String {
    let mut out = format!("    <{}", element.name);
    let mut children = Vec::new();
    for (key, value) in &element.attributes {
        if needs_child_element(value) {
            children.push((key, value));
        } else {
            out.push_str(&format!(" {key}=\"{}\"", escape(value.as_str())));
        }
    }
    if children.is_empty() {
        out.push_str("/>\n");
        return out;
    }
    out.push_str(">\n");
    for (key, value) in children {
        out.push_str(&format!("        <{key}>{}</{key}>\n", escape(value.as_str())));
    }
    out.push_str(&format!("    </{}>\n", element.name));
    out
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::scanner::{scan, DispatchTable, EntityHandler};
    use crate::error::HandlerError;

    #[test]
    fn escapes_attributes_and_moves_multiline_values_to_children() {
        let element = BackupElement::new("Action")
            .with_attr("id", "5")
            .with_attr("author", "o'neil <admin>")
            .with_attr("body", "one\ntwo & three");
        let xml = render_element(&element);
        assert!(xml.contains(r#"author="o&apos;neil &lt;admin&gt;""#));
        assert!(xml.contains("<body>one\ntwo &amp; three</body>"));
        assert!(xml.trim_end().ends_with("</Action>"));
    }

    struct Keep(Vec<BackupElement>);

    #[async_trait::async_trait]
    impl EntityHandler for Keep {
        fn entity_names(&self) -> &'static [&'static str] {
            &["Action"]
        }

        async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
            self.0.push(element.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn written_partition_scans_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("related.xml");
        let element = BackupElement::new("Action")
            .with_attr("id", "5")
            .with_attr("body", "line one\nline two")
            .with_attr("level", "\"devs\"");

        let mut writer = PartitionWriter::create(&path).await.unwrap();
        writer.write_element(&element).await.unwrap();
        let (written, count) = writer.finish().await.unwrap();
        assert_eq!(count, 1);

        let mut keep = Keep(Vec::new());
        let mut table = DispatchTable::new();
        table.register(&mut keep);
        scan(&written, &mut table).await.unwrap();
        assert_eq!(keep.0, vec![element]);
    }

    #[tokio::test]
    async fn multiline_values_keep_surrounding_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("related.xml");
        let element = BackupElement::new("Action")
            .with_attr("id", "6")
            .with_attr("body", "    indented code\nsecond line\n")
            .with_attr("summary", "  padded  ");

        let mut writer = PartitionWriter::create(&path).await.unwrap();
        writer.write_element(&element).await.unwrap();
        let (written, _) = writer.finish().await.unwrap();

        let mut keep = Keep(Vec::new());
        let mut table = DispatchTable::new();
        table.register(&mut keep);
        scan(&written, &mut table).await.unwrap();
        assert_eq!(keep.0[0].get("body"), Some("    indented code\nsecond line\n"));
        assert_eq!(keep.0[0].get("summary"), Some("  padded  "));
    }
}
