use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::fs;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileType {
    pub extension: &'static str,
    pub description: &'static str,
}

pub const FILE_TYPES: [FileType; 5] = [
    FileType {
        extension: ".cs",
        description: "C# Model Files",
    },
    FileType {
        extension: ".py",
        description: "Python Model Files",
    },
    FileType {
        extension: ".sql",
        description: "SQL Schema Files",
    },
    FileType {
        extension: ".json",
        description: "JSON Schema Files",
    },
    FileType {
        extension: ".ts",
        description: "TypeScript Files",
    },
];

static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"class\s+(\w+)").unwrap());
static CREATE_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)CREATE\s+TABLE\s+[`\["]?(\w+)[`\]"]?"#).unwrap());
static TS_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:interface|class)\s+(\w+)").unwrap());

/// Context loaded from model/schema files on disk.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub text: String,
    pub file_names: Vec<String>,
    pub tables: Vec<String>,
}

fn captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Names of the entities a context file declares.
pub fn detect_tables(extension: &str, content: &str) -> Vec<String> {
    match extension {
        "cs" | "py" => captures(&CLASS_RE, content),
        "sql" => captures(&CREATE_TABLE_RE, content),
        "ts" => captures(&TS_TYPE_RE, content),
        "json" => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn supported(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    FILE_TYPES
        .iter()
        .any(|t| t.extension[1..] == ext)
        .then_some(ext)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Every file and directory under `root`, sorted, directories with a trailing `/`.
async fn walk(root: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_dir = entry.file_type().await?.is_dir();
            if is_dir {
                pending.push(path.clone());
            }
            found.push((path, is_dir));
        }
    }

    found.sort();
    Ok(found)
}

/// Load every supported file below `folder`, creating the folder when missing.
pub async fn load_context_files(folder: &Path) -> std::io::Result<ContextBundle> {
    if !fs::try_exists(folder).await? {
        fs::create_dir_all(folder).await?;
        info!(folder = %folder.display(), "Created context files directory");
    }

    let mut bundle = ContextBundle::default();
    let mut tables = BTreeSet::new();

    for (path, is_dir) in walk(folder).await? {
        if is_dir {
            continue;
        }
        let Some(ext) = supported(&path) else {
            continue;
        };
        let name = relative(folder, &path);

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let detected = detect_tables(&ext, &content);
                info!(file = %name, tables = ?detected, "Loaded context file");
                bundle.text.push_str(&format!("\n\n--- {name} ---\n{content}"));
                tables.extend(detected);
                bundle.file_names.push(name);
            }
            Err(e) => {
                error!(file = %name, error = %e, "Error reading context file");
                bundle
                    .text
                    .push_str(&format!("\n\n--- ERROR: {name} ---\nError reading {name}: {e}"));
            }
        }
    }

    bundle.tables = tables.into_iter().collect();
    Ok(bundle)
}

/// Folder listing for the `/context` endpoint.
pub async fn folder_structure(folder: &Path) -> Vec<String> {
    match walk(folder).await {
        Ok(entries) => entries
            .into_iter()
            .map(|(path, is_dir)| {
                let name = relative(folder, &path);
                if is_dir { format!("{name}/") } else { name }
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_detected_per_file_type() {
        assert_eq!(
            detect_tables("cs", "public class Employee : FullAuditedEntity<Guid> {}"),
            vec!["Employee"]
        );
        assert_eq!(
            detect_tables("sql", "create table `Sites` (Id char(36));\nCREATE TABLE [Shifts] (x int)"),
            vec!["Sites", "Shifts"]
        );
        assert_eq!(
            detect_tables("ts", "export interface Device { id: string }\nclass Site {}"),
            vec!["Device", "Site"]
        );
        assert_eq!(
            detect_tables("json", r#"{"Employees": {}, "Sites": {}}"#),
            vec!["Employees", "Sites"]
        );
        assert!(detect_tables("json", "[1, 2]").is_empty());
        assert!(detect_tables("json", "not json").is_empty());
    }

    #[actix_web::test]
    async fn folder_is_loaded_recursively() {
        let root = std::env::temp_dir().join(format!("wa-context-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(root.join("Entities")).await.unwrap();
        fs::write(root.join("Entities/Site.cs"), "public class Site {}").await.unwrap();
        fs::write(root.join("schema.sql"), "CREATE TABLE Shifts (Id int)").await.unwrap();
        fs::write(root.join("readme.md"), "ignored").await.unwrap();

        let bundle = load_context_files(&root).await.unwrap();
        assert_eq!(bundle.file_names, vec!["Entities/Site.cs", "schema.sql"]);
        assert_eq!(bundle.tables, vec!["Shifts", "Site"]);
        assert!(bundle.text.contains("\n\n--- Entities/Site.cs ---\npublic class Site {}"));

        let structure = folder_structure(&root).await;
        assert_eq!(
            structure,
            vec!["Entities/", "Entities/Site.cs", "readme.md", "schema.sql"]
        );

        fs::remove_dir_all(&root).await.unwrap();
    }

    #[actix_web::test]
    async fn missing_folder_is_created() {
        let root = std::env::temp_dir().join(format!("wa-context-{}", uuid::Uuid::new_v4()));
        let bundle = load_context_files(&root).await.unwrap();

        assert!(bundle.file_names.is_empty());
        assert!(fs::try_exists(&root).await.unwrap());
        fs::remove_dir_all(&root).await.unwrap();
    }
}
