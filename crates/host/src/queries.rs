// crates/host/src/queries.rs

//! Query file loading.
//!
//! `.json` files hold an array of strings or `{question, category}`
//! objects. Anything else is read as text, one query per line, with blank
//! lines and `#` comments skipped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use toolpref_core::types::QuerySet;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryEntry {
    Plain(String),
    Tagged {
        question: String,
        #[serde(default)]
        category: Option<String>,
    },
}

impl QueryEntry {
    fn keep(&self, category: Option<&str>) -> bool {
        match (self, category) {
            (_, None) => true,
            (QueryEntry::Plain(_), Some(_)) => false,
            (QueryEntry::Tagged { category: c, .. }, Some(wanted)) => {
                c.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(wanted))
            }
        }
    }

    fn into_question(self) -> String {
        match self {
            QueryEntry::Plain(q) => q,
            QueryEntry::Tagged { question, .. } => question,
        }
    }
}

pub fn load(path: &Path, category: Option<&str>) -> Result<QuerySet> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read query file {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let queries = if is_json {
        parse_json(&contents, category)
            .with_context(|| format!("failed to parse query file {}", path.display()))?
    } else {
        parse_lines(&contents)
    };

    let set = QuerySet::new(queries);
    if set.is_empty() {
        match category {
            Some(c) => anyhow::bail!("no queries in {} for category '{}'", path.display(), c),
            None => anyhow::bail!("no queries in {}", path.display()),
        }
    }
    Ok(set)
}

fn parse_json(contents: &str, category: Option<&str>) -> Result<Vec<String>> {
    let entries: Vec<QueryEntry> = serde_json::from_str(contents)?;
    Ok(entries
        .into_iter()
        .filter(|e| e.keep(category))
        .map(QueryEntry::into_question)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect())
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.txt");
        fs::write(&path, "# weather\nWill it rain in Oslo?\n\n  Forecast for Lima  \n").unwrap();

        let set = load(&path, None).unwrap();
        assert_eq!(set.queries(), ["Will it rain in Oslo?", "Forecast for Lima"]);
    }

    #[test]
    fn test_json_mixed_entries_with_category_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        fs::write(
            &path,
            r#"[
                "plain query",
                {"question": "Weather in Rome?", "category": "weather"},
                {"question": "BTC price?", "category": "crypto"}
            ]"#,
        )
        .unwrap();

        assert_eq!(load(&path, None).unwrap().len(), 3);
        let weather = load(&path, Some("Weather")).unwrap();
        assert_eq!(weather.queries(), ["Weather in Rome?"]);
    }

    #[test]
    fn test_empty_result_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        fs::write(&path, r#"[{"question": "BTC price?", "category": "crypto"}]"#).unwrap();
        assert!(load(&path, Some("weather")).is_err());

        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "# nothing here\n\n").unwrap();
        assert!(load(&blank, None).is_err());
    }
}
