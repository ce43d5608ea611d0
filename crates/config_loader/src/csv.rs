//! Flat CSV fixture reader
//!
//! No quoting. Each line is a trimmed comma split; blank lines and lines whose
//! trimmed form starts with `#` are skipped.

use std::path::Path;

use contracts::ContractError;

/// One data row with its 1-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: usize,
    pub fields: Vec<String>,
}

impl CsvRow {
    /// Field at `index`, `None` when absent or empty
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(String::as_str)
            .filter(|field| !field.is_empty())
    }
}

pub fn parse_csv(content: &str) -> Vec<CsvRow> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            Some(CsvRow {
                line: idx + 1,
                fields: line.split(',').map(|f| f.trim().to_string()).collect(),
            })
        })
        .collect()
}

pub fn read_csv(path: &Path) -> Result<Vec<CsvRow>, ContractError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ContractError::fixture(path.display().to_string(), 0, format!("cannot read: {e}"))
    })?;
    Ok(parse_csv(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_comments_and_blank_lines() {
        let rows = parse_csv("# model,serial\n\n  SIM-1 , SN1 ,cam-a,GigE\n   # trailing\nSIM-2,SN2,,USB3\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 3);
        assert_eq!(rows[0].fields, vec!["SIM-1", "SN1", "cam-a", "GigE"]);
        assert_eq!(rows[1].get(2), None);
        assert_eq!(rows[1].get(3), Some("USB3"));
        assert_eq!(rows[1].get(9), None);
    }

    #[test]
    fn test_read_missing_file_reports_path() {
        let err = read_csv(Path::new("/nonexistent/devices.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/devices.csv"));
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("webcams.csv");
        std::fs::write(&path, "cam0,Front Cam\n").unwrap();
        let rows = read_csv(&path).unwrap();
        assert_eq!(rows[0].get(1), Some("Front Cam"));
    }
}
