//! Relations stored as text: one row per line, cells separated by whitespace.

use std::{fs, io, path::Path};

use mpc_rel::PlainRelation;

use crate::QueryError;

pub fn read_relation(path: &Path) -> Result<PlainRelation, QueryError> {
    parse_relation(&fs::read_to_string(path)?)
}

/// Parse relation. Blank lines are skipped, widths are checked later by the session.
pub fn parse_relation(text: &str) -> Result<PlainRelation, QueryError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.split_whitespace()
                .map(|value| {
                    value.parse::<i64>().map_err(|err| QueryError::Parse {
                        line: idx + 1,
                        message: format!("{:?}: {}", value, err),
                    })
                })
                .collect()
        })
        .collect()
}

pub fn format_relation(rel: &PlainRelation) -> String {
    rel.iter()
        .map(|row| {
            let cells: Vec<_> = row.iter().map(i64::to_string).collect();
            cells.join(" ") + "\n"
        })
        .collect()
}

pub fn write_relation(path: &Path, rel: &PlainRelation) -> io::Result<()> {
    fs::write(path, format_relation(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relation() {
        let text = "1 2\n\n  -3\t40  \n";
        assert_eq!(parse_relation(text).unwrap(), vec![vec![1, 2], vec![-3, 40]]);
        assert_eq!(parse_relation("").unwrap(), PlainRelation::new());
    }

    #[test]
    fn test_parse_error_reports_line() {
        match parse_relation("1 2\n3 x\n") {
            Err(QueryError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_format_relation() {
        let rel = vec![vec![1, -2], vec![], vec![3]];
        assert_eq!(format_relation(&rel), "1 -2\n\n3\n");
        assert_eq!(parse_relation(&format_relation(&rel)).unwrap(), vec![vec![1, -2], vec![3]]);
    }
}
