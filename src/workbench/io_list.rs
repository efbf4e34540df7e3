// Reading participant lists.

use std::path::Path;

use crate::workbench::*;

/// Reads the identifiers of a participant list, without duplicates.
///
/// `.csv` files contribute every non-empty cell, any other file is read as
/// text where both commas and line breaks separate the identifiers.
pub fn read_participant_list(path: &Path) -> WorkbenchResult<Vec<String>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let ids: Vec<String> = if is_csv {
        read_csv_cells(path)?
    } else {
        parse_participant_ids(&read_to_string(path)?)
    };
    debug!("read_participant_list: {:?}: {} ids", path, ids.len());

    let unique = unique_participant_ids(ids);
    if unique.is_empty() {
        return EmptyParticipantListSnafu {
            path: path.display().to_string(),
        }
        .fail();
    }
    Ok(unique)
}

fn read_csv_cells(path: &Path) -> WorkbenchResult<Vec<String>> {
    let p = path.display().to_string();
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(ParsingCsvSnafu { path: p.clone() })?;
    let mut res: Vec<String> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let line = line_r.context(ParsingCsvSnafu { path: p.clone() })?;
        debug!("read_csv_cells: lineno: {} row: {:?}", idx + 1, line);
        res.extend(
            line.iter()
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .map(|cell| cell.to_string()),
        );
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn text_list_with_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ids.txt");
        fs::write(&p, "P001\nP002, P003\n\nP001\n").unwrap();
        let ids = read_participant_list(&p).unwrap();
        assert_eq!(ids, vec!["P001", "P002", "P003"]);
    }

    #[test]
    fn csv_list_all_cells() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ids.CSV");
        fs::write(&p, "P001,P002\n P003 ,\nP002\n").unwrap();
        let ids = read_participant_list(&p).unwrap();
        assert_eq!(ids, vec!["P001", "P002", "P003"]);
    }

    #[test]
    fn empty_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ids.txt");
        fs::write(&p, "\n , \n").unwrap();
        assert!(matches!(
            read_participant_list(&p),
            Err(WorkbenchError::EmptyParticipantList { .. })
        ));
    }

    #[test]
    fn missing_list_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_participant_list(&dir.path().join("nope.txt")),
            Err(WorkbenchError::ReadingFile { .. })
        ));
    }
}
