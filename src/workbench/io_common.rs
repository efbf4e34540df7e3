use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::workbench::*;

/// The storage formats accepted for a masterfile.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MasterfileFormat {
    Csv,
    Xls,
    Xlsx,
}

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Detects the format of a masterfile from its extension, and from its first
/// bytes when the extension is not known.
///
/// A masterfile that does not exist yet must have a known extension.
pub fn detect_format(path: &Path) -> WorkbenchResult<MasterfileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("csv") => return Ok(MasterfileFormat::Csv),
        Some("xls") => return Ok(MasterfileFormat::Xls),
        Some("xlsx") | Some("xlsm") => return Ok(MasterfileFormat::Xlsx),
        _ => {}
    }
    if !path.is_file() {
        return UnsupportedFormatSnafu {
            path: path.display().to_string(),
        }
        .fail();
    }
    let mut head: Vec<u8> = Vec::new();
    File::open(path)
        .and_then(|f| f.take(4096).read_to_end(&mut head))
        .context(ReadingFileSnafu {
            path: path.display().to_string(),
        })?;
    let format = sniff_format(&head).context(UnsupportedFormatSnafu {
        path: path.display().to_string(),
    })?;
    debug!("detect_format: {:?} sniffed as {:?}", path, format);
    Ok(format)
}

fn sniff_format(head: &[u8]) -> Option<MasterfileFormat> {
    if head.starts_with(XLSX_MAGIC) {
        Some(MasterfileFormat::Xlsx)
    } else if head.starts_with(XLS_MAGIC) {
        Some(MasterfileFormat::Xls)
    } else if !head.contains(&0u8) && looks_like_text(head) {
        Some(MasterfileFormat::Csv)
    } else {
        None
    }
}

// The sample may end in the middle of a multi-byte character.
fn looks_like_text(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
