use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Non-empty lines of a text file, trimmed.
pub(crate) fn read_lines<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let file_in = fs::File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file_in).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// `1234567.0` -> `"1.2 M"`
pub(crate) fn human_bytes(size: f64) -> String {
    const UNITS: [&str; 5] = ["", "K", "M", "G", "T"];
    let mut size = size;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit]).trim_end().to_string()
}
