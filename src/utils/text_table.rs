/// Render rows as a fixed-width table: header line, one line per row, every
/// column right-aligned to its widest cell and separated by two spaces.
pub fn render(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return "Empty result set".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| -> String {
        widths
            .iter()
            .enumerate()
            .map(|(idx, width)| {
                let cell = cells.get(idx).map(String::as_str).unwrap_or("");
                format!("{cell:>width$}")
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = line(headers);
    for row in rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}
