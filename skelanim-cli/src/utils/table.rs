//! Table formatting utilities

use prettytable::{Cell, Row, Table};

/// Create a table with bold headers
pub fn create_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).style_spec("b"))
        .collect();
    table.set_titles(Row::new(header_cells));

    table
}

/// Add a row with a left-aligned label and right-aligned values
pub fn add_stat_row(table: &mut Table, label: &str, values: &[String]) {
    let mut cells = vec![Cell::new(label)];
    cells.extend(values.iter().map(|v| Cell::new(v).style_spec("r")));
    table.add_row(Row::new(cells));
}
