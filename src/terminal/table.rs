use comfy_table::{presets::NOTHING, Cell, Color, ContentArrangement, Table};

/// Borderless table with yellow headers and cyan cells
pub fn make_table<'a>(headers: impl IntoIterator<Item = &'a str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.into_iter().map(|header| Cell::new(header).fg(Color::Yellow)));
    table
}

pub fn add_row(table: &mut Table, cells: impl IntoIterator<Item = impl std::fmt::Display>) {
    table.add_row(cells.into_iter().map(|cell| Cell::new(cell).fg(Color::Cyan)));
}

/// Prints the title and the table indented by four spaces
pub fn print_table(title: &str, table: &Table) {
    println!();
    println!("    {}", console::style(title).italic());
    for line in table.lines() {
        println!("    {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_rendered() {
        let mut table = make_table(["Id", "State"]);
        add_row(&mut table, ["sync0", "IMPORT_COMPLETE"]);
        add_row(&mut table, ["sync1", "IMPORT_FAILED"]);
        let rendered = table.to_string();
        assert!(rendered.contains("Id"));
        assert!(rendered.contains("IMPORT_COMPLETE"));
        assert!(rendered.contains("sync1"));
        assert_eq!(2, table.row_iter().count());
    }
}
