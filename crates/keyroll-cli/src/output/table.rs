use anyhow::Result;
use comfy_table::Table;

pub fn print_table(table: Table) -> Result<()> {
    println!("{table}");
    Ok(())
}

/// Two-column key/value table.
pub fn key_value_table<'a>(rows: impl IntoIterator<Item = (&'a str, String)>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value]);
    }
    table
}
