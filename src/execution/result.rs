//! Textual formatting of executor results for the wire protocol's
//! `tag=0` data payload (spec.md §6). No upstream `Table.String()` body
//! was present in the retrieved source, so the layouts below (space
//! separated rows, one header line of field names) are authored fresh.

use crate::catalog::Table;
use crate::common::value::Value;

pub fn format_schema(table: &Table) -> String {
    let mut out = format!("table {}", table.name());
    for field in table.fields() {
        out.push_str(&format!(
            "\n  {} {}{}",
            field.name(),
            field.kind().name(),
            if field.is_indexed() { " (indexed)" } else { "" }
        ));
    }
    out
}

pub fn format_rows(table: &Table, rows: &[Vec<Value>]) -> String {
    let header = table.fields().iter().map(|f| f.name()).collect::<Vec<_>>().join(" ");
    if rows.is_empty() {
        return format!("{header}\n(0 rows)");
    }
    let mut out = header;
    for row in rows {
        out.push('\n');
        out.push_str(&row.iter().map(Value::to_display).collect::<Vec<_>>().join(" "));
    }
    out.push_str(&format!("\n({} row{})", rows.len(), if rows.len() == 1 { "" } else { "s" }));
    out
}
