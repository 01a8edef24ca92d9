use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// A structured table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table with column headers and data rows.
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: impl IntoIterator<Item = Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().collect(),
        }
    }

    /// Creates a two-column field/value table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value]);
        Self::grid(["field", "value"], records)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn grid_table_renders_with_headers_and_rows() {
        let table = Table::grid(
            ["role", "characteristic"],
            vec![
                vec!["led".into(), "6e400103".into()],
                vec!["rx".into(), "6e400002".into()],
            ],
        );
        assert_snapshot!(table.to_string(), @r"
        ╭──────┬────────────────╮
        │ role │ characteristic │
        ├──────┼────────────────┤
        │ led  │ 6e400103       │
        │ rx   │ 6e400002       │
        ╰──────┴────────────────╯
        ");
    }

    #[test]
    fn key_value_table_renders_field_value_pairs() {
        let painter = Painter::new(false);
        let table = Table::key_value(
            &painter,
            vec![("name", "Nordic_Blinky".into()), ("rssi", "-43".into())],
        );
        assert_snapshot!(table.to_string(), @r"
        ╭───────┬───────────────╮
        │ field │ value         │
        ├───────┼───────────────┤
        │ name  │ Nordic_Blinky │
        │ rssi  │ -43           │
        ╰───────┴───────────────╯
        ");
    }
}
