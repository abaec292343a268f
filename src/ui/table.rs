use tabled::{Table, Tabled, builder::Builder, settings::Style};

use crate::schema::{EntityDescriptor, Schema};

#[derive(Tabled)]
pub struct LayoutRow {
    #[tabled(rename = "Entity")]
    pub entity: String,
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Columns")]
    pub columns: String,
    #[tabled(rename = "Foreign keys")]
    pub foreign_keys: String,
    #[tabled(rename = "Junctions")]
    pub junctions: String,
}

impl LayoutRow {
    fn from_descriptor(descriptor: &EntityDescriptor) -> Self {
        let mut columns: Vec<String> = descriptor.columns.iter().map(|c| c.storage.clone()).collect();
        if descriptor.timestamps {
            columns.push(format!("{}_created", descriptor.table));
            columns.push(format!("{}_updated", descriptor.table));
        }
        let foreign_keys: Vec<&str> = descriptor.parents.iter().map(|p| p.storage.as_str()).collect();
        let junctions: Vec<String> = descriptor
            .siblings
            .iter()
            .map(|s| format!("{}({})", s.junction.table, s.junction.columns.join(", ")))
            .collect();

        Self {
            entity: descriptor.name.clone(),
            table: descriptor.table.clone(),
            key: descriptor.id_column.clone(),
            columns: columns.join("\n"),
            foreign_keys: foreign_keys.join("\n"),
            junctions: junctions.join("\n"),
        }
    }
}

/// Derived storage layout of every registered entity
pub fn layout_table(schema: &Schema) -> String {
    let rows: Vec<LayoutRow> = schema.descriptors().map(LayoutRow::from_descriptor).collect();
    if rows.is_empty() {
        return String::new();
    }
    Table::new(&rows).with(Style::rounded()).to_string()
}

/// Rows with a dynamic header, one cell per column
pub struct TableBuilder {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new(header: Vec<String>) -> Self {
        Self { header, rows: Vec::new() }
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut builder = Builder::default();
        builder.push_record(self.header.clone());
        for row in &self.rows {
            builder.push_record(row.clone());
        }
        builder.build().with(Style::rounded()).to_string()
    }
}

pub fn records_table(header: Vec<String>, rows: Vec<Vec<String>>) -> String {
    let mut builder = TableBuilder::new(header);
    for row in rows {
        builder.add_row(row);
    }
    builder.build()
}
