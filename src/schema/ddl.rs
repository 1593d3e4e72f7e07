//! DDL generation for declared shapes

use super::shape::{EntityShape, FieldDef};

fn column_definition(field: &FieldDef) -> String {
    let mut def = format!("{} {}", field.name, field.sql_type.as_sql());
    if field.primary_key {
        def.push_str(" PRIMARY KEY");
    } else if !field.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(fk) = &field.foreign_key {
        def.push_str(&format!(
            " REFERENCES {} ({}) ON DELETE {}",
            fk.entity,
            fk.field,
            fk.on_delete.as_sql()
        ));
    }
    def
}

/// SQL to create the table of a shape
pub fn create_table(shape: &EntityShape) -> String {
    let columns: Vec<String> = shape.fields.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        shape.name,
        columns.join(",\n    ")
    )
}

/// Index name for an indexed field
pub fn index_name(table: &str, field: &str) -> String {
    format!("ix_{}_{}", table, field)
}

/// SQL to create the indexes of a shape
pub fn create_indexes(shape: &EntityShape) -> Vec<String> {
    shape
        .fields
        .iter()
        .filter(|f| f.indexed && !f.primary_key)
        .map(|f| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                index_name(shape.name, f.name),
                shape.name,
                f.name
            )
        })
        .collect()
}

/// All schema creation statements for one shape
pub fn schema_statements(shape: &EntityShape) -> Vec<String> {
    let mut stmts = vec![create_table(shape)];
    stmts.extend(create_indexes(shape));
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::shape::{FieldDef, OnDelete};

    #[test]
    fn test_create_table_sql() {
        let shape = EntityShape::new("hero")
            .field(FieldDef::primary_key("id"))
            .field(FieldDef::text("name").indexed())
            .field(FieldDef::integer("age").nullable())
            .field(FieldDef::integer("team_id").nullable().references("team", "id", OnDelete::SetNull));

        let sql = create_table(&shape);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS hero"));
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("name TEXT NOT NULL"));
        assert!(sql.contains("age INTEGER,"));
        assert!(sql.contains("REFERENCES team (id) ON DELETE SET NULL"));

        let idx = create_indexes(&shape);
        assert_eq!(idx, vec!["CREATE INDEX IF NOT EXISTS ix_hero_name ON hero (name)"]);
    }
}
