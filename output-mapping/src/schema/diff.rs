use storage::types::{ColumnAttributes, ColumnSpec, TableInfo};

use crate::schema::DesiredSchema;
use crate::schema::primary_key::{decide, normalize_key};

/// Default values reported by storage do not round-trip reliably, so they are not compared.
const COMPARE_DEFAULT_VALUES: bool = false;

/// Attributes a live column should be changed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDelta {
    pub column_name: String,
    pub desired: ColumnAttributes,
}

/// Structural changes needed to turn a live table into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChangeSet {
    /// Columns to add, in declaration order.
    pub missing_columns: Vec<ColumnSpec>,
    /// Key to set, in declaration order. `None` keeps the current key.
    pub primary_key: Option<Vec<String>>,
    pub attribute_deltas: Vec<AttributeDelta>,
}

impl TableChangeSet {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty()
            && self.primary_key.is_none()
            && self.attribute_deltas.is_empty()
    }
}

/// Computes the changes that bring `live` to `desired`.
///
/// Columns are matched by exact name.
pub fn diff(desired: &DesiredSchema, live: &TableInfo) -> TableChangeSet {
    let mut changes = TableChangeSet::default();

    for column in &desired.columns {
        match live.column(&column.name) {
            None => changes.missing_columns.push(column.clone()),
            Some(live_column) => {
                if let (Some(live_definition), Some(desired_definition)) =
                    (&live_column.definition, &column.definition)
                    && attributes_differ(live_definition, desired_definition)
                {
                    changes.attribute_deltas.push(AttributeDelta {
                        column_name: column.name.clone(),
                        desired: desired_definition.clone(),
                    });
                }
            }
        }
    }

    if decide(&live.primary_key, &desired.primary_key) {
        changes.primary_key = Some(normalize_key(&desired.primary_key));
    }

    changes
}

fn attributes_differ(live: &ColumnAttributes, desired: &ColumnAttributes) -> bool {
    let differ = live.base_type != desired.base_type
        || live.length != desired.length
        || live.nullable != desired.nullable;

    differ || (COMPARE_DEFAULT_VALUES && live.default != desired.default)
}

#[cfg(test)]
mod tests {
    use config::shared::BaseType;
    use storage::types::TableId;

    use super::*;

    fn attributes(base_type: BaseType, length: Option<&str>, nullable: bool) -> ColumnAttributes {
        ColumnAttributes {
            base_type,
            length: length.map(str::to_string),
            nullable,
            default: None,
        }
    }

    fn live(columns: Vec<ColumnSpec>, primary_key: &[&str]) -> TableInfo {
        TableInfo {
            id: "in.c-main.t".parse::<TableId>().unwrap(),
            columns,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            rows_count: 0,
        }
    }

    #[test]
    fn identical_schema_yields_no_changes() {
        let columns = vec![
            ColumnSpec::typed("id", attributes(BaseType::Integer, None, false)),
            ColumnSpec::untyped("name"),
        ];
        let desired = DesiredSchema {
            columns: columns.clone(),
            primary_key: vec!["id".to_string()],
        };

        let changes = diff(&desired, &live(columns, &["id"]));
        assert!(changes.is_empty());
    }

    #[test]
    fn missing_columns_keep_declaration_order() {
        let desired = DesiredSchema {
            columns: vec![
                ColumnSpec::untyped("c"),
                ColumnSpec::untyped("a"),
                ColumnSpec::untyped("b"),
            ],
            primary_key: vec![],
        };

        let changes = diff(&desired, &live(vec![ColumnSpec::untyped("a")], &[]));
        let names = changes
            .missing_columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "b"]);
        assert!(changes.primary_key.is_none());
    }

    #[test]
    fn column_names_are_case_sensitive() {
        let desired = DesiredSchema {
            columns: vec![ColumnSpec::untyped("Name")],
            primary_key: vec![],
        };

        let changes = diff(&desired, &live(vec![ColumnSpec::untyped("name")], &[]));
        assert_eq!(changes.missing_columns.len(), 1);
    }

    #[test]
    fn primary_key_target_keeps_desired_order() {
        let desired = DesiredSchema {
            columns: vec![ColumnSpec::untyped("Id"), ColumnSpec::untyped("Name")],
            primary_key: vec!["Name".to_string(), "Id".to_string()],
        };
        let columns = desired.columns.clone();

        let changes = diff(&desired, &live(columns.clone(), &["Id"]));
        assert_eq!(
            changes.primary_key,
            Some(vec!["Name".to_string(), "Id".to_string()])
        );

        let changes = diff(&desired, &live(columns, &["Id", "Name"]));
        assert!(changes.primary_key.is_none());
    }

    #[test]
    fn attribute_changes_ignore_defaults() {
        let mut desired_attributes = attributes(BaseType::String, Some("255"), true);
        desired_attributes.default = Some("x".to_string());
        let desired = DesiredSchema {
            columns: vec![
                ColumnSpec::typed("name", desired_attributes.clone()),
                ColumnSpec::typed("note", attributes(BaseType::String, None, true)),
                ColumnSpec::typed("untyped", attributes(BaseType::String, None, true)),
            ],
            primary_key: vec![],
        };

        let changes = diff(
            &desired,
            &live(
                vec![
                    ColumnSpec::typed("name", attributes(BaseType::String, Some("100"), true)),
                    ColumnSpec::typed("note", attributes(BaseType::String, None, true)),
                    ColumnSpec::untyped("untyped"),
                ],
                &[],
            ),
        );
        assert_eq!(
            changes.attribute_deltas,
            vec![AttributeDelta {
                column_name: "name".to_string(),
                desired: desired_attributes,
            }]
        );
    }
}
