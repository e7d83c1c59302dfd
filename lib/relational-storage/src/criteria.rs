//! Typed search predicates.
//!
//! `Criteria` replaces free-form keyword predicates with a small fluent
//! builder over tagged constraints: equality, in-set (where `Null` members
//! additionally admit NULL rows), and related-record equality (rewritten to
//! the foreign-key column). Field names are validated against the target
//! model's searchable columns when the criteria are compiled.

use std::any::TypeId;

use crate::model::Model;
use crate::{Entity, StorageError, Value};

/// A set of ANDed predicates accepted by `search`, `from_left`, and
/// `from_right`.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
struct Term {
    field: String,
    constraint: Constraint,
}

#[derive(Debug, Clone)]
enum Constraint {
    Equals(Value),
    AnyOf(Vec<Value>),
    Related {
        entity: &'static str,
        target: TypeId,
        identity: Option<i64>,
    },
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a column to equal a value.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(Term {
            field: field.into(),
            constraint: Constraint::Equals(value.into()),
        });
        self
    }

    /// Require a column to match any of the given values. A `Value::Null`
    /// member additionally admits rows where the column is NULL; a list of
    /// only nulls degrades to a plain IS NULL test.
    pub fn any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.terms.push(Term {
            field: field.into(),
            constraint: Constraint::AnyOf(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Require a relationship field to point at the given record, matching
    /// on its identity value.
    pub fn related<E: Entity>(mut self, field: impl Into<String>, record: &E) -> Self {
        self.terms.push(Term {
            field: field.into(),
            constraint: Constraint::Related {
                entity: E::entity_name(),
                target: TypeId::of::<E>(),
                identity: record.identity(),
            },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Compile into a WHERE fragment plus ordered bind values, validating
    /// every field against the model's searchable columns.
    pub(crate) fn compile(&self, model: &Model) -> Result<(String, Vec<Value>), StorageError> {
        let mut clauses = Vec::with_capacity(self.terms.len());
        let mut binds = Vec::new();

        for term in &self.terms {
            match &term.constraint {
                Constraint::Related {
                    entity,
                    target,
                    identity,
                } => {
                    let fk = model
                        .foreigners
                        .iter()
                        .find(|fk| fk.field == term.field)
                        .ok_or_else(|| {
                            StorageError::Usage(format!(
                                "`{}` has no relationship field `{}`",
                                model.entity, term.field
                            ))
                        })?;

                    if fk.target_type != *target {
                        return Err(StorageError::Usage(format!(
                            "Field `{}` in `{}` does not reference `{entity}`",
                            term.field, model.entity
                        )));
                    }

                    clauses.push(format!("[{}] = ?", fk.column));
                    binds.push(identity.map_or(Value::Null, Value::Integer));
                }
                Constraint::Equals(value) => {
                    check_searchable(model, &term.field)?;
                    clauses.push(format!("[{}] = ?", term.field));
                    binds.push(value.clone());
                }
                Constraint::AnyOf(values) => {
                    check_searchable(model, &term.field)?;
                    clauses.push(Self::in_set(&term.field, values, &mut binds)?);
                }
            }
        }

        Ok((clauses.join(" AND "), binds))
    }

    fn in_set(
        field: &str,
        values: &[Value],
        binds: &mut Vec<Value>,
    ) -> Result<String, StorageError> {
        if values.is_empty() {
            return Err(StorageError::Usage(format!(
                "Empty value list for field `{field}`"
            )));
        }

        let mut admits_null = false;
        let mut placeholders = Vec::new();

        for value in values {
            if *value == Value::Null {
                admits_null = true;
            } else {
                placeholders.push("?");
                binds.push(value.clone());
            }
        }

        if placeholders.is_empty() {
            return Ok(format!("[{field}] IS NULL"));
        }

        let set = format!("[{field}] IN ({})", placeholders.join(", "));

        Ok(if admits_null {
            format!("({set} OR [{field}] IS NULL)")
        } else {
            set
        })
    }
}

fn check_searchable(model: &Model, field: &str) -> Result<(), StorageError> {
    if model.searchable.iter().any(|name| name == field) {
        Ok(())
    } else {
        Err(StorageError::Usage(format!(
            "`{}` has no searchable field `{field}`",
            model.entity
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;

    use super::*;
    use crate::ColumnType;
    use crate::model::{Column, Model};

    fn widget_model() -> Model {
        Model {
            entity: "Widget",
            type_id: TypeId::of::<()>(),
            table: "Widget".to_string(),
            id_column: "widget_id".to_string(),
            columns: vec![
                Column {
                    name: "label".to_string(),
                    column_type: ColumnType::Text,
                    nullable: false,
                },
                Column {
                    name: "weight".to_string(),
                    column_type: ColumnType::Integer,
                    nullable: true,
                },
            ],
            foreigners: Vec::new(),
            uniques: Vec::new(),
            searchable: vec!["label".to_string(), "weight".to_string()],
        }
    }

    #[test]
    fn equality_compiles_to_a_placeholder() {
        let criteria = Criteria::new().eq("label", "widget-9");
        let (clause, binds) = criteria.compile(&widget_model()).unwrap();

        assert_eq!(clause, "[label] = ?");
        assert_eq!(binds, vec![Value::Text("widget-9".to_string())]);
    }

    #[test]
    fn terms_are_anded_in_order() {
        let criteria = Criteria::new().eq("label", "x").eq("weight", 3i64);
        let (clause, binds) = criteria.compile(&widget_model()).unwrap();

        assert_eq!(clause, "[label] = ? AND [weight] = ?");
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn in_set_with_null_admits_null_rows() {
        let criteria = Criteria::new().any_of("weight", [Value::Integer(1), Value::Null]);
        let (clause, binds) = criteria.compile(&widget_model()).unwrap();

        assert_eq!(clause, "([weight] IN (?) OR [weight] IS NULL)");
        assert_eq!(binds, vec![Value::Integer(1)]);
    }

    #[test]
    fn all_null_set_degrades_to_is_null() {
        let criteria = Criteria::new().any_of("weight", [Value::Null, Value::Null]);
        let (clause, binds) = criteria.compile(&widget_model()).unwrap();

        assert_eq!(clause, "[weight] IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn empty_set_is_a_usage_error() {
        let criteria = Criteria::new().any_of("weight", Vec::<Value>::new());
        let result = criteria.compile(&widget_model());

        assert!(matches!(result, Err(StorageError::Usage(_))));
    }

    #[test]
    fn unknown_field_is_a_usage_error() {
        let criteria = Criteria::new().eq("height", 1i64);
        let result = criteria.compile(&widget_model());

        assert!(matches!(result, Err(StorageError::Usage(_))));
    }
}
