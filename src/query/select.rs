//! Select statement builder and its translation to SQL

use std::marker::PhantomData;
use crate::entity::Entity;
use crate::schema::SchemaRegistry;
use crate::storage::Statement;
use crate::value::Value;
use crate::{Error, Result};
use super::expr::{Column, Expr};

#[derive(Debug, Clone)]
struct JoinClause {
    entity: &'static str,
    on: Option<Expr>,
    outer: bool,
}

/// A select over one entity (`Select<Hero>`) or a pair (`Select<(Hero, Team)>`).
///
/// Built with [`select`] / [`select_pair`] and run with
/// [`crate::Session::exec`] / [`crate::Session::exec_pair`].
#[derive(Debug, Clone)]
pub struct Select<P> {
    projection: Vec<&'static str>,
    joins: Vec<JoinClause>,
    filters: Vec<Expr>,
    order: Vec<(Column, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    _marker: PhantomData<fn() -> P>,
}

/// Begin a query returning instances of `E`
pub fn select<E: Entity>() -> Select<E> {
    Select::new(vec![E::TABLE])
}

/// Begin a query returning `(A, B)` pairs
pub fn select_pair<A: Entity, B: Entity>() -> Select<(A, B)> {
    Select::new(vec![A::TABLE, B::TABLE])
}

/// Projected entity and where its columns sit in each result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProjectedEntity {
    pub entity: &'static str,
    pub offset: usize,
    pub width: usize,
}

/// SQL ready to execute plus the row layout needed to materialize it
#[derive(Debug, Clone)]
pub(crate) struct CompiledSelect {
    pub statement: Statement,
    pub layout: Vec<ProjectedEntity>,
}

impl<P> Select<P> {
    fn new(projection: Vec<&'static str>) -> Self {
        Self {
            projection,
            joins: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    /// Add a conjunctive filter; repeated calls AND together
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Inner join on the declared foreign key between `E` and the query
    pub fn join<E: Entity>(mut self) -> Self {
        self.joins.push(JoinClause { entity: E::TABLE, on: None, outer: false });
        self
    }

    /// Left outer join on the declared foreign key between `E` and the query
    pub fn outer_join<E: Entity>(mut self) -> Self {
        self.joins.push(JoinClause { entity: E::TABLE, on: None, outer: true });
        self
    }

    /// Join with an explicit condition
    pub fn join_on<E: Entity>(mut self, on: Expr, outer: bool) -> Self {
        self.joins.push(JoinClause { entity: E::TABLE, on: Some(on), outer });
        self
    }

    pub fn order_by(mut self, column: Column) -> Self {
        self.order.push((column, false));
        self
    }

    pub fn order_by_desc(mut self, column: Column) -> Self {
        self.order.push((column, true));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Primary projected entity
    pub fn entity(&self) -> &'static str {
        self.projection[0]
    }

    /// Translate into SQL against the declared schema
    pub(crate) fn compile(&self, schema: &SchemaRegistry) -> Result<CompiledSelect> {
        for entity in &self.projection {
            schema.shape(entity)?;
        }

        // FROM items: projected entities not brought in by a join
        let mut from: Vec<&'static str> = Vec::new();
        for entity in &self.projection {
            let joined = self.joins.iter().any(|j| j.entity == *entity);
            if (!joined || from.is_empty()) && !from.contains(entity) {
                from.push(entity);
            }
        }

        let mut scope: Vec<&'static str> = from.clone();
        let mut statement = Statement::default();
        let mut join_sql = Vec::new();

        for join in &self.joins {
            if scope.contains(&join.entity) {
                return Err(Error::InvalidQuery(format!("{} is already part of the query", join.entity)));
            }
            let target = schema.shape(join.entity)?;
            let condition = match &join.on {
                Some(on) => {
                    let mut with_target = scope.clone();
                    with_target.push(target.name);
                    check_columns(schema, on, &with_target)?;
                    on.to_sql(&mut statement)
                }
                None => {
                    let path = find_join_path(schema, &scope, target.name)?;
                    format!(
                        "{}.{} = {}.{}",
                        path.dependent, path.fk_field, path.principal, path.pk_field
                    )
                }
            };
            let kind = if join.outer { "LEFT OUTER JOIN" } else { "JOIN" };
            join_sql.push(format!("{} {} ON {}", kind, target.name, condition));
            scope.push(target.name);
        }

        // Entities only mentioned in filters or ordering become cross joins
        let mut implicit: Vec<&'static str> = Vec::new();
        let mentioned = self
            .filters
            .iter()
            .flat_map(|f| f.columns())
            .chain(self.order.iter().map(|(c, _)| *c));
        for column in mentioned {
            if !scope.contains(&column.entity) {
                schema.shape(column.entity)?;
                tracing::warn!("{} is not joined; adding it as a cross join", column.entity);
                scope.push(column.entity);
                implicit.push(column.entity);
            }
        }

        let mut where_sql = Vec::new();
        for filter in &self.filters {
            check_columns(schema, filter, &scope)?;
            where_sql.push(filter.to_sql(&mut statement));
        }
        for (column, _) in &self.order {
            check_column(schema, column, &scope)?;
        }

        let mut layout = Vec::new();
        let mut select_list = Vec::new();
        for entity in &self.projection {
            let shape = schema.shape(entity)?;
            layout.push(ProjectedEntity {
                entity: shape.name,
                offset: select_list.len(),
                width: shape.fields.len(),
            });
            select_list.extend(shape.field_names().map(|f| format!("{}.{}", shape.name, f)));
        }

        let mut sql = format!("SELECT {} FROM {}", select_list.join(", "), from.join(", "));
        for j in &join_sql {
            sql.push(' ');
            sql.push_str(j);
        }
        for entity in &implicit {
            sql.push_str(", ");
            sql.push_str(entity);
        }
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql.join(" AND "));
        }
        if !self.order.is_empty() {
            let parts: Vec<String> = self
                .order
                .iter()
                .map(|(c, desc)| format!("{}{}", c.qualified(), if *desc { " DESC" } else { "" }))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if self.limit.is_some() || self.offset.is_some() {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            let limit = match self.limit {
                Some(n) => row_count(n, "limit")?,
                None => -1,
            };
            let p = statement.bind(Value::Integer(limit));
            sql.push_str(&format!(" LIMIT {}", p));
            if let Some(offset) = self.offset {
                let p = statement.bind(Value::Integer(row_count(offset, "offset")?));
                sql.push_str(&format!(" OFFSET {}", p));
            }
        }

        statement.sql = sql;
        Ok(CompiledSelect { statement, layout })
    }
}

/// LIMIT/OFFSET operand; SQLite integers are signed
fn row_count(n: u64, clause: &str) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::InvalidQuery(format!("{} {} is out of range", clause, n)))
}

fn find_join_path(
    schema: &SchemaRegistry,
    scope: &[&'static str],
    target: &'static str,
) -> Result<crate::schema::JoinPath> {
    for entity in scope {
        match schema.join_path(entity, target) {
            Ok(path) => return Ok(path),
            Err(Error::NoRelationship { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::NoRelationship {
        from: scope.first().copied().unwrap_or_default().to_string(),
        to: target.to_string(),
    })
}

fn check_column(schema: &SchemaRegistry, column: &Column, scope: &[&'static str]) -> Result<()> {
    if !scope.contains(&column.entity) {
        return Err(Error::InvalidQuery(format!("{} is not part of the query", column.entity)));
    }
    let shape = schema.shape(column.entity)?;
    if shape.get_field(column.name).is_none() {
        return Err(Error::InvalidQuery(format!("Unknown column {}", column)));
    }
    Ok(())
}

fn check_columns(schema: &SchemaRegistry, expr: &Expr, scope: &[&'static str]) -> Result<()> {
    for column in expr.columns() {
        check_column(schema, &column, scope)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Hero, ModelOptions, Team};
    use crate::query::or_;

    fn registry() -> SchemaRegistry {
        ModelOptions::default().registry().unwrap()
    }

    #[test]
    fn test_simple_select() {
        let q = select::<Hero>().filter(Hero::NAME.eq("Deadpond"));
        let c = q.compile(&registry()).unwrap();
        assert_eq!(
            c.statement.sql,
            "SELECT hero.id, hero.name, hero.secret_name, hero.age, hero.team_id FROM hero WHERE (hero.name = ?1)"
        );
        assert_eq!(c.layout, vec![ProjectedEntity { entity: "hero", offset: 0, width: 5 }]);
    }

    #[test]
    fn test_where_or() {
        let q = select::<Hero>().filter(or_([Hero::AGE.le(35), Hero::AGE.gt(90)]));
        let c = q.compile(&registry()).unwrap();
        assert!(c.statement.sql.ends_with("WHERE ((hero.age <= ?1) OR (hero.age > ?2))"));
    }

    #[test]
    fn test_join_uses_declared_foreign_key() {
        let q = select::<Hero>().join::<Team>().filter(Team::NAME.eq("Preventers"));
        let c = q.compile(&registry()).unwrap();
        assert!(c.statement.sql.contains("FROM hero JOIN team ON hero.team_id = team.id"));
    }

    #[test]
    fn test_pair_outer_join_layout() {
        let q = select_pair::<Hero, Team>().outer_join::<Team>();
        let c = q.compile(&registry()).unwrap();
        assert!(c.statement.sql.contains("FROM hero LEFT OUTER JOIN team ON hero.team_id = team.id"));
        assert_eq!(c.layout[1], ProjectedEntity { entity: "team", offset: 5, width: 3 });
    }

    #[test]
    fn test_implicit_cross_join() {
        let q = select_pair::<Hero, Team>().filter(Hero::TEAM_ID.eq(Team::ID));
        let c = q.compile(&registry()).unwrap();
        assert!(c.statement.sql.contains("FROM hero, team WHERE (hero.team_id = team.id)"));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let q = select::<Hero>().filter(crate::Column::new("hero", "power").eq(1));
        assert!(matches!(q.compile(&registry()), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_limit_offset() {
        let q = select::<Hero>().order_by(Hero::ID).offset(3);
        let c = q.compile(&registry()).unwrap();
        assert!(c.statement.sql.ends_with("ORDER BY hero.id LIMIT ?1 OFFSET ?2"));
        assert_eq!(c.statement.params, vec![Value::Integer(-1), Value::Integer(3)]);
    }

    #[test]
    fn test_limit_beyond_i64_rejected() {
        let q = select::<Hero>().limit(u64::MAX);
        assert!(matches!(q.compile(&registry()), Err(Error::InvalidQuery(_))));
        let q = select::<Hero>().offset(i64::MAX as u64 + 1);
        assert!(matches!(q.compile(&registry()), Err(Error::InvalidQuery(_))));
        assert!(select::<Hero>().limit(i64::MAX as u64).compile(&registry()).is_ok());
    }
}
