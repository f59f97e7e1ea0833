use ahash::AHashSet;

use crate::core::{JunctionError, Row, Value, cell};

use super::{JoinCondition, JoinType, Operator};

/// One side of a join: the rows plus how their fields are named in the output.
pub struct JoinInput<'a> {
    labels: Vec<String>,
    /// (source field, output column)
    columns: Vec<(String, String)>,
    rows: &'a [Row],
}

impl<'a> JoinInput<'a> {
    /// Output columns are named `label.field`.
    pub fn qualified(label: &str, fields: Vec<String>, rows: &'a [Row]) -> Self {
        let columns = fields
            .into_iter()
            .map(|f| {
                let name = format!("{}.{}", label, f);
                (f, name)
            })
            .collect();
        Self {
            labels: vec![label.to_string()],
            columns,
            rows,
        }
    }

    /// Output columns keep their names; used when a pipeline joins onto the
    /// dataset it already holds.
    pub fn verbatim(fields: Vec<String>, rows: &'a [Row]) -> Self {
        let columns = fields.into_iter().map(|f| (f.clone(), f)).collect();
        Self {
            labels: Vec::new(),
            columns,
            rows,
        }
    }

    fn label(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    fn relabel(&mut self, label: String) {
        for (field, name) in self.columns.iter_mut() {
            *name = format!("{}.{}", label, field);
        }
        self.labels.push(label);
    }

    /// Maps a condition column (bare or `label.field`) to the source field.
    fn resolve(&self, column: &str) -> Option<&str> {
        if let Some((field, _)) = self.columns.iter().find(|(f, _)| f == column) {
            return Some(field.as_str());
        }
        self.labels.iter().find_map(|label| {
            let field = column.strip_prefix(label.as_str())?.strip_prefix('.')?;
            self.columns
                .iter()
                .find(|(f, _)| f == field)
                .map(|(f, _)| f.as_str())
        })
    }

    fn describe(&self) -> String {
        self.label().unwrap_or("current dataset").to_string()
    }

    fn emit(&self, out: &mut Row, row: Option<&Row>) {
        for (field, name) in &self.columns {
            let value = row.map(|r| cell(r, field).clone()).unwrap_or(Value::Null);
            out.insert(name.clone(), value);
        }
    }
}

pub struct JoinOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

struct Resolved<'c> {
    left: &'c str,
    right: &'c str,
    operator: Operator,
}

/// Nested-loop join. Pairs are emitted in left order, right order within;
/// unmatched right rows of RIGHT and FULL joins follow in right order.
pub fn join_inputs(
    left: JoinInput<'_>,
    mut right: JoinInput<'_>,
    join_type: JoinType,
    conditions: &[JoinCondition],
) -> Result<JoinOutput, JunctionError> {
    if join_type != JoinType::Cross && conditions.is_empty() {
        return Err(JunctionError::JoinConfigError(format!(
            "{} join requires at least one condition",
            join_type
        )));
    }

    let clash = right
        .label()
        .filter(|r| left.label() == Some(*r))
        .map(|r| format!("{}_2", r));
    if let Some(renamed) = clash {
        right.relabel(renamed);
    }
    dedupe_right_columns(&left, &mut right);

    let resolved = if join_type == JoinType::Cross {
        Vec::new()
    } else {
        conditions
            .iter()
            .map(|c| resolve_condition(&left, &right, c))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut columns: Vec<String> = left.columns.iter().map(|(_, n)| n.clone()).collect();
    columns.extend(right.columns.iter().map(|(_, n)| n.clone()));

    let width = columns.len();
    let mut rows = Vec::new();
    let mut right_matched = vec![false; right.rows.len()];

    for l in left.rows {
        let mut matched = false;
        for (j, r) in right.rows.iter().enumerate() {
            let hit = resolved
                .iter()
                .all(|c| c.operator.apply(cell(l, c.left), cell(r, c.right)));
            if hit {
                matched = true;
                right_matched[j] = true;
                let mut out = Row::with_capacity(width);
                left.emit(&mut out, Some(l));
                right.emit(&mut out, Some(r));
                rows.push(out);
            }
        }
        if !matched && join_type.keeps_unmatched_left() {
            let mut out = Row::with_capacity(width);
            left.emit(&mut out, Some(l));
            right.emit(&mut out, None);
            rows.push(out);
        }
    }

    if join_type.keeps_unmatched_right() {
        for (r, _) in right
            .rows
            .iter()
            .zip(&right_matched)
            .filter(|(_, matched)| !**matched)
        {
            let mut out = Row::with_capacity(width);
            left.emit(&mut out, None);
            right.emit(&mut out, Some(r));
            rows.push(out);
        }
    }

    Ok(JoinOutput { columns, rows })
}

/// Right output columns that still collide with a left column get a `_2` suffix.
fn dedupe_right_columns(left: &JoinInput<'_>, right: &mut JoinInput<'_>) {
    let mut taken: AHashSet<String> = left.columns.iter().map(|(_, n)| n.clone()).collect();
    for (_, name) in right.columns.iter_mut() {
        while taken.contains(name.as_str()) {
            name.push_str("_2");
        }
        taken.insert(name.clone());
    }
}

fn resolve_condition<'c>(
    left: &'c JoinInput<'_>,
    right: &'c JoinInput<'_>,
    condition: &JoinCondition,
) -> Result<Resolved<'c>, JunctionError> {
    let l = left.resolve(&condition.left_column).ok_or_else(|| {
        JunctionError::JoinConfigError(format!(
            "column '{}' is not a field of {}",
            condition.left_column,
            left.describe()
        ))
    })?;
    let r = right.resolve(&condition.right_column).ok_or_else(|| {
        JunctionError::JoinConfigError(format!(
            "column '{}' is not a field of {}",
            condition.right_column,
            right.describe()
        ))
    })?;
    Ok(Resolved {
        left: l,
        right: r,
        operator: condition.operator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn order(id: f64, user_id: f64, amount: f64) -> Row {
        row(&[
            ("id", Value::Number(id)),
            ("user_id", Value::Number(user_id)),
            ("amount", Value::Number(amount)),
        ])
    }

    fn orders() -> Vec<Row> {
        vec![
            order(1.0, 10.0, 120.5),
            order(2.0, 11.0, 89.99),
            order(3.0, 99.0, 200.0),
        ]
    }

    fn users() -> Vec<Row> {
        vec![
            row(&[("id", Value::Number(10.0)), ("name", "Ann".into())]),
            row(&[("id", Value::Number(11.0)), ("name", "Bob".into())]),
            row(&[("id", Value::Number(12.0)), ("name", "Cid".into())]),
        ]
    }

    fn run(join_type: JoinType, conditions: &[JoinCondition]) -> Result<JoinOutput, JunctionError> {
        let (o, u) = (orders(), users());
        join_inputs(
            JoinInput::qualified("orders", fields(&["id", "user_id", "amount"]), &o),
            JoinInput::qualified("users", fields(&["id", "name"]), &u),
            join_type,
            conditions,
        )
    }

    fn on_user() -> Vec<JoinCondition> {
        vec![JoinCondition::new("orders.user_id", Operator::Eq, "id")]
    }

    #[test]
    fn test_left_join_keeps_unmatched_left() {
        let out = run(JoinType::Left, &on_user()).unwrap();
        assert_eq!(
            out.columns,
            fields(&["orders.id", "orders.user_id", "orders.amount", "users.id", "users.name"])
        );
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.rows[0]["users.name"], Value::from("Ann"));
        assert_eq!(out.rows[2]["orders.id"], Value::Number(3.0));
        assert_eq!(out.rows[2]["users.name"], Value::Null);
        assert_eq!(out.rows[2]["users.id"], Value::Null);
    }

    #[test]
    fn test_right_and_full_append_unmatched_right() {
        let right = run(JoinType::Right, &on_user()).unwrap();
        assert_eq!(right.rows.len(), 3);
        assert_eq!(right.rows[2]["users.name"], Value::from("Cid"));
        assert_eq!(right.rows[2]["orders.id"], Value::Null);

        let full = run(JoinType::Full, &on_user()).unwrap();
        assert_eq!(full.rows.len(), 4);
        assert_eq!(full.rows[2]["orders.id"], Value::Number(3.0));
        assert_eq!(full.rows[3]["users.id"], Value::Number(12.0));
    }

    #[test]
    fn test_cross_ignores_conditions() {
        let out = run(JoinType::Cross, &[]).unwrap();
        assert_eq!(out.rows.len(), 9);
        let with_conditions = run(JoinType::Cross, &on_user()).unwrap();
        assert_eq!(with_conditions.rows.len(), 9);
    }

    #[test]
    fn test_multi_condition_and_non_equi() {
        let conditions = vec![
            JoinCondition::new("user_id", Operator::Ge, "id"),
            JoinCondition::new("amount", Operator::Gt, "id"),
        ];
        let out = run(JoinType::Inner, &conditions).unwrap();
        // order 1 (10, 120.5): users 10; order 2 (11, 89.99): users 10, 11; order 3 (99, 200): all
        assert_eq!(out.rows.len(), 6);
    }

    #[test]
    fn test_missing_conditions_rejected() {
        let err = run(JoinType::Inner, &[]).err().unwrap();
        assert!(matches!(err, JunctionError::JoinConfigError(_)));
    }

    #[test]
    fn test_unknown_condition_column_rejected() {
        let conditions = vec![JoinCondition::new("customer_id", Operator::Eq, "id")];
        let err = run(JoinType::Inner, &conditions).err().unwrap();
        assert_eq!(
            err,
            JunctionError::JoinConfigError(
                "column 'customer_id' is not a field of orders".to_string()
            )
        );
    }

    #[test]
    fn test_same_label_gets_suffix() {
        let u = users();
        let out = join_inputs(
            JoinInput::qualified("users", fields(&["id", "name"]), &u),
            JoinInput::qualified("users", fields(&["id", "name"]), &u),
            JoinType::Inner,
            &[JoinCondition::new("users.id", Operator::Eq, "users_2.id")],
        )
        .unwrap();
        assert_eq!(
            out.columns,
            fields(&["users.id", "users.name", "users_2.id", "users_2.name"])
        );
        assert_eq!(out.rows.len(), 3);
    }

    #[test]
    fn test_verbatim_left_side() {
        let o = orders();
        let u = users();
        let out = join_inputs(
            JoinInput::verbatim(fields(&["id", "user_id", "amount"]), &o),
            JoinInput::qualified("users", fields(&["id", "name"]), &u),
            JoinType::Inner,
            &[JoinCondition::new("user_id", Operator::Eq, "id")],
        )
        .unwrap();
        assert_eq!(out.columns[0], "id");
        assert_eq!(out.columns[3], "users.id");
        assert_eq!(out.rows.len(), 2);
    }

    #[test]
    fn test_null_keys_never_match() {
        let l = vec![row(&[("k", Value::Null)])];
        let r = vec![row(&[("k", Value::Null)])];
        let out = join_inputs(
            JoinInput::qualified("a", fields(&["k"]), &l),
            JoinInput::qualified("b", fields(&["k"]), &r),
            JoinType::Full,
            &[JoinCondition::new("k", Operator::Eq, "k")],
        )
        .unwrap();
        assert_eq!(out.rows.len(), 2);
    }
}
